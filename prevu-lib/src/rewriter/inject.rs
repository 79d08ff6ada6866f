use super::{templates::TEMPLATES, url_rewrite::RewriteContext};
use crate::{constants::CONSENT_BANNER_SELECTORS, policy::TargetReference};
use once_cell::sync::Lazy;
use regex::Regex;

// Opening tags are matched with an attribute-or-close guard so `<header>`
// never counts as `<head>`.
static HEAD_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head(\s[^>]*)?>").unwrap());
static HTML_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html(\s[^>]*)?>").unwrap());
static BODY_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body(\s[^>]*)?>").unwrap());
static BODY_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</body\s*>").unwrap());
static BASE_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<base[\s/>]").unwrap());

/// Insert right after the opening head tag, else after the opening html tag,
/// else at document start, so the block runs before any page script.
fn insert_early(html: &str, block: &str) -> String {
  for re in [&*HEAD_OPEN_RE, &*HTML_OPEN_RE] {
    if let Some(m) = re.find(html) {
      let mut out = String::with_capacity(html.len() + block.len());
      out.push_str(&html[..m.end()]);
      out.push_str(block);
      out.push_str(&html[m.end()..]);
      return out;
    }
  }
  format!("{block}{html}")
}

fn insert_head(html: &str, block: &str) -> String {
  if let Some(m) = HEAD_OPEN_RE.find(html) {
    let mut out = String::with_capacity(html.len() + block.len());
    out.push_str(&html[..m.end()]);
    out.push_str(block);
    out.push_str(&html[m.end()..]);
    return out;
  }
  format!("{block}{html}")
}

fn insert_body_start(html: &str, block: &str) -> String {
  if let Some(m) = BODY_OPEN_RE.find(html) {
    let mut out = String::with_capacity(html.len() + block.len());
    out.push_str(&html[..m.end()]);
    out.push_str(block);
    out.push_str(&html[m.end()..]);
    return out;
  }
  format!("{block}{html}")
}

fn insert_body_end(html: &str, block: &str) -> String {
  if let Some(m) = BODY_CLOSE_RE.find(html) {
    let mut out = String::with_capacity(html.len() + block.len());
    out.push_str(&html[..m.start()]);
    out.push_str(block);
    out.push_str(&html[m.start()..]);
    return out;
  }
  format!("{html}{block}")
}

fn escape_attribute(value: &str) -> String {
  value.replace('&', "&amp;").replace('"', "&quot;").replace('\'', "&#39;")
}

/// Inject a `<base>` element pointing at the target's directory-normalized
/// URL unless one already exists. The safety net for anything the rewriter
/// misses.
pub fn ensure_base_href(html: &str, target: &TargetReference) -> String {
  if BASE_TAG_RE.is_match(html) {
    return html.to_string();
  }
  let block = format!("<base href=\"{}\">", escape_attribute(&target.directory_base()));
  insert_head(html, &block)
}

/// Ship the client interceptor as early as possible so it installs before any
/// page script executes. Skipped when a prior injection is already present.
pub(super) fn inject_interceptor(html: &str, ctx: &RewriteContext, debug: bool) -> String {
  if html.contains("data-pv-proxy=\"url-rewriting\"") || html.contains("__PV_PROXY_REWRITE_INSTALLED") {
    return html.to_string();
  }
  let script = TEMPLATES.render_interceptor(ctx, debug);
  let block = format!("<script data-pv-proxy=\"url-rewriting\">{script}</script>");
  insert_early(html, &block)
}

pub(super) fn inject_hydration_guard(html: &str, debug: bool) -> String {
  if html.contains("data-pv-proxy=\"hydration-guard\"") || html.contains("__PV_HYDRATION_GUARD_INSTALLED") {
    return html.to_string();
  }
  let script = TEMPLATES.render_hydration_guard(debug);
  let block = format!("<script data-pv-proxy=\"hydration-guard\">{script}</script>");
  insert_early(html, &block)
}

/// Hide the known cookie-consent overlays: CSS immediately, plus a script
/// re-applying for late-mounted banners.
pub(super) fn inject_consent_cleanup(html: &str) -> String {
  let selectors = CONSENT_BANNER_SELECTORS.join(", ");
  let style_block = format!(
    "\n<style data-pv-proxy=\"consent-hide\">{selectors}{{display:none!important;visibility:hidden!important;opacity:0!important;}}</style>"
  );
  let selector_array =
    serde_json::to_string(CONSENT_BANNER_SELECTORS).unwrap_or_else(|_| "[]".to_string());
  let script_block = format!(
    "\n<script data-pv-proxy=\"consent-hide\">(function(){{var selectors={selector_array};\
var hide=function(){{selectors.forEach(function(sel){{try{{document.querySelectorAll(sel).forEach(function(node){{\
if(!node)return;node.style.setProperty('display','none','important');\
node.style.setProperty('visibility','hidden','important');\
node.style.setProperty('opacity','0','important');\
node.setAttribute('data-pv-proxy-hidden','true');}});}}catch(e){{}}}});}};\
hide();['load','DOMContentLoaded'].forEach(function(evt){{window.addEventListener(evt,hide,{{once:false}});}});\
var interval=setInterval(hide,500);setTimeout(function(){{clearInterval(interval);}},5000);}})();</script>"
  );

  let output = insert_head(html, &style_block);
  insert_body_end(&output, &script_block)
}

/// Persistent visible notice shown when the upstream answered 403 but still
/// returned a page body.
pub(super) fn inject_blocked_banner(html: &str, target_host: &str) -> String {
  let message = format!(
    "This site ({}) blocked the preview proxy request. Some sites block automated access for security reasons.",
    escape_attribute(target_host)
  );

  let style_block = "\n<style data-pv-proxy=\"403-notice\">\
.pv-proxy-403-banner{position:fixed!important;top:0!important;left:0!important;right:0!important;\
z-index:999999!important;background:linear-gradient(135deg,#ff6b6b 0%,#ee5a6f 100%)!important;\
color:white!important;padding:12px 20px!important;\
font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,'Helvetica Neue',Arial,sans-serif!important;\
font-size:14px!important;line-height:1.5!important;text-align:center!important;\
box-shadow:0 2px 8px rgba(0,0,0,0.15)!important;display:block!important;visibility:visible!important;\
opacity:1!important;margin:0!important;width:100%!important;box-sizing:border-box!important;}\
.pv-proxy-403-banner strong{font-weight:600!important;display:block!important;margin-bottom:4px!important;}\
.pv-proxy-403-banner .pv-proxy-403-detail{font-size:12px!important;opacity:0.9!important;}\
</style>";

  let banner_block = format!(
    "\n<div class=\"pv-proxy-403-banner\" data-pv-proxy=\"403-notice\">\
<strong>Preview blocked</strong>\
<span class=\"pv-proxy-403-detail\">{message}</span></div>"
  );

  // pages that fight back get their banner re-asserted every second
  let protection_block = "\n<script data-pv-proxy=\"403-protection\">(function(){\
function protectBanner(){\
var banner=document.querySelector('.pv-proxy-403-banner[data-pv-proxy=\"403-notice\"]');\
if(!banner)return;\
banner.style.setProperty('position','fixed','important');\
banner.style.setProperty('top','0','important');\
banner.style.setProperty('left','0','important');\
banner.style.setProperty('right','0','important');\
banner.style.setProperty('z-index','999999','important');\
banner.style.setProperty('display','block','important');\
banner.style.setProperty('visibility','visible','important');\
banner.style.setProperty('opacity','1','important');}\
protectBanner();['DOMContentLoaded','load'].forEach(function(evt){\
window.addEventListener(evt,protectBanner,{once:false});});\
setInterval(protectBanner,1000);})();</script>";

  let output = insert_head(html, style_block);
  let output = insert_body_start(&output, &banner_block);
  insert_body_end(&output, protection_block)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::{evaluate_target, PolicySet};

  fn target(url: &str) -> TargetReference {
    evaluate_target(url, &PolicySet::default()).unwrap()
  }

  #[test]
  fn base_is_added_once_and_escaped() {
    let html = "<html><head><title>t</title></head><body></body></html>";
    let out = ensure_base_href(html, &target("https://site.example/a/page?x=1&y=2"));
    assert_eq!(out.matches("<base ").count(), 1);
    // query dropped, path normalized to a directory
    assert!(out.contains("<head><base href=\"https://site.example/a/page/\">"));
  }

  #[test]
  fn base_injection_is_skipped_when_present() {
    let html = "<html><head><base href=\"https://original.example/\"></head></html>";
    let out = ensure_base_href(html, &target("https://site.example/"));
    assert_eq!(out, html);
  }

  #[test]
  fn base_escapes_ampersands_in_directory_urls() {
    let out = ensure_base_href("<head></head>", &target("https://site.example/a&b/"));
    assert!(out.contains("a&amp;b"));
  }

  #[test]
  fn header_element_is_not_mistaken_for_head() {
    let html = "<html><body><header>x</header></body></html>";
    let out = ensure_base_href(html, &target("https://site.example/"));
    // no head: the base lands at document start, not inside <header>
    assert!(out.starts_with("<base href="));
  }

  #[test]
  fn interceptor_lands_right_after_head_and_only_once() {
    let ctx = RewriteContext::new(&target("https://site.example/"), "http://p.local", &[]);
    let html = "<html><head><script>first</script></head><body></body></html>";
    let out = inject_interceptor(html, &ctx, false);
    let head_pos = out.find("<head>").unwrap();
    let injected_pos = out.find("data-pv-proxy=\"url-rewriting\"").unwrap();
    let first_pos = out.find("first").unwrap();
    assert!(head_pos < injected_pos && injected_pos < first_pos);

    let again = inject_interceptor(&out, &ctx, false);
    assert_eq!(again.matches("data-pv-proxy=\"url-rewriting\"").count(), 1);
  }

  #[test]
  fn interceptor_prepends_without_head_or_html() {
    let ctx = RewriteContext::new(&target("https://site.example/"), "http://p.local", &[]);
    let out = inject_interceptor("<p>bare fragment</p>", &ctx, false);
    assert!(out.starts_with("<script data-pv-proxy=\"url-rewriting\">"));
  }

  #[test]
  fn consent_cleanup_injects_style_and_script() {
    let html = "<html><head></head><body><p>x</p></body></html>";
    let out = inject_consent_cleanup(html);
    assert!(out.contains("data-pv-proxy=\"consent-hide\""));
    assert!(out.contains("#onetrust-banner-sdk"));
    // script sits before the body close tag
    let script_pos = out.find("<script data-pv-proxy=\"consent-hide\"").unwrap();
    let close_pos = out.find("</body>").unwrap();
    assert!(script_pos < close_pos);
  }

  #[test]
  fn blocked_banner_carries_the_host() {
    let html = "<html><head></head><body><p>x</p></body></html>";
    let out = inject_blocked_banner(html, "www.site.example");
    assert!(out.contains("This site (www.site.example) blocked the preview proxy request"));
    assert!(out.contains("pv-proxy-403-banner"));
    assert!(out.contains("data-pv-proxy=\"403-protection\""));
  }
}
