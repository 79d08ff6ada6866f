use super::{
  inject::{ensure_base_href, inject_blocked_banner, inject_consent_cleanup, inject_hydration_guard, inject_interceptor},
  url_rewrite::{rewrite_srcset, rewrite_url, RewriteContext},
};
use crate::policy::TargetReference;
use http::StatusCode;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Structured-data blocks must survive rewriting byte-identical; they are
/// lifted out before scanning and restored verbatim afterwards.
static JSONLD_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"(?is)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>.*?</script>"#).unwrap());

static SRCSET_ATTR_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"(?i)\b((?:data-)?srcset\s*=\s*)(["'])([^"']*)(["'])"#).unwrap());

static QUOTED_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r#"(?i)\b((?:data-src|data-href|src|href|action|formaction|cite|poster|background|content)\s*=\s*)(["'])([^"']*)(["'])"#,
  )
  .unwrap()
});

static UNQUOTED_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r#"(?i)\b((?:data-src|data-href|src|href|action|formaction|cite|poster|background|content)\s*=\s*)([^\s"'<>`]+)"#,
  )
  .unwrap()
});

static CSS_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)url\s*\(\s*(["']?)([^"')]+)(["']?)\s*\)"#).unwrap());

/// Transform a successful HTML response so the embedded site behaves as
/// though it were never proxied. Step order is fixed: base href, structured
/// data protection, URL rewriting, restoration, script/style injection, and
/// the 403 notice last.
pub fn rewrite_document(
  html: &str,
  ctx: &RewriteContext,
  target: &TargetReference,
  upstream_status: StatusCode,
  debug: bool,
) -> String {
  let output = ensure_base_href(html, target);

  let (output, jsonld_blocks) = protect_jsonld(&output);
  let output = rewrite_url_attributes(&output, ctx);
  let output = restore_jsonld(&output, &jsonld_blocks);

  // both insert right behind the head tag, so the guard goes in first and the
  // interceptor ends up ahead of it in the document
  let output = inject_hydration_guard(&output, debug);
  let output = inject_interceptor(&output, ctx, debug);
  let output = inject_consent_cleanup(&output);

  if upstream_status == StatusCode::FORBIDDEN {
    return inject_blocked_banner(&output, target.host_str());
  }
  output
}

/// Best-effort text scan over URL-bearing constructs. This is not a document
/// parser; attribute values containing unescaped `>` or nested quotes can
/// defeat a match.
fn rewrite_url_attributes(html: &str, ctx: &RewriteContext) -> String {
  let output = SRCSET_ATTR_RE.replace_all(html, |caps: &Captures| {
    format!("{}{}{}{}", &caps[1], &caps[2], rewrite_srcset(ctx, &caps[3]), &caps[4])
  });

  let output = QUOTED_ATTR_RE.replace_all(&output, |caps: &Captures| {
    format!("{}{}{}{}", &caps[1], &caps[2], rewrite_url(ctx, &caps[3]), &caps[4])
  });

  let output = UNQUOTED_ATTR_RE.replace_all(&output, |caps: &Captures| {
    format!("{}{}", &caps[1], rewrite_url(ctx, &caps[2]))
  });

  let output = CSS_URL_RE.replace_all(&output, |caps: &Captures| {
    format!("url({}{}{})", &caps[1], rewrite_url(ctx, &caps[2]), &caps[3])
  });

  output.into_owned()
}

fn protect_jsonld(html: &str) -> (String, Vec<String>) {
  let mut blocks = Vec::new();
  let protected = JSONLD_RE
    .replace_all(html, |caps: &Captures| {
      let placeholder = format!("\u{1}pv-jsonld-{}\u{1}", blocks.len());
      blocks.push(caps[0].to_string());
      placeholder
    })
    .into_owned();
  (protected, blocks)
}

fn restore_jsonld(html: &str, blocks: &[String]) -> String {
  let mut output = html.to_string();
  for (index, block) in blocks.iter().enumerate() {
    let placeholder = format!("\u{1}pv-jsonld-{index}\u{1}");
    output = output.replace(&placeholder, block);
  }
  output
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::{evaluate_target, PolicySet};

  const PROXY: &str = "http://preview.local:8100";

  fn setup(target_url: &str) -> (RewriteContext, TargetReference) {
    let target = evaluate_target(target_url, &PolicySet::default()).unwrap();
    let ctx = RewriteContext::new(&target, PROXY, &["google-analytics.com".to_string()]);
    (ctx, target)
  }

  #[test]
  fn quoted_attributes_are_rewritten() {
    let (ctx, _) = setup("https://site.example/");
    let html = r#"<img src="/img/a.png"><a href='https://other.example/p'>x</a>"#;
    let out = rewrite_url_attributes(html, &ctx);
    assert!(out.contains("src=\"http://preview.local:8100/proxy?url=https%3A%2F%2Fsite.example%2Fimg%2Fa.png\""));
    assert!(out.contains("href='http://preview.local:8100/proxy?url=https%3A%2F%2Fother.example%2Fp'"));
  }

  #[test]
  fn unquoted_attributes_are_rewritten() {
    let (ctx, _) = setup("https://site.example/");
    let out = rewrite_url_attributes("<img src=/img/a.png alt=x>", &ctx);
    assert!(out.contains("src=http://preview.local:8100/proxy?url=https%3A%2F%2Fsite.example%2Fimg%2Fa.png"));
  }

  #[test]
  fn srcset_candidates_are_rewritten_independently() {
    let (ctx, _) = setup("https://site.example/");
    let out = rewrite_url_attributes(r#"<img srcset="a.jpg 1x, b.jpg 2x">"#, &ctx);
    assert!(out.contains("a.jpg 1x,"));
    assert!(out.ends_with(r#" 2x">"#));
    assert_eq!(out.matches("/proxy?url=").count(), 2);
  }

  #[test]
  fn css_url_references_are_rewritten() {
    let (ctx, _) = setup("https://site.example/");
    let out = rewrite_url_attributes(r#"<div style="background:url('/bg.png')"></div>"#, &ctx);
    assert!(out.contains("url('http://preview.local:8100/proxy?url=https%3A%2F%2Fsite.example%2Fbg.png')"));
  }

  #[test]
  fn data_urls_survive_untouched() {
    let (ctx, _) = setup("https://site.example/");
    let html = r#"<img src="data:image/png;base64,AAAA">"#;
    assert_eq!(rewrite_url_attributes(html, &ctx), html);
  }

  #[test]
  fn jsonld_blocks_are_byte_identical_after_processing() {
    let (ctx, target) = setup("https://site.example/");
    let jsonld = r#"<script type="application/ld+json">{"@context":"https://schema.org","url":"https://site.example/about","logo":"/logo.png"}</script>"#;
    let html = format!(r#"<html><head>{jsonld}</head><body><img src="/a.png"></body></html>"#);
    let out = rewrite_document(&html, &ctx, &target, StatusCode::OK, false);
    assert!(out.contains(jsonld), "structured data must not be mutated");
    assert!(out.contains("/proxy?url=https%3A%2F%2Fsite.example%2Fa.png"));
  }

  #[test]
  fn full_pipeline_injects_everything_in_order() {
    let (ctx, target) = setup("https://site.example/a/");
    let html = "<html><head><title>t</title></head><body><p>content</p></body></html>";
    let out = rewrite_document(html, &ctx, &target, StatusCode::OK, false);

    assert!(out.contains("<base href=\"https://site.example/a/\"") || out.contains("proxy?url="));
    assert!(out.contains("data-pv-proxy=\"url-rewriting\""));
    assert!(out.contains("data-pv-proxy=\"hydration-guard\""));
    assert!(out.contains("data-pv-proxy=\"consent-hide\""));
    assert!(!out.contains("pv-proxy-403-banner"));

    // interceptor installs before the hydration guard
    let interceptor_pos = out.find("data-pv-proxy=\"url-rewriting\"").unwrap();
    let guard_pos = out.find("data-pv-proxy=\"hydration-guard\"").unwrap();
    assert!(interceptor_pos < guard_pos);
  }

  #[test]
  fn upstream_403_gets_the_visible_banner() {
    let (ctx, target) = setup("https://site.example/");
    let html = "<html><head></head><body><p>denied</p></body></html>";
    let out = rewrite_document(html, &ctx, &target, StatusCode::FORBIDDEN, false);
    assert!(out.contains("pv-proxy-403-banner"));
    assert!(out.contains("site.example) blocked the preview proxy request"));
  }

  #[test]
  fn rewriting_a_rewritten_document_is_stable_for_urls() {
    let (ctx, _) = setup("https://site.example/");
    let html = r#"<img src="/img/a.png">"#;
    let once = rewrite_url_attributes(html, &ctx);
    let twice = rewrite_url_attributes(&once, &ctx);
    assert_eq!(once, twice);
  }
}
