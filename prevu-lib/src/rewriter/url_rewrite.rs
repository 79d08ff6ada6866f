use crate::{
  constants::{ANALYTICS_PLACEHOLDER_URL, PROXY_ENDPOINT},
  policy::TargetReference,
};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Read-only context threaded through every rewrite call
#[derive(Debug, Clone)]
pub struct RewriteContext {
  /// Directory-normalized target URL, the base for resolving relative forms
  base: Url,
  /// `scheme://host[:port]` of the proxied site
  pub target_origin: String,
  /// `scheme://host[:port]` of this proxy, no trailing slash
  pub proxy_origin: String,
  /// Tracker patterns rewritten to the neutral placeholder
  pub analytics_blocklist: Vec<String>,
}

impl RewriteContext {
  pub fn new(target: &TargetReference, proxy_origin: &str, analytics_blocklist: &[String]) -> Self {
    let base = Url::parse(&target.directory_base()).unwrap_or_else(|_| target.as_url().clone());
    Self {
      base,
      target_origin: target.origin_str(),
      proxy_origin: proxy_origin.trim_end_matches('/').to_string(),
      analytics_blocklist: analytics_blocklist.to_vec(),
    }
  }
}

static SCHEME_SKIP_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)^(data:|blob:|javascript:|mailto:|tel:|#|about:)").unwrap());
static ABSOLUTE_HTTP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://").unwrap());

/// Marker identifying URLs already in proxied form; rewriting is idempotent
fn already_proxied(value: &str) -> bool {
  value.contains(&format!("{PROXY_ENDPOINT}?url="))
}

/// Rewrite a single URL-bearing value into its proxied equivalent, or return
/// it unchanged when it must not be touched.
pub fn rewrite_url(ctx: &RewriteContext, raw: &str) -> String {
  let decoded = decode_html_entities(raw);
  let trimmed = decoded.trim();
  if trimmed.is_empty() {
    return raw.to_string();
  }
  if SCHEME_SKIP_RE.is_match(trimmed) {
    return raw.to_string();
  }
  if already_proxied(trimmed) {
    return raw.to_string();
  }
  if matches_analytics(trimmed, &ctx.analytics_blocklist) {
    return ANALYTICS_PLACEHOLDER_URL.to_string();
  }

  let absolute = if let Some(rest) = trimmed.strip_prefix("//") {
    // protocol-relative: assume https
    format!("https://{rest}")
  } else if ABSOLUTE_HTTP_RE.is_match(trimmed) {
    trimmed.to_string()
  } else {
    match ctx.base.join(trimmed) {
      Ok(resolved) => resolved.to_string(),
      Err(_) => return raw.to_string(),
    }
  };

  // already local to the proxy itself
  if let Ok(parsed) = Url::parse(&absolute) {
    if parsed.origin().ascii_serialization() == ctx.proxy_origin {
      return raw.to_string();
    }
  }

  format!(
    "{}{}?url={}",
    ctx.proxy_origin,
    PROXY_ENDPOINT,
    urlencoding::encode(&absolute)
  )
}

/// Rewrite each comma-separated srcset candidate independently, preserving
/// its width/density descriptors.
pub fn rewrite_srcset(ctx: &RewriteContext, value: &str) -> String {
  value
    .split(',')
    .map(|entry| {
      let trimmed = entry.trim();
      if trimmed.is_empty() {
        return trimmed.to_string();
      }
      let mut parts = trimmed.split_whitespace();
      let candidate = parts.next().unwrap_or_default();
      let descriptors = parts.collect::<Vec<_>>().join(" ");
      let rewritten = rewrite_url(ctx, candidate);
      if descriptors.is_empty() {
        rewritten
      } else {
        format!("{rewritten} {descriptors}")
      }
    })
    .collect::<Vec<_>>()
    .join(", ")
}

fn matches_analytics(value: &str, blocklist: &[String]) -> bool {
  if blocklist.is_empty() {
    return false;
  }
  match Url::parse(value) {
    Ok(url) => {
      let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
      let path = url.path().to_ascii_lowercase();
      blocklist.iter().any(|pattern| {
        let p = pattern.to_ascii_lowercase();
        host.contains(&p) || path.contains(&p)
      })
    }
    Err(_) => {
      let lower = value.to_ascii_lowercase();
      blocklist.iter().any(|pattern| lower.contains(&pattern.to_ascii_lowercase()))
    }
  }
}

/// Minimal entity decoding for attribute values; `&amp;` is resolved last so
/// double-escaped entities survive one level.
pub(crate) fn decode_html_entities(value: &str) -> String {
  value
    .replace("&quot;", "\"")
    .replace("&#34;", "\"")
    .replace("&#39;", "'")
    .replace("&#x27;", "'")
    .replace("&lt;", "<")
    .replace("&gt;", ">")
    .replace("&#x2F;", "/")
    .replace("&#47;", "/")
    .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::{evaluate_target, PolicySet};

  const PROXY: &str = "http://preview.local:8100";

  fn ctx_for(target_url: &str) -> RewriteContext {
    let target = evaluate_target(target_url, &PolicySet::default()).unwrap();
    RewriteContext::new(&target, PROXY, &["google-analytics.com".to_string(), "hotjar.com".to_string()])
  }

  #[test]
  fn absolute_urls_are_wrapped() {
    let ctx = ctx_for("https://www.site.example/");
    let out = rewrite_url(&ctx, "https://cdn.example.com/file.js");
    assert_eq!(
      out,
      "http://preview.local:8100/proxy?url=https%3A%2F%2Fcdn.example.com%2Ffile.js"
    );
  }

  #[test]
  fn proxied_urls_are_untouched() {
    let ctx = ctx_for("https://www.site.example/");
    let already = "http://preview.local:8100/proxy?url=https%3A%2F%2Fcdn.example.com%2Ffile.js";
    assert_eq!(rewrite_url(&ctx, already), already);
  }

  #[test]
  fn proxy_origin_urls_are_untouched() {
    let ctx = ctx_for("https://www.site.example/");
    let local = "http://preview.local:8100/preview/widget.js";
    assert_eq!(rewrite_url(&ctx, local), local);
  }

  #[test]
  fn relative_paths_resolve_against_the_target_directory() {
    let ctx = ctx_for("https://site.example/a/");
    assert_eq!(
      rewrite_url(&ctx, "img/x.png"),
      "http://preview.local:8100/proxy?url=https%3A%2F%2Fsite.example%2Fa%2Fimg%2Fx.png"
    );
  }

  #[test]
  fn root_relative_paths_resolve_against_the_origin() {
    let ctx = ctx_for("https://site.example/a/b.html");
    assert_eq!(
      rewrite_url(&ctx, "/css/app.css"),
      "http://preview.local:8100/proxy?url=https%3A%2F%2Fsite.example%2Fcss%2Fapp.css"
    );
  }

  #[test]
  fn protocol_relative_urls_assume_https() {
    let ctx = ctx_for("https://www.site.example/");
    assert_eq!(
      rewrite_url(&ctx, "//cdn.example/x.js"),
      "http://preview.local:8100/proxy?url=https%3A%2F%2Fcdn.example%2Fx.js"
    );
  }

  #[test]
  fn special_schemes_and_fragments_are_skipped() {
    let ctx = ctx_for("https://www.site.example/");
    for value in [
      "data:image/png;base64,AAAA",
      "blob:https://x/y",
      "javascript:void(0)",
      "mailto:a@b.c",
      "tel:+15551234",
      "#section",
      "about:blank",
      "",
      "   ",
    ] {
      assert_eq!(rewrite_url(&ctx, value), value);
    }
  }

  #[test]
  fn analytics_urls_become_the_placeholder() {
    let ctx = ctx_for("https://www.site.example/");
    assert_eq!(
      rewrite_url(&ctx, "https://www.google-analytics.com/analytics.js"),
      "about:blank"
    );
    // relative form with a blocklisted pattern in the path
    assert_eq!(rewrite_url(&ctx, "vendor/hotjar.com/loader.js"), "about:blank");
  }

  #[test]
  fn srcset_candidates_keep_their_descriptors() {
    let ctx = ctx_for("https://site.example/");
    let out = rewrite_srcset(&ctx, "a.jpg 1x, b.jpg 2x");
    assert_eq!(
      out,
      "http://preview.local:8100/proxy?url=https%3A%2F%2Fsite.example%2Fa.jpg 1x, \
       http://preview.local:8100/proxy?url=https%3A%2F%2Fsite.example%2Fb.jpg 2x"
    );
  }

  #[test]
  fn srcset_with_width_descriptors() {
    let ctx = ctx_for("https://site.example/");
    let out = rewrite_srcset(&ctx, "small.jpg 480w, large.jpg 1080w");
    assert!(out.contains("small.jpg 480w, "));
    assert!(out.ends_with(" 1080w"));
    assert_eq!(out.matches("/proxy?url=").count(), 2);
  }

  #[test]
  fn entity_encoded_ampersands_are_decoded_before_wrapping() {
    let ctx = ctx_for("https://site.example/");
    let out = rewrite_url(&ctx, "https://other.example/p?a=1&amp;b=2");
    assert_eq!(
      out,
      format!(
        "http://preview.local:8100/proxy?url={}",
        urlencoding::encode("https://other.example/p?a=1&b=2")
      )
    );
  }

  #[test]
  fn rewrite_is_idempotent() {
    let ctx = ctx_for("https://site.example/");
    let once = rewrite_url(&ctx, "https://cdn.example.com/x.png");
    let twice = rewrite_url(&ctx, &once);
    assert_eq!(once, twice);
  }
}
