use super::{ContentExpectation, ContentKind};
use crate::{constants::*, policy::PolicySet, policy::TargetReference};
use http::{header, HeaderMap, StatusCode};

/// Why a response was replaced instead of passed through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
  CloudflareChallenge,
  ContentTypeMismatch,
  DomainBlocklist,
  None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeVerdict {
  pub blocked: bool,
  pub reason: BlockReason,
}

impl ChallengeVerdict {
  pub const fn pass() -> Self {
    Self {
      blocked: false,
      reason: BlockReason::None,
    }
  }
}

/// Detect anti-bot challenge pages and content-type mismatches on an upstream
/// response. Best-effort: parsing failures count as "no match".
pub fn classify_response(
  target: &TargetReference,
  status: StatusCode,
  headers: &HeaderMap,
  body_text: Option<&str>,
  expectation: &ContentExpectation,
  policy: &PolicySet,
) -> ChallengeVerdict {
  // Trusted hosts skip challenge classification entirely; challenge-resolution
  // scripts must load even under 403 or the challenge never completes.
  let challenge_exempt =
    policy.is_challenge_passthrough(target.host_str()) || target.as_url().path().starts_with(CHALLENGE_SCRIPT_PATH);

  if !challenge_exempt && is_challenge(target, status, headers, body_text) {
    return ChallengeVerdict {
      blocked: true,
      reason: BlockReason::CloudflareChallenge,
    };
  }

  if is_mismatch(status, headers, expectation) {
    return ChallengeVerdict {
      blocked: true,
      reason: BlockReason::ContentTypeMismatch,
    };
  }

  ChallengeVerdict::pass()
}

fn is_challenge(target: &TargetReference, status: StatusCode, headers: &HeaderMap, body_text: Option<&str>) -> bool {
  let blocked_status = matches!(status.as_u16(), 403 | 503);
  let marker_present = {
    let url_lower = target.as_url().as_str().to_ascii_lowercase();
    let body_lower = body_text.map(|b| b.to_ascii_lowercase());
    CHALLENGE_MARKERS.iter().any(|marker| {
      url_lower.contains(marker) || body_lower.as_deref().is_some_and(|b| b.contains(marker))
    })
  };

  let edge_cdn = headers
    .get(header::SERVER)
    .and_then(|v| v.to_str().ok())
    .map(|v| v.to_ascii_lowercase().contains(EDGE_CDN_SERVER_MARKER))
    .unwrap_or(false);

  if edge_cdn {
    blocked_status || marker_present
  } else {
    blocked_status && marker_present
  }
}

/// A block page masquerading as the requested asset: HTML came back where
/// script/style/font was expected, with an error status.
fn is_mismatch(status: StatusCode, headers: &HeaderMap, expectation: &ContentExpectation) -> bool {
  if expectation.kind == ContentKind::Html || status.as_u16() < 400 {
    return false;
  }
  headers
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .map(|v| v.to_ascii_lowercase().contains("text/html"))
    .unwrap_or(false)
}

/// Whether a body reads as an HTML document, regardless of declared type
pub fn looks_like_html(body: &str) -> bool {
  let head: String = body.trim_start().chars().take(512).collect();
  let lower = head.to_ascii_lowercase();
  lower.starts_with("<!doctype") || lower.starts_with("<html") || lower.contains("<html")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::policy::evaluate_target;
  use http::HeaderValue;

  fn target(url: &str) -> TargetReference {
    evaluate_target(url, &PolicySet::default()).unwrap()
  }

  fn cf_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::SERVER, HeaderValue::from_static("cloudflare"));
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
    h
  }

  #[test]
  fn cloudflare_403_is_a_challenge_without_markers() {
    let verdict = classify_response(
      &target("https://www.site.example/"),
      StatusCode::FORBIDDEN,
      &cf_headers(),
      Some("<html>blocked</html>"),
      &ContentExpectation { kind: ContentKind::Html },
      &PolicySet::default(),
    );
    assert!(verdict.blocked);
    assert_eq!(verdict.reason, BlockReason::CloudflareChallenge);
  }

  #[test]
  fn passthrough_domain_disables_challenge_classification() {
    let mut policy = PolicySet::default();
    policy.cf_passthrough_domains = vec!["site.example".to_string()];
    let verdict = classify_response(
      &target("https://www.site.example/"),
      StatusCode::FORBIDDEN,
      &cf_headers(),
      Some("<html>blocked</html>"),
      &ContentExpectation { kind: ContentKind::Html },
      &policy,
    );
    assert!(!verdict.blocked);
  }

  #[test]
  fn challenge_scripts_pass_even_under_403() {
    let verdict = classify_response(
      &target("https://www.site.example/cdn-cgi/challenge-platform/h/b/orchestrate.js"),
      StatusCode::FORBIDDEN,
      &cf_headers(),
      None,
      &ContentExpectation { kind: ContentKind::Javascript },
      &PolicySet::default(),
    );
    // not classified as challenge; html content-type still flags a mismatch
    assert_eq!(verdict.reason, BlockReason::ContentTypeMismatch);
  }

  #[test]
  fn other_servers_need_status_and_marker() {
    let mut h = HeaderMap::new();
    h.insert(header::SERVER, HeaderValue::from_static("nginx"));
    let t = target("https://www.site.example/");
    let no_marker = classify_response(
      &t,
      StatusCode::FORBIDDEN,
      &h,
      Some("plain denial"),
      &ContentExpectation { kind: ContentKind::Html },
      &PolicySet::default(),
    );
    assert!(!no_marker.blocked);
    let with_marker = classify_response(
      &t,
      StatusCode::FORBIDDEN,
      &h,
      Some("<html>Just a moment...</html>"),
      &ContentExpectation { kind: ContentKind::Html },
      &PolicySet::default(),
    );
    assert!(with_marker.blocked);
  }

  #[test]
  fn html_block_page_for_expected_script_is_a_mismatch() {
    let mut h = HeaderMap::new();
    h.insert(header::SERVER, HeaderValue::from_static("nginx"));
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    let verdict = classify_response(
      &target("https://www.site.example/app.js"),
      StatusCode::NOT_FOUND,
      &h,
      Some("<html><body>not found</body></html>"),
      &ContentExpectation { kind: ContentKind::Javascript },
      &PolicySet::default(),
    );
    assert!(verdict.blocked);
    assert_eq!(verdict.reason, BlockReason::ContentTypeMismatch);
  }

  #[test]
  fn html_sniffing() {
    assert!(looks_like_html("  <!DOCTYPE html><html></html>"));
    assert!(looks_like_html("<html lang=\"en\">"));
    assert!(!looks_like_html("{\"error\":\"nope\"}"));
  }
}
