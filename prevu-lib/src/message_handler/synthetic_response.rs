use super::{
  http_result::HttpError,
  utils_headers::{apply_cors_headers, apply_server_header},
};
use crate::{
  classifier::{BlockReason, ContentExpectation, ContentKind},
  hyper_ext::body::{empty, full, BoxBody},
  policy::PolicySet,
};
use bytes::Bytes;
use http::{header, HeaderMap, Response, StatusCode};

/// Answer a CORS preflight with 204 regardless of target validity
pub(crate) fn preflight_response(req_headers: &HeaderMap) -> Response<BoxBody> {
  let mut res = Response::builder()
    .status(StatusCode::NO_CONTENT)
    .body(empty())
    .unwrap();
  apply_cors_headers(res.headers_mut(), req_headers);
  res.headers_mut().insert(
    header::HeaderName::from_static("access-control-max-age"),
    header::HeaderValue::from_static("86400"),
  );
  apply_server_header(res.headers_mut());
  res
}

/// Structured JSON error body with a machine-readable reason code
pub(crate) fn json_error_response(
  status: StatusCode,
  message: &str,
  reason: &str,
  req_headers: &HeaderMap,
) -> Response<BoxBody> {
  let payload = serde_json::json!({ "error": message, "reason": reason });
  let body = Bytes::from(payload.to_string());
  let mut res = Response::builder()
    .status(status)
    .header(header::CONTENT_TYPE, "application/json")
    .body(full(body))
    .unwrap();
  apply_cors_headers(res.headers_mut(), req_headers);
  apply_server_header(res.headers_mut());
  res
}

/// Local health answer, never touching any upstream
pub(crate) fn health_response(policy: &PolicySet, req_headers: &HeaderMap) -> Response<BoxBody> {
  let payload = serde_json::json!({ "status": "ok", "allowlist": policy.allowlist });
  let mut res = Response::builder()
    .status(StatusCode::OK)
    .header(header::CONTENT_TYPE, "application/json")
    .body(full(Bytes::from(payload.to_string())))
    .unwrap();
  apply_cors_headers(res.headers_mut(), req_headers);
  apply_server_header(res.headers_mut());
  res
}

/// A stub in the expected content's own syntax, so script/style error
/// handling in the browser still behaves sanely. Carries the given status.
pub(crate) fn typed_stub_response(
  expectation: &ContentExpectation,
  status: StatusCode,
  note: &str,
  req_headers: &HeaderMap,
) -> Response<BoxBody> {
  let note = note.replace("*/", "* /"); // keep the comment well-formed
  let body = match expectation.kind {
    ContentKind::Javascript => full(Bytes::from(format!("/* upstream returned {status}: {note} */\n"))),
    ContentKind::Css => full(Bytes::from(format!("/* upstream returned {status}: {note} */\n"))),
    ContentKind::Font => empty(),
    ContentKind::Html => {
      let payload = serde_json::json!({ "error": note, "reason": "upstream_failure" });
      full(Bytes::from(payload.to_string()))
    }
  };
  let mime = match expectation.kind {
    ContentKind::Html => "application/json",
    _ => expectation.mime(),
  };
  let mut res = Response::builder()
    .status(status)
    .header(header::CONTENT_TYPE, mime)
    .body(body)
    .unwrap();
  apply_cors_headers(res.headers_mut(), req_headers);
  apply_server_header(res.headers_mut());
  res
}

/// Self-contained "preview blocked" page with per-reason copy, forced 403
pub(crate) fn blocked_page_response(reason: BlockReason, target_host: &str, req_headers: &HeaderMap) -> Response<BoxBody> {
  let (title, detail) = match reason {
    BlockReason::CloudflareChallenge => (
      "Preview blocked by an anti-bot challenge",
      "The site presented an automated-access challenge instead of its content. \
       Challenges cannot be completed inside the preview.",
    ),
    BlockReason::ContentTypeMismatch => (
      "Preview blocked",
      "The site returned a block page instead of the requested resource.",
    ),
    BlockReason::DomainBlocklist => (
      "Preview unavailable",
      "This site is excluded from previewing by deployment policy.",
    ),
    BlockReason::None => ("Preview unavailable", "The site could not be previewed."),
  };
  let host = target_host.replace('<', "&lt;").replace('>', "&gt;");
  let body = format!(
    "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title>\
<style>body{{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;\
display:flex;align-items:center;justify-content:center;min-height:100vh;margin:0;background:#f8fafc;color:#0f172a}}\
main{{max-width:28rem;padding:2rem;text-align:center}}h1{{font-size:1.25rem;margin-bottom:.5rem}}\
p{{font-size:.875rem;line-height:1.6;color:#475569}}code{{background:#e2e8f0;padding:.1rem .4rem;border-radius:4px}}</style>\
</head><body><main><h1>{title}</h1><p>{detail}</p><p><code>{host}</code></p></main></body></html>"
  );
  let mut res = Response::builder()
    .status(StatusCode::FORBIDDEN)
    .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
    .body(full(Bytes::from(body)))
    .unwrap();
  apply_cors_headers(res.headers_mut(), req_headers);
  apply_server_header(res.headers_mut());
  res
}

/// Redirect a recognized site navigation into the proxy endpoint
pub(crate) fn redirect_response(location: &str, req_headers: &HeaderMap) -> Response<BoxBody> {
  let mut builder = Response::builder().status(StatusCode::FOUND);
  if let Ok(value) = header::HeaderValue::from_str(location) {
    builder = builder.header(header::LOCATION, value);
  }
  let mut res = builder.body(empty()).unwrap();
  apply_cors_headers(res.headers_mut(), req_headers);
  apply_server_header(res.headers_mut());
  res
}

/// Map a pipeline error to its externally visible response
pub(crate) fn error_response(err: &HttpError, req_headers: &HeaderMap) -> Response<BoxBody> {
  match err {
    HttpError::UpstreamFailed { expectation, .. } | HttpError::UpstreamBodyRead { expectation, .. } => {
      typed_stub_response(expectation, StatusCode::BAD_GATEWAY, &err.to_string(), req_headers)
    }
    HttpError::PassThrough => {
      let mut res = Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(empty())
        .unwrap();
      apply_server_header(res.headers_mut());
      res
    }
    _ => json_error_response(err.status(), &err.to_string(), err.reason_code(), req_headers),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn preflight_is_204_with_permissive_cors() {
    let res = preflight_response(&HeaderMap::new());
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers().get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(res.headers().get("access-control-max-age").unwrap(), "86400");
  }

  #[test]
  fn javascript_stub_is_a_comment_with_the_original_status() {
    let res = typed_stub_response(
      &ContentExpectation { kind: ContentKind::Javascript },
      StatusCode::NOT_FOUND,
      "blocked",
      &HeaderMap::new(),
    );
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.headers().get(header::CONTENT_TYPE).unwrap(), "application/javascript");
  }

  #[test]
  fn font_stub_is_empty() {
    let res = typed_stub_response(
      &ContentExpectation { kind: ContentKind::Font },
      StatusCode::BAD_GATEWAY,
      "fetch failed",
      &HeaderMap::new(),
    );
    assert_eq!(res.headers().get(header::CONTENT_TYPE).unwrap(), "font/woff2");
  }

  #[test]
  fn blocked_page_is_forced_403_html() {
    let res = blocked_page_response(BlockReason::CloudflareChallenge, "www.site.example", &HeaderMap::new());
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(res
      .headers()
      .get(header::CONTENT_TYPE)
      .unwrap()
      .to_str()
      .unwrap()
      .starts_with("text/html"));
  }

  #[test]
  fn error_mapping_preserves_reason_codes() {
    let res = error_response(&HttpError::MissingUrlParameter, &HeaderMap::new());
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = error_response(&HttpError::MethodNotAllowed, &HeaderMap::new());
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
  }
}
