use crate::{
  constants::*,
  policy::{PolicySet, TargetReference},
};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};

// ////////////////////////////////////////////////////
// // Functions to manipulate headers

/// Identify responses synthesized or relayed by this proxy
pub(crate) fn apply_server_header(headers: &mut HeaderMap) {
  headers.insert(header::SERVER, HeaderValue::from_static(RESPONSE_HEADER_SERVER));
}

/// Permissive CORS on every proxy response; the embedding preview surface is
/// a different origin by definition. Overwrites upstream-supplied values.
pub(crate) fn apply_cors_headers(headers: &mut HeaderMap, req_headers: &HeaderMap) {
  headers.insert(
    HeaderName::from_static("access-control-allow-origin"),
    HeaderValue::from_static("*"),
  );
  let allow_headers = req_headers
    .get("access-control-request-headers")
    .cloned()
    .unwrap_or_else(|| HeaderValue::from_static("Accept,Content-Type,User-Agent"));
  headers.insert(HeaderName::from_static("access-control-allow-headers"), allow_headers);
  headers.insert(
    HeaderName::from_static("access-control-allow-methods"),
    HeaderValue::from_static("GET,POST,PUT,DELETE,HEAD,OPTIONS"),
  );
  headers.insert(
    HeaderName::from_static("access-control-allow-credentials"),
    HeaderValue::from_static("true"),
  );
  headers.insert(
    HeaderName::from_static("access-control-expose-headers"),
    HeaderValue::from_static("cache-control,expires,pragma,content-type"),
  );
}

/// Copy the cache-related upstream headers the preview relies on
pub(crate) fn copy_passthrough_headers(upstream: &HeaderMap, out: &mut HeaderMap) {
  for name in PASSTHROUGH_RESPONSE_HEADERS {
    if let Some(value) = upstream.get(*name) {
      if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
        out.insert(header_name, value.clone());
      }
    }
  }
}

/// Remove headers that prevent iframe embedding: X-Frame-Options outright,
/// and the frame-ancestors directive from both CSP headers. A CSP that
/// becomes empty is dropped entirely.
pub(crate) fn remove_frame_blocking_headers(headers: &mut HeaderMap) {
  headers.remove("x-frame-options");

  for name in ["content-security-policy", "content-security-policy-report-only"] {
    let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()).map(|v| v.to_string()) else {
      continue;
    };
    let modified = strip_frame_ancestors(&value);
    let header_name = HeaderName::from_bytes(name.as_bytes()).expect("static header name");
    match modified.and_then(|m| HeaderValue::from_str(&m).ok()) {
      Some(new_value) => {
        headers.insert(header_name, new_value);
      }
      None => {
        headers.remove(header_name);
      }
    }
  }
}

fn strip_frame_ancestors(csp: &str) -> Option<String> {
  let kept: Vec<&str> = csp
    .split(';')
    .map(|directive| directive.trim())
    .filter(|directive| !directive.is_empty())
    .filter(|directive| !directive.to_ascii_lowercase().starts_with("frame-ancestors"))
    .collect();
  if kept.is_empty() {
    None
  } else {
    Some(kept.join("; "))
  }
}

/// Hop header values which are removed at proxy
const HOP_HEADERS: &[&str] = &[
  "connection",
  "te",
  "trailer",
  "keep-alive",
  "proxy-connection",
  "proxy-authenticate",
  "proxy-authorization",
  "transfer-encoding",
  "upgrade",
];

/// Remove hop headers
pub(crate) fn remove_hop_headers(headers: &mut HeaderMap) {
  HOP_HEADERS.iter().for_each(|key| {
    headers.remove(*key);
  });
}

/// Drop cookies whose names contain a configured sensitive substring.
/// Returns `None` when nothing survives.
pub(crate) fn sanitize_cookie_header(cookie_header: &str, patterns: &[String]) -> Option<String> {
  let cookies: Vec<&str> = cookie_header.split(';').map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
  let filtered: Vec<&str> = cookies
    .into_iter()
    .filter(|cookie| {
      let name = cookie.split('=').next().unwrap_or_default().to_ascii_lowercase();
      !patterns.iter().any(|pattern| name.contains(&pattern.to_ascii_lowercase()))
    })
    .collect();
  if filtered.is_empty() {
    None
  } else {
    Some(filtered.join("; "))
  }
}

/// Synthesize the header set for the single outbound call: a filtered
/// allowlist of inbound headers, a navigation-simulating set, and defaults
/// where the caller supplied nothing.
pub(crate) fn build_upstream_headers(
  inbound: &HeaderMap,
  target: &TargetReference,
  policy: &PolicySet,
  method: &Method,
) -> HeaderMap {
  let mut upstream = HeaderMap::new();
  let target_origin = target.origin_str();

  let copy_or_default = |upstream: &mut HeaderMap, name: header::HeaderName, fallback: &'static str| {
    let value = inbound
      .get(&name)
      .cloned()
      .unwrap_or_else(|| HeaderValue::from_static(fallback));
    upstream.insert(name, value);
  };

  copy_or_default(&mut upstream, header::USER_AGENT, DEFAULT_USER_AGENT);
  copy_or_default(&mut upstream, header::ACCEPT, DEFAULT_ACCEPT);
  copy_or_default(&mut upstream, header::ACCEPT_LANGUAGE, DEFAULT_ACCEPT_LANGUAGE);
  copy_or_default(&mut upstream, header::ACCEPT_ENCODING, DEFAULT_ACCEPT_ENCODING);

  for name in [header::CACHE_CONTROL, header::IF_MODIFIED_SINCE, header::IF_NONE_MATCH] {
    if let Some(value) = inbound.get(&name) {
      upstream.insert(name, value.clone());
    }
  }

  // navigation-simulating set; the caller's values win when present
  for (name, fallback) in [
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
  ] {
    let header_name = HeaderName::from_static(name);
    let value = inbound
      .get(&header_name)
      .cloned()
      .unwrap_or_else(|| HeaderValue::from_static(fallback));
    upstream.insert(header_name, value);
  }

  // Origin/Referer default to the target origin; Host always names the target
  for name in [header::REFERER, header::ORIGIN] {
    let value = inbound
      .get(&name)
      .cloned()
      .or_else(|| HeaderValue::from_str(&target_origin).ok());
    if let Some(value) = value {
      upstream.insert(name, value);
    }
  }
  if let Some(host) = target_authority(target) {
    if let Ok(value) = HeaderValue::from_str(&host) {
      upstream.insert(header::HOST, value);
    }
  }

  if let Some(cookie) = inbound.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
    let patterns = policy.effective_cookie_patterns();
    let sanitized = if patterns.is_empty() {
      Some(cookie.to_string())
    } else {
      sanitize_cookie_header(cookie, &patterns)
    };
    if let Some(value) = sanitized.and_then(|v| HeaderValue::from_str(&v).ok()) {
      upstream.insert(header::COOKIE, value);
    }
  }

  if matches!(*method, Method::POST | Method::PUT | Method::DELETE) {
    if let Some(value) = inbound.get(header::CONTENT_TYPE) {
      upstream.insert(header::CONTENT_TYPE, value.clone());
    }
  }

  upstream
}

/// Copy the safe subset of inbound headers onto a catch-all asset request
pub(crate) fn copy_safe_asset_headers(inbound: &HeaderMap, target: &TargetReference) -> HeaderMap {
  let mut out = HeaderMap::new();
  for name in SAFE_FORWARD_HEADERS {
    if let Some(value) = inbound.get(*name) {
      if let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) {
        out.insert(header_name, value.clone());
      }
    }
  }
  if let Some(host) = target_authority(target) {
    if let Ok(value) = HeaderValue::from_str(&host) {
      out.insert(header::HOST, value);
    }
  }
  out
}

fn target_authority(target: &TargetReference) -> Option<String> {
  let url = target.as_url();
  let host = url.host_str()?;
  Some(match url.port() {
    Some(port) => format!("{host}:{port}"),
    None => host.to_string(),
  })
}

/// Whether the inbound request already carries the origin cookie
pub(crate) fn origin_cookie_present(inbound: &HeaderMap) -> bool {
  inbound
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .any(|cookie| cookie.trim().starts_with(&format!("{ORIGIN_COOKIE_NAME}=")))
}

/// Persist the resolved origin client-side. Set at most once per browsing
/// session; the browser owns it afterwards.
pub(crate) fn append_origin_cookie(headers: &mut HeaderMap, target_origin: &str) {
  let cookie = format!(
    "{ORIGIN_COOKIE_NAME}={}; Path=/; SameSite=Lax; Max-Age={ORIGIN_COOKIE_MAX_AGE_SECS}",
    urlencoding::encode(target_origin)
  );
  if let Ok(value) = HeaderValue::from_str(&cookie) {
    headers.append(header::SET_COOKIE, value);
  }
}
