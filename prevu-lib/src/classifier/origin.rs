use crate::constants::*;
use http::{header, HeaderMap};
use url::Url;

/// Recover the target site's origin for a request lacking an explicit proxy
/// URL. Priority: Referer-embedded proxied URL, then the origin cookie.
/// Every decode/parse failure falls through to the next source.
pub fn resolve_target_origin(headers: &HeaderMap) -> Option<String> {
  origin_from_referer(headers).or_else(|| origin_from_cookie(headers))
}

fn origin_from_referer(headers: &HeaderMap) -> Option<String> {
  let referer = headers.get(header::REFERER)?.to_str().ok()?;
  let marker = format!("{PROXY_ENDPOINT}?url=");
  let idx = referer.find(&marker)?;
  let encoded = referer[idx + marker.len()..].split('&').next()?;
  let decoded = urlencoding::decode(encoded).ok()?;
  parse_http_origin(&decoded)
}

fn origin_from_cookie(headers: &HeaderMap) -> Option<String> {
  let prefix = format!("{ORIGIN_COOKIE_NAME}=");
  let raw = headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .map(|v| v.trim())
    .find_map(|cookie| cookie.strip_prefix(prefix.as_str()))?;
  let decoded = urlencoding::decode(raw).ok()?;
  parse_http_origin(&decoded)
}

/// The cookie is attacker-writable; only a well-formed http(s) origin counts.
fn parse_http_origin(value: &str) -> Option<String> {
  let url = Url::parse(value.trim()).ok()?;
  if !matches!(url.scheme(), "http" | "https") {
    return None;
  }
  url.host_str()?;
  Some(url.origin().ascii_serialization())
}
