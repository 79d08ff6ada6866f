use crate::globals::ProxyConfig;
use bytes::Bytes;
use http::{header, HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use hyper::body::Incoming;

/// Percent-decoded value of a query parameter
pub(crate) fn query_param(uri: &Uri, name: &str) -> Option<String> {
  let query = uri.query()?;
  url::form_urlencoded::parse(query.as_bytes())
    .find(|(key, _)| key == name)
    .map(|(_, value)| value.into_owned())
}

/// The inbound stream is single-read; collect it fully before forwarding
pub(crate) async fn collect_body(body: Incoming) -> Result<Bytes, String> {
  body
    .collect()
    .await
    .map(|collected| collected.to_bytes())
    .map_err(|e| e.to_string())
}

pub(crate) fn is_mutating(method: &Method) -> bool {
  matches!(*method, Method::POST | Method::PUT | Method::DELETE)
}

/// The proxy's externally visible origin: configured override, else derived
/// from the request's own Host information assuming plain http.
pub(crate) fn proxy_origin_for(inbound: &HeaderMap, uri: &Uri, config: &ProxyConfig) -> String {
  if let Some(origin) = &config.public_origin {
    return origin.trim_end_matches('/').to_string();
  }
  let host = inbound
    .get(header::HOST)
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned)
    .or_else(|| uri.authority().map(|a| a.to_string()))
    .unwrap_or_else(|| "localhost".to_string());
  format!("http://{host}")
}
