use crate::{constants::MAX_REDIRECT_HOPS, error::*, globals::Globals, hyper_ext::rt::LocalExecutor, log::*};
use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use std::sync::Arc;

#[async_trait]
/// Definition of the forwarder that performs the single outbound call of the
/// pipeline against the validated target.
pub trait ForwardRequest<B> {
  type Error;
  async fn request(&self, req: Request<B>) -> Result<Response<Incoming>, Self::Error>;
}

/// Upstream http client. Redirects are resolved here, bounded, so the message
/// handler still observes exactly one call and no separate redirect loop.
pub struct Forwarder {
  inner: Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>,
}

#[async_trait]
impl ForwardRequest<Full<Bytes>> for Forwarder {
  type Error = PrevuError;

  async fn request(&self, req: Request<Full<Bytes>>) -> Result<Response<Incoming>, Self::Error> {
    let (parts, body) = req.into_parts();
    let mut method = parts.method;
    let mut uri = parts.uri;
    let mut headers = parts.headers;
    let mut body = body;

    for _hop in 0..=MAX_REDIRECT_HOPS {
      let mut hop_req = Request::builder()
        .method(method.clone())
        .uri(uri.clone())
        .body(body.clone())
        .map_err(|e| PrevuError::FailedToFetchFromUpstream(e.to_string()))?;
      *hop_req.headers_mut() = headers.clone();

      let res = self
        .inner
        .request(hop_req)
        .await
        .map_err(|e| PrevuError::FailedToFetchFromUpstream(e.to_string()))?;

      if !res.status().is_redirection() {
        return Ok(res);
      }

      let Some(location) = res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()) else {
        // redirection without a destination is returned as-is
        return Ok(res);
      };
      let next_uri = resolve_location(&uri, location)?;
      debug!("following upstream redirect: {} -> {}", uri, next_uri);

      // per fetch semantics, 301/302/303 turn a mutating request into a GET
      if matches!(res.status(), StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER)
        && !matches!(method, Method::GET | Method::HEAD)
      {
        method = Method::GET;
        body = Full::new(Bytes::new());
        headers.remove(header::CONTENT_TYPE);
        headers.remove(header::CONTENT_LENGTH);
      }

      if let Some(authority) = next_uri.authority() {
        headers.insert(
          header::HOST,
          HeaderValue::from_str(authority.as_str()).map_err(|e| PrevuError::BrokenRedirect(e.to_string()))?,
        );
      }
      uri = next_uri;
    }

    Err(PrevuError::BrokenRedirect(format!(
      "more than {MAX_REDIRECT_HOPS} hops from {uri}"
    )))
  }
}

/// Resolve a Location header value, which may be relative, against the
/// current request URL.
fn resolve_location(current: &Uri, location: &str) -> PrevuResult<Uri> {
  let base = url::Url::parse(&current.to_string()).map_err(|e| PrevuError::BrokenRedirect(e.to_string()))?;
  let resolved = base.join(location).map_err(|e| PrevuError::BrokenRedirect(e.to_string()))?;
  resolved
    .as_str()
    .parse::<Uri>()
    .map_err(|e| PrevuError::BrokenRedirect(e.to_string()))
}

impl Forwarder {
  /// Build the upstream client with rustls and the platform's native roots.
  /// Both http and https targets are allowed; ALPN picks the http version.
  pub async fn try_new(globals: &Arc<Globals>) -> PrevuResult<Self> {
    let builder = hyper_rustls::HttpsConnectorBuilder::new().with_native_roots()?;
    info!("Native root certs with rustls are used for the connection to proxied sites");

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_reuse_address(true);

    let connector = builder.https_or_http().enable_all_versions().wrap_connector(http);
    let inner = Client::builder(LocalExecutor::new(globals.runtime_handle.clone())).build::<_, Full<Bytes>>(connector);

    Ok(Self { inner })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relative_locations_resolve_against_the_current_url() {
    let current: Uri = "https://site.example/a/b?q=1".parse().unwrap();
    let next = resolve_location(&current, "/login").unwrap();
    assert_eq!(next.to_string(), "https://site.example/login");
    let next = resolve_location(&current, "c/d").unwrap();
    assert_eq!(next.to_string(), "https://site.example/a/c/d");
    let next = resolve_location(&current, "https://other.example/x").unwrap();
    assert_eq!(next.to_string(), "https://other.example/x");
  }
}
