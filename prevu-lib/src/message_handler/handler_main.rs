use super::{
  http_result::{HttpError, HttpResult},
  synthetic_response::{
    blocked_page_response, error_response, health_response, preflight_response, redirect_response,
    typed_stub_response,
  },
  utils_headers::{
    append_origin_cookie, apply_cors_headers, apply_server_header, build_upstream_headers, copy_passthrough_headers,
    copy_safe_asset_headers, origin_cookie_present, remove_frame_blocking_headers, remove_hop_headers,
  },
  utils_request::{collect_body, is_mutating, proxy_origin_for, query_param},
};
use crate::{
  body_decode::ensure_plain_body,
  classifier::{
    classify_path, classify_response, looks_like_html, repair_chunk_path, resolve_target_origin, ContentExpectation,
    ContentKind, PathClass,
  },
  constants::*,
  error::*,
  forwarder::{ForwardRequest, Forwarder},
  globals::Globals,
  hyper_ext::body::{full, BoxBody},
  log::*,
  policy::{evaluate_target, TargetReference},
  rewriter::{rewrite_document, RewriteContext},
};
use anyhow::anyhow;
use bytes::Bytes;
use derive_builder::Builder;
use http::{header, HeaderMap, Method, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use std::{net::SocketAddr, sync::Arc};

/// HTTP message handler serving one inbound request per invocation:
/// classify, resolve, validate, forward once, classify the response, rewrite
/// HTML, compose headers. The pipeline is a strict sequential continuation.
#[derive(Clone, Builder)]
pub struct HttpMessageHandler {
  forwarder: Arc<Forwarder>,
  globals: Arc<Globals>,
}

impl HttpMessageHandler {
  pub async fn handle_request(
    &self,
    req: Request<Incoming>,
    client_addr: SocketAddr,
  ) -> PrevuResult<Response<BoxBody>> {
    let mut log_data = MessageLog::from(&req);
    log_data.client_addr(&client_addr);
    let req_headers = req.headers().clone();

    let response = match self.route_request(req, &mut log_data).await {
      Ok(response) => response,
      Err(e) => {
        if !matches!(e, HttpError::PassThrough) {
          debug!("request handling terminated: {e}");
        }
        error_response(&e, &req_headers)
      }
    };
    log_data.status_code(&response.status()).output();
    Ok(response)
  }

  async fn route_request(&self, req: Request<Incoming>, log_data: &mut MessageLog) -> HttpResult<Response<BoxBody>> {
    if req.method() == Method::OPTIONS {
      return Ok(preflight_response(req.headers()));
    }
    if !matches!(
      *req.method(),
      Method::GET | Method::POST | Method::PUT | Method::DELETE | Method::HEAD
    ) {
      return Err(HttpError::MethodNotAllowed);
    }

    match req.uri().path() {
      HEALTH_ENDPOINT => Ok(health_response(&self.globals.policy, req.headers())),
      PROXY_ENDPOINT => self.serve_proxy(req, log_data).await,
      _ => self.serve_catch_all(req, log_data).await,
    }
  }

  /// The explicit proxy endpoint: `/proxy?url=<absolute target>`
  async fn serve_proxy(&self, req: Request<Incoming>, log_data: &mut MessageLog) -> HttpResult<Response<BoxBody>> {
    let policy = self.globals.policy.clone();
    let raw_target = query_param(req.uri(), "url").ok_or(HttpError::MissingUrlParameter)?;
    let target = evaluate_target(&raw_target, &policy)?;
    log_data.target(target.as_url().as_str());

    let inbound_headers = req.headers().clone();
    let accept = inbound_headers
      .get(header::ACCEPT)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned);
    let expectation = ContentExpectation::derive(accept.as_deref(), target.as_url().path());
    let method = req.method().clone();
    let proxy_origin = proxy_origin_for(&inbound_headers, req.uri(), &self.globals.proxy_config);
    let had_cookie = origin_cookie_present(&inbound_headers);

    let body_bytes = if is_mutating(&method) {
      collect_body(req.into_body()).await.map_err(|message| HttpError::UpstreamBodyRead {
        message,
        expectation,
      })?
    } else {
      Bytes::new()
    };

    let upstream_headers = build_upstream_headers(&inbound_headers, &target, &policy, &method);
    let upstream_res = self
      .forward_to_target(&target, method, upstream_headers, body_bytes, &expectation)
      .await?;

    let (parts, incoming) = upstream_res.into_parts();
    let status = parts.status;
    let mut upstream_headers = parts.headers;
    let raw_body = incoming
      .collect()
      .await
      .map(|collected| collected.to_bytes())
      .map_err(|e| HttpError::UpstreamBodyRead {
        message: e.to_string(),
        expectation,
      })?;

    let content_type = upstream_headers
      .get(header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default()
      .to_ascii_lowercase();
    let is_html = content_type.contains("text/html");

    // challenge sniffing and rewriting need plain text
    let needs_text = is_html || status.as_u16() >= 400;
    let body = if needs_text {
      ensure_plain_body(&mut upstream_headers, raw_body).map_err(|e| HttpError::UpstreamBodyRead {
        message: e.to_string(),
        expectation,
      })?
    } else {
      raw_body
    };
    let body_text = needs_text.then(|| String::from_utf8_lossy(&body).into_owned());

    let verdict = classify_response(&target, status, &upstream_headers, body_text.as_deref(), &expectation, &policy);
    if verdict.blocked {
      info!("upstream response replaced: {:?} for {}", verdict.reason, target);
      if expectation.kind == ContentKind::Html {
        return Ok(blocked_page_response(verdict.reason, target.host_str(), &inbound_headers));
      }
      return Ok(typed_stub_response(&expectation, status, "blocked by upstream", &inbound_headers));
    }
    if status.as_u16() >= 400
      && expectation.kind != ContentKind::Html
      && body_text.as_deref().map(looks_like_html).unwrap_or(false)
    {
      return Ok(typed_stub_response(
        &expectation,
        status,
        "upstream answered with an html error page",
        &inbound_headers,
      ));
    }

    let final_body = if is_html {
      let ctx = RewriteContext::new(&target, &proxy_origin, &policy.analytics_blocklist);
      let html = body_text.unwrap_or_default();
      Bytes::from(rewrite_document(&html, &ctx, &target, status, policy.debug_log))
    } else {
      body
    };

    let mut headers_out = HeaderMap::new();
    if let Some(ct) = upstream_headers.get(header::CONTENT_TYPE) {
      headers_out.insert(header::CONTENT_TYPE, ct.clone());
    }
    if !needs_text {
      // opaque bodies keep their encoding
      if let Some(enc) = upstream_headers.get(header::CONTENT_ENCODING) {
        headers_out.insert(header::CONTENT_ENCODING, enc.clone());
      }
    }
    copy_passthrough_headers(&upstream_headers, &mut headers_out);
    // upstream CORS is carried, then overwritten by the permissive set
    for (name, value) in upstream_headers.iter() {
      if name.as_str().starts_with("access-control-") {
        headers_out.insert(name.clone(), value.clone());
      }
    }
    remove_frame_blocking_headers(&mut upstream_headers);
    for name in ["content-security-policy", "content-security-policy-report-only"] {
      if let Some(value) = upstream_headers.get(name) {
        if let Ok(header_name) = header::HeaderName::from_bytes(name.as_bytes()) {
          headers_out.insert(header_name, value.clone());
        }
      }
    }
    apply_cors_headers(&mut headers_out, &inbound_headers);
    apply_server_header(&mut headers_out);
    if !had_cookie {
      append_origin_cookie(&mut headers_out, &target.origin_str());
    }

    let mut response = Response::builder()
      .status(status)
      .body(full(final_body))
      .map_err(|e| HttpError::Other(anyhow!(e)))?;
    *response.headers_mut() = headers_out;
    Ok(response)
  }

  /// Catch-all for asset and navigation requests that leaked past the proxy
  /// endpoint because the browser resolved them against the preview origin.
  async fn serve_catch_all(&self, req: Request<Incoming>, log_data: &mut MessageLog) -> HttpResult<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    let class = classify_path(&path);
    if class == PathClass::PassThrough {
      return Err(HttpError::PassThrough);
    }

    let inbound_headers = req.headers().clone();
    let Some(origin) = resolve_target_origin(&inbound_headers) else {
      return Err(HttpError::PassThrough);
    };

    let fixed_path = repair_chunk_path(&path).unwrap_or_else(|| path.clone());
    if fixed_path != path {
      debug!("repaired chunk path: {path} -> {fixed_path}");
    }
    let query = req.uri().query().map(|q| format!("?{q}")).unwrap_or_default();
    let target_raw = format!("{origin}{fixed_path}{query}");

    // page navigations go back through the proxy endpoint for full rewriting
    if class == PathClass::NavigationRoute {
      let proxy_origin = proxy_origin_for(&inbound_headers, req.uri(), &self.globals.proxy_config);
      let location = format!(
        "{proxy_origin}{PROXY_ENDPOINT}?url={}",
        urlencoding::encode(&target_raw)
      );
      log_data.target(&target_raw);
      return Ok(redirect_response(&location, &inbound_headers));
    }

    // the cookie is untrusted input; the evaluator still gates the forwarder
    let policy = self.globals.policy.clone();
    let Ok(target) = evaluate_target(&target_raw, &policy) else {
      return Err(HttpError::PassThrough);
    };
    log_data.target(target.as_url().as_str());

    let accept = inbound_headers
      .get(header::ACCEPT)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned);
    let expectation = ContentExpectation::derive(accept.as_deref(), target.as_url().path());
    let method = req.method().clone();
    let had_cookie = origin_cookie_present(&inbound_headers);

    let body_bytes = if is_mutating(&method) {
      collect_body(req.into_body()).await.map_err(|message| HttpError::UpstreamBodyRead {
        message,
        expectation,
      })?
    } else {
      Bytes::new()
    };

    let asset_headers = copy_safe_asset_headers(&inbound_headers, &target);
    let upstream_res = self
      .forward_to_target(&target, method, asset_headers, body_bytes, &expectation)
      .await?;

    let (parts, incoming) = upstream_res.into_parts();
    let status = parts.status;
    let mut upstream_headers = parts.headers;
    let raw_body = incoming
      .collect()
      .await
      .map(|collected| collected.to_bytes())
      .map_err(|e| HttpError::UpstreamBodyRead {
        message: e.to_string(),
        expectation,
      })?;

    let needs_text = status.as_u16() >= 400;
    let body = if needs_text {
      ensure_plain_body(&mut upstream_headers, raw_body).map_err(|e| HttpError::UpstreamBodyRead {
        message: e.to_string(),
        expectation,
      })?
    } else {
      raw_body
    };
    let body_text = needs_text.then(|| String::from_utf8_lossy(&body).into_owned());

    let verdict = classify_response(&target, status, &upstream_headers, body_text.as_deref(), &expectation, &policy);
    if verdict.blocked {
      info!("catch-all response replaced: {:?} for {}", verdict.reason, target);
      if expectation.kind == ContentKind::Html {
        return Ok(blocked_page_response(verdict.reason, target.host_str(), &inbound_headers));
      }
      return Ok(typed_stub_response(&expectation, status, "blocked by upstream", &inbound_headers));
    }
    if needs_text
      && expectation.kind != ContentKind::Html
      && body_text.as_deref().map(looks_like_html).unwrap_or(false)
    {
      return Ok(typed_stub_response(
        &expectation,
        status,
        "upstream answered with an html error page",
        &inbound_headers,
      ));
    }

    // assets pass through opaquely with repaired headers
    let mut headers_out = upstream_headers;
    remove_hop_headers(&mut headers_out);
    remove_frame_blocking_headers(&mut headers_out);
    headers_out.remove(header::CONTENT_LENGTH);
    apply_cors_headers(&mut headers_out, &inbound_headers);
    apply_server_header(&mut headers_out);
    if !had_cookie {
      append_origin_cookie(&mut headers_out, &origin);
    }

    let mut response = Response::builder()
      .status(status)
      .body(full(body))
      .map_err(|e| HttpError::Other(anyhow!(e)))?;
    *response.headers_mut() = headers_out;
    Ok(response)
  }

  /// Exactly one outbound call per inbound request; the forwarder resolves
  /// redirects internally.
  async fn forward_to_target(
    &self,
    target: &TargetReference,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
    expectation: &ContentExpectation,
  ) -> HttpResult<Response<Incoming>> {
    let uri: Uri = target
      .as_url()
      .as_str()
      .parse()
      .map_err(|e: http::uri::InvalidUri| HttpError::UpstreamFailed {
        target: target.to_string(),
        message: e.to_string(),
        expectation: *expectation,
      })?;

    let mut upstream_req = Request::builder()
      .method(method)
      .uri(uri)
      .body(Full::new(body))
      .map_err(|e| HttpError::UpstreamFailed {
        target: target.to_string(),
        message: e.to_string(),
        expectation: *expectation,
      })?;
    *upstream_req.headers_mut() = headers;

    self
      .forwarder
      .request(upstream_req)
      .await
      .map_err(|e| HttpError::UpstreamFailed {
        target: target.to_string(),
        message: e.to_string(),
        expectation: *expectation,
      })
  }
}
