mod body_decode;
mod classifier;
mod constants;
mod error;
mod forwarder;
mod globals;
mod hyper_ext;
mod log;
mod message_handler;
mod policy;
mod proxy;
mod rewriter;

use crate::{
  error::*, forwarder::Forwarder, globals::Globals, hyper_ext::rt::LocalExecutor, log::*,
  message_handler::HttpMessageHandlerBuilder, proxy::ProxyBuilder,
};
use futures::future::select_all;
use hyper_util::server::conn::auto::Builder as ConnectionBuilder;
use std::sync::Arc;

pub use crate::{
  classifier::{ContentExpectation, ContentKind},
  error::{PrevuError, PrevuResult},
  globals::ProxyConfig,
  policy::{evaluate_target, PolicyRejection, PolicySet, TargetReference},
  rewriter::{rewrite_url, RewriteContext},
};

/// Entrypoint that creates and spawns tasks of the rewriting proxy service
pub async fn entrypoint(
  proxy_config: &ProxyConfig,
  policy: &PolicySet,
  runtime_handle: &tokio::runtime::Handle,
  term_notify: Option<Arc<tokio::sync::Notify>>,
) -> PrevuResult<()> {
  // For initial message logging
  if proxy_config.listen_sockets.iter().any(|addr| addr.is_ipv6()) {
    info!("Listen both IPv4 and IPv6")
  } else {
    info!("Listen IPv4")
  }
  if let Some(port) = proxy_config.http_port {
    info!("Listen port: {port}");
  }
  if policy.allowlist.iter().any(|v| v == "*") {
    info!("Target allowlist is open (*); restrict it for shared deployments");
  } else {
    info!("Target allowlist: {}", policy.allowlist.join(", "));
  }
  if !policy.domain_blocklist.is_empty() {
    info!("Domain blocklist entries: {}", policy.domain_blocklist.len());
  }
  if policy.sensitive_cookie_patterns.as_ref().is_some_and(|v| v.is_empty()) {
    warn!("Sensitive-cookie filtering is disabled by configuration");
  }

  // build global shared context
  let globals = Arc::new(Globals {
    proxy_config: proxy_config.clone(),
    policy: Arc::new(policy.clone()),
    request_count: Default::default(),
    runtime_handle: runtime_handle.clone(),
    term_notify: term_notify.clone(),
  });

  // build message handler including the upstream forwarder
  let forwarder = Arc::new(Forwarder::try_new(&globals).await?);
  let message_handler = Arc::new(
    HttpMessageHandlerBuilder::default()
      .forwarder(forwarder)
      .globals(globals.clone())
      .build()?,
  );

  let connection_builder = Arc::new(ConnectionBuilder::new(LocalExecutor::new(runtime_handle.clone())));

  let addresses = globals.proxy_config.listen_sockets.clone();
  let futures = select_all(addresses.into_iter().map(|addr| {
    let proxy = ProxyBuilder::default()
      .globals(globals.clone())
      .listening_on(addr)
      .connection_builder(connection_builder.clone())
      .message_handler(message_handler.clone())
      .build()
      .unwrap();

    globals.runtime_handle.spawn(async move { proxy.start().await })
  }));

  // wait for all future
  if let (Ok(Err(e)), _, _) = futures.await {
    error!("Some proxy services are down: {}", e);
  };

  Ok(())
}
