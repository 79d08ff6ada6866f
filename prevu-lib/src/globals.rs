use crate::{constants::*, policy::PolicySet};
use std::net::SocketAddr;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

/// Global object containing proxy configurations and shared objects like counters.
/// Note that everything held here is read-only during request handling; the
/// origin cookie on the client side is the only state crossing requests.
pub struct Globals {
  /// Configuration parameters for proxy transport and request handlers
  pub proxy_config: ProxyConfig,

  /// Immutable policy lists governing targets, cookies and trackers
  pub policy: Arc<PolicySet>,

  /// Shared context - Counter for serving requests
  pub request_count: RequestCount,

  /// Shared context - Async task runtime handler
  pub runtime_handle: tokio::runtime::Handle,

  /// Shared context - Notify object to stop proxy services
  pub term_notify: Option<Arc<tokio::sync::Notify>>,
}

/// Configuration parameters for proxy transport and request handlers
#[derive(PartialEq, Eq, Clone)]
pub struct ProxyConfig {
  pub listen_sockets: Vec<SocketAddr>,
  pub http_port: Option<u16>,
  pub tcp_listen_backlog: u32,
  pub max_clients: usize,

  /// Externally visible origin of this proxy (scheme + host + port), used in
  /// rewritten URLs. When unset, it is derived per request from the Host
  /// header assuming plain http.
  pub public_origin: Option<String>,
}

impl Default for ProxyConfig {
  fn default() -> Self {
    Self {
      listen_sockets: Vec::new(),
      http_port: None,
      tcp_listen_backlog: TCP_LISTEN_BACKLOG,
      max_clients: MAX_CLIENTS,
      public_origin: None,
    }
  }
}

#[derive(Debug, Clone, Default)]
/// Counter for serving requests
pub struct RequestCount(Arc<AtomicUsize>);

impl RequestCount {
  pub fn current(&self) -> usize {
    self.0.load(Ordering::Relaxed)
  }

  pub fn increment(&self) -> usize {
    self.0.fetch_add(1, Ordering::Relaxed)
  }

  pub fn decrement(&self) -> usize {
    let mut count;
    while {
      count = self.0.load(Ordering::Relaxed);
      count > 0
        && self
          .0
          .compare_exchange(count, count - 1, Ordering::Relaxed, Ordering::Relaxed)
          != Ok(count)
    } {}
    count
  }
}
