pub use tracing::{debug, error, info, trace, warn};

/// Per-request access log assembled while a request travels the pipeline
#[derive(Debug, Clone)]
pub struct MessageLog {
  pub client_addr: String,
  pub method: String,
  pub p_and_q: String,
  pub version: hyper::Version,
  pub ua: String,
  pub status: String,
  pub target: String,
}

impl<T> From<&hyper::Request<T>> for MessageLog {
  fn from(req: &hyper::Request<T>) -> Self {
    let ua = req
      .headers()
      .get(hyper::header::USER_AGENT)
      .map_or_else(|| "", |s| s.to_str().unwrap_or(""))
      .to_string();
    Self {
      client_addr: "".to_string(),
      method: req.method().to_string(),
      p_and_q: req
        .uri()
        .path_and_query()
        .map_or_else(|| "", |v| v.as_str())
        .to_string(),
      version: req.version(),
      ua,
      status: "".to_string(),
      target: "".to_string(),
    }
  }
}

impl MessageLog {
  pub fn client_addr(&mut self, client_addr: &std::net::SocketAddr) -> &mut Self {
    self.client_addr = client_addr.to_string();
    self
  }
  pub fn status_code(&mut self, status_code: &hyper::StatusCode) -> &mut Self {
    self.status = status_code.to_string();
    self
  }
  pub fn target(&mut self, target: &str) -> &mut Self {
    self.target = target.to_string();
    self
  }

  pub fn output(&self) {
    info!(
      "{} -- {} {} {:?} -- {} -- \"{}\" \"{}\"",
      self.client_addr, self.method, self.p_and_q, self.version, self.status, self.target, self.ua,
    );
  }
}
