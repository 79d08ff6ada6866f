use crate::constants::*;
use http::StatusCode;
use thiserror::Error;
use url::Url;

/// Immutable policy lists loaded once at startup and passed explicitly into
/// every component; never a global read ad hoc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySet {
  /// Hostnames allowed as proxy targets (`*`, exact, or subdomain match)
  pub allowlist: Vec<String>,
  /// Hostname prefixes rejected outright (loopback by default)
  pub blocklist: Vec<String>,
  /// Per-deployment domain blocklist (exact or subdomain match, rejected with 403)
  pub domain_blocklist: Vec<String>,
  /// Hosts exempted from challenge classification entirely
  pub cf_passthrough_domains: Vec<String>,
  /// Tracker patterns rewritten to the neutral placeholder
  pub analytics_blocklist: Vec<String>,
  /// Cookie-name substrings dropped before forwarding.
  /// `None` applies the built-in defaults; `Some(vec![])` disables filtering.
  pub sensitive_cookie_patterns: Option<Vec<String>>,
  /// Widens the injected interceptor's in-browser logging
  pub debug_log: bool,
}

impl Default for PolicySet {
  fn default() -> Self {
    Self {
      allowlist: DEFAULT_TARGET_ALLOWLIST.iter().map(|v| v.to_string()).collect(),
      blocklist: DEFAULT_TARGET_BLOCKLIST.iter().map(|v| v.to_string()).collect(),
      domain_blocklist: Vec::new(),
      cf_passthrough_domains: Vec::new(),
      analytics_blocklist: DEFAULT_ANALYTICS_BLOCKLIST.iter().map(|v| v.to_string()).collect(),
      sensitive_cookie_patterns: None,
      debug_log: false,
    }
  }
}

impl PolicySet {
  /// Effective sensitive-cookie substrings after applying the default rule
  pub fn effective_cookie_patterns(&self) -> Vec<String> {
    match &self.sensitive_cookie_patterns {
      Some(patterns) => patterns.clone(),
      None => DEFAULT_SENSITIVE_COOKIE_PATTERNS.iter().map(|v| v.to_string()).collect(),
    }
  }

  /// Whether challenge classification is disabled for the given host
  pub fn is_challenge_passthrough(&self, host: &str) -> bool {
    let lower = host.to_ascii_lowercase();
    self.cf_passthrough_domains.iter().any(|d| domain_matches(&lower, d))
  }
}

/// Exact or subdomain match against a configured domain entry
pub(crate) fn domain_matches(host_lower: &str, entry: &str) -> bool {
  let entry = entry.trim().to_ascii_lowercase();
  if entry.is_empty() {
    return false;
  }
  host_lower == entry || host_lower.ends_with(&format!(".{entry}"))
}

/// A validated absolute target URL. The forwarder only accepts this type, so
/// nothing reaches an upstream without passing the evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReference {
  inner: Url,
}

impl TargetReference {
  pub fn as_url(&self) -> &Url {
    &self.inner
  }

  pub fn host_str(&self) -> &str {
    self.inner.host_str().unwrap_or_default()
  }

  /// `scheme://host[:port]` of the target
  pub fn origin_str(&self) -> String {
    self.inner.origin().ascii_serialization()
  }

  /// The target URL with query and fragment removed, normalized to end in a
  /// directory slash unless the last path segment looks like a file.
  pub fn directory_base(&self) -> String {
    let mut base = self.inner.clone();
    base.set_query(None);
    base.set_fragment(None);
    let mut s = base.to_string();
    let last_segment = s.rsplit('/').next().unwrap_or_default();
    if !s.ends_with('/') && !last_segment.contains('.') {
      s.push('/');
    }
    s
  }
}

impl std::fmt::Display for TargetReference {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.inner.fmt(f)
  }
}

/// Typed rejection emitted by the evaluator; each carries a stable reason code
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyRejection {
  #[error("Malformed url")]
  MalformedUrl,
  #[error("Invalid URL")]
  InvalidUrl,
  #[error("Only http/https protocols supported")]
  DisallowedProtocol,
  #[error("Host not allowed: {0}")]
  HostNotAllowed(String),
  #[error("Host is blocklisted: {0}")]
  DomainBlocklist(String),
}

impl PolicyRejection {
  pub fn reason_code(&self) -> &'static str {
    match self {
      Self::MalformedUrl => "malformed_url",
      Self::InvalidUrl => "invalid_url",
      Self::DisallowedProtocol => "disallowed_protocol",
      Self::HostNotAllowed(_) => "host_not_allowed",
      Self::DomainBlocklist(_) => "domain_blocklist",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      Self::DomainBlocklist(_) => StatusCode::FORBIDDEN,
      _ => StatusCode::BAD_REQUEST,
    }
  }
}

/// Validate a raw URL string against malformed-input, protocol, allow/block
/// and domain-blocklist rules. Checks short-circuit in order.
pub fn evaluate_target(raw: &str, policy: &PolicySet) -> Result<TargetReference, PolicyRejection> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Err(PolicyRejection::InvalidUrl);
  }

  let decoded = urlencoding::decode(trimmed)
    .map(|v| v.into_owned())
    .unwrap_or_else(|_| trimmed.to_string());
  let decoded_lower = decoded.to_ascii_lowercase();

  // A scheme marker surviving one decode round means the input was
  // double-encoded; quote imbalance marks injection-shaped input.
  if decoded_lower.contains("%3a%2f%2f") || decoded_lower.contains("http%3a") || decoded_lower.contains("https%3a") {
    return Err(PolicyRejection::MalformedUrl);
  }
  if decoded.matches('\'').count() % 2 != 0 || decoded.matches('"').count() % 2 != 0 {
    return Err(PolicyRejection::MalformedUrl);
  }

  let url = Url::parse(trimmed)
    .or_else(|_| Url::parse(&decoded))
    .map_err(|_| PolicyRejection::InvalidUrl)?;

  if !matches!(url.scheme(), "http" | "https") {
    return Err(PolicyRejection::DisallowedProtocol);
  }

  // ipv6 hosts come back bracketed from the parser; the lists hold bare forms
  let host = url
    .host_str()
    .unwrap_or_default()
    .trim_start_matches('[')
    .trim_end_matches(']')
    .to_ascii_lowercase();
  if host.is_empty() {
    return Err(PolicyRejection::HostNotAllowed(host));
  }
  if policy
    .blocklist
    .iter()
    .any(|blocked| host.starts_with(&blocked.trim().to_ascii_lowercase()))
  {
    return Err(PolicyRejection::HostNotAllowed(host));
  }
  let allowed = policy.allowlist.iter().any(|entry| {
    let entry = entry.trim().to_ascii_lowercase();
    entry == "*" || host == entry || host.ends_with(&format!(".{entry}"))
  });
  if !allowed {
    return Err(PolicyRejection::HostNotAllowed(host));
  }

  if policy.domain_blocklist.iter().any(|entry| domain_matches(&host, entry)) {
    return Err(PolicyRejection::DomainBlocklist(host));
  }

  Ok(TargetReference { inner: url })
}
