use crate::{
  constants::*,
  error::{anyhow, ensure},
};
use prevu_lib::ProxyConfig;
use serde::Deserialize;
use std::{fs, net::SocketAddr};

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct ConfigToml {
  pub listen_port: Option<u16>,
  pub listen_ipv6: Option<bool>,
  pub tcp_listen_backlog: Option<u32>,
  pub max_clients: Option<u32>,
  /// Externally visible origin when the proxy sits behind a TLS terminator
  pub public_origin: Option<String>,
  pub policy: Option<PolicyToml>,
}

#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct PolicyToml {
  pub allowlist: Option<Vec<String>>,
  pub blocklist: Option<Vec<String>>,
  pub domain_blocklist: Option<Vec<String>>,
  pub cf_passthrough_domains: Option<Vec<String>>,
  /// Merged with the built-in tracker defaults
  pub analytics_blocklist: Option<Vec<String>>,
  /// An explicitly empty list disables cookie filtering
  pub sensitive_cookie_patterns: Option<Vec<String>>,
  pub debug_log: Option<bool>,
}

impl TryInto<ProxyConfig> for &ConfigToml {
  type Error = anyhow::Error;

  fn try_into(self) -> std::result::Result<ProxyConfig, Self::Error> {
    let mut proxy_config = ProxyConfig {
      http_port: Some(self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT)),
      ..Default::default()
    };
    ensure!(
      proxy_config.http_port.is_some_and(|p| p > 0),
      anyhow!("listen_port must be positive")
    );

    // NOTE: when [::]:xx is bound, both v4 and v6 listeners are enabled.
    let listen_addresses: Vec<&str> = if let Some(true) = self.listen_ipv6 {
      LISTEN_ADDRESSES_V6.to_vec()
    } else {
      LISTEN_ADDRESSES_V4.to_vec()
    };
    let port = proxy_config.http_port.unwrap();
    proxy_config.listen_sockets = listen_addresses
      .iter()
      .map(|addr| {
        format!("{addr}:{port}")
          .parse::<SocketAddr>()
          .map_err(|e| anyhow!("invalid listen address: {e}"))
      })
      .collect::<Result<Vec<_>, _>>()?;

    if let Some(backlog) = self.tcp_listen_backlog {
      proxy_config.tcp_listen_backlog = backlog;
    }
    if let Some(c) = self.max_clients {
      proxy_config.max_clients = c as usize;
    }
    if let Some(origin) = &self.public_origin {
      ensure!(
        origin.starts_with("http://") || origin.starts_with("https://"),
        anyhow!("public_origin must be an http(s) origin")
      );
      proxy_config.public_origin = Some(origin.trim_end_matches('/').to_string());
    }

    Ok(proxy_config)
  }
}

impl ConfigToml {
  pub fn new(config_file: &str) -> std::result::Result<Self, anyhow::Error> {
    let config_str = fs::read_to_string(config_file)?;

    toml::from_str(&config_str).map_err(|e| anyhow!(e))
  }
}
