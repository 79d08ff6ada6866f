use super::toml::ConfigToml;
use crate::error::anyhow;
use clap::{Arg, ArgAction};
use prevu_lib::{PolicySet, ProxyConfig};

/// Parsed options
pub struct Opts {
  pub config_file_path: Option<String>,
  pub watch: bool,
}

/// Parse arg values passed from cli
pub fn parse_opts() -> Result<Opts, anyhow::Error> {
  let _ = include_str!("../../Cargo.toml");
  let options = clap::command!()
    .arg(
      Arg::new("config_file")
        .long("config")
        .short('c')
        .value_name("FILE")
        .help("Configuration file path like ./config.toml; defaults plus env vars apply without one"),
    )
    .arg(
      Arg::new("watch")
        .long("watch")
        .short('w')
        .action(ArgAction::SetTrue)
        .requires("config_file")
        .help("Activate dynamic reloading of the config file via continuous monitoring"),
    );
  let matches = options.get_matches();

  ///////////////////////////////////
  let config_file_path = matches.get_one::<String>("config_file").map(|v| v.to_owned());
  let watch = matches.get_one::<bool>("watch").unwrap().to_owned();

  Ok(Opts { config_file_path, watch })
}

/// Build the immutable runtime settings from the config file and the
/// environment. Env vars win over the file, matching the original deployment
/// knobs (comma-separated lists).
pub fn build_settings(config: &ConfigToml) -> std::result::Result<(ProxyConfig, PolicySet), anyhow::Error> {
  let proxy_config: ProxyConfig = config.try_into()?;

  let mut policy = PolicySet::default();
  if let Some(policy_toml) = &config.policy {
    if let Some(v) = &policy_toml.allowlist {
      policy.allowlist = v.clone();
    }
    if let Some(v) = &policy_toml.blocklist {
      policy.blocklist = v.clone();
    }
    if let Some(v) = &policy_toml.domain_blocklist {
      policy.domain_blocklist = v.clone();
    }
    if let Some(v) = &policy_toml.cf_passthrough_domains {
      policy.cf_passthrough_domains = v.clone();
    }
    if let Some(v) = &policy_toml.analytics_blocklist {
      merge_analytics(&mut policy.analytics_blocklist, v);
    }
    if let Some(v) = &policy_toml.sensitive_cookie_patterns {
      policy.sensitive_cookie_patterns = Some(v.clone());
    }
    if let Some(v) = policy_toml.debug_log {
      policy.debug_log = v;
    }
  }

  apply_env_overrides(&mut policy);

  if policy.allowlist.is_empty() {
    return Err(anyhow!("Target allowlist must not be empty"));
  }

  Ok((proxy_config, policy))
}

fn apply_env_overrides(policy: &mut PolicySet) {
  if let Some(list) = env_list("PREVU_ALLOWLIST") {
    policy.allowlist = list;
  }
  if let Some(list) = env_list("PREVU_BLOCKLIST") {
    policy.blocklist = list;
  }
  if let Some(list) = env_list("PREVU_DOMAIN_BLOCKLIST") {
    policy.domain_blocklist = list;
  }
  if let Some(list) = env_list("PREVU_CF_PASSTHROUGH_DOMAINS") {
    policy.cf_passthrough_domains = list;
  }
  if let Some(list) = env_list("PREVU_ANALYTICS_BLOCKLIST") {
    merge_analytics(&mut policy.analytics_blocklist, &list);
  }
  // an env var set to an empty string disables cookie filtering entirely
  if let Ok(value) = std::env::var("PREVU_SENSITIVE_COOKIE_PATTERNS") {
    policy.sensitive_cookie_patterns = Some(parse_list(&value));
  }
  if let Ok(value) = std::env::var("PREVU_DEBUG") {
    policy.debug_log = matches!(value.as_str(), "1" | "true");
  }
}

/// Comma-separated env list; `None` when the variable is unset
fn env_list(name: &str) -> Option<Vec<String>> {
  std::env::var(name).ok().map(|value| parse_list(&value))
}

fn parse_list(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(|entry| entry.trim().to_string())
    .filter(|entry| !entry.is_empty())
    .collect()
}

fn merge_analytics(existing: &mut Vec<String>, extra: &[String]) {
  for entry in extra {
    if !existing.iter().any(|have| have == entry) {
      existing.push(entry.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_list_trims_and_drops_empties() {
    assert_eq!(parse_list("a, b ,,c"), vec!["a", "b", "c"]);
    assert!(parse_list("").is_empty());
  }

  #[test]
  fn analytics_lists_merge_without_duplicates() {
    let mut existing = vec!["a.example".to_string()];
    merge_analytics(&mut existing, &["b.example".to_string(), "a.example".to_string()]);
    assert_eq!(existing, vec!["a.example", "b.example"]);
  }

  #[test]
  fn settings_from_a_plain_default_config() {
    let (proxy_config, policy) = build_settings(&ConfigToml::default()).unwrap();
    assert!(proxy_config.http_port.is_some());
    assert_eq!(policy.allowlist, vec!["*"]);
    assert!(policy.sensitive_cookie_patterns.is_none());
  }

  #[test]
  fn toml_policy_overrides_defaults() {
    let config: ConfigToml = ::toml::from_str(
      r#"
[policy]
allowlist = ["site.example"]
analytics_blocklist = ["tracker.example"]
"#,
    )
    .unwrap();
    let (_, policy) = build_settings(&config).unwrap();
    assert_eq!(policy.allowlist, vec!["site.example"]);
    assert!(policy.analytics_blocklist.iter().any(|v| v == "tracker.example"));
    // built-in defaults are kept alongside
    assert!(policy.analytics_blocklist.iter().any(|v| v == "google-analytics.com"));
  }
}
