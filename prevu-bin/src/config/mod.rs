mod parse;
mod service;
mod toml;

pub use {
  parse::{build_settings, parse_opts},
  service::ConfigTomlReloader,
  toml::ConfigToml,
};
