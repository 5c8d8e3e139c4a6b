pub mod app_config;
pub mod model;

use std::path::PathBuf;

use thiserror::Error;

pub use app_config::{AppConfig, FailurePolicy, load_config, setup_resolver, setup_tls_connector};
pub use model::{Settings, Target};

/// Errors raised while loading the configuration. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings YAML")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid target URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid value '{value}' for {name}: {reason}")]
    Env {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read the system DNS configuration")]
    SystemDns(#[source] std::io::Error),

    #[error("failed to set up the DNS resolver")]
    Resolver(#[from] trust_dns_resolver::error::ResolveError),

    #[error("failed to set up the TLS connector")]
    Tls(#[from] native_tls::Error),
}
