use std::fmt;

use serde::Deserialize;
use url::Url;

use super::ConfigError;

/// The settings file as written on disk.
/// Only the `urls` key is recognised; any other key is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Absolute HTTP(S) URLs to probe, in the order they should be started.
    #[serde(default)]
    pub urls: Vec<String>,
}

impl Settings {
    /// Parse the settings from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate every configured URL and turn the list into probe targets.
    /// Duplicates collapse into the first occurrence, keeping the configured order.
    pub fn targets(&self) -> Result<Vec<Target>, ConfigError> {
        let mut targets: Vec<Target> = Vec::with_capacity(self.urls.len());
        for raw in &self.urls {
            let target = Target::parse(raw)?;
            if targets.contains(&target) {
                log::warn!("Ignoring duplicate target {target}");
                continue;
            }
            targets.push(target);
        }
        Ok(targets)
    }
}

/// A single URL to probe. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    url: Url,
    label: String,
}

impl Target {
    /// Parse and validate a target URL.
    /// The URL must be absolute, use the `http` or `https` scheme and carry a host.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme '{other}'"))),
        }
        if url.host().is_none() {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self {
            url,
            label: raw.to_string(),
        })
    }

    /// The URL exactly as configured; this is the `url` label of every sample.
    pub fn as_str(&self) -> &str {
        &self.label
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
