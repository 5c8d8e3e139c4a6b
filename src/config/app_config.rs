use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::{env, fmt, time::Duration};

use tokio_native_tls::TlsConnector as TokioTlsConnector;
use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts},
};

use super::{ConfigError, Settings, Target};

const DEFAULT_CONFIG_FILE: &str = "settings.yaml";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8092";

/// Upper bound for the URL column in log lines.
const MAX_LOG_URL_WIDTH: usize = 48;

/// What a probe does when a request fails at the transport level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure, publish nothing for the tick and try again on the next one.
    #[default]
    Skip,
    /// Report the failure to the scheduler, which stops every probe and exits.
    Exit,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "exit" => Ok(Self::Exit),
            other => Err(format!("expected 'skip' or 'exit', got '{other}'")),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => f.write_str("skip"),
            Self::Exit => f.write_str("exit"),
        }
    }
}

pub struct AppConfig {
    pub settings_path: PathBuf,
    pub targets: Vec<Target>,
    pub listen_addr: SocketAddr,
    /// Custom name servers; `None` uses the system resolver configuration.
    pub dns_hosts: Option<Vec<IpAddr>>,
    pub failure_policy: FailurePolicy,
    pub probe_timeout: Option<Duration>,
    pub max_url_width: usize,
}

/// Load the application configuration from the settings file and environment variables.
/// The settings file is named by `CONFIG_FILE` and holds the list of URLs to probe.
/// `LISTEN_ADDR`, `DNS_HOSTS`, `ON_PROBE_ERROR` and `PROBE_TIMEOUT_SECONDS` tune the process.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_lookup(|name| env::var(name).ok())
}

impl AppConfig {
    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings_path =
            PathBuf::from(lookup("CONFIG_FILE").unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string()));

        let listen_addr = parse_var(&lookup, "LISTEN_ADDR", DEFAULT_LISTEN_ADDR, |value| {
            value.parse::<SocketAddr>().map_err(|e| e.to_string())
        })?;

        let dns_hosts = match lookup("DNS_HOSTS") {
            Some(hosts) if !hosts.trim().is_empty() => Some(parse_dns_hosts(&hosts)?),
            _ => None,
        };

        let failure_policy = parse_var(&lookup, "ON_PROBE_ERROR", "skip", FailurePolicy::from_str)?;

        let probe_timeout = match lookup("PROBE_TIMEOUT_SECONDS") {
            Some(value) => {
                let seconds = value.trim().parse::<u64>().map_err(|e| ConfigError::Env {
                    name: "PROBE_TIMEOUT_SECONDS",
                    value: value.clone(),
                    reason: e.to_string(),
                })?;
                (seconds > 0).then(|| Duration::from_secs(seconds))
            }
            None => None,
        };

        let yaml = std::fs::read_to_string(&settings_path).map_err(|source| ConfigError::Read {
            path: settings_path.clone(),
            source,
        })?;
        let targets = Settings::from_yaml(&yaml)?.targets()?;

        if targets.is_empty() {
            log::warn!(
                "No urls configured in {}, nothing will be probed",
                settings_path.display()
            );
        }

        let max_url_width = targets
            .iter()
            .map(|target| target.as_str().len())
            .max()
            .unwrap_or(10)
            .min(MAX_LOG_URL_WIDTH);

        Ok(Self {
            settings_path,
            targets,
            listen_addr,
            dns_hosts,
            failure_policy,
            probe_timeout,
            max_url_width,
        })
    }
}

fn parse_var<F, T>(
    lookup: &F,
    name: &'static str,
    default: &str,
    parse: impl Fn(&str) -> Result<T, String>,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    parse(&value).map_err(|reason| ConfigError::Env {
        name,
        value,
        reason,
    })
}

fn parse_dns_hosts(hosts: &str) -> Result<Vec<IpAddr>, ConfigError> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(|host| {
            host.parse::<IpAddr>().map_err(|e| ConfigError::Env {
                name: "DNS_HOSTS",
                value: host.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Setup a TLS connector that accepts invalid certificates.
/// Expired and self-signed targets must still produce timings and an expiry value.
pub fn setup_tls_connector() -> Result<TokioTlsConnector, ConfigError> {
    let mut builder = native_tls::TlsConnector::builder();
    builder.danger_accept_invalid_certs(true);
    builder.danger_accept_invalid_hostnames(true);
    let connector = builder.build()?;
    Ok(TokioTlsConnector::from(connector))
}

/// Setup a DNS resolver.
/// With explicit `dns_hosts` the resolver queries those servers over TCP on port 53.
/// Caching is disabled so that every probe pays for a real lookup.
/// Without hosts the system configuration (`/etc/resolv.conf`, hosts file) is used.
pub fn setup_resolver(dns_hosts: Option<&[IpAddr]>) -> Result<TokioAsyncResolver, ConfigError> {
    let Some(dns_hosts) = dns_hosts else {
        let (config, mut opts) = trust_dns_resolver::system_conf::read_system_conf()
            .map_err(ConfigError::SystemDns)?;
        opts.cache_size = 0;
        return Ok(TokioAsyncResolver::tokio(config, opts));
    };

    let mut opts = ResolverOpts::default();
    opts.attempts = 2;
    opts.timeout = Duration::from_secs(2);
    opts.cache_size = 0;

    let mut name_servers = NameServerConfigGroup::new();
    for ip in dns_hosts {
        name_servers.push(NameServerConfig {
            socket_addr: (*ip, 53).into(),
            protocol: Protocol::Tcp,
            tls_dns_name: None,
            trust_negative_responses: false,
            bind_addr: None,
        });
    }

    let resolver_config = ResolverConfig::from_parts(None, vec![], name_servers);
    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}
