use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// A probe attempt that did not produce a result. Every variant fails the whole tick.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("target {0} has no host")]
    InvalidTarget(String),

    #[error("DNS lookup for {host} failed")]
    Dns {
        host: String,
        #[source]
        source: trust_dns_resolver::error::ResolveError,
    },

    #[error("DNS lookup for {host} returned no addresses")]
    NoAddress { host: String },

    #[error("failed to connect to {addr}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {host} failed")]
    Tls {
        host: String,
        #[source]
        source: native_tls::Error,
    },

    #[error("failed to build request")]
    Request(#[from] hyper::http::Error),

    #[error("HTTP exchange failed")]
    Http(#[from] hyper::Error),

    #[error("invalid redirect to '{location}': {reason}")]
    InvalidRedirect { location: String, reason: String },

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}
