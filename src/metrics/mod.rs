//! Metric names and the sink probes publish into.
//!
//! Every sample is keyed by the probed url and one of the [`MetricName`]s. The sink
//! keeps only the latest value per key: publishing again overwrites, it never appends.

use std::fmt;

use thiserror::Error;

use crate::http_probe::prelude::ProbeResult;

pub mod server;
pub mod store;

pub use store::GaugeStore;

const URL_LABEL: &str = "url";
const METRIC_LABEL: &str = "metric";
const RESPONSE_INFO_METRIC: &str = "response_info";

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics registry error")]
    Registry(#[from] prometheus::Error),

    #[error("metrics endpoint I/O error")]
    Io(#[from] std::io::Error),
}

/// The closed set of per-url metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricName {
    StatusCode,
    DnsLookup,
    TcpConnection,
    TlsHandshake,
    ServerProcessing,
    TotalTime,
    CertExpiryDate,
}

impl MetricName {
    pub const ALL: [MetricName; 7] = [
        Self::StatusCode,
        Self::DnsLookup,
        Self::TcpConnection,
        Self::TlsHandshake,
        Self::ServerProcessing,
        Self::TotalTime,
        Self::CertExpiryDate,
    ];

    /// The `metric` label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            // Misspelt on purpose: existing dashboards query this exact label.
            Self::StatusCode => "stataus_code",
            Self::DnsLookup => "dns_lookup",
            Self::TcpConnection => "tcp_connection",
            Self::TlsHandshake => "tls_handshake",
            Self::ServerProcessing => "server_processing",
            Self::TotalTime => "total_time",
            Self::CertExpiryDate => "CertExpiryDate",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write side of the metrics store, shared by all probes.
///
/// Implementations must accept concurrent calls from any number of probes. A call
/// replaces the previous value for `(url, metric)`.
pub trait MetricsSink: Send + Sync + 'static {
    fn publish(&self, url: &str, metric: MetricName, value: f64);
}

/// Publish every sample of `result`: six for plaintext targets, seven when a
/// certificate expiry is known.
pub fn publish_result(sink: &dyn MetricsSink, result: &ProbeResult) {
    let url = result.url.as_str();
    let timings = &result.timings;

    sink.publish(url, MetricName::StatusCode, f64::from(result.http_status));

    let phases = [
        (MetricName::DnsLookup, timings.dns_lookup),
        (MetricName::TcpConnection, timings.tcp_connection),
        (MetricName::TlsHandshake, timings.tls_handshake),
        (MetricName::ServerProcessing, timings.server_processing),
        (MetricName::TotalTime, timings.total),
    ];
    for (metric, duration) in phases {
        sink.publish(url, metric, duration.as_millis() as f64);
    }

    if let Some(expiry) = &result.cert_expiry {
        sink.publish(url, MetricName::CertExpiryDate, expiry.days_left as f64);
    }
}
