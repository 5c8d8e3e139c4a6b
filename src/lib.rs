//! probestat probes HTTP(S) endpoints on a fixed interval and exports the phases of
//! every request (DNS lookup, TCP connect, TLS handshake, server processing and
//! content transfer) together with TLS certificate expiry as Prometheus gauges.
//!
//! A [`probe::Scheduler`] starts one [`probe::Probe`] per configured URL. Each probe
//! measures its target through a shared [`http_probe::timer::PhaseTimer`] and writes
//! the outcome into a [`metrics::MetricsSink`], normally the [`metrics::GaugeStore`]
//! served on `/metrics`.

pub mod config;
pub mod http_probe;
pub mod metrics;
pub mod probe;
