use std::time::{Duration, Instant};

use super::cert::CertExpiry;

/// Outcome of one probe tick. Consumed into metric samples and then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub url: String,
    pub http_status: u16,
    pub timings: PhaseTimings,
    /// Present only for TLS targets whose leaf certificate could be read.
    pub cert_expiry: Option<CertExpiry>,
}

/// Durations of the phases of one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimings {
    pub dns_lookup: Duration,
    pub tcp_connection: Duration,
    /// Zero for plaintext targets.
    pub tls_handshake: Duration,
    /// Connection ready to first response byte.
    pub server_processing: Duration,
    /// First response byte to end of body (content transfer).
    pub total: Duration,
}

/// Instants recorded at the boundaries of each request phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseMarks {
    pub dns_start: Instant,
    pub dns_end: Instant,
    pub connect_start: Instant,
    pub connect_end: Instant,
    pub tls: Option<(Instant, Instant)>,
    pub first_byte: Instant,
    pub body_end: Instant,
}

impl PhaseMarks {
    /// The instant the connection became usable for HTTP.
    pub fn connection_ready(&self) -> Instant {
        self.tls.map_or(self.connect_end, |(_, end)| end)
    }

    pub fn timings(&self) -> PhaseTimings {
        PhaseTimings {
            dns_lookup: self.dns_end.saturating_duration_since(self.dns_start),
            tcp_connection: self.connect_end.saturating_duration_since(self.connect_start),
            tls_handshake: self
                .tls
                .map(|(start, end)| end.saturating_duration_since(start))
                .unwrap_or_default(),
            server_processing: self
                .first_byte
                .saturating_duration_since(self.connection_ready()),
            total: self.body_end.saturating_duration_since(self.first_byte),
        }
    }
}
