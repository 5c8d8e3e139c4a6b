use chrono::{DateTime, Utc};
use x509_parser::parse_x509_certificate;

const SECONDS_PER_DAY: i64 = 86_400;

/// Source of wall-clock time for certificate expiry.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Expiry of the leaf certificate presented by a TLS target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertExpiry {
    pub not_after: DateTime<Utc>,
    /// Whole days left, rounded down. Negative once the certificate has expired.
    pub days_left: i64,
}

impl CertExpiry {
    pub fn new(not_after: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            not_after,
            days_left: days_until(not_after, now),
        }
    }
}

/// Read the `NotAfter` timestamp of a DER encoded certificate.
pub fn not_after(der: &[u8]) -> Option<DateTime<Utc>> {
    let (_, parsed) = parse_x509_certificate(der).ok()?;
    let timestamp = parsed.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
}

/// Whole days from `now` until `not_after`, floored.
pub fn days_until(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}
