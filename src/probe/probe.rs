use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{FailurePolicy, Target};
use crate::http_probe::prelude::*;
use crate::http_probe::report;
use crate::metrics::{MetricsSink, publish_result};

pub(crate) fn to_fixed_width(input: &str, width: usize) -> String {
    use unicode_truncate::UnicodeTruncateStr;

    let (truncated, _) = input.unicode_truncate(width);
    format!("{:<width$}", truncated, width = width)
}

/// Periodic prober for a single target.
///
/// The probe sleeps for one interval, runs one request, publishes the result and
/// goes back to sleep. A request that outlives the interval makes the probe skip
/// the ticks it missed, so there is never more than one request in flight per target.
pub struct Probe {
    target: Target,
    timer: Arc<PhaseTimer>,
    sink: Arc<dyn MetricsSink>,
    interval: Duration,
    label_width: usize,
}

impl Probe {
    pub fn new(
        target: Target,
        timer: Arc<PhaseTimer>,
        sink: Arc<dyn MetricsSink>,
        interval: Duration,
    ) -> Self {
        let label_width = target.as_str().len();
        Self {
            target,
            timer,
            sink,
            interval,
            label_width,
        }
    }

    /// Pad (or truncate) the url to this width in log lines.
    pub fn with_label_width(mut self, width: usize) -> Self {
        self.label_width = width;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Run one request and publish its samples.
    /// Nothing is published when the request fails.
    pub async fn tick(&self) -> Result<ProbeResult, ProbeError> {
        let result = self.timer.run(&self.target).await?;
        publish_result(self.sink.as_ref(), &result);
        self.log_result(&result);
        Ok(result)
    }

    /// Probe until `token` is cancelled.
    ///
    /// Under [`FailurePolicy::Exit`] the first failed request ends the loop and the
    /// error is handed back to the caller; under [`FailurePolicy::Skip`] it is logged.
    pub async fn run(self, token: CancellationToken, policy: FailurePolicy) -> Result<(), ProbeError> {
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                outcome = self.tick() => outcome,
            };

            if let Err(e) = outcome {
                let label = to_fixed_width(self.target.as_str(), self.label_width);
                match policy {
                    FailurePolicy::Skip => {
                        log::warn!("[{label}] ❌ Probe error, retrying next tick: {}", report(&e));
                    }
                    FailurePolicy::Exit => {
                        log::error!("[{label}] ❌ Probe error: {}", report(&e));
                        return Err(e);
                    }
                }
            }
        }
    }

    fn log_result(&self, result: &ProbeResult) {
        let label = to_fixed_width(self.target.as_str(), self.label_width);
        let t = &result.timings;
        let cert = result
            .cert_expiry
            .map(|expiry| {
                format!(
                    "{} ({}d)",
                    expiry.not_after.format("%Y-%m-%d %H:%M:%S"),
                    expiry.days_left
                )
            })
            .unwrap_or_else(|| "N/A".to_string());

        log::info!(
            "[{label}] ✅ Status: {}, DNS: {}ms, TCP: {}ms, TLS: {}ms, Processing: {}ms, Total: {}ms, Cert: {cert}",
            result.http_status,
            t.dns_lookup.as_millis(),
            t.tcp_connection.as_millis(),
            t.tls_handshake.as_millis(),
            t.server_processing.as_millis(),
            t.total.as_millis(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fixed_width_pads() {
        assert_eq!(to_fixed_width("http://a.test", 16), "http://a.test   ");
    }

    #[test]
    fn test_to_fixed_width_truncates() {
        assert_eq!(to_fixed_width("https://very-long-host.test", 12), "https://very");
    }
}
