use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::Probe;
use crate::config::{FailurePolicy, Target};
use crate::http_probe::prelude::*;
use crate::http_probe::report;
use crate::metrics::MetricsSink;

/// Interval between two probes of the same target.
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(3);

/// Shortest interval accepted by [`Scheduler::with_interval`].
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Owns one probe task per target.
///
/// Probes share the phase timer and the sink and nothing else. All of them observe
/// the scheduler's cancellation token and are joined on shutdown.
pub struct Scheduler {
    timer: Arc<PhaseTimer>,
    sink: Arc<dyn MetricsSink>,
    policy: FailurePolicy,
    interval: Duration,
    label_width: usize,
    token: CancellationToken,
    probes: JoinSet<(String, Result<(), ProbeError>)>,
}

impl Scheduler {
    pub fn new(timer: Arc<PhaseTimer>, sink: Arc<dyn MetricsSink>, policy: FailurePolicy) -> Self {
        Self {
            timer,
            sink,
            policy,
            interval: UPDATE_INTERVAL,
            label_width: 10,
            token: CancellationToken::new(),
            probes: JoinSet::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            log::warn!("Probe interval {interval:?} is below the minimum, using {MIN_INTERVAL:?}");
            self.interval = MIN_INTERVAL;
        } else {
            self.interval = interval;
        }
        self
    }

    pub fn with_label_width(mut self, width: usize) -> Self {
        self.label_width = width;
        self
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of probe tasks still running.
    pub fn running(&self) -> usize {
        self.probes.len()
    }

    /// Spawn one probe per target, in order, and return immediately.
    pub fn start(&mut self, targets: &[Target]) {
        for target in targets {
            let probe = Probe::new(
                target.clone(),
                Arc::clone(&self.timer),
                Arc::clone(&self.sink),
                self.interval,
            )
            .with_label_width(self.label_width);

            let token = self.token.clone();
            let policy = self.policy;
            let url = target.to_string();
            self.probes
                .spawn(async move { (url, probe.run(token, policy).await) });

            log::info!("Started probe for {target} every {:?}", self.interval);
        }
    }

    /// Wait on the probes.
    ///
    /// Returns the first probe error after cancelling and joining every other probe.
    /// Returns `Ok` once all probes have stopped on their own (cancellation).
    pub async fn supervise(&mut self) -> Result<(), ProbeError> {
        while let Some(joined) = self.probes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((url, Err(e))) => {
                    log::error!("Probe for {url} failed, stopping all probes: {}", report(&e));
                    self.stop().await;
                    return Err(e);
                }
                Err(e) => log::error!("Probe task ended abnormally: {e}"),
            }
        }
        Ok(())
    }

    /// Cancel every probe and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.stop().await;
        log::info!("All probes stopped");
    }

    async fn stop(&mut self) {
        self.token.cancel();
        while let Some(joined) = self.probes.join_next().await {
            if let Err(e) = joined {
                log::warn!("Probe task ended abnormally: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::setup_tls_connector;
    use crate::metrics::GaugeStore;

    struct NoResolve;

    #[async_trait::async_trait]
    impl Resolve for NoResolve {
        async fn resolve(&self, host: &str) -> Result<Vec<std::net::IpAddr>, ProbeError> {
            Err(ProbeError::NoAddress {
                host: host.to_string(),
            })
        }
    }

    fn scheduler() -> Scheduler {
        let timer = PhaseTimer::new(Arc::new(NoResolve), setup_tls_connector().unwrap());
        Scheduler::new(
            Arc::new(timer),
            Arc::new(GaugeStore::new().unwrap()),
            FailurePolicy::Skip,
        )
    }

    #[test]
    fn interval_defaults_to_update_interval() {
        assert_eq!(scheduler().interval(), UPDATE_INTERVAL);
    }

    #[test]
    fn interval_is_clamped_to_minimum() {
        assert_eq!(scheduler().with_interval(Duration::ZERO).interval(), MIN_INTERVAL);
        assert_eq!(
            scheduler().with_interval(Duration::from_millis(250)).interval(),
            Duration::from_millis(250)
        );
    }

    #[tokio::test]
    async fn shutdown_without_targets_returns() {
        let mut scheduler = scheduler();
        scheduler.start(&[]);
        assert_eq!(scheduler.running(), 0);
        assert_eq!(scheduler.supervise().await.ok(), Some(()));
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_idle_probes() {
        let targets = [
            Target::parse("http://a.test/").unwrap(),
            Target::parse("http://b.test/").unwrap(),
        ];
        let mut scheduler = scheduler().with_interval(Duration::from_secs(60));
        let token = scheduler.token();
        scheduler.start(&targets);
        assert_eq!(scheduler.running(), 2);

        scheduler.shutdown().await;
        assert!(token.is_cancelled());
    }
}
