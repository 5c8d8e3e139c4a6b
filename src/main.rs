use std::sync::Arc;

use probestat::config::{load_config, setup_resolver, setup_tls_connector};
use probestat::http_probe::prelude::*;
use probestat::http_probe::report;
use probestat::metrics::{GaugeStore, server};
use probestat::probe::Scheduler;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", report(&e));
            return Err(e.into());
        }
    };
    log::info!(
        "Loaded {} target(s) from {}, on probe error: {}",
        config.targets.len(),
        config.settings_path.display(),
        config.failure_policy
    );
    match &config.dns_hosts {
        Some(hosts) => log::info!("Using DNS hosts: {:?}", hosts),
        None => log::info!("Using the system DNS configuration"),
    }

    let resolver = setup_resolver(config.dns_hosts.as_deref())?;
    let connector = setup_tls_connector()?;
    let store = GaugeStore::new()?;

    let timer = PhaseTimer::new(Arc::new(resolver), connector).with_timeout(config.probe_timeout);
    let mut scheduler = Scheduler::new(
        Arc::new(timer),
        Arc::new(store.clone()),
        config.failure_policy,
    )
    .with_label_width(config.max_url_width);
    scheduler.start(&config.targets);

    let listener = TcpListener::bind(config.listen_addr).await?;
    let server_token = CancellationToken::new();
    let mut server = tokio::spawn(server::serve(listener, store, server_token.clone()));

    let failure = tokio::select! {
        _ = shutdown_signal() => None,
        failure = supervise(&mut scheduler) => Some(failure),
        served = &mut server => {
            match served {
                Ok(Ok(())) => log::warn!("Metrics endpoint stopped"),
                Ok(Err(e)) => log::error!("Metrics endpoint failed: {}", report(&e)),
                Err(e) => log::error!("Metrics endpoint task failed: {e}"),
            }
            None
        }
    };

    server_token.cancel();
    scheduler.shutdown().await;
    if !server.is_finished() {
        let _ = server.await;
    }

    match failure {
        Some(e) => {
            log::error!("Exiting after probe failure: {}", report(&e));
            Err(e.into())
        }
        None => {
            log::info!("Shutdown complete");
            Ok(())
        }
    }
}

/// Resolves only with a probe failure; a scheduler without failures never completes.
async fn supervise(scheduler: &mut Scheduler) -> ProbeError {
    match scheduler.supervise().await {
        Err(e) => e,
        Ok(()) => std::future::pending().await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Received Ctrl+C"),
        _ = terminate => log::info!("Received terminate signal"),
    }
}
