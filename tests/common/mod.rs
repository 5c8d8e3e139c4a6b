//! Shared helpers for the probe integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::{HeaderValue, LOCATION};
use hyper::{Response, StatusCode};
use hyper_util::rt::TokioIo;
use probestat::config::setup_tls_connector;
use probestat::http_probe::cert;
use probestat::http_probe::prelude::*;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

pub const CERT_PEM: &str = include_str!("../fixtures/example.test.crt");
pub const KEY_PEM: &str = include_str!("../fixtures/example.test.key");

/// Resolves a fixed set of host names and counts lookups.
#[derive(Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
    lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn new<'a>(hosts: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            hosts: hosts
                .into_iter()
                .map(|host| (host.to_string(), vec![IpAddr::from([127, 0, 0, 1])]))
                .collect(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Answer `host` with `addrs`, in order.
    pub fn with_addresses(mut self, host: &str, addrs: Vec<IpAddr>) -> Self {
        self.hosts.insert(host.to_string(), addrs);
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Resolve for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ProbeError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        match self.hosts.get(host) {
            Some(ips) => Ok(ips.clone()),
            None => Err(ProbeError::NoAddress {
                host: host.to_string(),
            }),
        }
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// `NotAfter` of the checked-in `example.test` certificate.
pub fn fixture_not_after() -> DateTime<Utc> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(CERT_PEM.as_bytes()).expect("fixture PEM");
    cert::not_after(&pem.contents).expect("fixture certificate")
}

pub fn timer(resolver: Arc<StaticResolver>) -> PhaseTimer {
    PhaseTimer::new(resolver, setup_tls_connector().expect("tls connector"))
}

/// A local HTTP server answering every request with `status` after `delay`,
/// optionally with a `Location` header.
#[derive(Clone)]
pub struct MockServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockServer {
    pub async fn http(status: StatusCode, delay: Duration) -> Self {
        Self::spawn(status, delay, None, None).await
    }

    /// Plain HTTP server redirecting every request to `location`.
    pub async fn redirect(status: StatusCode, location: impl Into<String>) -> Self {
        Self::spawn(status, Duration::ZERO, Some(location.into()), None).await
    }

    pub async fn https(status: StatusCode, delay: Duration) -> Self {
        let identity = native_tls::Identity::from_pkcs8(CERT_PEM.as_bytes(), KEY_PEM.as_bytes())
            .expect("fixture identity");
        let acceptor = native_tls::TlsAcceptor::new(identity).expect("tls acceptor");
        let acceptor = tokio_native_tls::TlsAcceptor::from(acceptor);
        Self::spawn(status, delay, None, Some(acceptor)).await
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn spawn(
        status: StatusCode,
        delay: Duration,
        location: Option<String>,
        tls: Option<tokio_native_tls::TlsAcceptor>,
    ) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let server = Self {
            addr: listener.local_addr().expect("local addr"),
            hits: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        };

        let state = server.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let state = state.clone();
                let tls = tls.clone();
                let location = location.clone();
                tokio::spawn(async move {
                    match tls {
                        Some(acceptor) => {
                            if let Ok(stream) = acceptor.accept(stream).await {
                                state.serve(stream, status, delay, location).await;
                            }
                        }
                        None => state.serve(stream, status, delay, location).await,
                    }
                });
            }
        });

        server
    }

    async fn serve<S>(
        self,
        stream: S,
        status: StatusCode,
        delay: Duration,
        location: Option<String>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let service = service_fn(move |_request| {
            let state = self.clone();
            let location = location.clone();
            async move {
                state.hits.fetch_add(1, Ordering::SeqCst);
                let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                state.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                state.in_flight.fetch_sub(1, Ordering::SeqCst);

                let mut response =
                    Response::new(Full::new(Bytes::from_static(b"hello from the mock server\n")));
                *response.status_mut() = status;
                if let Some(location) = location {
                    if let Ok(value) = HeaderValue::from_str(&location) {
                        response.headers_mut().insert(LOCATION, value);
                    }
                }
                Ok::<_, Infallible>(response)
            }
        });
        let _ = http1::Builder::new()
            .serve_connection(TokioIo::new(stream), service)
            .await;
    }
}

/// An address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("local addr")
}

/// Poll `condition` every 10ms until it holds or `limit` elapses.
pub async fn eventually(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
