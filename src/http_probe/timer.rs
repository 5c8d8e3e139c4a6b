use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Empty};
use hyper::{Request, StatusCode};
use hyper::client::conn::http1;
use hyper::header::{ACCEPT, HOST, LOCATION, USER_AGENT};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector as TokioTlsConnector;
use url::{Host, Position, Url};

use super::cert::{self, CertExpiry};
use super::prelude::*;
use crate::config::Target;

const PROBE_USER_AGENT: &str = concat!("probestat/", env!("CARGO_PKG_VERSION"));

/// Runs one instrumented HTTP GET per call.
///
/// Every call opens its own connection and closes it once the body has been read,
/// so each measurement covers a full DNS, TCP and TLS setup. Redirects are followed
/// up to [`MAX_REDIRECTS`] requests; the result describes the last one.
pub struct PhaseTimer {
    resolver: Arc<dyn Resolve>,
    connector: TokioTlsConnector,
    clock: Arc<dyn Clock>,
    timeout: Option<Duration>,
}

/// Redirects followed before a tick is given up.
pub const MAX_REDIRECTS: usize = 10;

/// Response side of the exchange.
struct Exchange {
    http_status: u16,
    first_byte: Instant,
    body_end: Instant,
    /// `Location` of a redirect response.
    location: Option<String>,
}

/// One request of a possibly redirected probe.
struct Hop {
    http_status: u16,
    marks: PhaseMarks,
    not_after: Option<DateTime<Utc>>,
    location: Option<String>,
}

impl PhaseTimer {
    pub fn new(resolver: Arc<dyn Resolve>, connector: TokioTlsConnector) -> Self {
        Self {
            resolver,
            connector,
            clock: Arc::new(SystemClock),
            timeout: None,
        }
    }

    /// Replace the clock used for certificate expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound the whole exchange. `None` lets a request run until the peer gives up.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Probe `target` once.
    pub async fn run(&self, target: &Target) -> Result<ProbeResult, ProbeError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.measure(target))
                .await
                .map_err(|_| ProbeError::Timeout(limit))?,
            None => self.measure(target).await,
        }
    }

    async fn measure(&self, target: &Target) -> Result<ProbeResult, ProbeError> {
        let mut url = target.url().clone();
        let mut requests = 0;

        loop {
            let hop = self.measure_hop(&url).await?;
            requests += 1;

            let Some(location) = hop.location else {
                return Ok(ProbeResult {
                    url: target.to_string(),
                    http_status: hop.http_status,
                    timings: hop.marks.timings(),
                    cert_expiry: hop
                        .not_after
                        .map(|not_after| CertExpiry::new(not_after, self.clock.now())),
                });
            };

            if requests >= MAX_REDIRECTS {
                return Err(ProbeError::TooManyRedirects(MAX_REDIRECTS));
            }
            url = redirect_target(&url, &location)?;
            log::debug!("[{target}] {} redirects to {url}", hop.http_status);
        }
    }

    /// One request over a fresh connection to `url`.
    async fn measure_hop(&self, url: &Url) -> Result<Hop, ProbeError> {
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::InvalidTarget(url.to_string()))?;
        let request = build_request(url)?;

        let dns_start = Instant::now();
        let ips = self.lookup(url).await?;
        let dns_end = Instant::now();

        let host = url.host_str().unwrap_or_default();
        let (stream, connect_start, connect_end) = connect(host, &ips, port).await?;

        let (exchange, tls, not_after) = if url.scheme() == "https" {
            let domain = tls_domain(url)?;
            let tls_start = Instant::now();
            let stream = self
                .connector
                .connect(&domain, stream)
                .await
                .map_err(|source| ProbeError::Tls {
                    host: domain.clone(),
                    source,
                })?;
            let tls_end = Instant::now();

            let not_after = leaf_not_after(&stream);
            if not_after.is_none() {
                log::warn!("[{url}] Could not read the server certificate");
            }

            let exchange = send(stream, request).await?;
            (exchange, Some((tls_start, tls_end)), not_after)
        } else {
            (send(stream, request).await?, None, None)
        };

        Ok(Hop {
            http_status: exchange.http_status,
            marks: PhaseMarks {
                dns_start,
                dns_end,
                connect_start,
                connect_end,
                tls,
                first_byte: exchange.first_byte,
                body_end: exchange.body_end,
            },
            not_after,
            location: exchange.location,
        })
    }

    /// IP literals are used as-is and make for an empty DNS phase.
    async fn lookup(&self, url: &Url) -> Result<Vec<IpAddr>, ProbeError> {
        match url.host() {
            Some(Host::Ipv4(ip)) => Ok(vec![IpAddr::V4(ip)]),
            Some(Host::Ipv6(ip)) => Ok(vec![IpAddr::V6(ip)]),
            Some(Host::Domain(domain)) => {
                let ips = self.resolver.resolve(domain).await?;
                if ips.is_empty() {
                    return Err(ProbeError::NoAddress {
                        host: domain.to_string(),
                    });
                }
                Ok(ips)
            }
            None => Err(ProbeError::InvalidTarget(url.to_string())),
        }
    }
}

/// Connect to the first address that accepts. Only the successful attempt is timed.
async fn connect(
    host: &str,
    ips: &[IpAddr],
    port: u16,
) -> Result<(TcpStream, Instant, Instant), ProbeError> {
    let mut last_error = None;
    for ip in ips {
        let addr = SocketAddr::new(*ip, port);
        let start = Instant::now();
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok((stream, start, Instant::now())),
            Err(source) => {
                log::debug!("Connect to {addr} failed: {source}");
                last_error = Some(ProbeError::Connect { addr, source });
            }
        }
    }
    Err(last_error.unwrap_or_else(|| ProbeError::NoAddress {
        host: host.to_string(),
    }))
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Resolve a `Location` header against the URL that returned it.
fn redirect_target(base: &Url, location: &str) -> Result<Url, ProbeError> {
    let invalid = |reason: String| ProbeError::InvalidRedirect {
        location: location.to_string(),
        reason,
    };

    let next = base.join(location).map_err(|e| invalid(e.to_string()))?;
    match next.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if next.host().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(next)
}

fn tls_domain(url: &Url) -> Result<String, ProbeError> {
    match url.host() {
        Some(Host::Domain(domain)) => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        None => Err(ProbeError::InvalidTarget(url.to_string())),
    }
}

fn build_request(url: &Url) -> Result<Request<Empty<Bytes>>, ProbeError> {
    let path = &url[Position::BeforePath..Position::AfterQuery];
    let authority = &url[Position::BeforeHost..Position::AfterPort];

    Ok(Request::get(path)
        .header(HOST, authority)
        .header(USER_AGENT, PROBE_USER_AGENT)
        .header(ACCEPT, "*/*")
        .body(Empty::new())?)
}

fn leaf_not_after(stream: &tokio_native_tls::TlsStream<TcpStream>) -> Option<DateTime<Utc>> {
    let certificate = stream.get_ref().peer_certificate().ok().flatten()?;
    let der = certificate.to_der().ok()?;
    cert::not_after(&der)
}

/// Send `request` over a dedicated HTTP/1.1 connection and drain the response body.
async fn send<S>(stream: S, request: Request<Empty<Bytes>>) -> Result<Exchange, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::debug!("Probe connection closed with error: {e}");
        }
    });

    let response = sender.send_request(request).await?;
    let first_byte = Instant::now();
    let http_status = response.status().as_u16();
    let location = is_redirect(response.status())
        .then(|| response.headers().get(LOCATION))
        .flatten()
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let mut body = response.into_body();
    while let Some(frame) = body.frame().await {
        frame?;
    }
    let body_end = Instant::now();

    // Dropping the sender closes the connection.
    drop(sender);

    Ok(Exchange {
        http_status,
        first_byte,
        body_end,
        location,
    })
}
