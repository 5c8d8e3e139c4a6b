//! Pull endpoint exposing the metrics store to scrapers.

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::{GaugeStore, MetricsError};

pub const METRICS_PATH: &str = "/metrics";

/// Serve `GET /metrics` on `listener` until `token` is cancelled.
pub async fn serve(
    listener: TcpListener,
    store: GaugeStore,
    token: CancellationToken,
) -> Result<(), MetricsError> {
    log::info!(
        "Serving metrics on http://{}{}",
        listener.local_addr()?,
        METRICS_PATH
    );

    loop {
        let (stream, peer) = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    log::warn!("Failed to accept metrics connection: {e}");
                    continue;
                }
            },
        };

        let store = store.clone();
        tokio::spawn(async move {
            let service = service_fn(move |request| {
                let store = store.clone();
                async move { Ok::<_, Infallible>(respond(&request, &store)) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                log::debug!("Metrics connection from {peer} failed: {e}");
            }
        });
    }
}

/// Answer a single request against the store.
pub fn respond<B>(request: &Request<B>, store: &GaugeStore) -> Response<Full<Bytes>> {
    if request.uri().path() != METRICS_PATH {
        return plain(StatusCode::NOT_FOUND, "Not Found\n");
    }
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n");
    }

    match store.encode() {
        Ok(text) => {
            let mut response = Response::new(Full::new(Bytes::from(text)));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            );
            response
        }
        Err(e) => {
            log::error!("Failed to encode metrics: {e}");
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics\n")
        }
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
