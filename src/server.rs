//! HTTP server
//!
//! Accept loop on the main listener. Media routes go to [`MediaHandler`];
//! `/health`, `/metrics` and `/stats` are answered inline.

use crate::handler::{MediaHandler, ResponseBody};
use crate::metrics::StreamMetrics;
use crate::metrics_endpoint::{health_response, metrics_response, not_found_response, stats_response};
use http::request::Parts;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use prometheus::Registry;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Main HTTP server
#[derive(Clone)]
pub struct StreamServer {
    handler: Arc<MediaHandler>,
    metrics: Arc<StreamMetrics>,
    registry: Option<Registry>,
}

fn boxed(response: Response<Full<Bytes>>) -> Response<ResponseBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed_unsync())
}

impl StreamServer {
    pub fn new(handler: Arc<MediaHandler>, metrics: Arc<StreamMetrics>) -> Self {
        StreamServer {
            handler,
            metrics,
            registry: None,
        }
    }

    /// Expose the metrics gathered by `registry` on `/metrics`
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Route one request
    pub async fn route(&self, parts: Parts) -> Response<ResponseBody> {
        match parts.uri.path() {
            "/health" => boxed(health_response()),
            "/metrics" => boxed(metrics_response(&self.metrics, self.registry.as_ref())),
            "/stats" => boxed(stats_response(&self.metrics)),
            path => match self.handler.handle(&parts).await {
                Some(response) => response,
                None => {
                    debug!("No route for {}", path);
                    boxed(not_found_response())
                }
            },
        }
    }

    /// Bind `addr` and serve until `shutdown` resolves
    pub async fn serve(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.run(listener, shutdown).await;
        Ok(())
    }

    /// Serve connections from `listener` until `shutdown` resolves
    ///
    /// Connections already accepted keep running after shutdown; only the
    /// accept loop stops.
    pub async fn run(self, listener: TcpListener, shutdown: impl Future<Output = ()>) {
        match listener.local_addr() {
            Ok(addr) => info!("Media server listening on http://{}", addr),
            Err(e) => warn!("Media server listening on unknown address: {}", e),
        }

        let server = Arc::new(self);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
            };

            let io = TokioIo::new(stream);
            let server = Arc::clone(&server);

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let server = Arc::clone(&server);
                    async move {
                        let (parts, _body) = req.into_parts();
                        Ok::<_, Infallible>(server.route(parts).await)
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {:?}", peer, err);
                }
            });
        }
    }
}
