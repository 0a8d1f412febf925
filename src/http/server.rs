//! HTTP server setup and connection dispatch.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener
//! - Read the first request head of each connection
//! - Send Upgrade handshakes to the WebSocket splicer
//! - Serve everything else with hyper + the axum router
//! - Close connections that never finish a request head
//! - Drain connections on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, Router};
use hyper::body::Incoming;
use hyper_util::rt::{TokioIo, TokioTimer};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::Service;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::http::forward::{proxy_handler, AppState};
use crate::http::head::{read_request_head, HeadRead};
use crate::http::request::BackendIdentity;
use crate::http::websocket::splice_upgrade;
use crate::net::{ConnectionGuard, ConnectionTracker, Listener, ListenerError, Rewind};
use crate::observability::metrics;
use crate::routing::RequestRouter;

/// Error type for server construction and the accept loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("backend address cannot be used as a header value: {0}")]
    InvalidBackend(#[from] axum::http::header::InvalidHeaderValue),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Everything a connection task needs, shared read-only.
struct ConnectionContext {
    router: Router,
    backend: Arc<BackendIdentity>,
    connect_timeout: Duration,
    header_timeout: Duration,
    max_header_bytes: usize,
}

/// HTTP server for the OAuth proxy.
pub struct HttpServer {
    config: ProxyConfig,
    context: Arc<ConnectionContext>,
    tracker: ConnectionTracker,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let backend = BackendIdentity::new(&config.backend)?;
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);

        let state = AppState::new(
            RequestRouter::from_config(&config.oauth),
            backend,
            connect_timeout,
        );

        let context = Arc::new(ConnectionContext {
            backend: state.backend.clone(),
            router: Self::build_router(state),
            connect_timeout,
            header_timeout: Duration::from_secs(config.timeouts.header_secs),
            max_header_bytes: config.listener.max_header_bytes,
        });

        Ok(Self {
            config,
            context,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Build the Axum router: every path goes to the forwarder.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(
            address = %addr,
            backend = %self.context.backend.authority(),
            "HTTP server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer, permit)) => {
                            let context = self.context.clone();
                            let guard = self.tracker.track();
                            let conn_shutdown = shutdown.resubscribe();
                            tokio::spawn(async move {
                                handle_connection(context, stream, peer, guard, conn_shutdown).await;
                                drop(permit);
                            });
                        }
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Stopping accept loop");
                    break;
                }
            }
        }

        drop(listener);
        let deadline = Duration::from_secs(self.config.shutdown.drain_secs);
        if self.tracker.drain(deadline).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed, dropping remaining connections"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn handle_connection(
    context: Arc<ConnectionContext>,
    mut stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    mut shutdown: broadcast::Receiver<()>,
) {
    let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);

    async move {
        let _ = stream.set_nodelay(true);

        let sniff = tokio::time::timeout(
            context.header_timeout,
            read_request_head(&mut stream, context.max_header_bytes),
        );
        let read = tokio::select! {
            read = sniff => match read {
                Ok(Ok(read)) => read,
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Failed reading request head");
                    return;
                }
                Err(_) => {
                    tracing::debug!(
                        timeout = ?context.header_timeout,
                        "No request head before timeout, closing"
                    );
                    return;
                }
            },
            _ = shutdown.recv() => {
                tracing::debug!("Shutdown before request head, closing");
                return;
            }
        };

        match read {
            HeadRead::Closed => {}
            HeadRead::Complete { head, raw, head_len } if head.is_upgrade() => {
                tracing::info!(method = %head.method, target = %head.target, "WebSocket upgrade");
                let early = raw.slice(head_len..);
                match splice_upgrade(
                    stream,
                    &head,
                    &early,
                    &context.backend,
                    context.connect_timeout,
                )
                .await
                {
                    Ok(stats) => tracing::info!(
                        client_to_backend = stats.client_to_backend,
                        backend_to_client = stats.backend_to_client,
                        "WebSocket closed"
                    ),
                    Err(e) => {
                        tracing::error!(error = %e, "WebSocket backend connection error, closing client");
                        metrics::record_upstream_error("websocket");
                    }
                }
            }
            other => serve_http(&context, stream, other, shutdown).await,
        }

        drop(guard);
    }
    .instrument(span)
    .await
}

async fn serve_http(
    context: &ConnectionContext,
    stream: TcpStream,
    read: HeadRead,
    mut shutdown: broadcast::Receiver<()>,
) {
    let io = TokioIo::new(Rewind::new(read.into_raw(), stream));

    let router = context.router.clone();
    let service = hyper::service::service_fn(move |request: Request<Incoming>| {
        router.clone().call(request.map(Body::new))
    });

    let mut builder = hyper::server::conn::http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(context.header_timeout);

    let conn = builder.serve_connection(io, service).with_upgrades();
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.recv() => {
            // Finishes an in-flight response, then closes; idle connections close now.
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "HTTP connection closed with error");
    }
}
