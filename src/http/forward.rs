//! HTTP forwarding.
//!
//! One inbound request becomes one backend request: the path is repaired if
//! the router says so, `Host`/`Origin` are rewritten, the body streams
//! through, and the response comes back minus `Transfer-Encoding`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri},
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
};
use uuid::Uuid;

use crate::http::request::{is_upgrade_request, rewrite_request_headers, BackendIdentity};
use crate::http::response::{bad_gateway, error_chain, filter_response_headers};
use crate::http::websocket::splice;
use crate::observability::metrics;
use crate::routing::{RequestRouter, RoutedPath};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<RequestRouter>,
    pub backend: Arc<BackendIdentity>,
    pub client: Client<HttpConnector, Body>,
}

impl AppState {
    pub fn new(router: RequestRouter, backend: BackendIdentity, connect_timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            router: Arc::new(router),
            backend: Arc::new(backend),
            client,
        }
    }
}

/// Forward a request to the backend and relay its response.
pub async fn proxy_handler(State(state): State<AppState>, mut request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();
    let method = request.method().clone();

    let original = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let routed = state.router.route(&original);
    if let RoutedPath::Rewritten { spaces, .. } = &routed {
        tracing::info!(
            request_id = %request_id,
            spaces,
            "OAuth callback detected, restoring '+' in state"
        );
        metrics::record_state_rewrite();
    }
    let target = routed.resolve(&original);

    tracing::debug!(request_id = %request_id, method = %method, path = %target, "Proxying request");

    let uri: Uri = match format!("http://{}{}", state.backend.authority(), target).parse() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Unusable request target");
            metrics::record_request(method.as_str(), 502, start);
            return bad_gateway(&e.to_string());
        }
    };

    // Upgrades that arrive on a keep-alive connection come through here
    // rather than the raw splicer.
    let client_upgrade = is_upgrade_request(request.headers()).then(|| hyper::upgrade::on(&mut request));

    let (mut parts, body) = request.into_parts();
    parts.uri = uri;
    rewrite_request_headers(&mut parts.headers, &state.backend);
    let outbound = Request::from_parts(parts, body);

    match state.client.request(outbound).await {
        Ok(mut response) => {
            let status = response.status();
            tracing::info!(
                request_id = %request_id,
                method = %method,
                path = %target,
                status = status.as_u16(),
                "Upstream responded"
            );
            metrics::record_request(method.as_str(), status.as_u16(), start);

            if status == StatusCode::SWITCHING_PROTOCOLS {
                if let Some(client_upgrade) = client_upgrade {
                    let backend_upgrade = hyper::upgrade::on(&mut response);
                    tokio::spawn(async move {
                        match tokio::try_join!(client_upgrade, backend_upgrade) {
                            Ok((client, backend)) => {
                                let stats = splice(TokioIo::new(client), TokioIo::new(backend)).await;
                                tracing::info!(
                                    request_id = %request_id,
                                    client_to_backend = stats.client_to_backend,
                                    backend_to_client = stats.backend_to_client,
                                    "Upgraded connection closed"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(request_id = %request_id, error = %e, "Upgrade failed");
                            }
                        }
                    });
                }
            }

            let (mut parts, body) = response.into_parts();
            filter_response_headers(&mut parts.headers);
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            let message = error_chain(&e);
            tracing::error!(request_id = %request_id, method = %method, path = %target, error = %message, "Proxy error");
            metrics::record_request(method.as_str(), 502, start);
            metrics::record_upstream_error("http");
            bad_gateway(&message)
        }
    }
}
