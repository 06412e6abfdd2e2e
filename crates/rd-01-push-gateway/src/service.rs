//! Push gateway service - HTTP surface and process lifecycle.
//!
//! Routes:
//!
//! - `GET /events` opens an event stream for the user named by `x-user-id`
//! - `POST /events/:connection_id/heartbeat` refreshes liveness
//! - `GET /health` reports registry stats and counters

use crate::adapters::channel_sink;
use crate::connections::{ConnectionManager, Maintenance};
use crate::domain::cache_control::CacheStrategy;
use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::domain::types::{CloseReason, ConnectionId, ConnectionMeta};
use crate::domain::wire::{encode_event, events};
use crate::middleware::{client_ip, user_agent, GatewayMetrics, TracingLayer, VersionLayer};
use crate::ports::{unix_millis, EventSink};
use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use shared_types::{BuildVersion, UserId};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceBuilder;
use tracing::{debug, info, warn};

/// Header carrying the authenticated user, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Push gateway service state
pub struct PushGatewayService {
    config: GatewayConfig,
    version: BuildVersion,
    manager: Arc<ConnectionManager>,
    metrics: Arc<GatewayMetrics>,
}

impl PushGatewayService {
    /// Create a new push gateway service
    pub fn new(config: GatewayConfig, version: BuildVersion) -> Result<Self, GatewayError> {
        config.validate()?;

        let metrics = Arc::new(GatewayMetrics::new());
        let manager = Arc::new(ConnectionManager::with_metrics(
            config.connections.clone(),
            Arc::clone(&metrics),
        ));

        Ok(Self {
            config,
            version,
            manager,
            metrics,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Shared connection manager, for business logic that sends events.
    pub fn manager(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.manager)
    }

    /// Get metrics
    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Bind the configured HTTP address.
    pub async fn bind(&self) -> Result<TcpListener, GatewayError> {
        TcpListener::bind(self.config.http_addr())
            .await
            .map_err(GatewayError::Bind)
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// Runs the cleanup sweep and server heartbeats for the lifetime of the
    /// server. On shutdown every connection is closed first so that open
    /// streams end and the graceful shutdown can complete.
    pub async fn run_until<F>(self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr().map_err(GatewayError::Bind)?;
        info!(addr = %addr, version = %self.version, "Starting push gateway");

        let maintenance = Maintenance::spawn(
            Arc::clone(&self.manager),
            self.config.cleanup.interval,
            self.config.connections.heartbeat_interval,
        );

        let router = self.router();
        let manager = Arc::clone(&self.manager);
        let signal = async move {
            shutdown.await;
            info!("Received shutdown signal");
            manager.shutdown().await;
        };

        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await;

        maintenance.stop().await;
        info!("Push gateway stopped");
        result.map_err(GatewayError::Serve)
    }

    /// Build the HTTP router with its middleware stack
    pub fn router(&self) -> Router {
        let state = AppState {
            manager: Arc::clone(&self.manager),
            metrics: Arc::clone(&self.metrics),
            version: self.version.clone(),
            stream_buffer: self.config.http.stream_buffer,
            trust_forwarded_headers: self.config.http.trust_forwarded_headers,
        };

        let middleware = ServiceBuilder::new()
            .layer(TracingLayer::new())
            .layer(VersionLayer::new(self.version.clone()));

        let router = Router::new()
            .route("/events", get(open_stream))
            .route("/events/:connection_id/heartbeat", post(heartbeat))
            .route("/health", get(health_check));

        #[cfg(feature = "metrics")]
        let router = router.route("/metrics", get(prometheus_metrics));

        router.layer(middleware).with_state(state)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    manager: Arc<ConnectionManager>,
    metrics: Arc<GatewayMetrics>,
    version: BuildVersion,
    stream_buffer: usize,
    trust_forwarded_headers: bool,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
    CacheStrategy::NoCache.apply(response.headers_mut());
    response
}

/// Open an event stream
async fn open_stream(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let user_id = match headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(id) => UserId::from(id),
        None => return error_response(StatusCode::UNAUTHORIZED, "missing x-user-id header"),
    };

    let meta = ConnectionMeta::new(
        client_ip(
            &headers,
            connect_info.map(|ConnectInfo(addr)| addr),
            state.trust_forwarded_headers,
        ),
        user_agent(&headers),
    );
    let connection_id = ConnectionId::new();
    let (sink, rx) = channel_sink(state.stream_buffer);
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    // Queued before registration so it is always the first record
    let hello = serde_json::json!({
        "connectionId": connection_id,
        "timestamp": unix_millis(),
    });
    let queued = match encode_event(events::CONNECTED, &hello) {
        Ok(record) => sink.write(record).await,
        Err(e) => {
            warn!(error = %e, "Failed to encode connected event");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };
    if let Err(e) = queued {
        warn!(error = %e, "Failed to queue connected event");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
    }

    let admission = state
        .manager
        .try_add_connection(user_id.clone(), connection_id, sink, meta)
        .await;
    if let Some(reason) = admission.reason {
        return error_response(StatusCode::TOO_MANY_REQUESTS, reason.as_str());
    }

    let stream = EventStream {
        inner: ReceiverStream::new(rx),
        _guard: DisconnectGuard {
            manager: Arc::clone(&state.manager),
            user_id,
            connection_id,
        },
    };

    let mut response = Response::new(Body::from_stream(stream));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    // Disable proxy buffering (nginx)
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    CacheStrategy::NoCache.apply(headers);
    response
}

/// Record a client heartbeat
async fn heartbeat(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> Response {
    let Ok(connection_id) = ConnectionId::parse(&connection_id) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid connection id");
    };

    if state.manager.update_heartbeat(connection_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "unknown connection")
    }
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Response {
    let mut response = Json(serde_json::json!({
        "status": "ok",
        "version": state.version.as_str(),
        "connections": state.manager.stats(),
        "metrics": state.metrics.snapshot(),
    }))
    .into_response();
    CacheStrategy::NoCache.apply(response.headers_mut());
    response
}

#[cfg(feature = "metrics")]
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(state.manager.connection_count()),
    )
}

/// Response body of an event stream.
///
/// Ends when the manager closes the sink. When the client goes away first,
/// dropping the body drops the guard, which unregisters the connection.
struct EventStream {
    inner: ReceiverStream<Bytes>,
    _guard: DisconnectGuard,
}

impl Stream for EventStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx).map(|record| record.map(Ok))
    }
}

struct DisconnectGuard {
    manager: Arc<ConnectionManager>,
    user_id: UserId,
    connection_id: ConnectionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let manager = Arc::clone(&self.manager);
        let user_id = self.user_id.clone();
        let connection_id = self.connection_id;
        debug!(connection_id = %connection_id, "Event stream dropped");
        runtime.spawn(async move {
            manager
                .close_connection(&user_id, connection_id, CloseReason::ClientDisconnected)
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use axum::body::BodyDataStream;
    use futures::StreamExt;
    use shared_types::VERSION_HEADER;
    use std::time::Duration;
    use tower::ServiceExt;

    fn service() -> PushGatewayService {
        PushGatewayService::new(GatewayConfig::default(), BuildVersion::parse("test-build").unwrap())
            .unwrap()
    }

    fn events_request(user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/events")
            .header("x-forwarded-for", "203.0.113.9")
            .header("user-agent", "test-agent");
        if let Some(user) = user {
            builder = builder.header(USER_ID_HEADER, user);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn next_record(body: &mut BodyDataStream) -> String {
        let chunk = tokio::time::timeout(Duration::from_secs(1), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        String::from_utf8(chunk.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let response = service().router().oneshot(events_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[VERSION_HEADER], "test-build");
    }

    #[tokio::test]
    async fn test_stream_starts_with_connected_event() {
        let service = service();
        let manager = service.manager();

        let response = service.router().oneshot(events_request(Some("alice"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            CacheStrategy::NoCache.header_value()
        );
        assert_eq!(response.headers()[VERSION_HEADER], "test-build");

        let mut body = response.into_body().into_data_stream();
        let first = next_record(&mut body).await;
        assert!(first.starts_with("event: connected\ndata: "));

        let alice = UserId::from("alice");
        let info = manager.online_users();
        assert_eq!(info, vec![alice.clone()]);

        manager
            .send_to_user(&alice, "update", &serde_json::json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(next_record(&mut body).await, "event: update\ndata: {\"n\":1}\n\n");
    }

    #[tokio::test]
    async fn test_dropping_stream_unregisters_connection() {
        let service = service();
        let manager = service.manager();

        let response = service.router().oneshot(events_request(Some("bob"))).await.unwrap();
        assert_eq!(manager.connection_count(), 1);
        drop(response);

        for _ in 0..50 {
            if manager.connection_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_rejection_is_429() {
        let config = GatewayConfig {
            connections: crate::domain::config::ConnectionConfig {
                max_new_connections_per_window: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let service = PushGatewayService::new(config, BuildVersion::from_pkg()).unwrap();

        let first = service.router().oneshot(events_request(Some("carol"))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = service.router().oneshot(events_request(Some("carol"))).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "too many connection attempts, try again later");
    }

    #[tokio::test]
    async fn test_heartbeat_endpoint() {
        let service = service();
        let manager = service.manager();
        let response = service.router().oneshot(events_request(Some("dave"))).await.unwrap();
        let mut body = response.into_body().into_data_stream();
        let first = next_record(&mut body).await;

        let data = first.lines().nth(1).unwrap().strip_prefix("data: ").unwrap();
        let json: serde_json::Value = serde_json::from_str(data).unwrap();
        let id = json["connectionId"].as_str().unwrap().to_string();
        assert!(manager.connection_info(ConnectionId::parse(&id).unwrap()).is_some());

        let ok = service
            .router()
            .oneshot(
                Request::post(format!("/events/{id}/heartbeat"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::NO_CONTENT);

        let unknown = service
            .router()
            .oneshot(
                Request::post(format!("/events/{}/heartbeat", ConnectionId::new()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let malformed = service
            .router()
            .oneshot(Request::post("/events/nope/heartbeat").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_forwarded_ip_needs_opt_in() {
        // No peer address under oneshot: only a trusted header yields an IP
        let untrusted = service();
        let _open = untrusted.router().oneshot(events_request(Some("erin"))).await.unwrap();
        assert_eq!(untrusted.manager().stats().ips, 0);

        let mut config = GatewayConfig::default();
        config.http.trust_forwarded_headers = true;
        let trusted = PushGatewayService::new(config, BuildVersion::from_pkg()).unwrap();
        let _open = trusted.router().oneshot(events_request(Some("erin"))).await.unwrap();
        assert_eq!(trusted.manager().stats().ips, 1);
    }

    #[tokio::test]
    async fn test_health() {
        let service = service();
        let response = service
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], "test-build");
        assert_eq!(json["connections"]["connections"], 0);
        assert_eq!(json["metrics"]["connections_accepted"], 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = GatewayConfig::default();
        config.connections.max_connections_per_user = 0;
        assert!(matches!(
            PushGatewayService::new(config, BuildVersion::from_pkg()),
            Err(GatewayError::Config(_))
        ));
    }
}
