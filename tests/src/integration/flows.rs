//! # Integration Test Flows
//!
//! A real gateway on a loopback socket, exercised the way a browser tab and
//! a backend client would.
//!
//! ## Flows Tested:
//!
//! 1. **Stream lifecycle**: connected record first, targeted delivery,
//!    heartbeat, disconnect cleanup
//! 2. **Admission**: eviction of the oldest stream, rate-limit rejection as
//!    a retryable client error
//! 3. **Version contract**: header echoed on every response, skew reported
//!    by the executor
//! 4. **Shutdown**: open streams end and the server task completes

#[cfg(test)]
mod tests {
    use super::super::support::{eventually, open_stream, TestGateway, SERVER_BUILD};
    use rd_01_push_gateway::service::USER_ID_HEADER;
    use rd_01_push_gateway::{GatewayConfig, PresenceStatus};
    use rd_02_resilient_client::testing::RecordingObserver;
    use rd_02_resilient_client::{
        HttpRequest, ReqwestTransport, RequestOptions, ResilientRequestExecutor, RetryPredicate,
    };
    use shared_types::{BuildVersion, UserId, VERSION_HEADER};
    use std::sync::Arc;
    use std::time::Duration;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn executor(build: &str) -> ResilientRequestExecutor {
        ResilientRequestExecutor::new(
            Arc::new(ReqwestTransport::new().unwrap()),
            BuildVersion::parse(build).unwrap(),
        )
    }

    fn fast_options() -> RequestOptions {
        RequestOptions::default()
            .with_timeout(Duration::from_secs(2))
            .with_retry_delay(Duration::from_millis(10))
    }

    // =============================================================================
    // STREAM LIFECYCLE
    // =============================================================================

    #[tokio::test]
    async fn test_stream_delivers_connected_then_targeted_events() {
        let gateway = TestGateway::start(GatewayConfig::default()).await;
        let client = reqwest::Client::new();

        let mut alice = open_stream(&client, &gateway, "alice").await;
        let mut bob = open_stream(&client, &gateway, "bob").await;

        assert_eq!(
            alice.response().headers()["content-type"],
            "text/event-stream"
        );
        assert_eq!(alice.response().headers()[VERSION_HEADER], SERVER_BUILD);

        let (event, hello) = alice.next_record().await.unwrap();
        assert_eq!(event, "connected");
        assert!(hello["connectionId"].is_string());
        assert!(hello["timestamp"].is_u64());
        bob.next_record().await.unwrap();

        let report = gateway
            .manager
            .send_to_user(
                &UserId::from("alice"),
                "invoice_paid",
                &serde_json::json!({"invoice": 42}),
            )
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);

        let (event, data) = alice.next_record().await.unwrap();
        assert_eq!(event, "invoice_paid");
        assert_eq!(data["invoice"], 42);

        let report = gateway
            .manager
            .broadcast("maintenance", &serde_json::json!({"in_minutes": 5}))
            .await
            .unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(bob.next_record().await.unwrap().0, "maintenance");
        assert_eq!(alice.next_record().await.unwrap().0, "maintenance");

        drop(alice);
        drop(bob);
        gateway.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_through_executor() {
        let gateway = TestGateway::start(GatewayConfig::default()).await;
        let client = reqwest::Client::new();
        let executor = executor(SERVER_BUILD);

        let mut stream = open_stream(&client, &gateway, "carol").await;
        let (_, hello) = stream.next_record().await.unwrap();
        let connection_id = hello["connectionId"].as_str().unwrap().to_string();

        let response = executor
            .execute(
                HttpRequest::post(gateway.url(&format!("/events/{connection_id}/heartbeat"))),
                &fast_options(),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 204);

        let unknown = executor
            .execute(
                HttpRequest::post(gateway.url(
                    "/events/01890a5d-ac96-774b-bcce-b302099a8057/heartbeat",
                )),
                &fast_options(),
            )
            .await
            .unwrap_err();
        assert!(unknown.is_client_error());
        assert_eq!(unknown.status, Some(404));
        assert_eq!(unknown.attempts, 1);

        drop(stream);
        gateway.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_client_disconnect_unregisters_connection() {
        // Server pings surface the closed socket on the next write
        let mut config = GatewayConfig::default();
        config.connections.heartbeat_interval = Duration::from_millis(50);
        let gateway = TestGateway::start(config).await;
        let client = reqwest::Client::new();
        let mut presence = gateway.manager.subscribe_presence();

        let mut stream = open_stream(&client, &gateway, "dave").await;
        stream.next_record().await.unwrap();
        assert!(gateway.manager.is_online(&UserId::from("dave")));

        let online = presence.recv().await.unwrap();
        assert_eq!(online.status, PresenceStatus::Online);

        drop(stream);
        let manager = Arc::clone(&gateway.manager);
        eventually(move || manager.connection_count() == 0).await;

        let offline = tokio::time::timeout(Duration::from_secs(5), presence.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(offline.status, PresenceStatus::Offline);
        assert_eq!(offline.user_id.as_str(), "dave");
        gateway.manager.assert_consistent();

        gateway.stop().await.unwrap();
    }

    // =============================================================================
    // ADMISSION
    // =============================================================================

    #[tokio::test]
    async fn test_oldest_stream_evicted_at_user_capacity() {
        let mut config = GatewayConfig::default();
        config.connections.max_connections_per_user = 1;
        let gateway = TestGateway::start(config).await;
        let client = reqwest::Client::new();

        let mut first = open_stream(&client, &gateway, "erin").await;
        first.next_record().await.unwrap();

        let mut second = open_stream(&client, &gateway, "erin").await;
        second.next_record().await.unwrap();

        first.until_closed().await;
        assert_eq!(gateway.manager.user_connection_count(&UserId::from("erin")), 1);

        drop(second);
        gateway.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limited_open_is_retryable_client_error() {
        let mut config = GatewayConfig::default();
        config.connections.max_new_connections_per_window = 1;
        let gateway = TestGateway::start(config).await;
        let client = reqwest::Client::new();

        let mut stream = open_stream(&client, &gateway, "frank").await;
        stream.next_record().await.unwrap();

        let err = executor(SERVER_BUILD)
            .execute(
                HttpRequest::get(gateway.url("/events")).header(USER_ID_HEADER, "frank"),
                &fast_options().with_retry_on(RetryPredicate::none()),
            )
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert!(err.is_retryable());
        assert_eq!(err.status, Some(429));
        assert!(err.message.contains("too many connection attempts"));

        let missing_user = executor(SERVER_BUILD)
            .execute(HttpRequest::get(gateway.url("/events")), &fast_options())
            .await
            .unwrap_err();
        assert!(missing_user.is_auth_error());
        assert_eq!(missing_user.attempts, 1);

        drop(stream);
        gateway.stop().await.unwrap();
    }

    // =============================================================================
    // VERSION CONTRACT
    // =============================================================================

    #[tokio::test]
    async fn test_executor_reports_version_skew() {
        let gateway = TestGateway::start(GatewayConfig::default()).await;
        let observer = Arc::new(RecordingObserver::new());
        let stale = executor("gateway-1.9.0").with_observer(observer.clone());

        let health: serde_json::Value = stale
            .execute_json(HttpRequest::get(gateway.url("/health")), &fast_options())
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["version"], SERVER_BUILD);

        let skews = observer.skews();
        assert_eq!(skews.len(), 1);
        assert_eq!(skews[0].local.as_str(), "gateway-1.9.0");
        assert_eq!(skews[0].remote.as_str(), SERVER_BUILD);

        let current = Arc::new(RecordingObserver::new());
        executor(SERVER_BUILD)
            .with_observer(current.clone())
            .execute(HttpRequest::get(gateway.url("/health")), &fast_options())
            .await
            .unwrap();
        assert!(current.skews().is_empty());

        gateway.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_gateway_exhausts_retries() {
        let gateway = TestGateway::start(GatewayConfig::default()).await;
        let url = gateway.url("/health");
        gateway.stop().await.unwrap();

        let err = executor(SERVER_BUILD)
            .execute(HttpRequest::get(url), &fast_options().with_retries(2))
            .await
            .unwrap_err();
        assert!(err.is_network_error());
        assert!(err.is_retryable());
        assert_eq!(err.attempts, 3);
    }

    // =============================================================================
    // SHUTDOWN
    // =============================================================================

    #[tokio::test]
    async fn test_shutdown_ends_open_streams() {
        let gateway = TestGateway::start(GatewayConfig::default()).await;
        let client = reqwest::Client::new();

        let mut streams = Vec::new();
        for user in ["gina", "hank", "gina"] {
            let mut stream = open_stream(&client, &gateway, user).await;
            stream.next_record().await.unwrap();
            streams.push(stream);
        }
        assert_eq!(gateway.manager.connection_count(), 3);

        let manager = Arc::clone(&gateway.manager);
        let stopping = tokio::spawn(gateway.stop());
        for stream in &mut streams {
            stream.until_closed().await;
        }
        stopping.await.unwrap().unwrap();
        assert_eq!(manager.connection_count(), 0);
    }
}
