//! Test harness: a gateway served on a loopback port, plus a reader that
//! splits a raw event stream into records.

use rd_01_push_gateway::service::USER_ID_HEADER;
use rd_01_push_gateway::{ConnectionManager, GatewayConfig, GatewayError, PushGatewayService};
use shared_types::BuildVersion;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Build identifier the harness gateway reports.
pub const SERVER_BUILD: &str = "gateway-2.0.0";

/// Upper bound for any single wait in these flows.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestGateway {
    pub base_url: String,
    pub manager: Arc<ConnectionManager>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), GatewayError>>,
}

impl TestGateway {
    pub async fn start(mut config: GatewayConfig) -> Self {
        config.http.host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        config.http.port = 0;

        let service =
            PushGatewayService::new(config, BuildVersion::parse(SERVER_BUILD).unwrap()).unwrap();
        let manager = service.manager();
        let listener = service.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(service.run_until(listener, async move {
            let _ = rx.await;
        }));

        Self {
            base_url: format!("http://{addr}"),
            manager,
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Signal shutdown and wait for the server task to finish.
    pub async fn stop(mut self) -> Result<(), GatewayError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(STEP_TIMEOUT, &mut self.handle)
            .await
            .expect("gateway did not stop in time")
            .expect("gateway task panicked")
    }
}

/// Raw event stream reader.
pub struct StreamReader {
    response: reqwest::Response,
    buffer: String,
}

impl StreamReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    pub fn response(&self) -> &reqwest::Response {
        &self.response
    }

    /// Next complete record as `(event, data)`, or `None` once the stream ends.
    pub async fn next_record(&mut self) -> Option<(String, serde_json::Value)> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let record: String = self.buffer.drain(..end + 2).collect();
                return Some(parse_record(&record));
            }
            let chunk = tokio::time::timeout(STEP_TIMEOUT, self.response.chunk())
                .await
                .expect("timed out waiting for stream data")
                .expect("stream read failed")?;
            self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }

    /// Wait for the stream to end, skipping any remaining records.
    pub async fn until_closed(&mut self) {
        while self.next_record().await.is_some() {}
    }
}

fn parse_record(record: &str) -> (String, serde_json::Value) {
    let mut event = String::new();
    let mut data = serde_json::Value::Null;
    for line in record.lines() {
        if let Some(name) = line.strip_prefix("event: ") {
            event = name.to_string();
        } else if let Some(json) = line.strip_prefix("data: ") {
            data = serde_json::from_str(json).unwrap();
        }
    }
    (event, data)
}

/// Open a stream for `user` with a plain client.
pub async fn open_stream(client: &reqwest::Client, gateway: &TestGateway, user: &str) -> StreamReader {
    let response = client
        .get(gateway.url("/events"))
        .header(USER_ID_HEADER, user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    StreamReader::new(response)
}

/// Poll `check` until it holds or the step timeout passes.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
