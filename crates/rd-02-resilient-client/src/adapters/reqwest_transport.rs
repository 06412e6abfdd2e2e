//! reqwest-backed transport.

use crate::ports::{Headers, HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// [`HttpTransport`] over a shared `reqwest::Client`.
///
/// The client is built without an overall timeout; per-attempt deadlines are
/// enforced by the executor.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn transport_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(error.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(method(request.method), &request.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.set(name.as_str(), value);
            }
        }
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Router,
    };

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_round_trip_against_local_server() {
        let router = Router::new()
            .route(
                "/echo",
                post(|headers: HeaderMap, body: String| async move {
                    let version = headers
                        .get("x-app-version")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    ([("x-app-version", version)], body)
                }),
            )
            .route("/busy", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let base = serve(router).await;

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .send(
                &HttpRequest::post(format!("{base}/echo"))
                    .header("x-app-version", "7.1")
                    .body("ping"),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.text(), "ping");
        assert_eq!(response.headers.get("X-App-Version"), Some("7.1"));

        let busy = transport
            .send(&HttpRequest::get(format!("{base}/busy")))
            .await
            .unwrap();
        assert_eq!(busy.status, 503);
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new().unwrap();
        let result = transport
            .send(&HttpRequest::get(format!("http://{addr}/")))
            .await;
        assert!(matches!(result, Err(TransportError::Network(_))));
    }
}
