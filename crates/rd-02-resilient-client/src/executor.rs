//! Resilient request executor.
//!
//! One logical call is a bounded loop of attempts:
//!
//! ```text
//! Pending → Sent ─┬─ 2xx ──────────────────────────────→ Success
//!                 ├─ 401/403 ──────────────────────────→ Failed (auth)
//!                 ├─ retryable status / timeout / network
//!                 │     budget left → RetryScheduled → Sent
//!                 │     budget spent ──────────────────→ Failed
//!                 └─ any other status ─────────────────→ Failed
//! ```
//!
//! Each attempt runs under its own deadline. Retries wait on plain sleeps;
//! callers that need to abort early wrap the whole call in their own
//! cancellation scope.

use crate::domain::backoff::BackoffPolicy;
use crate::domain::classify::ErrorClassifier;
use crate::domain::config::{ExecutorConfig, RequestOptions};
use crate::domain::error::{ConfigError, ErrorKind, RequestError};
use crate::ports::{HttpRequest, HttpResponse, HttpTransport, TransportError, VersionObserver};
use serde::de::DeserializeOwned;
use shared_types::{detect_skew, BuildVersion};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

// Longest body excerpt carried in an error message
const MAX_ERROR_BODY: usize = 200;

pub struct ResilientRequestExecutor {
    transport: Arc<dyn HttpTransport>,
    config: ExecutorConfig,
    version: BuildVersion,
    observer: Option<Arc<dyn VersionObserver>>,
}

/// What one attempt produced, before the retry decision.
enum Attempt {
    Success(HttpResponse),
    Status(HttpResponse),
    Failed(TransportError),
}

impl ResilientRequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, version: BuildVersion) -> Self {
        Self {
            transport,
            config: ExecutorConfig::default(),
            version,
            observer: None,
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_observer(mut self, observer: Arc<dyn VersionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn version(&self) -> &BuildVersion {
        &self.version
    }

    /// Execute with the configured default options.
    pub async fn execute_default(&self, request: HttpRequest) -> Result<HttpResponse, RequestError> {
        self.execute(request, &self.config.defaults).await
    }

    /// Execute one logical call and return the successful response.
    pub async fn execute(
        &self,
        request: HttpRequest,
        options: &RequestOptions,
    ) -> Result<HttpResponse, RequestError> {
        self.run(request, options).await.map(|(response, _)| response)
    }

    /// Execute and decode a JSON body. An empty body decodes as `null`.
    pub async fn execute_json<T>(
        &self,
        request: HttpRequest,
        options: &RequestOptions,
    ) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
    {
        let (response, attempts) = self.run(request, options).await?;
        let body: &[u8] = if response.body.is_empty() {
            b"null"
        } else {
            &response.body
        };

        serde_json::from_slice(body).map_err(|e| {
            warn!(status = response.status, error = %e, "Response body did not decode");
            RequestError::new(ErrorKind::InvalidResponse, format!("invalid response body: {e}"))
                .with_status(response.status)
                .with_attempts(attempts)
        })
    }

    async fn run(
        &self,
        mut request: HttpRequest,
        options: &RequestOptions,
    ) -> Result<(HttpResponse, u32), RequestError> {
        options.validate()?;

        request
            .headers
            .set(self.config.version_header.as_str(), self.version.as_str());
        let backoff = BackoffPolicy::new(options.retry_delay, options.max_delay);

        let mut attempt: u32 = 0;
        loop {
            let calls = attempt + 1;
            let budget_left = attempt < options.retries;

            debug!(method = %request.method, url = %request.url, attempt = calls, "Sending request");

            let error = match self.attempt(&request, options.timeout).await {
                Attempt::Success(response) => {
                    self.check_version(&response);
                    return Ok((response, calls));
                }
                Attempt::Status(response) => {
                    let status = response.status;
                    let kind = ErrorClassifier::status(status);
                    let retry_after = if status == 429 {
                        retry_after(&response, options.max_retry_after)
                    } else {
                        None
                    };

                    if kind != ErrorKind::Auth && options.retry_on.matches(status) && budget_left {
                        let delay = retry_after.unwrap_or_else(|| backoff.delay(attempt));
                        warn!(
                            url = %request.url,
                            status,
                            attempt = calls,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying request"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    RequestError::new(kind, status_message(&response))
                        .with_status(status)
                        .with_retry_after(retry_after)
                }
                Attempt::Failed(error) => {
                    let kind = ErrorClassifier::transport(&error);
                    if budget_left {
                        let delay = backoff.delay(attempt);
                        warn!(
                            url = %request.url,
                            error = %error,
                            attempt = calls,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying request"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    RequestError::new(kind, error.to_string())
                }
            };

            let error = error.with_attempts(calls);
            warn!(
                url = %request.url,
                kind = %error.kind,
                status = ?error.status,
                attempts = calls,
                "Request failed"
            );
            return Err(error);
        }
    }

    async fn attempt(&self, request: &HttpRequest, deadline: Duration) -> Attempt {
        match timeout(deadline, self.transport.send(request)).await {
            Ok(Ok(response)) if response.is_success() => Attempt::Success(response),
            Ok(Ok(response)) => Attempt::Status(response),
            Ok(Err(error)) => Attempt::Failed(error),
            Err(_) => Attempt::Failed(TransportError::Timeout),
        }
    }

    fn check_version(&self, response: &HttpResponse) {
        let remote = response.headers.get(&self.config.version_header);
        if let Some(skew) = detect_skew(&self.version, remote) {
            info!(local = %skew.local, remote = %skew.remote, "Version skew detected");
            if let Some(observer) = &self.observer {
                observer.on_version_mismatch(&skew);
            }
        }
    }
}

/// `Retry-After` in seconds, capped. HTTP-date values are not honored.
fn retry_after(response: &HttpResponse, cap: Duration) -> Option<Duration> {
    let raw = response.headers.get("retry-after")?.trim();
    let secs = raw.parse::<f64>().ok().filter(|s| s.is_finite() && *s >= 0.0)?;
    Some(Duration::from_secs_f64(secs.min(cap.as_secs_f64())))
}

fn status_message(response: &HttpResponse) -> String {
    let body = response.text();
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("HTTP {}: {}", response.status, excerpt)
    }
}
