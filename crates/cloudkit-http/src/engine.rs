//! The one-shot HTTP exchange.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cloudkit_core::domain::{code, CloudError};
use futures_util::StreamExt;
use reqwest::{Client, Method};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::rate_limit::{parse_retry_after, AdaptiveRateLimiter};

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 5;

/// `(total, current)` progress, for upload or download. `(0, 0)` means the
/// total is unknown.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// One HTTP exchange to build and send. `follow_redirect` and the bearer
/// token are carried per-spec since adapters vary (the auth exchange
/// itself must not carry a bearer token, while every authenticated call
/// after it must).
#[derive(Clone)]
pub struct HttpRequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub bearer_token: Option<String>,
    pub follow_redirect: bool,
}

impl HttpRequestSpec {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            bearer_token: None,
            follow_redirect: true,
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

/// The response to one exchange: status code, headers, and the full body.
/// `download_stream` is the alternative for bodies too large to buffer.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Shared, immutable collaborator for HTTP exchanges. Cloned cheaply
/// (internally `Arc`'d reqwest client); one instance is shared across all
/// provider instances in a process as a dependency-injected, shared
/// handle.
pub struct HttpEngine {
    client: Client,
    rate_limiter: Option<Arc<AdaptiveRateLimiter>>,
}

impl Default for HttpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            rate_limiter: None,
        }
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn build(&self, spec: &HttpRequestSpec) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(spec.method.clone(), &spec.url);
        for (name, value) in &spec.headers {
            builder = builder.header(name, value);
        }
        if !spec.query.is_empty() {
            builder = builder.query(&spec.query);
        }
        if let Some(token) = &spec.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = spec.body.clone() {
            builder = builder.body(body);
        }
        builder
    }

    /// Sends one exchange, buffering the whole response body. Cooperative
    /// cancellation: if `cancel` fires before the exchange completes, the
    /// in-flight `send()` future is dropped and `CloudError::aborted()`
    /// (code 600) is returned without ever observing a response.
    pub async fn execute(
        &self,
        spec: &HttpRequestSpec,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, CloudError> {
        let send = self.build(spec).send();
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CloudError::aborted()),
            result = send => result.map_err(|e| CloudError::unknown(e.to_string()))?,
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CloudError::aborted()),
            result = response.bytes() => result.map_err(|e| CloudError::unknown(e.to_string()))?,
        };

        Ok(HttpResponse { status, headers, body })
    }

    /// `execute` wrapped with proactive rate limiting and automatic 429
    /// backoff against `endpoint_category` ("delta", "upload", "download",
    /// "metadata", …). This is ambient provider-HTTP behavior layered on
    /// top of, not instead of, the 401 retry the request engine performs.
    pub async fn execute_with_retry(
        &self,
        spec: &HttpRequestSpec,
        endpoint_category: &str,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, CloudError> {
        let max_retries = self
            .rate_limiter
            .as_ref()
            .map_or(DEFAULT_MAX_RETRIES, |rl| rl.max_retries());

        for attempt in 0..=max_retries {
            if cancel.is_cancelled() {
                return Err(CloudError::aborted());
            }

            if let Some(limiter) = &self.rate_limiter {
                limiter.acquire(endpoint_category).await;
            }

            let response = self.execute(spec, cancel).await?;

            if response.status != 429 {
                if let Some(limiter) = &self.rate_limiter {
                    limiter.on_success(endpoint_category);
                }
                if attempt > 0 {
                    info!(endpoint_category, attempt, "request succeeded after retry");
                }
                return Ok(response);
            }

            if attempt >= max_retries {
                warn!(endpoint_category, attempts = attempt + 1, "429 retry limit exhausted");
                return Err(CloudError::new(
                    code::FAILURE,
                    format!("retry limit exhausted after {} attempts", attempt + 1),
                ));
            }

            let retry_after = response
                .header("Retry-After")
                .map_or(DEFAULT_RETRY_AFTER, |v| parse_retry_after(v, DEFAULT_RETRY_AFTER));

            if let Some(limiter) = &self.rate_limiter {
                limiter.on_throttle(endpoint_category);
            }

            debug!(endpoint_category, attempt, retry_after_ms = retry_after.as_millis(), "429, backing off");
            tokio::time::sleep(retry_after).await;
        }

        Err(CloudError::unknown("retry loop exited unexpectedly"))
    }

    /// Streams the response body in chunks, invoking `on_progress` with
    /// `(total, current)` per chunk and checking `cancel` between chunks —
    /// the path the streaming proxy's download sub-request and large-file
    /// downloads use instead of buffering the whole body.
    pub async fn download_stream(
        &self,
        spec: &HttpRequestSpec,
        cancel: CancellationToken,
        on_progress: Option<ProgressCallback>,
        mut on_chunk: impl FnMut(Bytes) -> Result<(), CloudError> + Send,
    ) -> Result<u16, CloudError> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CloudError::aborted()),
            result = self.build(spec).send() => result.map_err(|e| CloudError::unknown(e.to_string()))?,
        };

        let status = response.status().as_u16();
        let total = response.content_length().unwrap_or(0);
        let mut current = 0u64;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(CloudError::aborted()),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| CloudError::unknown(e.to_string()))?;
            current += chunk.len() as u64;
            if let Some(cb) = &on_progress {
                cb(total, current);
            }
            on_chunk(chunk)?;
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn executes_a_simple_get() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .mount(&server)
            .await;

        let engine = HttpEngine::new();
        let spec = HttpRequestSpec::new(Method::GET, format!("{}/ping", server.uri()));
        let response = engine.execute(&spec, &CancellationToken::new()).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"pong");
    }

    #[tokio::test]
    async fn cancellation_before_send_returns_aborted() {
        let engine = HttpEngine::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let spec = HttpRequestSpec::new(Method::GET, "http://127.0.0.1:0/unreachable");
        let err = engine.execute(&spec, &cancel).await.unwrap_err();
        assert_eq!(err.code, code::ABORTED);
    }

    #[tokio::test]
    async fn retries_once_on_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let engine = HttpEngine::new();
        let spec = HttpRequestSpec::new(Method::GET, format!("{}/limited", server.uri()));
        let response = engine
            .execute_with_retry(&spec, "test", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn download_stream_reports_progress_and_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 64]))
            .mount(&server)
            .await;

        let engine = HttpEngine::new();
        let spec = HttpRequestSpec::new(Method::GET, format!("{}/file", server.uri()));
        let mut received = Vec::new();
        let status = engine
            .download_stream(&spec, CancellationToken::new(), None, |chunk| {
                received.extend_from_slice(&chunk);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(status, 200);
        assert_eq!(received.len(), 64);
    }
}
