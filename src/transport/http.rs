use crate::auth::TokenManager;
use crate::config::ClientConfig;
use crate::error_class::classify_with_code;
use crate::resilience::RetryPolicy;
use crate::transport::TransportError;
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::{Method, Proxy};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// One logical HTTP call, replayable across attempts.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the base URL, or an absolute `http(s)://` URL.
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Attach the bearer credential. Artifact downloads go out anonymously.
    pub authenticated: bool,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            authenticated: true,
        }
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
            authenticated: true,
        }
    }

    pub fn anonymous_get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: url.into(),
            body: None,
            authenticated: false,
        }
    }
}

/// A failed attempt, with any server hint about when to come back.
struct AttemptFailure {
    error: Error,
    retry_after: Option<Duration>,
}

impl From<Error> for AttemptFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

/// Executes single HTTP calls with bounded retry and capped exponential backoff.
///
/// Retryable statuses (see [`RetryPolicy::retry_on_status`]) and network-level
/// failures are retried; any other non-success status fails on the spot.
pub struct ResilientHttpClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenManager>,
    policy: RetryPolicy,
}

impl ResilientHttpClient {
    pub fn new(config: &ClientConfig, tokens: Arc<TokenManager>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.http_timeout.min(Duration::from_secs(10)))
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .user_agent(concat!("vidgen-client/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy url: {}", e),
                    ErrorContext::new()
                        .with_field_path("config.proxy_url")
                        .with_source("http_client"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
            policy: config.retry.clone(),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Absolute URL for `path` with `segment` appended as one percent-encoded
    /// path segment, so ids containing `/`, `?` or `#` cannot change the target.
    pub fn endpoint(&self, path: &str, segment: &str) -> Result<String> {
        let invalid = |msg: &str| {
            Error::configuration_with_context(
                msg.to_string(),
                ErrorContext::new()
                    .with_field_path("config.base_url")
                    .with_details(self.base_url.clone())
                    .with_source("http_client"),
            )
        };
        let mut url = Url::parse(&self.resolve_url(path))
            .map_err(|e| invalid(&format!("invalid endpoint url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| invalid("base url cannot carry a path"))?
            .pop_if_empty()
            .push(segment);
        Ok(url.into())
    }

    /// Execute `request` and decode the JSON body into `T`.
    ///
    /// Decoding failures are returned as [`Error::Serialization`] and are not
    /// retried: the server answered, it just answered something unexpected.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        max_attempts: u32,
    ) -> Result<T> {
        let body = self.execute_bytes(request, max_attempts).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Execute `request` and return the raw body of the first successful response.
    ///
    /// The body is read inside each attempt, so a connection dropped mid-body
    /// is retried like any other network failure.
    pub async fn execute_bytes(&self, request: &ApiRequest, max_attempts: u32) -> Result<Bytes> {
        self.with_retry(request, max_attempts, move || async move {
            let resp = self.send_once(request).await?;
            resp.bytes()
                .await
                .map_err(|e| AttemptFailure::from(Error::Transport(TransportError::Http(e))))
        })
        .await
    }

    /// Run `attempt_fn` until it succeeds, fails permanently or the budget runs out.
    async fn with_retry<T, F, Fut>(
        &self,
        request: &ApiRequest,
        max_attempts: u32,
        mut attempt_fn: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, AttemptFailure>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt: u32 = 1;
        loop {
            let failure = match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(f) => f,
            };

            if !failure.error.is_retryable() {
                return Err(failure.error);
            }
            if attempt >= max_attempts {
                warn!(
                    attempt,
                    max_attempts,
                    path = request.path.as_str(),
                    error = %failure.error,
                    "retry budget exhausted"
                );
                return Err(failure.error);
            }

            let delay = self.policy.backoff_delay(attempt, failure.retry_after);
            info!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                path = request.path.as_str(),
                error = %failure.error,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
    ) -> std::result::Result<reqwest::Response, AttemptFailure> {
        let url = self.resolve_url(&request.path);
        let request_id = Uuid::new_v4().to_string();

        let mut req = self
            .client
            .request(request.method.clone(), &url)
            .header("x-request-id", &request_id);
        if let Some(body) = &request.body {
            req = req.json(body);
        }
        if request.authenticated {
            let credential = self.tokens.get_token()?;
            req = req.bearer_auth(&credential.value);
        }

        let start = Instant::now();
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        let status = resp.status().as_u16();
        if resp.status().is_success() {
            debug!(
                http_status = status,
                request_id = request_id.as_str(),
                duration_ms = start.elapsed().as_millis() as u64,
                "request succeeded"
            );
            return Ok(resp);
        }

        let retry_after = retry_after(resp.headers());
        let message = resp.text().await.unwrap_or_default();
        let class = classify_with_code(Some(status), envelope_code(&message), &message);
        let retryable = self.policy.is_retryable_status(status);

        info!(
            http_status = status,
            error_class = class.name(),
            retryable,
            request_id = request_id.as_str(),
            duration_ms = start.elapsed().as_millis() as u64,
            "request failed"
        );

        Err(AttemptFailure {
            error: Error::Remote {
                status,
                class,
                message,
                retryable,
            },
            retry_after,
        })
    }

    /// Fetch a generated artifact with a plain, unauthenticated GET.
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        self.execute_bytes(&ApiRequest::anonymous_get(url), self.policy.max_attempts)
            .await
    }

    /// Stream an artifact to `path`, returning the number of bytes written.
    ///
    /// Data goes to a sibling `.part` file that is renamed into place once the
    /// body has been fully received. The partial file is removed on any failure;
    /// a stream cut short counts as a transient failure and restarts the download.
    pub async fn download_to_file(&self, url: &str, path: &Path) -> Result<u64> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut partial = path.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let request = &ApiRequest::anonymous_get(url);
        let target = partial.as_path();
        let outcome = self
            .with_retry(request, self.policy.max_attempts, move || async move {
                let resp = self.send_once(request).await?;
                let written = stream_to_file(resp, target).await;
                if written.is_err() {
                    let _ = tokio::fs::remove_file(target).await;
                }
                Ok::<u64, AttemptFailure>(written?)
            })
            .await;

        let written = match outcome {
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&partial, path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        Ok(written)
    }
}

/// Write the response body to `partial`, truncating whatever a previous attempt left.
async fn stream_to_file(resp: reqwest::Response, partial: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = resp.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Transport(TransportError::Http(e)))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Numeric `code` from a JSON error envelope, if the body is one.
fn envelope_code(body: &str) -> Option<i64> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("code").and_then(|v| v.as_i64())
}

/// Best-effort parsing of `Retry-After`.
///
/// Only the `Retry-After: <seconds>` form is supported.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    let secs: u64 = raw.parse().ok()?;
    Some(Duration::from_secs(secs))
}
