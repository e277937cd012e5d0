use crate::auth::TokenManager;
use crate::client::core::VideoClient;
use crate::client::orchestrator::PollingOrchestrator;
use crate::client::submit::JobSubmitter;
use crate::config::ClientConfig;
use crate::resilience::RetryPolicy;
use crate::transport::ResilientHttpClient;
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builder for [`VideoClient`].
///
/// Starts from [`ClientConfig::default`] (or an env/YAML-derived config) and
/// lets callers override individual settings. Nothing global is touched.
pub struct VideoClientBuilder {
    config: ClientConfig,
    tokens: Option<Arc<TokenManager>>,
}

impl VideoClientBuilder {
    pub fn new() -> Self {
        Self::from_config(ClientConfig::default())
    }

    /// Defaults overlaid with `VIDGEN_*` environment variables and keyring entries.
    pub fn from_env() -> Self {
        Self::from_config(ClientConfig::from_env())
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            tokens: None,
        }
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_config(ClientConfig::from_yaml_file(path)?))
    }

    /// Point the client at another deployment (or a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn credentials(mut self, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.config.access_key = access_key.into();
        self.config.secret_key = secret_key.into();
        self
    }

    /// Default model for requests that do not name one.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model_name = model.into();
        self
    }

    /// Per-call HTTP timeout.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.config.proxy_url = Some(url.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Attempts per HTTP call, including the first. Clamped to at least 1.
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry = self.config.retry.with_max_attempts(attempts);
        self
    }

    /// Backoff base delay and cap.
    pub fn backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.config.retry = self
            .config
            .retry
            .with_base_delay(base)
            .with_max_delay(cap);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll.interval = interval;
        self
    }

    pub fn max_poll_attempts(mut self, attempts: u32) -> Self {
        self.config.poll.max_attempts = attempts;
        self
    }

    /// Consecutive auth failures during polling that end the run early.
    pub fn auth_failure_threshold(mut self, threshold: u32) -> Self {
        self.config.poll.auth_failure_threshold = threshold.max(1);
        self
    }

    /// Wall-clock ceiling for one run, independent of the poll budget.
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll.overall_timeout = Some(timeout);
        self
    }

    pub fn token_validity(mut self, validity: Duration) -> Self {
        self.config.token.validity = validity;
        self
    }

    pub fn token_safety_margin(mut self, margin: Duration) -> Self {
        self.config.token.safety_margin = margin;
        self
    }

    /// Share one credential cache between several clients.
    ///
    /// When set, the configured access/secret keys are ignored.
    pub fn shared_token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Validate the configuration and assemble the client.
    pub fn build(self) -> Result<VideoClient> {
        let config = self.config;
        config.validate()?;

        let tokens = match self.tokens {
            Some(shared) => shared,
            None => Arc::new(TokenManager::new(
                config.access_key.clone(),
                config.secret_key.clone(),
                config.token.clone(),
            )?),
        };

        let http = Arc::new(ResilientHttpClient::new(&config, tokens.clone())?);
        let submitter = JobSubmitter::new(http.clone(), config.model_name.clone());
        let orchestrator = PollingOrchestrator::new(http.clone(), config.poll.clone());

        info!(
            base_url = config.base_url.as_str(),
            model = config.model_name.as_str(),
            max_retry_attempts = config.retry.max_attempts,
            max_poll_attempts = config.poll.max_attempts,
            poll_interval_ms = config.poll.interval.as_millis() as u64,
            "video client initialized"
        );

        Ok(VideoClient {
            config,
            tokens,
            http,
            submitter,
            orchestrator,
        })
    }
}

impl Default for VideoClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
