//! Client configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `VIDGEN_*` environment variables, then explicit builder calls. Unparsable
//! environment values are ignored and the previous layer wins.
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `VIDGEN_BASE_URL` | API base URL | `https://api-singapore.klingai.com` |
//! | `VIDGEN_ACCESS_KEY` / `VIDGEN_SECRET_KEY` | Signing key pair | keyring, then unset |
//! | `VIDGEN_MODEL` | Model name sent on submission | `kling-video-o1` |
//! | `VIDGEN_HTTP_TIMEOUT_SECS` | Per-call timeout | 30 |
//! | `VIDGEN_PROXY_URL` | HTTP(S) proxy | unset |
//! | `VIDGEN_RETRY_MAX_ATTEMPTS` | Attempts per HTTP call | 3 |
//! | `VIDGEN_RETRY_BASE_DELAY_MS` | Backoff base | 1000 |
//! | `VIDGEN_RETRY_MAX_DELAY_MS` | Backoff cap | 30000 |
//! | `VIDGEN_POLL_MAX_ATTEMPTS` | Status polls per job | 120 |
//! | `VIDGEN_POLL_INTERVAL_SECS` | Wait between polls | 10 |
//! | `VIDGEN_POLL_TIMEOUT_SECS` | Wall-clock ceiling for the poll loop | unset |
//! | `VIDGEN_AUTH_FAILURE_THRESHOLD` | Consecutive auth failures before abort | 10 |
//! | `VIDGEN_TOKEN_VALIDITY_SECS` | Signed credential lifetime | 1800 |
//! | `VIDGEN_TOKEN_SAFETY_MARGIN_SECS` | Refresh this long before expiry | 60 |

use crate::auth::TokenConfig;
use crate::resilience::RetryPolicy;
use crate::{Error, ErrorContext, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api-singapore.klingai.com";
pub const DEFAULT_MODEL: &str = "kling-video-o1";

/// Poll loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Consecutive auth-classified poll failures that end the run early.
    pub auth_failure_threshold: u32,
    /// Optional wall-clock ceiling, enforced independently of `max_attempts`.
    pub overall_timeout: Option<Duration>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            interval: Duration::from_secs(10),
            auth_failure_threshold: 10,
            overall_timeout: None,
        }
    }
}

impl PollConfig {
    /// Nominal budget: `max_attempts * interval`.
    pub fn nominal_budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub access_key: String,
    pub secret_key: String,
    pub model_name: String,
    pub http_timeout: Duration,
    pub proxy_url: Option<String>,
    pub retry: RetryPolicy,
    pub poll: PollConfig,
    pub token: TokenConfig,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("model_name", &self.model_name)
            .field("http_timeout", &self.http_timeout)
            .field("proxy_url", &self.proxy_url)
            .field("retry", &self.retry)
            .field("poll", &self.poll)
            .field("token", &self.token)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            model_name: DEFAULT_MODEL.to_string(),
            http_timeout: Duration::from_secs(30),
            proxy_url: None,
            retry: RetryPolicy::default(),
            poll: PollConfig::default(),
            token: TokenConfig::default(),
        }
    }
}

/// On-disk shape. Every field is optional and overlays the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    model_name: Option<String>,
    http_timeout_secs: Option<u64>,
    proxy_url: Option<String>,
    retry: RetryFile,
    poll: PollFile,
    token: TokenFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RetryFile {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    retry_on_status: Option<Vec<u16>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PollFile {
    max_attempts: Option<u32>,
    interval_secs: Option<u64>,
    auth_failure_threshold: Option<u32>,
    overall_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TokenFile {
    validity_secs: Option<u64>,
    safety_margin_secs: Option<u64>,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Look up a secret in the OS keyring (service `vidgen`).
fn keyring_secret(name: &str) -> Option<String> {
    let entry = keyring::Entry::new("vidgen", name).ok()?;
    entry.get_password().ok().filter(|s| !s.is_empty())
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `VIDGEN_*` environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Load a YAML file, then overlay environment variables.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut cfg = Self::from_yaml_str(&raw).map_err(|e| match e {
            Error::Configuration { message, context } => Error::Configuration {
                message,
                context: context.with_details(path.display().to_string()),
            },
            other => other,
        })?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Parse a YAML document over the defaults. Environment is not consulted.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(raw).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid config file: {}", e),
                ErrorContext::new().with_source("config_loader"),
            )
        })?;
        let mut cfg = Self::default();
        cfg.apply_file(file);
        Ok(cfg)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(v) = file.base_url {
            self.base_url = v;
        }
        if let Some(v) = file.access_key {
            self.access_key = v;
        }
        if let Some(v) = file.secret_key {
            self.secret_key = v;
        }
        if let Some(v) = file.model_name {
            self.model_name = v;
        }
        if let Some(v) = file.http_timeout_secs {
            self.http_timeout = Duration::from_secs(v);
        }
        if file.proxy_url.is_some() {
            self.proxy_url = file.proxy_url;
        }

        if let Some(v) = file.retry.max_attempts {
            self.retry.max_attempts = v.max(1);
        }
        if let Some(v) = file.retry.base_delay_ms {
            self.retry.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = file.retry.max_delay_ms {
            self.retry.max_delay = Duration::from_millis(v);
        }
        if let Some(v) = file.retry.retry_on_status {
            self.retry.retry_on_status = v;
        }

        if let Some(v) = file.poll.max_attempts {
            self.poll.max_attempts = v;
        }
        if let Some(v) = file.poll.interval_secs {
            self.poll.interval = Duration::from_secs(v);
        }
        if let Some(v) = file.poll.auth_failure_threshold {
            self.poll.auth_failure_threshold = v;
        }
        if let Some(v) = file.poll.overall_timeout_secs {
            self.poll.overall_timeout = Some(Duration::from_secs(v));
        }

        if let Some(v) = file.token.validity_secs {
            self.token.validity = Duration::from_secs(v);
        }
        if let Some(v) = file.token.safety_margin_secs {
            self.token.safety_margin = Duration::from_secs(v);
        }
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_string("VIDGEN_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = env_string("VIDGEN_ACCESS_KEY").or_else(|| keyring_secret("access_key")) {
            self.access_key = v;
        }
        if let Some(v) = env_string("VIDGEN_SECRET_KEY").or_else(|| keyring_secret("secret_key")) {
            self.secret_key = v;
        }
        if let Some(v) = env_string("VIDGEN_MODEL") {
            self.model_name = v;
        }
        if let Some(v) = env_parse::<u64>("VIDGEN_HTTP_TIMEOUT_SECS") {
            self.http_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_string("VIDGEN_PROXY_URL") {
            self.proxy_url = Some(v);
        }
        if let Some(v) = env_parse::<u32>("VIDGEN_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = v.max(1);
        }
        if let Some(v) = env_parse::<u64>("VIDGEN_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("VIDGEN_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("VIDGEN_POLL_MAX_ATTEMPTS") {
            self.poll.max_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("VIDGEN_POLL_INTERVAL_SECS") {
            self.poll.interval = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("VIDGEN_POLL_TIMEOUT_SECS").filter(|v| *v > 0) {
            self.poll.overall_timeout = Some(Duration::from_secs(v));
        }
        if let Some(v) = env_parse::<u32>("VIDGEN_AUTH_FAILURE_THRESHOLD") {
            self.poll.auth_failure_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("VIDGEN_TOKEN_VALIDITY_SECS") {
            self.token.validity = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<u64>("VIDGEN_TOKEN_SAFETY_MARGIN_SECS") {
            self.token.safety_margin = Duration::from_secs(v);
        }
        debug!(base_url = self.base_url.as_str(), "configuration loaded from environment");
    }

    /// Reject configurations the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base url: {}", e),
                ErrorContext::new()
                    .with_field_path("config.base_url")
                    .with_details(self.base_url.clone())
                    .with_source("config_validator"),
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::configuration_with_context(
                "base url must use http or https",
                ErrorContext::new()
                    .with_field_path("config.base_url")
                    .with_details(self.base_url.clone())
                    .with_source("config_validator"),
            ));
        }
        if self.model_name.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "model name is empty",
                ErrorContext::new()
                    .with_field_path("config.model_name")
                    .with_source("config_validator"),
            ));
        }
        if self.poll.max_attempts == 0 {
            return Err(Error::configuration_with_context(
                "poll max_attempts must be at least 1",
                ErrorContext::new()
                    .with_field_path("config.poll.max_attempts")
                    .with_source("config_validator"),
            ));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(Error::configuration_with_context(
                "retry max_delay must not be shorter than base_delay",
                ErrorContext::new()
                    .with_field_path("config.retry.max_delay")
                    .with_source("config_validator"),
            ));
        }
        Ok(())
    }
}
