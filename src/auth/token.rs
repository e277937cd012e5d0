use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwapOption;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Lifetime settings for signed credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// How long a freshly signed credential is valid.
    pub validity: Duration,
    /// A cached credential is replaced once it is this close to expiry.
    pub safety_margin: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            validity: Duration::from_secs(1800),
            safety_margin: Duration::from_secs(60),
        }
    }
}

/// A signed bearer credential with its validity window.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub value: String,
    pub issued_at: SystemTime,
    pub expires_at: SystemTime,
}

impl Credential {
    /// Usable while `now < expires_at - margin`.
    pub fn is_usable_at(&self, now: SystemTime, margin: Duration) -> bool {
        match self.expires_at.checked_sub(margin) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    exp: u64,
    nbf: u64,
}

/// Issues and caches short-lived HS256 credentials.
///
/// Signing is local, so refreshing never touches the network. Concurrent
/// callers that all observe a stale credential may each sign a new one; the
/// last store wins and every returned credential is valid.
pub struct TokenManager {
    access_key: String,
    secret_key: String,
    config: TokenConfig,
    cached: ArcSwapOption<Credential>,
}

impl TokenManager {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        config: TokenConfig,
    ) -> Result<Self> {
        let access_key = access_key.into();
        let secret_key = secret_key.into();
        if access_key.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "access key is empty",
                ErrorContext::new()
                    .with_field_path("credentials.access_key")
                    .with_source("token_manager"),
            ));
        }
        if secret_key.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "secret key is empty",
                ErrorContext::new()
                    .with_field_path("credentials.secret_key")
                    .with_source("token_manager"),
            ));
        }
        if config.safety_margin >= config.validity {
            return Err(Error::configuration_with_context(
                "token safety margin must be shorter than validity",
                ErrorContext::new()
                    .with_field_path("token.safety_margin")
                    .with_details(format!(
                        "margin={}s validity={}s",
                        config.safety_margin.as_secs(),
                        config.validity.as_secs()
                    ))
                    .with_source("token_manager"),
            ));
        }
        Ok(Self {
            access_key,
            secret_key,
            config,
            cached: ArcSwapOption::const_empty(),
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Return a credential that is safe to use right now.
    pub fn get_token(&self) -> Result<Arc<Credential>> {
        self.get_token_at(SystemTime::now())
    }

    pub(crate) fn get_token_at(&self, now: SystemTime) -> Result<Arc<Credential>> {
        if let Some(current) = self.cached.load_full() {
            if current.is_usable_at(now, self.config.safety_margin) {
                return Ok(current);
            }
        }

        let fresh = Arc::new(self.sign(now)?);
        self.cached.store(Some(fresh.clone()));
        debug!(
            expires_in_secs = self.config.validity.as_secs(),
            "signed new API credential"
        );
        Ok(fresh)
    }

    /// Drop the cached credential so the next call signs a new one.
    pub fn invalidate(&self) {
        self.cached.store(None);
    }

    fn sign(&self, now: SystemTime) -> Result<Credential> {
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::signing(format!("clock before unix epoch: {}", e)))?
            .as_secs();
        let claims = Claims {
            iss: &self.access_key,
            exp: now_secs.saturating_add(self.config.validity.as_secs()),
            // Tolerate small clock skew on the server side.
            nbf: now_secs.saturating_sub(5),
        };
        let value = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret_key.as_bytes()),
        )
        .map_err(|e| Error::signing(e.to_string()))?;

        Ok(Credential {
            value,
            issued_at: now,
            expires_at: now + self.config.validity,
        })
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("access_key", &self.access_key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
