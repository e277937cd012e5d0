//! Error taxonomy for the generation service.
//!
//! Failures from the remote API arrive in three shapes: an HTTP status, a
//! numeric code inside the JSON envelope, and free-form message text. The
//! classifier folds all three onto a small fixed set of [`ErrorClass`]es that
//! callers can branch on, count in metrics, and show to users.
//!
//! | Class | Code | Typical trigger |
//! |-------|------|-----------------|
//! | `AuthError` | V1001 | 401/403, envelope 1000-1004, 1103, 1304 |
//! | `InsufficientBalance` | V1101 | 402, envelope 1100-1102 |
//! | `RateLimited` | V2001 | 429, envelope 1302 |
//! | `QuotaExceeded` | V2002 | envelope 1303, "quota" in message |
//! | `ServiceUnavailable` | V3001 | 5xx, envelope 5000-5002 |
//! | `Unknown` | V9999 | anything else |
//!
//! Structured signals win over text: an envelope code is consulted first, then
//! the HTTP status, and only then message substrings.
//!
//! ```rust
//! use vidgen_client::error_class::{classify, ErrorClass};
//!
//! assert_eq!(classify(Some(429), ""), ErrorClass::RateLimited);
//! assert_eq!(classify(None, "Insufficient balance"), ErrorClass::InsufficientBalance);
//! assert!(ErrorClass::RateLimited.retryable());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Missing, invalid, expired or rejected credential
    AuthError,
    /// Account has no remaining balance or resource pack
    InsufficientBalance,
    /// Request rate limit exceeded
    RateLimited,
    /// Provider-side outage or overload
    ServiceUnavailable,
    /// Concurrency or usage quota reached
    QuotaExceeded,
    /// Could not be classified
    Unknown,
}

impl ErrorClass {
    /// Returns the machine-readable code (e.g., `"V2001"`).
    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthError => "V1001",
            Self::InsufficientBalance => "V1101",
            Self::RateLimited => "V2001",
            Self::QuotaExceeded => "V2002",
            Self::ServiceUnavailable => "V3001",
            Self::Unknown => "V9999",
        }
    }

    /// Returns the snake_case name used in logs and metrics labels.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthError => "auth_error",
            Self::InsufficientBalance => "insufficient_balance",
            Self::RateLimited => "rate_limited",
            Self::QuotaExceeded => "quota_exceeded",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a later attempt could succeed without operator action.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::ServiceUnavailable)
    }

    /// Message suitable for end users.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AuthError => "Authentication with the video service failed. Check the API credentials.",
            Self::InsufficientBalance => "The video service account has insufficient balance.",
            Self::RateLimited => "Too many requests to the video service. Please try again shortly.",
            Self::QuotaExceeded => "The video service quota has been reached. Please try again later.",
            Self::ServiceUnavailable => "The video service is temporarily unavailable.",
            Self::Unknown => "Video generation failed.",
        }
    }

    /// Maps a numeric envelope code from the remote API.
    ///
    /// Returns `None` for success (`0`) and for codes without a known meaning.
    pub fn from_remote_code(code: i64) -> Option<Self> {
        let class = match code {
            1000..=1004 | 1103 | 1304 => Self::AuthError,
            1100..=1102 => Self::InsufficientBalance,
            1302 => Self::RateLimited,
            1303 => Self::QuotaExceeded,
            5000..=5002 => Self::ServiceUnavailable,
            _ => return None,
        };
        Some(class)
    }

    /// Maps an HTTP status code. Unmapped statuses return `None`.
    pub fn from_http_status(status: u16) -> Option<Self> {
        let class = match status {
            401 | 403 => Self::AuthError,
            402 => Self::InsufficientBalance,
            429 => Self::RateLimited,
            500 | 502 | 503 | 504 => Self::ServiceUnavailable,
            _ => return None,
        };
        Some(class)
    }

    /// Substring rules over a lowercased message.
    pub fn from_message(message: &str) -> Option<Self> {
        let m = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| m.contains(n));

        if has(&["balance", "arrears", "insufficient fund", "resource pack"]) {
            Some(Self::InsufficientBalance)
        } else if has(&["quota", "concurrency limit", "parallel task"]) {
            Some(Self::QuotaExceeded)
        } else if has(&["rate limit", "too many requests", "rate_limit"]) {
            Some(Self::RateLimited)
        } else if has(&[
            "unauthorized",
            "authentication",
            "authorization",
            "invalid token",
            "token expired",
            "signature",
            "forbidden",
        ]) {
            Some(Self::AuthError)
        } else if has(&[
            "service unavailable",
            "bad gateway",
            "gateway timeout",
            "timed out",
            "timeout",
            "overloaded",
            "internal server error",
        ]) {
            Some(Self::ServiceUnavailable)
        } else {
            None
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Classify a failure from its HTTP status (if any) and message text.
pub fn classify(http_status: Option<u16>, message: &str) -> ErrorClass {
    classify_with_code(http_status, None, message)
}

/// Classify a failure, preferring the remote envelope code when present.
pub fn classify_with_code(
    http_status: Option<u16>,
    remote_code: Option<i64>,
    message: &str,
) -> ErrorClass {
    remote_code
        .and_then(ErrorClass::from_remote_code)
        .or_else(|| http_status.and_then(ErrorClass::from_http_status))
        .or_else(|| ErrorClass::from_message(message))
        .unwrap_or(ErrorClass::Unknown)
}
