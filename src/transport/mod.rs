//! HTTP transport with bounded retry.

pub mod http;

pub use http::{ApiRequest, ResilientHttpClient};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            TransportError::Other(_) => None,
        }
    }

    /// Network-level failures (timeouts, refused or reset connections, bodies
    /// cut short) that are worth another attempt. Builder and redirect errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http(e) => {
                if e.is_builder() || e.is_redirect() {
                    return false;
                }
                // JSON is decoded by the caller, so a reqwest decode error is a
                // body read failing underneath a content decoder.
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            TransportError::Other(_) => false,
        }
    }
}
