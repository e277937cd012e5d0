//! Resilience primitives.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`retry`] | Per-call retry policy: retryable statuses and capped exponential backoff |
//! | [`failure_guard`] | Consecutive-failure counter used to abort hopeless poll loops |
//!
//! ```rust
//! use vidgen_client::resilience::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new()
//!     .with_max_attempts(5)
//!     .with_base_delay(Duration::from_millis(500));
//! assert_eq!(policy.backoff_delay(1, None), Duration::from_secs(1));
//! assert!(policy.is_retryable_status(503));
//! ```

pub mod failure_guard;
pub mod retry;

pub use failure_guard::{ConsecutiveFailureGuard, FailureGuardSnapshot};
pub use retry::RetryPolicy;
