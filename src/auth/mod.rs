//! Credential lifecycle: locally signed, time-limited bearer tokens.

pub mod token;

pub use token::{Credential, TokenConfig, TokenManager};
