//! # vidgen-client
//!
//! Resilient job-orchestration client for asynchronous video-generation APIs.
//!
//! ## Overview
//!
//! Remote video generation is slow (minutes), rate-limited and gated behind
//! short-lived signed credentials. Completion is only observable by polling.
//! This crate turns that unreliable signal into a single deterministic
//! [`GenerationResult`] per job.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`auth::TokenManager`] | Issues and caches locally signed JWT credentials |
//! | [`transport::ResilientHttpClient`] | Single HTTP call with bounded retry and backoff |
//! | [`error_class`] | Pure mapping of failures onto a stable taxonomy |
//! | [`client::JobSubmitter`] | Request validation, prompt translation and submission |
//! | [`client::PollingOrchestrator`] | Submit → poll → terminal state machine |
//! | [`VideoClient`] | Explicitly constructed facade owning the pieces above |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vidgen_client::{GenerationRequest, ProgressEvent, VideoClientBuilder};
//!
//! #[tokio::main]
//! async fn main() -> vidgen_client::Result<()> {
//!     let client = VideoClientBuilder::from_env()
//!         .credentials("access-key", "secret-key")
//!         .build()?;
//!
//!     let request = GenerationRequest::new("A cat surfing, same motion as @video")
//!         .with_reference_video("https://cdn.example.com/source.mp4");
//!
//!     let on_progress = |event: &ProgressEvent| {
//!         println!("{:?} {:?} {}", event.state, event.percent, event.message);
//!     };
//!     let result = client.run(&request, &on_progress).await;
//!     println!("{:?}", result.video_url);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Credential signing and caching |
//! | [`client`] | Builder, facade, submitter, orchestrator, progress sinks |
//! | [`config`] | Client configuration (defaults, env, YAML) |
//! | [`resilience`] | Retry policy and consecutive-failure guard |
//! | [`transport`] | HTTP execution with retry |
//! | [`types`] | Request, job, progress and wire types |

pub mod auth;
pub mod client;
pub mod config;
pub mod error_class;
pub mod resilience;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{
    ChannelProgressSink, InMemoryProgressSink, JobSubmitter, NoopProgressSink,
    PollingOrchestrator, ProgressSink, SubmissionFailure, VideoClient, VideoClientBuilder,
};
pub use config::ClientConfig;
pub use error_class::ErrorClass;
pub use types::{
    GenerationJob, GenerationMode, GenerationRequest, GenerationResult, JobState, JobStatus,
    ProgressEvent,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
