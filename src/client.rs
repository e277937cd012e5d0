//! Video generation client.
//!
//! The public surface is [`VideoClient`] plus its builder. Submission and
//! polling live in their own submodules so they can be driven independently.

pub mod builder;
pub mod core;
pub mod orchestrator;
pub mod progress;
pub mod submit;

pub use builder::VideoClientBuilder;
pub use core::VideoClient;
pub use orchestrator::PollingOrchestrator;
pub use progress::{ChannelProgressSink, InMemoryProgressSink, NoopProgressSink, ProgressSink};
pub use submit::{translate_placeholders, JobSubmitter, SubmissionFailure};
