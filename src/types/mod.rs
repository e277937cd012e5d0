//! Core type definitions.
//!
//! - [`request`]: what the caller asks for
//! - [`job`]: job identity, lifecycle state, progress and results
//! - [`wire`]: JSON shapes exchanged with the remote API

pub mod job;
pub mod request;
pub mod wire;

pub use job::{GenerationJob, GenerationResult, JobState, JobStatus, ProgressEvent};
pub use request::{GenerationMode, GenerationRequest};
