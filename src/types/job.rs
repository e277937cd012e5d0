use crate::error_class::ErrorClass;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// A submitted job. The id is assigned by the remote service and never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    job_id: String,
    submitted_at: SystemTime,
}

impl GenerationJob {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            submitted_at: SystemTime::now(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn submitted_at(&self) -> SystemTime {
        self.submitted_at
    }
}

/// Lifecycle of a job. `Completed`, `Failed` and `TimedOut` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::TimedOut)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        }
    }

    /// Normalize a remote status string.
    ///
    /// Returns `None` for values the client does not recognise.
    pub fn from_remote(status: &str) -> Option<Self> {
        let state = match status.trim().to_ascii_lowercase().as_str() {
            "submitted" | "queued" | "queueing" | "pending" => JobState::Pending,
            "processing" | "running" | "in_progress" => JobState::Processing,
            "succeed" | "succeeded" | "success" | "completed" => JobState::Completed,
            "failed" | "fail" | "error" => JobState::Failed,
            _ => return None,
        };
        Some(state)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted on every successful poll, whether or not the state changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub state: JobState,
    pub percent: Option<u8>,
    pub message: String,
}

/// Normalized view of one status check.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    pub percent: Option<u8>,
    pub message: String,
    /// First artifact URL, when the remote reported one.
    pub video_url: Option<String>,
}

impl JobStatus {
    pub fn progress_event(&self, job: &GenerationJob) -> ProgressEvent {
        ProgressEvent {
            job_id: job.job_id().to_string(),
            state: self.state,
            percent: self.percent,
            message: self.message.clone(),
        }
    }
}

/// Final outcome of one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub video_url: Option<String>,
    pub error: Option<String>,
    pub job_id: Option<String>,
    pub state: JobState,
    pub error_class: Option<ErrorClass>,
    /// Status polls performed.
    pub polls: u32,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl GenerationResult {
    pub fn completed(job_id: &str, video_url: String, polls: u32, elapsed: Duration) -> Self {
        Self {
            success: true,
            video_url: Some(video_url),
            error: None,
            job_id: Some(job_id.to_string()),
            state: JobState::Completed,
            error_class: None,
            polls,
            elapsed,
        }
    }

    pub fn failed(
        job_id: Option<&str>,
        error: impl Into<String>,
        error_class: Option<ErrorClass>,
        polls: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            video_url: None,
            error: Some(error.into()),
            job_id: job_id.map(str::to_string),
            state: JobState::Failed,
            error_class,
            polls,
            elapsed,
        }
    }

    pub fn timed_out(
        job_id: Option<&str>,
        error: impl Into<String>,
        polls: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            video_url: None,
            error: Some(error.into()),
            job_id: job_id.map(str::to_string),
            state: JobState::TimedOut,
            error_class: None,
            polls,
            elapsed,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
