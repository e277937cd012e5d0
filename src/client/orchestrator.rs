//! Submit → poll → terminal state machine.
//!
//! ```text
//!            ┌──────────── poll ok, not terminal ───────────┐
//!            ▼                                              │
//! Pending ──► Processing ──► Completed (artifact URL present)
//!     │           │      └──► Failed   (remote failure, missing URL,
//!     │           │                     repeated auth failures)
//!     └───────────┴─────────► TimedOut (attempts exhausted, wall clock, cancel)
//! ```

use crate::client::progress::{deliver, ProgressSink};
use crate::client::submit::OMNI_VIDEO_PATH;
use crate::config::PollConfig;
use crate::error_class::{classify, classify_with_code, ErrorClass};
use crate::resilience::ConsecutiveFailureGuard;
use crate::transport::{ApiRequest, ResilientHttpClient};
use crate::types::wire::{Envelope, TaskData};
use crate::types::{GenerationJob, GenerationResult, JobState, JobStatus, ProgressEvent};
use crate::{Error, ErrorContext, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

pub const NO_ARTIFACT_URL: &str = "No artifact URL in response";
pub const CANCELLED: &str = "Generation cancelled";

/// Drives one job from submission to a terminal [`GenerationResult`].
pub struct PollingOrchestrator {
    http: Arc<ResilientHttpClient>,
    config: PollConfig,
}

/// Counters shared between the loop and the wall-clock wrapper.
#[derive(Debug, Default)]
struct LoopProgress {
    polls: u32,
}

impl PollingOrchestrator {
    pub fn new(http: Arc<ResilientHttpClient>, config: PollConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// One status check. Does not touch the job; repeated calls are side-effect free.
    pub async fn poll(&self, job: &GenerationJob) -> Result<JobStatus> {
        let url = self.http.endpoint(OMNI_VIDEO_PATH, job.job_id())?;
        let envelope: Envelope<TaskData> = self
            .http
            .execute(&ApiRequest::get(url), self.http.policy().max_attempts)
            .await?;

        if !envelope.is_ok() {
            let class = classify_with_code(None, Some(envelope.code), &envelope.message);
            return Err(Error::Api {
                code: envelope.code,
                class,
                message: envelope.message,
            });
        }

        let data = envelope.data.ok_or_else(|| {
            Error::runtime_with_context(
                "status response has no data",
                ErrorContext::new()
                    .with_field_path("data")
                    .with_details(job.job_id().to_string())
                    .with_source("polling_orchestrator"),
            )
        })?;
        Ok(normalize(job, &data))
    }

    /// Poll `job` until it reaches a terminal state.
    ///
    /// Never fails: every outcome, including cancellation, is a [`GenerationResult`].
    pub async fn run(
        &self,
        job: &GenerationJob,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> GenerationResult {
        let span = tracing::info_span!("generation_job", job_id = job.job_id());
        async {
            let start = Instant::now();
            deliver(
                sink,
                &ProgressEvent {
                    job_id: job.job_id().to_string(),
                    state: JobState::Pending,
                    percent: Some(0),
                    message: "Job submitted".to_string(),
                },
            );

            let mut progress = LoopProgress::default();
            let outcome = match self.config.overall_timeout {
                Some(limit) => tokio::time::timeout(
                    limit,
                    self.poll_loop(job, sink, cancel, &mut progress, start),
                )
                .await
                .ok(),
                None => Some(self.poll_loop(job, sink, cancel, &mut progress, start).await),
            };

            outcome.unwrap_or_else(|| {
                let elapsed = start.elapsed();
                warn!(
                    polls = progress.polls,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "poll loop exceeded wall-clock ceiling"
                );
                GenerationResult::timed_out(
                    Some(job.job_id()),
                    format!("Generation timeout after {}", format_elapsed(elapsed)),
                    progress.polls,
                    elapsed,
                )
            })
        }
        .instrument(span)
        .await
    }

    async fn poll_loop(
        &self,
        job: &GenerationJob,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
        progress: &mut LoopProgress,
        start: Instant,
    ) -> GenerationResult {
        let job_id = job.job_id();
        let mut auth_guard =
            ConsecutiveFailureGuard::new(ErrorClass::AuthError, self.config.auth_failure_threshold);
        let mut last_state = JobState::Pending;

        let cancelled = |polls: u32| {
            info!(polls, "generation cancelled by caller");
            GenerationResult::timed_out(Some(job_id), CANCELLED, polls, start.elapsed())
        };

        for attempt in 1..=self.config.max_attempts {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(progress.polls),
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(progress.polls),
                r = self.poll(job) => r,
            };
            progress.polls += 1;

            let status = match outcome {
                Ok(status) => status,
                Err(e) if is_malformed(&e) => {
                    error!(attempt, error = %e, "unexpected status response");
                    return GenerationResult::failed(
                        Some(job_id),
                        format!("Unexpected response from generation service: {}", e),
                        Some(ErrorClass::Unknown),
                        progress.polls,
                        start.elapsed(),
                    );
                }
                Err(e) => {
                    let class = e.class();
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        error_class = class.name(),
                        error = %e,
                        "status poll failed"
                    );
                    if class == ErrorClass::AuthError {
                        self.http.tokens().invalidate();
                    }
                    if auth_guard.on_failure(class) {
                        let failures = auth_guard.snapshot().consecutive_failures;
                        error!(failures, "aborting after repeated authentication failures");
                        return GenerationResult::failed(
                            Some(job_id),
                            format!(
                                "{} ({} consecutive failures: {})",
                                ErrorClass::AuthError.user_message(),
                                failures,
                                e
                            ),
                            Some(ErrorClass::AuthError),
                            progress.polls,
                            start.elapsed(),
                        );
                    }
                    continue;
                }
            };

            auth_guard.on_success();
            if status.state != last_state {
                info!(
                    from = last_state.as_str(),
                    to = status.state.as_str(),
                    attempt,
                    "job state changed"
                );
                last_state = status.state;
            }

            match status.state {
                JobState::Completed => {
                    let elapsed = start.elapsed();
                    return match status.video_url {
                        Some(url) => {
                            deliver(sink, &terminal_event(job_id, JobState::Completed, Some(100), "Video ready"));
                            info!(polls = progress.polls, elapsed_ms = elapsed.as_millis() as u64, "generation completed");
                            GenerationResult::completed(job_id, url, progress.polls, elapsed)
                        }
                        None => {
                            error!("job completed without an artifact URL");
                            deliver(sink, &terminal_event(job_id, JobState::Failed, None, NO_ARTIFACT_URL));
                            GenerationResult::failed(
                                Some(job_id),
                                NO_ARTIFACT_URL,
                                Some(ErrorClass::Unknown),
                                progress.polls,
                                elapsed,
                            )
                        }
                    };
                }
                JobState::Failed => {
                    deliver(sink, &status.progress_event(job));
                    let class = classify(None, &status.message);
                    warn!(error_class = class.name(), message = status.message.as_str(), "generation failed remotely");
                    return GenerationResult::failed(
                        Some(job_id),
                        status.message,
                        Some(class),
                        progress.polls,
                        start.elapsed(),
                    );
                }
                _ => deliver(sink, &status.progress_event(job)),
            }
        }

        let elapsed = start.elapsed();
        warn!(polls = progress.polls, elapsed_ms = elapsed.as_millis() as u64, "poll attempts exhausted");
        GenerationResult::timed_out(
            Some(job_id),
            format!("Generation timeout after {}", format_elapsed(elapsed)),
            progress.polls,
            elapsed,
        )
    }
}

/// The one event a run reports for its terminal poll; its state matches the result.
fn terminal_event(job_id: &str, state: JobState, percent: Option<u8>, message: &str) -> ProgressEvent {
    ProgressEvent {
        job_id: job_id.to_string(),
        state,
        percent,
        message: message.to_string(),
    }
}

/// The service answered but not in a shape the client understands.
fn is_malformed(err: &Error) -> bool {
    matches!(err, Error::Serialization(_) | Error::Runtime { .. })
}

fn normalize(job: &GenerationJob, data: &TaskData) -> JobStatus {
    let raw = data.task_status.as_deref().unwrap_or("");
    let state = JobState::from_remote(raw).unwrap_or_else(|| {
        warn!(job_id = job.job_id(), status = raw, "unrecognised remote status, treating as processing");
        JobState::Processing
    });

    let percent = match state {
        JobState::Completed => Some(100),
        _ => data
            .task_progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 99.0).round() as u8),
    };

    let message = data
        .task_status_msg
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_message(state).to_string());

    JobStatus {
        state,
        percent,
        message,
        video_url: data.primary_video_url().map(str::to_string),
    }
}

fn default_message(state: JobState) -> &'static str {
    match state {
        JobState::Pending => "Queued",
        JobState::Processing => "Generating video",
        JobState::Completed => "Generation complete",
        JobState::Failed => "Generation failed",
        JobState::TimedOut => "Generation timed out",
    }
}

/// `1m 5s`, `42s`, `350ms`.
pub(crate) fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}
