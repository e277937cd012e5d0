use crate::auth::TokenManager;
use crate::client::orchestrator::{PollingOrchestrator, CANCELLED};
use crate::client::progress::ProgressSink;
use crate::client::submit::{JobSubmitter, SubmissionFailure};
use crate::config::ClientConfig;
use crate::transport::ResilientHttpClient;
use crate::types::{GenerationJob, GenerationRequest, GenerationResult, JobStatus};
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Video generation client.
///
/// Owns the credential cache, the HTTP client, the submitter and the poll
/// orchestrator. Built with [`crate::VideoClientBuilder`]; safe to share
/// across tasks behind an `Arc`.
pub struct VideoClient {
    pub(crate) config: ClientConfig,
    pub(crate) tokens: Arc<TokenManager>,
    pub(crate) http: Arc<ResilientHttpClient>,
    pub(crate) submitter: JobSubmitter,
    pub(crate) orchestrator: PollingOrchestrator,
}

impl VideoClient {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Validate and submit one job without waiting for it.
    pub async fn submit(
        &self,
        request: &GenerationRequest,
    ) -> std::result::Result<GenerationJob, SubmissionFailure> {
        self.submitter.submit(request).await
    }

    /// Single status check for an existing job.
    pub async fn poll(&self, job: &GenerationJob) -> Result<JobStatus> {
        self.orchestrator.poll(job).await
    }

    /// Submit `request` and poll it to a terminal state.
    pub async fn run(&self, request: &GenerationRequest, sink: &dyn ProgressSink) -> GenerationResult {
        self.run_with_cancel(request, sink, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), resolving early once `cancel` fires.
    pub async fn run_with_cancel(
        &self,
        request: &GenerationRequest,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> GenerationResult {
        let start = Instant::now();
        let submitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("generation cancelled before submission completed");
                return GenerationResult::timed_out(None, CANCELLED, 0, start.elapsed());
            }
            r = self.submitter.submit(request) => r,
        };

        match submitted {
            Ok(job) => self.orchestrator.run(&job, sink, &cancel).await,
            Err(failure) => {
                warn!(error = %failure, "generation request not accepted");
                GenerationResult::failed(
                    None,
                    failure.to_string(),
                    failure.class(),
                    0,
                    start.elapsed(),
                )
            }
        }
    }

    /// Resume polling a job submitted earlier (for example by another process).
    pub async fn wait(
        &self,
        job: &GenerationJob,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> GenerationResult {
        self.orchestrator.run(job, sink, &cancel).await
    }

    /// Fetch a finished artifact into memory.
    pub async fn download_artifact(&self, url: &str) -> Result<Bytes> {
        ensure_http_url(url)?;
        self.http.download(url).await
    }

    /// Fetch a finished artifact to `path`, returning the byte count.
    pub async fn download_artifact_to(&self, url: &str, path: impl AsRef<Path>) -> Result<u64> {
        ensure_http_url(url)?;
        let path = path.as_ref();
        let written = self.http.download_to_file(url, path).await?;
        info!(path = %path.display(), bytes = written, "artifact downloaded");
        Ok(written)
    }
}

fn ensure_http_url(raw: &str) -> Result<()> {
    let ok = url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false);
    if ok {
        Ok(())
    } else {
        Err(Error::validation_with_context(
            "artifact url must be an absolute http(s) URL",
            ErrorContext::new()
                .with_field_path("artifact.url")
                .with_details(raw.to_string())
                .with_source("video_client"),
        ))
    }
}
