//! Job submission: validation, prompt translation and the submit call.

use crate::error_class::{classify_with_code, ErrorClass};
use crate::transport::{ApiRequest, ResilientHttpClient};
use crate::types::wire::{Envelope, ImageRef, SubmitBody, TaskData, VideoRef};
use crate::types::{GenerationJob, GenerationRequest};
use crate::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, warn};

/// Submission and status endpoint root.
pub const OMNI_VIDEO_PATH: &str = "/v1/videos/omni-video";

pub const MAX_REFERENCE_IMAGES: usize = 7;

const ALLOWED_DURATIONS: [u32; 2] = [5, 10];

// `@video`, `@video2`, `@image1`; not preceded by a word character.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|[^\w@])@(video|image)(\d*)\b").expect("placeholder regex is valid")
});

/// Why a submission did not produce a job. Returned, never raised.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionFailure {
    /// Rejected locally; no network call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The service answered with a non-zero envelope code.
    #[error("Submission rejected (code {code}, {class}): {message}")]
    Rejected {
        code: i64,
        message: String,
        class: ErrorClass,
    },

    /// The service accepted the request but returned no job id.
    #[error("Submission response did not include a job id")]
    MissingJobId,

    /// Transport or HTTP failure after the retry budget was spent.
    #[error("Submission request failed: {0}")]
    Request(#[source] Error),
}

impl SubmissionFailure {
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            SubmissionFailure::Validation(_) => None,
            SubmissionFailure::Rejected { class, .. } => Some(*class),
            SubmissionFailure::MissingJobId => Some(ErrorClass::Unknown),
            SubmissionFailure::Request(e) => Some(e.class()),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SubmissionFailure::Validation(_))
    }
}

/// Rewrite symbolic media placeholders into the API's positional tokens.
///
/// `@video` and `@video1` become `<<<video_1>>>`; `@imageN` becomes
/// `<<<image_N>>>`. A placeholder whose index has no matching URL is an error.
pub fn translate_placeholders(
    prompt: &str,
    video_count: usize,
    image_count: usize,
) -> Result<String, String> {
    let mut out = String::with_capacity(prompt.len() + 16);
    let mut last = 0;

    for caps in PLACEHOLDER.captures_iter(prompt) {
        let (Some(whole), Some(lead), Some(kind), Some(digits)) =
            (caps.get(0), caps.get(1), caps.get(2), caps.get(3))
        else {
            continue;
        };
        let kind = kind.as_str().to_ascii_lowercase();
        let index: usize = if digits.as_str().is_empty() {
            1
        } else {
            digits
                .as_str()
                .parse()
                .map_err(|_| format!("placeholder index out of range: {}", whole.as_str().trim()))?
        };
        let available = if kind == "video" { video_count } else { image_count };
        if index == 0 || index > available {
            return Err(format!(
                "placeholder @{}{} has no matching {} reference ({} provided)",
                kind,
                digits.as_str(),
                kind,
                available
            ));
        }

        out.push_str(&prompt[last..whole.start()]);
        out.push_str(lead.as_str());
        out.push_str(&format!("<<<{}_{}>>>", kind, index));
        last = whole.end();
    }
    out.push_str(&prompt[last..]);
    Ok(out)
}

fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Builds the wire request and submits one job.
pub struct JobSubmitter {
    http: Arc<ResilientHttpClient>,
    model_name: String,
}

impl JobSubmitter {
    pub fn new(http: Arc<ResilientHttpClient>, model_name: impl Into<String>) -> Self {
        Self {
            http,
            model_name: model_name.into(),
        }
    }

    /// Validate `request` and build the submission body. Pure; no I/O.
    pub fn build_body(&self, request: &GenerationRequest) -> Result<SubmitBody, String> {
        if request.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if !request.has_media_reference() {
            return Err("at least one reference video or image is required".to_string());
        }
        if !ALLOWED_DURATIONS.contains(&request.duration_secs) {
            return Err(format!(
                "duration must be one of {:?} seconds, got {}",
                ALLOWED_DURATIONS, request.duration_secs
            ));
        }

        let video_url = request
            .reference_video_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        if let Some(url) = video_url {
            if !is_http_url(url) {
                return Err(format!("reference video is not an http(s) URL: {}", url));
            }
        }

        let images: Vec<&str> = request
            .reference_image_urls
            .iter()
            .map(|u| u.trim())
            .collect();
        if images.len() > MAX_REFERENCE_IMAGES {
            return Err(format!(
                "at most {} reference images are supported, got {}",
                MAX_REFERENCE_IMAGES,
                images.len()
            ));
        }
        if let Some(bad) = images.iter().find(|u| !is_http_url(u)) {
            return Err(format!("reference image is not an http(s) URL: {:?}", bad));
        }

        let prompt = translate_placeholders(
            &request.prompt,
            usize::from(video_url.is_some()),
            images.len(),
        )?;

        Ok(SubmitBody {
            model_name: request
                .model_name
                .clone()
                .unwrap_or_else(|| self.model_name.clone()),
            prompt,
            negative_prompt: request
                .negative_prompt
                .clone()
                .filter(|n| !n.trim().is_empty()),
            mode: request.mode.wire_name(),
            duration: request.duration_secs.to_string(),
            aspect_ratio: request.aspect_ratio.clone(),
            image_list: images
                .iter()
                .map(|u| ImageRef {
                    image_url: u.to_string(),
                })
                .collect(),
            video_list: video_url
                .map(|u| VideoRef {
                    video_url: u.to_string(),
                    refer_type: "base",
                    keep_original_sound: if request.keep_audio { "yes" } else { "no" },
                })
                .into_iter()
                .collect(),
        })
    }

    /// Submit one job. Every failure mode comes back as a [`SubmissionFailure`].
    pub async fn submit(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationJob, SubmissionFailure> {
        let body = self
            .build_body(request)
            .map_err(SubmissionFailure::Validation)?;
        let payload = serde_json::to_value(&body)
            .map_err(|e| SubmissionFailure::Request(Error::Serialization(e)))?;

        let envelope: Envelope<TaskData> = self
            .http
            .execute(
                &ApiRequest::post_json(OMNI_VIDEO_PATH, payload),
                self.http.policy().max_attempts,
            )
            .await
            .map_err(SubmissionFailure::Request)?;

        if !envelope.is_ok() {
            let class = classify_with_code(None, Some(envelope.code), &envelope.message);
            warn!(
                code = envelope.code,
                error_class = class.name(),
                request_id = envelope.request_id.as_deref().unwrap_or(""),
                "submission rejected"
            );
            return Err(SubmissionFailure::Rejected {
                code: envelope.code,
                message: envelope.message,
                class,
            });
        }

        let job_id = envelope
            .data
            .and_then(|d| d.task_id)
            .filter(|id| !id.trim().is_empty())
            .ok_or(SubmissionFailure::MissingJobId)?;

        info!(
            job_id = job_id.as_str(),
            model = body.model_name.as_str(),
            mode = body.mode,
            "generation job submitted"
        );
        Ok(GenerationJob::new(job_id))
    }
}
