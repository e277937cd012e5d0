//! Wire shapes of the generation API.
//!
//! Every response is wrapped in an envelope whose `code` is `0` on success.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// `data` of a task: returned by both submission and status endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub task_status: Option<String>,
    #[serde(default)]
    pub task_status_msg: Option<String>,
    /// Not every deployment reports it.
    #[serde(default)]
    pub task_progress: Option<f64>,
    #[serde(default)]
    pub task_result: Option<TaskResult>,
}

impl TaskData {
    /// First non-empty artifact URL.
    pub fn primary_video_url(&self) -> Option<&str> {
        self.task_result
            .as_ref()?
            .videos
            .iter()
            .filter_map(|v| v.url.as_deref())
            .find(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub videos: Vec<VideoArtifact>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoArtifact {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

/// Submission body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitBody {
    pub model_name: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    pub mode: &'static str,
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image_list: Vec<ImageRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub video_list: Vec<VideoRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRef {
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRef {
    pub video_url: String,
    pub refer_type: &'static str,
    /// `"yes"` or `"no"`.
    pub keep_original_sound: &'static str,
}
