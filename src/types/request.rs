use serde::{Deserialize, Serialize};

/// Quality tier requested from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    Standard,
    Professional,
}

impl GenerationMode {
    /// Value sent on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            GenerationMode::Standard => "std",
            GenerationMode::Professional => "pro",
        }
    }
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "std" | "standard" => Ok(GenerationMode::Standard),
            "pro" | "professional" => Ok(GenerationMode::Professional),
            other => Err(format!("unknown generation mode: {}", other)),
        }
    }
}

/// What the caller wants generated. Read-only to the client.
///
/// The prompt may reference media with `@video` / `@video1` and `@image1`,
/// `@image2`, ...; the N-th placeholder of a kind refers to the N-th URL of
/// that kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub mode: GenerationMode,
    #[serde(default)]
    pub reference_video_url: Option<String>,
    #[serde(default)]
    pub reference_image_urls: Vec<String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_keep_audio")]
    pub keep_audio: bool,
    /// Clip length in seconds (5 or 10).
    #[serde(default = "default_duration")]
    pub duration_secs: u32,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    /// Overrides the configured model for this request only.
    #[serde(default)]
    pub model_name: Option<String>,
}

fn default_keep_audio() -> bool {
    true
}

fn default_duration() -> u32 {
    5
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            mode: GenerationMode::default(),
            reference_video_url: None,
            reference_image_urls: Vec::new(),
            negative_prompt: None,
            keep_audio: default_keep_audio(),
            duration_secs: default_duration(),
            aspect_ratio: None,
            model_name: None,
        }
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_reference_video(mut self, url: impl Into<String>) -> Self {
        self.reference_video_url = Some(url.into());
        self
    }

    pub fn with_reference_image(mut self, url: impl Into<String>) -> Self {
        self.reference_image_urls.push(url.into());
        self
    }

    pub fn with_negative_prompt(mut self, text: impl Into<String>) -> Self {
        self.negative_prompt = Some(text.into());
        self
    }

    pub fn keep_audio(mut self, keep: bool) -> Self {
        self.keep_audio = keep;
        self
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(ratio.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    /// At least one video or image reference is present.
    pub fn has_media_reference(&self) -> bool {
        self.reference_video_url
            .as_deref()
            .map(|u| !u.trim().is_empty())
            .unwrap_or(false)
            || self
                .reference_image_urls
                .iter()
                .any(|u| !u.trim().is_empty())
    }
}
