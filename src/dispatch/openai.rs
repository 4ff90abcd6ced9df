use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_IMAGE_TIMEOUT_SECS, DEFAULT_VIDEO_TIMEOUT_SECS, ProviderSettings};
use crate::dispatch::transport::HttpTransport;
use crate::dispatch::{Capability, ImageProvider, VideoProvider, unsupported_poll};
use crate::error::GenError;
use crate::options::{ImageOption, ImageOptions, ImageSize, VideoOption, VideoOptions, compose};
use crate::task::GenerationTask;

pub const IMAGE_SUBMIT_PATH: &str = "/v1/images/generations";
pub const VIDEO_SUBMIT_PATH: &str = "/v1/videos/generations";

/// Response of the immediate-completion family: `{"data": [{"url": ...}]}`.
#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    data: Vec<DataItem>,
}

#[derive(Debug, Deserialize)]
struct DataItem {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
    #[serde(default)]
    duration: Option<u32>,
}

/// Decode an immediate response; zero artifacts is an error, never an empty success.
fn first_artifact(provider: &str, body: &[u8]) -> Result<DataItem, GenError> {
    let parsed: DataResponse = serde_json::from_slice(body)
        .map_err(|e| GenError::protocol(provider, format!("failed to parse response: {e}"), body))?;

    parsed
        .data
        .into_iter()
        .find(|item| item.url.as_deref().is_some_and(|u| !u.is_empty()))
        .ok_or_else(|| GenError::no_artifact(provider, body))
}

// ---------------------------------------------------------------------------
// DALL-E style images
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub n: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image: Vec<String>,
}

/// Immediate-completion image client.
///
/// Defaults: size `1920x1920`, quality `standard`, one image per call.
pub struct OpenAiImageClient {
    transport: HttpTransport,
    model: String,
    submit_path: String,
}

impl OpenAiImageClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, GenError> {
        Ok(Self {
            transport: HttpTransport::new("openai-image", settings, DEFAULT_IMAGE_TIMEOUT_SECS)?,
            model: settings.model.clone(),
            submit_path: settings
                .submit_path
                .clone()
                .unwrap_or_else(|| IMAGE_SUBMIT_PATH.to_string()),
        })
    }

    pub fn defaults() -> ImageOptions {
        ImageOptions {
            size: Some(ImageSize::Tag("1920x1920".to_string())),
            quality: Some("standard".to_string()),
            ..Default::default()
        }
    }

    pub fn build_request(&self, prompt: &str, options: &ImageOptions) -> ImageRequest {
        ImageRequest {
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            prompt: prompt.to_string(),
            size: options.size.as_ref().map(ImageSize::as_tag),
            quality: options.quality.clone(),
            style: options.style.clone(),
            n: 1,
            image: options.reference_images.clone(),
        }
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageClient {
    fn name(&self) -> &str {
        self.transport.provider()
    }

    fn capability(&self) -> Capability {
        Capability::Immediate
    }

    fn default_options(&self) -> ImageOptions {
        Self::defaults()
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &[ImageOption],
    ) -> Result<GenerationTask, GenError> {
        let opts = compose(&self.default_options(), options);
        let request = self.build_request(prompt, &opts);

        let body = self.transport.post_json(&self.submit_path, &request).await?;
        let item = first_artifact(self.name(), &body)?;

        if let Some(revised) = &item.revised_prompt {
            tracing::debug!(provider = self.name(), revised_prompt = %revised, "prompt revised by provider");
        }
        tracing::info!(provider = self.name(), model = request.model, "image generated");

        Ok(GenerationTask::completed(item.url.unwrap_or_default())
            .with_dimensions(opts.size.as_ref().and_then(ImageSize::dimensions)))
    }

    async fn get_task_status(&self, _task_id: &str) -> Result<GenerationTask, GenError> {
        Err(unsupported_poll(self.name()))
    }
}

// ---------------------------------------------------------------------------
// Synchronous video gateways
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image: Vec<String>,
}

/// Immediate-completion video client for gateways that block until the clip is rendered.
///
/// Defaults: 5 second clip at `720P`.
pub struct OpenAiVideoClient {
    transport: HttpTransport,
    model: String,
    submit_path: String,
}

impl OpenAiVideoClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, GenError> {
        Ok(Self {
            transport: HttpTransport::new("openai-video", settings, DEFAULT_VIDEO_TIMEOUT_SECS)?,
            model: settings.model.clone(),
            submit_path: settings
                .submit_path
                .clone()
                .unwrap_or_else(|| VIDEO_SUBMIT_PATH.to_string()),
        })
    }

    pub fn defaults() -> VideoOptions {
        VideoOptions {
            duration_secs: Some(5),
            resolution: Some("720P".to_string()),
            ..Default::default()
        }
    }

    pub fn build_request(&self, prompt: &str, options: &VideoOptions) -> VideoRequest {
        VideoRequest {
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            prompt: prompt.to_string(),
            duration: options.duration_secs,
            resolution: options.resolution.clone(),
            first_frame_image: options.first_frame_image.clone(),
            last_frame_image: options.last_frame_image.clone(),
            image: options.reference_images.clone(),
        }
    }
}

#[async_trait]
impl VideoProvider for OpenAiVideoClient {
    fn name(&self) -> &str {
        self.transport.provider()
    }

    fn capability(&self) -> Capability {
        Capability::Immediate
    }

    fn default_options(&self) -> VideoOptions {
        Self::defaults()
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &[VideoOption],
    ) -> Result<GenerationTask, GenError> {
        let opts = compose(&self.default_options(), options);
        let request = self.build_request(prompt, &opts);

        let body = self.transport.post_json(&self.submit_path, &request).await?;
        let item = first_artifact(self.name(), &body)?;

        tracing::info!(provider = self.name(), model = request.model, "video generated");

        let mut task = GenerationTask::completed(item.url.unwrap_or_default());
        task.duration_secs = item.duration.or(opts.duration_secs);
        Ok(task)
    }

    async fn get_task_status(&self, _task_id: &str) -> Result<GenerationTask, GenError> {
        Err(unsupported_poll(self.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_client() -> OpenAiImageClient {
        OpenAiImageClient::new(&ProviderSettings::new("https://api.openai.com", "sk-test", "dall-e-3"))
            .unwrap()
    }

    #[test]
    fn image_request_uses_defaults() {
        let client = image_client();
        let opts = compose(&OpenAiImageClient::defaults(), &[] as &[ImageOption]);
        let body = serde_json::to_value(client.build_request("a cat", &opts)).unwrap();
        assert_eq!(body["model"], "dall-e-3");
        assert_eq!(body["size"], "1920x1920");
        assert_eq!(body["quality"], "standard");
        assert_eq!(body["n"], 1);
        assert!(body.get("image").is_none());
        assert!(body.get("style").is_none());
    }

    #[test]
    fn image_request_honours_overrides() {
        let client = image_client();
        let opts = compose(
            &OpenAiImageClient::defaults(),
            &[
                ImageOption::Dimensions(1024, 1792),
                ImageOption::Model("gpt-image-1".into()),
                ImageOption::ReferenceImages(vec!["https://ref/1.png".into()]),
            ],
        );
        let body = serde_json::to_value(client.build_request("a cat", &opts)).unwrap();
        assert_eq!(body["size"], "1024x1792");
        assert_eq!(body["model"], "gpt-image-1");
        assert_eq!(body["image"][0], "https://ref/1.png");
    }

    #[test]
    fn zero_artifacts_is_an_error() {
        let err = first_artifact("openai-image", br#"{"created":1,"data":[]}"#).unwrap_err();
        match err {
            GenError::NoArtifact { body, .. } => assert!(body.contains("\"data\":[]")),
            other => panic!("expected NoArtifact, got {other:?}"),
        }
    }

    #[test]
    fn empty_url_does_not_count_as_artifact() {
        let err = first_artifact("openai-image", br#"{"data":[{"url":""}]}"#).unwrap_err();
        assert!(matches!(err, GenError::NoArtifact { .. }));
    }

    #[test]
    fn video_request_skips_unset_frames() {
        let client = OpenAiVideoClient::new(&ProviderSettings::new("https://x", "k", "sora")).unwrap();
        let opts = compose(&OpenAiVideoClient::defaults(), &[VideoOption::LastFrame("https://f/l.png".into())]);
        let body = serde_json::to_value(client.build_request("waves", &opts)).unwrap();
        assert_eq!(body["duration"], 5);
        assert_eq!(body["resolution"], "720P");
        assert_eq!(body["last_frame_image"], "https://f/l.png");
        assert!(body.get("first_frame_image").is_none());
    }
}
