use serde::de::DeserializeOwned;

use crate::config::{Config, ImageBackend, VideoBackend};
use crate::dispatch::async_poll::{MinimaxVideoClient, StableDiffusionClient};
use crate::dispatch::http::ChatClient;
use crate::dispatch::openai::{OpenAiImageClient, OpenAiVideoClient};
use crate::dispatch::{ImageProvider, VideoProvider};
use crate::error::GenError;
use crate::options::{ImageOption, VideoOption};
use crate::parsers::json;
use crate::task::GenerationTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// A generation request for one media kind, carrying that kind's options.
#[derive(Debug, Clone)]
pub enum MediaRequest {
    Image(Vec<ImageOption>),
    Video(Vec<VideoOption>),
}

impl MediaRequest {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Image(_) => MediaKind::Image,
            Self::Video(_) => MediaKind::Video,
        }
    }
}

/// The collaborator-facing entry point: one provider per media kind, chosen
/// at construction. Holds no mutable state, so `&Registry` can be shared
/// across concurrent callers.
#[derive(Default)]
pub struct Registry {
    image: Option<Box<dyn ImageProvider>>,
    video: Option<Box<dyn VideoProvider>>,
    text: Option<ChatClient>,
}

impl Registry {
    pub fn from_config(config: &Config) -> Result<Self, GenError> {
        let image = match &config.image {
            Some(c) => {
                let provider: Box<dyn ImageProvider> = match c.kind {
                    ImageBackend::Openai => Box::new(OpenAiImageClient::new(&c.settings)?),
                    ImageBackend::StableDiffusion => {
                        Box::new(StableDiffusionClient::new(&c.settings)?)
                    }
                };
                Some(provider)
            }
            None => None,
        };

        let video = match &config.video {
            Some(c) => {
                let provider: Box<dyn VideoProvider> = match c.kind {
                    VideoBackend::Minimax => Box::new(MinimaxVideoClient::new(&c.settings)?),
                    VideoBackend::Openai => Box::new(OpenAiVideoClient::new(&c.settings)?),
                };
                Some(provider)
            }
            None => None,
        };

        let text = config
            .text
            .as_ref()
            .map(|c| ChatClient::new(&c.settings))
            .transpose()?;

        if let Some(p) = &image {
            tracing::info!(provider = p.name(), capability = ?p.capability(), "image provider ready");
        }
        if let Some(p) = &video {
            tracing::info!(provider = p.name(), capability = ?p.capability(), "video provider ready");
        }

        Ok(Self { image, video, text })
    }

    pub fn with_image(mut self, provider: Box<dyn ImageProvider>) -> Self {
        self.image = Some(provider);
        self
    }

    pub fn with_video(mut self, provider: Box<dyn VideoProvider>) -> Self {
        self.video = Some(provider);
        self
    }

    pub fn with_text(mut self, client: ChatClient) -> Self {
        self.text = Some(client);
        self
    }

    pub fn image(&self) -> Result<&dyn ImageProvider, GenError> {
        self.image
            .as_deref()
            .ok_or_else(|| missing(MediaKind::Image.as_str()))
    }

    pub fn video(&self) -> Result<&dyn VideoProvider, GenError> {
        self.video
            .as_deref()
            .ok_or_else(|| missing(MediaKind::Video.as_str()))
    }

    pub fn text(&self) -> Result<&ChatClient, GenError> {
        self.text.as_ref().ok_or_else(|| missing("text"))
    }

    pub async fn generate(
        &self,
        prompt: &str,
        request: &MediaRequest,
    ) -> Result<GenerationTask, GenError> {
        tracing::debug!(kind = request.kind().as_str(), "dispatching generation");
        match request {
            MediaRequest::Image(options) => self.image()?.generate(prompt, options).await,
            MediaRequest::Video(options) => self.video()?.generate(prompt, options).await,
        }
    }

    pub async fn poll_status(
        &self,
        task_id: &str,
        kind: MediaKind,
    ) -> Result<GenerationTask, GenError> {
        match kind {
            MediaKind::Image => self.image()?.get_task_status(task_id).await,
            MediaKind::Video => self.video()?.get_task_status(task_id).await,
        }
    }

    pub fn extract_structured<T: DeserializeOwned>(&self, raw: &str) -> Result<T, GenError> {
        Ok(json::extract(raw)?)
    }
}

fn missing(kind: &str) -> GenError {
    GenError::Config(format!("no {kind} provider configured"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Capability;

    const CONFIG: &str = r#"
[image]
kind = "openai"
base_url = "https://api.openai.com"
api_key = "sk-test"
model = "dall-e-3"

[video]
kind = "minimax"
base_url = "https://api.minimax.chat"
api_key = "mm-test"
model = "video-01"
"#;

    #[test]
    fn from_config_picks_backends() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let registry = Registry::from_config(&config).unwrap();
        assert_eq!(registry.image().unwrap().capability(), Capability::Immediate);
        assert_eq!(registry.video().unwrap().capability(), Capability::TaskPolling);
        assert_eq!(registry.video().unwrap().name(), "minimax");
        assert!(matches!(registry.text(), Err(GenError::Config(_))));
    }

    #[tokio::test]
    async fn missing_provider_is_config_error() {
        let registry = Registry::default();
        let err = registry
            .generate("a cat", &MediaRequest::Image(vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::Config(msg) if msg.contains("image")));
    }

    #[tokio::test]
    async fn immediate_provider_poll_is_capability_mismatch() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let registry = Registry::from_config(&config).unwrap();
        for id in ["", "task-1"] {
            let err = tokio_test::assert_err!(registry.poll_status(id, MediaKind::Image).await);
            assert!(err.is_capability_mismatch());
        }
    }

    #[test]
    fn request_kind_and_provider_defaults() {
        assert_eq!(MediaRequest::Image(vec![]).kind(), MediaKind::Image);
        assert_eq!(MediaRequest::Video(vec![]).kind().as_str(), "video");

        let config = Config::from_toml_str(CONFIG).unwrap();
        let registry = Registry::from_config(&config).unwrap();
        let video = registry.video().unwrap().default_options();
        assert_eq!(video.duration_secs, Some(6));
        assert_eq!(video.resolution.as_deref(), Some("1080P"));
        let image = registry.image().unwrap().default_options();
        assert_eq!(image.quality.as_deref(), Some("standard"));
    }

    #[test]
    fn extract_structured_wraps_extract_errors() {
        let registry = Registry::default();
        let err = registry
            .extract_structured::<serde_json::Value>("no json here")
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Extraction);
    }
}
