use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::GenError;

/// Default timeout for image generation calls (10 minutes).
pub const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 600;
/// Default timeout for video submission calls.
pub const DEFAULT_VIDEO_TIMEOUT_SECS: u64 = 300;
/// Default timeout for text completion calls.
pub const DEFAULT_TEXT_TIMEOUT_SECS: u64 = 600;
/// Default timeout for a single status poll.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

const DEFAULT_CONFIG_FILE: &str = "framecast.toml";

/// Connection settings shared by every provider instance.
/// Read-only after construction.
#[derive(Clone, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    /// Overrides the provider's submission path (e.g. `/v1/images/generations`).
    #[serde(default)]
    pub submit_path: Option<String>,
    /// Overrides the provider's status path; `{id}` is replaced by the task id.
    #[serde(default)]
    pub status_path: Option<String>,
    #[serde(default)]
    pub generate_timeout_secs: Option<u64>,
    #[serde(default)]
    pub poll_timeout_secs: Option<u64>,
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            submit_path: None,
            status_path: None,
            generate_timeout_secs: None,
            poll_timeout_secs: None,
        }
    }

    pub fn generate_timeout(&self, default_secs: u64) -> Duration {
        Duration::from_secs(self.generate_timeout_secs.unwrap_or(default_secs))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs.unwrap_or(DEFAULT_POLL_TIMEOUT_SECS))
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("submit_path", &self.submit_path)
            .field("status_path", &self.status_path)
            .field("generate_timeout_secs", &self.generate_timeout_secs)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageBackend {
    /// DALL-E style: the response already holds the image.
    Openai,
    /// Stable Diffusion gateway: may hand back a task id to poll.
    StableDiffusion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoBackend {
    Minimax,
    Openai,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ImageProviderConfig {
    pub kind: ImageBackend,
    #[serde(flatten)]
    pub settings: ProviderSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct VideoProviderConfig {
    pub kind: VideoBackend,
    #[serde(flatten)]
    pub settings: ProviderSettings,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TextProviderConfig {
    #[serde(flatten)]
    pub settings: ProviderSettings,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub image: Option<ImageProviderConfig>,
    #[serde(default)]
    pub video: Option<VideoProviderConfig>,
    #[serde(default)]
    pub text: Option<TextProviderConfig>,
}

impl Config {
    /// Load `framecast.toml` (or `$FRAMECAST_CONFIG`) and apply env overrides.
    /// A missing file yields an empty config.
    pub fn load() -> Result<Self, GenError> {
        let path = env::var("FRAMECAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides(|key| env::var(key).ok());

        if config.image.is_none() && config.video.is_none() && config.text.is_none() {
            tracing::warn!(path = %path.display(), "no providers configured");
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, GenError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(GenError::Config(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, GenError> {
        toml::from_str(text).map_err(|e| GenError::Config(format!("invalid config: {e}")))
    }

    /// Override credentials and base URLs from `lookup` (normally the process env).
    /// Only providers already present in the file are touched.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(image) = self.image.as_mut() {
            override_settings(&mut image.settings, "IMAGE", &lookup);
        }
        if let Some(video) = self.video.as_mut() {
            override_settings(&mut video.settings, "VIDEO", &lookup);
        }
        if let Some(text) = self.text.as_mut() {
            override_settings(&mut text.settings, "TEXT", &lookup);
        }
    }
}

fn override_settings(
    settings: &mut ProviderSettings,
    section: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) {
    if let Some(key) = lookup(&format!("FRAMECAST_{section}_API_KEY")) {
        settings.api_key = key;
    }
    if let Some(url) = lookup(&format!("FRAMECAST_{section}_BASE_URL")) {
        settings.base_url = url;
    }
    if settings.api_key.is_empty() {
        tracing::warn!(section, "API key not set, requests will be unauthenticated");
    }
}
