use async_trait::async_trait;
use serde::Serialize;

use crate::config::{DEFAULT_IMAGE_TIMEOUT_SECS, DEFAULT_VIDEO_TIMEOUT_SECS, ProviderSettings};
use crate::dispatch::transport::{HttpTransport, status_path};
use crate::dispatch::{Capability, ImageProvider, VideoProvider};
use crate::error::GenError;
use crate::options::{ImageOption, ImageOptions, ImageSize, VideoOption, VideoOptions, compose};
use crate::task::{GenerationTask, TaskState, settle_poll, settle_submission};

/// Native Stable Diffusion edge when the caller gives no usable size.
const SD_NATIVE_SIZE: u32 = 1024;

// ---------------------------------------------------------------------------
// Shared submit/poll plumbing
// ---------------------------------------------------------------------------

/// Launch and status calls for one task-polling provider instance.
/// Holds no record of outstanding tasks; every poll is keyed by the caller's id.
pub struct TaskDispatch {
    transport: HttpTransport,
    submit_path: String,
    status_path: String,
}

impl TaskDispatch {
    pub fn new(
        provider: &str,
        settings: &ProviderSettings,
        default_submit_path: &str,
        default_status_path: &str,
        default_generate_timeout_secs: u64,
    ) -> Result<Self, GenError> {
        Ok(Self {
            transport: HttpTransport::new(provider, settings, default_generate_timeout_secs)?,
            submit_path: settings
                .submit_path
                .clone()
                .unwrap_or_else(|| default_submit_path.to_string()),
            status_path: settings
                .status_path
                .clone()
                .unwrap_or_else(|| default_status_path.to_string()),
        })
    }

    pub fn provider(&self) -> &str {
        self.transport.provider()
    }

    /// Submit a job. Submission and the first poll share one decoding path.
    pub async fn submit<B: Serialize + ?Sized>(&self, body: &B) -> Result<GenerationTask, GenError> {
        let bytes = self.transport.post_json(&self.submit_path, body).await?;
        let task = settle_submission(self.provider(), &bytes).inspect_err(|e| {
            tracing::warn!(provider = self.provider(), "submission rejected: {e}");
        })?;

        tracing::info!(
            provider = self.provider(),
            task_id = task.task_id.as_deref().unwrap_or(""),
            state = ?task.state,
            "task submitted"
        );
        Ok(task)
    }

    pub async fn poll(&self, task_id: &str) -> Result<GenerationTask, GenError> {
        let path = status_path(&self.status_path, task_id);
        let bytes = self.transport.get(&path).await?;
        let task = settle_poll(self.provider(), task_id, &bytes)?;

        match task.state {
            TaskState::Processing => {
                tracing::debug!(provider = self.provider(), task_id, "task still processing")
            }
            TaskState::Completed => {
                tracing::info!(provider = self.provider(), task_id, "task completed")
            }
            TaskState::Failed => tracing::warn!(
                provider = self.provider(),
                task_id,
                error = task.error.as_deref().unwrap_or(""),
                "task failed"
            ),
        }
        Ok(task)
    }
}

// ---------------------------------------------------------------------------
// Stable Diffusion gateway (images)
// ---------------------------------------------------------------------------

pub const SD_SUBMIT_PATH: &str = "/v1/images/generations";
pub const SD_STATUS_PATH: &str = "/v1/images/status/{id}";

#[derive(Debug, Serialize)]
pub struct SdRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    pub samples: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub image: Vec<String>,
}

/// Task-polling image client.
///
/// Defaults: 1024x1024, 30 steps, guidance 7.5, one sample. Quality and style
/// tags have no counterpart in this API and are not sent.
pub struct StableDiffusionClient {
    dispatch: TaskDispatch,
    model: String,
}

impl StableDiffusionClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, GenError> {
        Ok(Self {
            dispatch: TaskDispatch::new(
                "stable-diffusion",
                settings,
                SD_SUBMIT_PATH,
                SD_STATUS_PATH,
                DEFAULT_IMAGE_TIMEOUT_SECS,
            )?,
            model: settings.model.clone(),
        })
    }

    pub fn defaults() -> ImageOptions {
        ImageOptions {
            size: Some(ImageSize::Dimensions {
                width: SD_NATIVE_SIZE,
                height: SD_NATIVE_SIZE,
            }),
            steps: Some(30),
            cfg_scale: Some(7.5),
            ..Default::default()
        }
    }

    fn resolve_dimensions(options: &ImageOptions) -> (u32, u32) {
        options
            .size
            .as_ref()
            .and_then(ImageSize::dimensions)
            .unwrap_or((SD_NATIVE_SIZE, SD_NATIVE_SIZE))
    }

    pub fn build_request(&self, prompt: &str, options: &ImageOptions) -> SdRequest {
        let (width, height) = Self::resolve_dimensions(options);
        SdRequest {
            prompt: prompt.to_string(),
            negative_prompt: options.negative_prompt.clone(),
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            width,
            height,
            steps: options.steps,
            cfg_scale: options.cfg_scale,
            seed: options.seed,
            samples: 1,
            image: options.reference_images.clone(),
        }
    }
}

#[async_trait]
impl ImageProvider for StableDiffusionClient {
    fn name(&self) -> &str {
        self.dispatch.provider()
    }

    fn capability(&self) -> Capability {
        Capability::TaskPolling
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
        let mut task = self.dispatch.submit(&request).await?;

        if task.state == TaskState::Completed && task.width.is_none() {
            task = task.with_dimensions(Some((request.width, request.height)));
        }
        Ok(task)
    }

    async fn get_task_status(&self, task_id: &str) -> Result<GenerationTask, GenError> {
        self.dispatch.poll(task_id).await
    }
}

// ---------------------------------------------------------------------------
// Minimax (video)
// ---------------------------------------------------------------------------

pub const MINIMAX_SUBMIT_PATH: &str = "/v1/video_generation";
pub const MINIMAX_STATUS_PATH: &str = "/v1/video_generation/{id}";

#[derive(Debug, Serialize)]
pub struct SubjectReference {
    #[serde(rename = "type")]
    pub kind: String,
    pub image: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MinimaxRequest {
    pub prompt: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subject_reference: Vec<SubjectReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}

/// Task-polling video client.
///
/// Defaults: 6 second clip at `1080P`.
pub struct MinimaxVideoClient {
    dispatch: TaskDispatch,
    model: String,
}

impl MinimaxVideoClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, GenError> {
        Ok(Self {
            dispatch: TaskDispatch::new(
                "minimax",
                settings,
                MINIMAX_SUBMIT_PATH,
                MINIMAX_STATUS_PATH,
                DEFAULT_VIDEO_TIMEOUT_SECS,
            )?,
            model: settings.model.clone(),
        })
    }

    pub fn defaults() -> VideoOptions {
        VideoOptions {
            duration_secs: Some(6),
            resolution: Some("1080P".to_string()),
            ..Default::default()
        }
    }

    pub fn build_request(&self, prompt: &str, options: &VideoOptions) -> MinimaxRequest {
        let subject_reference = if options.reference_images.is_empty() {
            vec![]
        } else {
            vec![SubjectReference {
                kind: "character".to_string(),
                image: options.reference_images.clone(),
            }]
        };

        MinimaxRequest {
            prompt: prompt.to_string(),
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            first_frame_image: options.first_frame_image.clone(),
            last_frame_image: options.last_frame_image.clone(),
            subject_reference,
            duration: options.duration_secs,
            resolution: options.resolution.clone(),
        }
    }
}

#[async_trait]
impl VideoProvider for MinimaxVideoClient {
    fn name(&self) -> &str {
        self.dispatch.provider()
    }

    fn capability(&self) -> Capability {
        Capability::TaskPolling
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
        self.dispatch.submit(&self.build_request(prompt, &opts)).await
    }

    async fn get_task_status(&self, task_id: &str) -> Result<GenerationTask, GenError> {
        self.dispatch.poll(task_id).await
    }
}
