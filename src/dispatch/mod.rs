pub mod async_poll;
pub mod http;
pub mod openai;
pub mod registry;
pub mod transport;

use async_trait::async_trait;

use crate::error::GenError;
use crate::options::{ImageOption, ImageOptions, VideoOption, VideoOptions};
use crate::task::GenerationTask;

/// How a provider delivers its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// The submit response already holds the artifact; there is nothing to poll.
    Immediate,
    /// Submit returns a task id; `get_task_status` must be called until terminal.
    TaskPolling,
}

/// Image generation backend. Callers program against this trait only.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    fn capability(&self) -> Capability;

    /// Defaults the caller's options are composed over.
    fn default_options(&self) -> ImageOptions;

    async fn generate(
        &self,
        prompt: &str,
        options: &[ImageOption],
    ) -> Result<GenerationTask, GenError>;

    /// Fails with `GenError::Unsupported` on immediate-completion providers.
    async fn get_task_status(&self, task_id: &str) -> Result<GenerationTask, GenError>;
}

/// Video generation backend.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn name(&self) -> &str;

    fn capability(&self) -> Capability;

    fn default_options(&self) -> VideoOptions;

    async fn generate(
        &self,
        prompt: &str,
        options: &[VideoOption],
    ) -> Result<GenerationTask, GenError>;

    /// Fails with `GenError::Unsupported` on immediate-completion providers.
    async fn get_task_status(&self, task_id: &str) -> Result<GenerationTask, GenError>;
}

pub(crate) fn unsupported_poll(provider: &str) -> GenError {
    GenError::Unsupported {
        provider: provider.to_string(),
        operation: "get_task_status",
    }
}
