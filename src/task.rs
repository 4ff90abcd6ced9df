use serde::{Deserialize, Serialize};

use crate::error::GenError;

/// Lifecycle state of a generation. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Processing,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Provider-agnostic result of a submit or poll call. Owned by the caller;
/// clients keep no registry of outstanding tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationTask {
    /// Absent for immediate-completion providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
}

impl GenerationTask {
    pub fn completed(url: impl Into<String>) -> Self {
        Self {
            task_id: None,
            state: TaskState::Completed,
            url: Some(url.into()),
            error: None,
            width: None,
            height: None,
            duration_secs: None,
        }
    }

    pub fn processing(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            state: TaskState::Processing,
            url: None,
            error: None,
            width: None,
            height: None,
            duration_secs: None,
        }
    }

    pub fn with_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        if let Some((width, height)) = dimensions {
            self.width = Some(width);
            self.height = Some(height);
        }
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

// ---------------------------------------------------------------------------
// Envelope: the decoded shape of every task-polling response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub duration: Option<u32>,
}

/// `error` arrives either as a bare string or as an object with a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EnvelopeError {
    Message(String),
    Detailed {
        #[serde(default)]
        code: Option<serde_json::Value>,
        #[serde(default)]
        message: String,
    },
}

/// Minimax-style status block; a non-zero code is a provider error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaseResp {
    #[serde(default)]
    pub status_code: i64,
    #[serde(default)]
    pub status_msg: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub output: Option<Vec<Artifact>>,
    #[serde(default)]
    pub video: Option<Artifact>,
    #[serde(default)]
    pub error: Option<EnvelopeError>,
    #[serde(default)]
    pub base_resp: Option<BaseResp>,
}

/// A populated error field: optional provider code plus message.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedError {
    pub code: Option<String>,
    pub message: String,
}

impl Envelope {
    pub fn parse(provider: &str, body: &[u8]) -> Result<Self, GenError> {
        serde_json::from_slice(body)
            .map_err(|e| GenError::protocol(provider, format!("undecodable envelope: {e}"), body))
    }

    /// The provider-reported error, if any. Empty messages count as absent.
    pub fn reported_error(&self) -> Option<ReportedError> {
        match &self.error {
            Some(EnvelopeError::Message(message)) if !message.is_empty() => {
                return Some(ReportedError {
                    code: None,
                    message: message.clone(),
                });
            }
            Some(EnvelopeError::Detailed { code, message }) if !message.is_empty() => {
                return Some(ReportedError {
                    code: code.as_ref().and_then(code_to_string),
                    message: message.clone(),
                });
            }
            _ => {}
        }

        self.base_resp
            .as_ref()
            .filter(|b| b.status_code != 0)
            .map(|b| ReportedError {
                code: Some(b.status_code.to_string()),
                message: if b.status_msg.is_empty() {
                    format!("status code {}", b.status_code)
                } else {
                    b.status_msg.clone()
                },
            })
    }

    /// First artifact with a non-empty URL, from `output[]` or `video`.
    pub fn artifact(&self) -> Option<&Artifact> {
        self.output
            .iter()
            .flatten()
            .chain(self.video.iter())
            .find(|a| !a.url.is_empty())
    }

    /// The single normalization step: error wins, then artifact, else processing.
    pub fn state(&self) -> TaskState {
        if self.reported_error().is_some() {
            TaskState::Failed
        } else if self.artifact().is_some() {
            TaskState::Completed
        } else {
            TaskState::Processing
        }
    }

    /// Map this envelope onto a task. `task_id` fills in when the envelope omits one.
    pub fn into_task(self, task_id: Option<&str>) -> GenerationTask {
        let state = self.state();
        let error = self.reported_error().map(|e| e.message);
        let artifact = self.artifact().cloned();
        GenerationTask {
            task_id: self
                .task_id
                .filter(|id| !id.is_empty())
                .or_else(|| task_id.map(str::to_string)),
            state,
            url: artifact.as_ref().map(|a| a.url.clone()),
            error,
            width: artifact.as_ref().and_then(|a| a.width),
            height: artifact.as_ref().and_then(|a| a.height),
            duration_secs: artifact.as_ref().and_then(|a| a.duration),
        }
    }
}

fn code_to_string(code: &serde_json::Value) -> Option<String> {
    match code {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Settle a submit response: a reported error fails the call outright, an
/// artifact completes it, anything else must carry a task id to poll.
pub fn settle_submission(provider: &str, body: &[u8]) -> Result<GenerationTask, GenError> {
    let envelope = Envelope::parse(provider, body)?;

    if let Some(err) = envelope.reported_error() {
        return Err(GenError::ProviderFailed {
            provider: provider.to_string(),
            code: err.code,
            message: err.message,
        });
    }

    let task = envelope.into_task(None);
    if task.state == TaskState::Processing && task.task_id.is_none() {
        return Err(GenError::no_artifact(provider, body));
    }
    Ok(task)
}

/// Settle a poll response. Errors become a `Failed` task rather than an `Err`.
pub fn settle_poll(provider: &str, task_id: &str, body: &[u8]) -> Result<GenerationTask, GenError> {
    Ok(Envelope::parse(provider, body)?.into_task(Some(task_id)))
}
