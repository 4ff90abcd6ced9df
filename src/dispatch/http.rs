use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_TEXT_TIMEOUT_SECS, ProviderSettings};
use crate::dispatch::transport::HttpTransport;
use crate::error::GenError;
use crate::options::{OptionSetter, compose};
use crate::parsers::json;

pub const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Sampling parameters; unset fields are left to the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatOption {
    Temperature(f64),
    MaxTokens(u32),
    TopP(f64),
}

impl OptionSetter<ChatOptions> for ChatOption {
    fn apply(&self, o: &mut ChatOptions) {
        match self {
            Self::Temperature(t) => o.temperature = Some(*t),
            Self::MaxTokens(n) => o.max_tokens = Some(*n),
            Self::TopP(p) => o.top_p = Some(*p),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// OpenAI-compatible chat completion client. Produces the free-form text
/// that `parsers::json` turns into structured data.
pub struct ChatClient {
    transport: HttpTransport,
    model: String,
    endpoint: String,
}

impl ChatClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, GenError> {
        Ok(Self {
            transport: HttpTransport::new("chat", settings, DEFAULT_TEXT_TIMEOUT_SECS)?,
            model: settings.model.clone(),
            endpoint: settings
                .submit_path
                .clone()
                .unwrap_or_else(|| CHAT_COMPLETIONS_PATH.to_string()),
        })
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &[ChatOption],
    ) -> Result<ChatCompletion, GenError> {
        let opts = compose(&ChatOptions::default(), options);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            top_p: opts.top_p,
        };

        let (status, bytes) = self.transport.post_json_raw(&self.endpoint, &request).await?;
        if !status.is_success() {
            return Err(provider_error(&self.transport, status, &bytes));
        }

        let completion: ChatCompletion = serde_json::from_slice(&bytes).map_err(|e| {
            GenError::protocol(self.transport.provider(), format!("failed to parse response: {e}"), &bytes)
        })?;

        if let Some(usage) = &completion.usage {
            tracing::debug!(
                model = completion.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "chat completion usage"
            );
        }
        Ok(completion)
    }

    /// Single-turn completion. The system message is sent only when non-empty.
    pub async fn generate_text(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &[ChatOption],
    ) -> Result<String, GenError> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        messages.push(ChatMessage::user(prompt));

        let completion = self.chat(&messages, options).await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenError::NoArtifact {
                provider: self.transport.provider().to_string(),
                body: format!("empty choices in completion {}", completion.id),
            })
    }

    /// Completion followed by structured-output extraction into `T`.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system_prompt: &str,
        options: &[ChatOption],
    ) -> Result<T, GenError> {
        let text = self.generate_text(prompt, system_prompt, options).await?;
        Ok(json::extract(&text)?)
    }

    /// Cheap round trip to verify credentials and endpoint.
    pub async fn test_connection(&self) -> Result<(), GenError> {
        self.chat(&[ChatMessage::user("Hello")], &[ChatOption::MaxTokens(10)])
            .await
            .map(|_| ())
    }
}

/// Prefer the structured `{"error": {...}}` message over the raw body when
/// present. Decoded from the full body; only the fallback is truncated.
fn provider_error(transport: &HttpTransport, status: StatusCode, body: &[u8]) -> GenError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(parsed) => GenError::ProviderFailed {
            provider: transport.provider().to_string(),
            code: parsed.error.code.and_then(|c| match c {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s),
                other => Some(other.to_string()),
            }),
            message: parsed.error.message,
        },
        Err(_) => transport.upstream(status, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_options_compose() {
        let opts = compose(
            &ChatOptions::default(),
            &[ChatOption::Temperature(0.2), ChatOption::MaxTokens(64), ChatOption::Temperature(0.9)],
        );
        assert_eq!(opts.temperature, Some(0.9));
        assert_eq!(opts.max_tokens, Some(64));
        assert_eq!(opts.top_p, None);
    }

    #[test]
    fn request_omits_unset_sampling_fields() {
        let messages = [ChatMessage::user("hi")];
        let body = serde_json::to_value(ChatCompletionRequest {
            model: "gpt-4o",
            messages: &messages,
            temperature: None,
            max_tokens: Some(10),
            top_p: None,
        })
        .unwrap();
        assert_eq!(body["max_tokens"], 10);
        assert!(body.get("temperature").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
    }

    fn transport() -> HttpTransport {
        HttpTransport::new("chat", &ProviderSettings::new("https://x", "k", "m"), 60).unwrap()
    }

    #[test]
    fn structured_error_body_becomes_provider_failed() {
        let err = provider_error(
            &transport(),
            StatusCode::UNAUTHORIZED,
            br#"{"error":{"message":"invalid api key","type":"auth","code":"invalid_api_key"}}"#,
        );
        match err {
            GenError::ProviderFailed { message, code, .. } => {
                assert_eq!(message, "invalid api key");
                assert_eq!(code.as_deref(), Some("invalid_api_key"));
            }
            other => panic!("expected ProviderFailed, got {other:?}"),
        }
    }

    #[test]
    fn raw_error_body_stays_upstream() {
        let err = provider_error(&transport(), StatusCode::BAD_GATEWAY, b"bad gateway");
        assert!(matches!(err, GenError::Upstream { status: 502, .. }));
    }

    #[test]
    fn long_structured_error_is_still_decoded() {
        let message = "x".repeat(600);
        let body = serde_json::json!({"error": {"message": message, "code": "context_length_exceeded"}});
        let err = provider_error(
            &transport(),
            StatusCode::BAD_REQUEST,
            body.to_string().as_bytes(),
        );
        match err {
            GenError::ProviderFailed { code, message, .. } => {
                assert_eq!(code.as_deref(), Some("context_length_exceeded"));
                assert_eq!(message.len(), 600);
            }
            other => panic!("expected ProviderFailed, got {other:?}"),
        }
    }

    #[test]
    fn long_unstructured_error_is_truncated() {
        let body = "e".repeat(2000);
        match provider_error(&transport(), StatusCode::BAD_GATEWAY, body.as_bytes()) {
            GenError::Upstream { body, .. } => {
                assert_eq!(body.chars().count(), crate::error::MAX_ERROR_BODY_CHARS + 3)
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }
}
