use thiserror::Error;

/// Max characters of a provider body carried inside an error.
pub const MAX_ERROR_BODY_CHARS: usize = 512;

/// Coarse error classes callers branch on when picking a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Provider,
    Protocol,
    Capability,
    Extraction,
    Config,
}

#[derive(Debug, Error)]
pub enum GenError {
    #[error("request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("timeout after {after_ms}ms calling {provider}")]
    Timeout { provider: String, after_ms: u64 },

    #[error("upstream error from {provider} (status {status}): {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider} reported failure: {message}")]
    ProviderFailed {
        provider: String,
        code: Option<String>,
        message: String,
    },

    #[error("protocol violation from {provider}: {message}, body: {body}")]
    Protocol {
        provider: String,
        message: String,
        body: String,
    },

    #[error("no artifact produced by {provider}, response: {body}")]
    NoArtifact { provider: String, body: String },

    #[error("{operation} not supported by {provider}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => ErrorKind::Transport,
            Self::Upstream { .. } | Self::ProviderFailed { .. } => ErrorKind::Provider,
            Self::Protocol { .. } | Self::NoArtifact { .. } => ErrorKind::Protocol,
            Self::Unsupported { .. } => ErrorKind::Capability,
            Self::Extract(_) => ErrorKind::Extraction,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Extract provider name from structured error variants.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Timeout { provider, .. }
            | Self::Upstream { provider, .. }
            | Self::ProviderFailed { provider, .. }
            | Self::Protocol { provider, .. }
            | Self::NoArtifact { provider, .. }
            | Self::Unsupported { provider, .. } => Some(provider),
            _ => None,
        }
    }

    pub fn is_capability_mismatch(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    pub(crate) fn protocol(provider: &str, message: impl Into<String>, body: &[u8]) -> Self {
        Self::Protocol {
            provider: provider.to_string(),
            message: message.into(),
            body: truncate_chars(&String::from_utf8_lossy(body), MAX_ERROR_BODY_CHARS),
        }
    }

    pub(crate) fn no_artifact(provider: &str, body: &[u8]) -> Self {
        Self::NoArtifact {
            provider: provider.to_string(),
            body: truncate_chars(&String::from_utf8_lossy(body), MAX_ERROR_BODY_CHARS),
        }
    }
}

/// Failures of the structured-output extractor. Every variant carries enough
/// of the raw text to diagnose the malformed output.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("model returned empty content")]
    Empty,

    #[error("no JSON object found in response: {preview}")]
    NoJsonObject { preview: String },

    #[error("JSON decode failed: {message}\n{context}")]
    Decode { message: String, context: String },
}

/// Keep at most `max` chars, appending `...` when something was cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
