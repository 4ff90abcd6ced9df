use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Serialize;

use crate::config::ProviderSettings;
use crate::error::{GenError, MAX_ERROR_BODY_CHARS, truncate_chars};

/// Max response body accepted from a provider (4MB).
pub const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// One provider instance's HTTP plumbing: base URL, bearer credential and
/// per-call timeouts. Immutable after construction, safe to share.
pub struct HttpTransport {
    client: Client,
    provider: String,
    base_url: String,
    api_key: String,
    generate_timeout: Duration,
    poll_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        provider: &str,
        settings: &ProviderSettings,
        default_generate_timeout_secs: u64,
    ) -> Result<Self, GenError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            client,
            provider: provider.to_string(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            generate_timeout: settings.generate_timeout(default_generate_timeout_secs),
            poll_timeout: settings.poll_timeout(),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn generate_timeout(&self) -> Duration {
        self.generate_timeout
    }

    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body under the generation timeout.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Vec<u8>, GenError> {
        let (status, bytes) = self.post_json_raw(path, body).await?;
        self.require_success(status, bytes)
    }

    /// Like [`post_json`](Self::post_json) but hands back non-2xx responses
    /// untouched so callers can decode provider-specific error bodies.
    pub async fn post_json_raw<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(StatusCode, Vec<u8>), GenError> {
        let req = self
            .client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .json(body);
        self.send_raw(req, self.generate_timeout).await
    }

    /// GET with no body under the poll timeout.
    pub async fn get(&self, path: &str) -> Result<Vec<u8>, GenError> {
        let req = self.client.get(self.url(path));
        let (status, bytes) = self.send_raw(req, self.poll_timeout).await?;
        self.require_success(status, bytes)
    }

    /// Any non-2xx keeps the provider's own diagnostic text.
    fn require_success(&self, status: StatusCode, bytes: Vec<u8>) -> Result<Vec<u8>, GenError> {
        if status.is_success() {
            Ok(bytes)
        } else {
            Err(self.upstream(status, &bytes))
        }
    }

    pub fn upstream(&self, status: StatusCode, body: &[u8]) -> GenError {
        GenError::Upstream {
            provider: self.provider.clone(),
            status: status.as_u16(),
            body: truncate_chars(&String::from_utf8_lossy(body), MAX_ERROR_BODY_CHARS),
        }
    }

    /// Send and read the body. Oversized success bodies are rejected; oversized
    /// error bodies are cut to `MAX_RESPONSE_BYTES`.
    async fn send_raw(
        &self,
        req: RequestBuilder,
        timeout: Duration,
    ) -> Result<(StatusCode, Vec<u8>), GenError> {
        let start = Instant::now();

        let response = req
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.classify(e, start))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify(e, start))?;

        tracing::debug!(
            provider = self.provider,
            status = status.as_u16(),
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            body = %truncate_chars(&String::from_utf8_lossy(&bytes), MAX_ERROR_BODY_CHARS),
            "provider response"
        );

        if bytes.len() > MAX_RESPONSE_BYTES {
            if !status.is_success() {
                return Ok((status, bytes[..MAX_RESPONSE_BYTES].to_vec()));
            }
            return Err(GenError::protocol(
                &self.provider,
                format!(
                    "response too large: {} bytes (max {MAX_RESPONSE_BYTES})",
                    bytes.len()
                ),
                &bytes[..MAX_ERROR_BODY_CHARS.min(bytes.len())],
            ));
        }

        Ok((status, bytes.to_vec()))
    }

    fn classify(&self, err: reqwest::Error, start: Instant) -> GenError {
        if err.is_timeout() {
            GenError::Timeout {
                provider: self.provider.clone(),
                after_ms: start.elapsed().as_millis() as u64,
            }
        } else {
            GenError::Transport(err)
        }
    }
}

/// Expand a status path template: `{id}` is replaced by the task id,
/// percent-encoded as a single path segment.
pub fn status_path(template: &str, task_id: &str) -> String {
    template.replace("{id}", &encode_segment(task_id))
}

fn encode_segment(segment: &str) -> String {
    let Ok(mut url) = Url::parse("http://localhost/") else {
        return segment.to_string();
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(segment);
    }
    url.path().trim_start_matches('/').to_string()
}
