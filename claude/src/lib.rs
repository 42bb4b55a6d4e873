//! Small client for Anthropic's Messages API.
//!
//! Only single-turn text completions are supported: one prompt goes out and
//! the concatenated text blocks come back as a [`Completion`].
//!
//! ```ignore
//! let client = claude::Claude::from_env()?;
//! let reply = client
//!     .complete(&claude::Prompt::new("Say hello").with_max_tokens(32))
//!     .await?;
//! println!("{}", reply.text);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: usize = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum Error {
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode API response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Error::Timeout;
        }
        if e.is_decode() {
            return Error::Decode(e.to_string());
        }
        Error::Transport(e.to_string())
    }
}

/// Messages API client. Cheap to clone.
#[derive(Clone)]
pub struct Claude {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl std::fmt::Debug for Claude {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Claude")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Claude {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: http_client(REQUEST_TIMEOUT),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Read the key from `ANTHROPIC_API_KEY`. A blank value counts as unset.
    pub fn from_env() -> Result<Self, Error> {
        match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(Error::MissingApiKey),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Per-request HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = http_client(timeout);
        self
    }

    /// API root, e.g. a local gateway. A trailing `/` is ignored.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.endpoint = url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one completion.
    pub async fn complete(&self, prompt: &Prompt) -> Result<Completion, Error> {
        let body = self.wire_request(prompt);
        let response = self
            .http
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let wire: WireResponse = response.json().await?;
        Ok(wire.into())
    }

    fn wire_request<'a>(&'a self, prompt: &'a Prompt) -> WireRequest<'a> {
        WireRequest {
            model: prompt.model.as_deref().unwrap_or(&self.model),
            max_tokens: prompt.max_tokens,
            temperature: prompt.temperature,
            messages: [WireMessage {
                role: "user",
                content: &prompt.text,
            }],
        }
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// A single user turn plus sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    /// Overrides the client's model.
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// The text of a completion with its accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub model: String,
    /// Every text block, concatenated.
    pub text: String,
    /// `end_turn`, `max_tokens`, ... as reported by the API.
    pub stop_reason: Option<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl Completion {
    /// Generation stopped at the token limit.
    pub fn truncated(&self) -> bool {
        self.stop_reason.as_deref() == Some("max_tokens")
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: [WireMessage<'a>; 1],
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    model: String,
    content: Vec<WireBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

impl From<WireResponse> for Completion {
    fn from(wire: WireResponse) -> Self {
        let text = wire
            .content
            .into_iter()
            .filter_map(|block| match block {
                WireBlock::Text { text } => Some(text),
                WireBlock::Other => None,
            })
            .collect::<String>();

        Self {
            model: wire.model,
            text,
            stop_reason: wire.stop_reason,
            input_tokens: wire.usage.input_tokens,
            output_tokens: wire.usage.output_tokens,
        }
    }
}
