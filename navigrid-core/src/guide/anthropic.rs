use super::{build_prompt, GuideError, GuideRequest, InstructionGenerator};
use async_trait::async_trait;
use claude::{Claude, Prompt};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_GUIDE_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_MAX_TOKENS: usize = 256;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Instruction generator backed by Claude.
#[derive(Clone)]
pub struct ClaudeGuide {
    client: Claude,
    max_tokens: usize,
    temperature: f32,
    timeout: Duration,
}

impl ClaudeGuide {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_GUIDE_TIMEOUT,
        }
    }

    /// Build from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, GuideError> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Upper bound on one generation, including network time.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn prompt(&self, request: &GuideRequest) -> Prompt {
        Prompt::new(build_prompt(request))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }
}

#[async_trait]
impl InstructionGenerator for ClaudeGuide {
    async fn generate(&self, request: &GuideRequest) -> Result<String, GuideError> {
        let prompt = self.prompt(request);
        let completion = tokio::time::timeout(self.timeout, self.client.complete(&prompt))
            .await
            .map_err(|_| GuideError::Timeout)??;

        debug!(
            model = %completion.model,
            output_tokens = completion.output_tokens,
            truncated = completion.truncated(),
            "instruction generated"
        );

        let text = completion.text.trim();
        if text.is_empty() {
            return Err(GuideError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        self.client.model()
    }
}
