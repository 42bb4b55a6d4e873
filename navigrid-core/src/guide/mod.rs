//! Natural-language instruction generation.
//!
//! The navigator asks an [`InstructionGenerator`] for the next walking
//! instruction after each advance. Generators may fail freely; the navigator
//! substitutes a deterministic fallback.

mod anthropic;

pub use anthropic::{ClaudeGuide, DEFAULT_GUIDE_TIMEOUT, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

use crate::history::HistoryEntry;
use crate::landmark::{FloorId, LandmarkId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors from instruction generation. None are fatal.
#[derive(Debug, Error)]
pub enum GuideError {
    #[error("instruction generator is unavailable")]
    Unavailable,

    #[error("instruction generation timed out")]
    Timeout,

    #[error("model request failed: {0}")]
    Api(#[from] claude::Error),

    #[error("model returned an empty instruction")]
    EmptyResponse,
}

/// Walker is about to change floors at a junction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorChange {
    pub from: String,
    pub to: String,
    /// The junction landmark the walker is standing on.
    pub via: LandmarkId,
}

/// Everything a generator sees for one instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct GuideRequest {
    pub current: LandmarkId,
    pub next: LandmarkId,
    pub floor: FloorId,
    /// Display label of `floor`.
    pub floor_label: String,
    pub floor_change: Option<FloorChange>,
    /// `"{step}/{last step}"`.
    pub progress: String,
    /// Most recent exchanges, oldest first.
    pub history: Vec<HistoryEntry>,
}

/// Produces walking instructions.
#[async_trait]
pub trait InstructionGenerator: Send + Sync {
    /// Generate one instruction for the walker.
    async fn generate(&self, request: &GuideRequest) -> Result<String, GuideError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

#[async_trait]
impl<G: InstructionGenerator + ?Sized> InstructionGenerator for Box<G> {
    async fn generate(&self, request: &GuideRequest) -> Result<String, GuideError> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<G: InstructionGenerator + ?Sized> InstructionGenerator for Arc<G> {
    async fn generate(&self, request: &GuideRequest) -> Result<String, GuideError> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A generator that is never available. Every step uses the fallback text.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGuide;

#[async_trait]
impl InstructionGenerator for OfflineGuide {
    async fn generate(&self, _request: &GuideRequest) -> Result<String, GuideError> {
        Err(GuideError::Unavailable)
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Render the model prompt for a request.
pub fn build_prompt(request: &GuideRequest) -> String {
    let floor_line = match &request.floor_change {
        Some(change) => format!(
            "The user is transitioning from {} to {} via {}.",
            change.from, change.to, change.via
        ),
        None => format!("Floor: {}", request.floor_label),
    };

    let mut prompt = format!(
        "You are an indoor navigation assistant for a building.\n\
         Current location: {}\n\
         Next destination: {}\n\
         {}\n\
         Progress: {}\n",
        request.current, request.next, floor_line, request.progress
    );

    if !request.history.is_empty() {
        prompt.push_str("Previous instructions:\n");
        for entry in &request.history {
            prompt.push_str(&format!(
                "- {} → {}: {}\n",
                entry.current, entry.next, entry.instruction
            ));
        }
    }

    prompt.push_str(
        "\nGive a short friendly natural navigation instruction in 1-2 sentences.\n\
         No markdown, plain text only.",
    );
    prompt
}
