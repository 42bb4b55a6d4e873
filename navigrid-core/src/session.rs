//! NavigationSession - the primary public API for one guided walk.
//!
//! A session owns everything a walk needs: the registry, the learned sign
//! lexicon, the instruction history, the instruction generator and the
//! navigator. Callers feed it detection batches once per sampling tick.

use crate::guide::{
    ClaudeGuide, InstructionGenerator, OfflineGuide, DEFAULT_GUIDE_TIMEOUT, DEFAULT_MAX_TOKENS,
    DEFAULT_TEMPERATURE,
};
use crate::history::{InstructionHistory, CONTEXT_WINDOW, MAX_HISTORY_ENTRIES};
use crate::landmark::{LandmarkId, LandmarkRegistry, RegistryError};
use crate::lexicon::{default_signs, SignLexicon};
use crate::matcher::{Detection, DetectionMatcher, SignMatch, DEFAULT_MIN_CONFIDENCE};
use crate::navigator::{NavigationStatus, Navigator, UpdateOutcome};
use crate::recognition::{FrameSampler, TextRecognizer, DEFAULT_SAMPLE_EVERY};
use crate::route::{ComposedRoute, RouteComposer, RouteError};
use crate::store::PersistError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// Errors that prevent a session from starting.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("route error: {0}")]
    Route(#[from] RouteError),

    #[error("storage error: {0}")]
    Persist(#[from] PersistError),
}

/// Configuration for a navigation session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Registry files, merged in order.
    pub registry_paths: Vec<PathBuf>,

    pub lexicon_path: PathBuf,

    pub history_path: PathBuf,

    /// Recognize every k-th frame.
    pub sample_every: u32,

    /// Detections at or below this confidence are ignored.
    pub min_confidence: f32,

    pub history_capacity: usize,

    /// History entries shown to the generator.
    pub context_window: usize,

    /// Model override for the generator.
    pub model: Option<String>,

    pub max_tokens: usize,

    pub temperature: f32,

    pub guide_timeout: Duration,

    /// Never call the model; always use fallback instructions.
    pub offline: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            registry_paths: Vec::new(),
            lexicon_path: PathBuf::from("sign_map.json"),
            history_path: PathBuf::from("guide_history.json"),
            sample_every: DEFAULT_SAMPLE_EVERY,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            history_capacity: MAX_HISTORY_ENTRIES,
            context_window: CONTEXT_WINDOW,
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            guide_timeout: DEFAULT_GUIDE_TIMEOUT,
            offline: false,
        }
    }

    /// Add a registry file.
    pub fn with_registry(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_paths.push(path.into());
        self
    }

    pub fn with_lexicon_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.lexicon_path = path.into();
        self
    }

    pub fn with_history_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_path = path.into();
        self
    }

    pub fn with_sample_every(mut self, frames: u32) -> Self {
        self.sample_every = frames;
        self
    }

    pub fn with_min_confidence(mut self, confidence: f32) -> Self {
        self.min_confidence = confidence;
        self
    }

    pub fn with_history_capacity(mut self, entries: usize) -> Self {
        self.history_capacity = entries;
        self
    }

    pub fn with_context_window(mut self, entries: usize) -> Self {
        self.context_window = entries;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_guide_timeout(mut self, timeout: Duration) -> Self {
        self.guide_timeout = timeout;
        self
    }

    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Apply `NAVIGRID_LEXICON`, `NAVIGRID_HISTORY`, `NAVIGRID_MODEL` and
    /// `NAVIGRID_OFFLINE` when set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = lookup("NAVIGRID_LEXICON") {
            self.lexicon_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("NAVIGRID_HISTORY") {
            self.history_path = PathBuf::from(path);
        }
        if let Some(model) = lookup("NAVIGRID_MODEL") {
            self.model = Some(model);
        }
        if let Some(flag) = lookup("NAVIGRID_OFFLINE") {
            self.offline = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        self
    }

    /// Load and merge the configured registry files.
    pub async fn load_registry(&self) -> Result<LandmarkRegistry, RegistryError> {
        LandmarkRegistry::load(&self.registry_paths).await
    }
}

/// Pick the instruction generator for a config.
///
/// Offline mode, or no `ANTHROPIC_API_KEY`, gives [`OfflineGuide`].
pub fn guide_from_config(config: &SessionConfig) -> Box<dyn InstructionGenerator> {
    if config.offline {
        info!("offline mode, using fallback instructions");
        return Box::new(OfflineGuide);
    }

    let client = match claude::Claude::from_env() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "no model client, using fallback instructions");
            return Box::new(OfflineGuide);
        }
    };
    let client = match &config.model {
        Some(model) => client.with_model(model),
        None => client,
    };

    Box::new(
        ClaudeGuide::new(client)
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature)
            .with_timeout(config.guide_timeout),
    )
}

/// What happened during one sampling tick.
#[derive(Debug)]
pub struct TickReport {
    pub matched: Option<SignMatch>,
    pub outcome: UpdateOutcome,
    /// Persistence failures; in-memory state already reflects the change.
    pub warnings: Vec<PersistError>,
}

impl TickReport {
    fn idle() -> Self {
        Self {
            matched: None,
            outcome: UpdateOutcome::Ignored,
            warnings: Vec::new(),
        }
    }
}

/// A guided walk from the building entrance to one destination.
pub struct NavigationSession {
    registry: LandmarkRegistry,
    lexicon: SignLexicon,
    history: InstructionHistory,
    guide: Box<dyn InstructionGenerator>,
    matcher: DetectionMatcher,
    navigator: Navigator,
    sampler: FrameSampler,
}

impl NavigationSession {
    /// Compose the route and load persisted state.
    ///
    /// Route errors are checked before any file is touched.
    pub async fn start(
        config: &SessionConfig,
        registry: LandmarkRegistry,
        destination: &LandmarkId,
        guide: Box<dyn InstructionGenerator>,
    ) -> Result<Self, SessionError> {
        let route = RouteComposer::new(&registry).compose(destination)?;

        let lexicon = SignLexicon::load(&config.lexicon_path, default_signs(&registry)).await?;
        let history =
            InstructionHistory::load(&config.history_path, config.history_capacity).await?;

        let navigator =
            Navigator::new(route, &registry).with_context_window(config.context_window);

        info!(
            destination = %destination,
            route = %navigator.route().describe(),
            guide = guide.name(),
            "navigation started"
        );

        Ok(Self {
            registry,
            lexicon,
            history,
            guide,
            matcher: DetectionMatcher::new(config.min_confidence),
            navigator,
            sampler: FrameSampler::new(config.sample_every),
        })
    }

    /// Run one update cycle: match the batch, then offer any hit to the
    /// navigator.
    pub async fn tick(&mut self, detections: &[Detection]) -> TickReport {
        let outcome = self.matcher.resolve(&mut self.lexicon, detections).await;
        let mut report = TickReport::idle();
        if let Some(e) = outcome.learn_error {
            warn!(error = %e, "could not persist sign lexicon");
            report.warnings.push(e);
        }

        let Some(matched) = outcome.matched else {
            return report;
        };

        let mut update = self
            .navigator
            .update(&matched.landmark, &*self.guide, &mut self.history)
            .await;
        if let UpdateOutcome::Advanced { persist_error, .. } = &mut update {
            if let Some(e) = persist_error.take() {
                report.warnings.push(e);
            }
        }

        report.matched = Some(matched);
        report.outcome = update;
        report
    }

    /// Count a frame and, on sampled frames, recognize and tick.
    ///
    /// Returns `None` for frames that are skipped. Recognizer failures are
    /// logged and treated as a tick with no detections.
    pub async fn observe_frame<R: TextRecognizer>(
        &mut self,
        frame: &R::Frame,
        recognizer: &mut R,
    ) -> Option<TickReport> {
        if !self.sampler.observe() {
            return None;
        }

        let detections: Vec<Detection> = match recognizer.recognize(frame) {
            Ok(regions) => regions.into_iter().map(Detection::from).collect(),
            Err(e) => {
                warn!(error = %e, "text recognition failed");
                Vec::new()
            }
        };
        Some(self.tick(&detections).await)
    }

    pub fn status(&self) -> NavigationStatus {
        self.navigator.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<NavigationStatus> {
        self.navigator.subscribe()
    }

    pub fn is_completed(&self) -> bool {
        self.navigator.is_completed()
    }

    pub fn route(&self) -> &ComposedRoute {
        self.navigator.route()
    }

    pub fn registry(&self) -> &LandmarkRegistry {
        &self.registry
    }

    pub fn lexicon(&self) -> &SignLexicon {
        &self.lexicon
    }

    pub fn history(&self) -> &InstructionHistory {
        &self.history
    }

    pub fn guide_name(&self) -> &str {
        self.guide.name()
    }
}
