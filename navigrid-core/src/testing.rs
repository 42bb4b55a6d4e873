//! Testing utilities for navigation sessions.
//!
//! This module provides tools for integration testing:
//! - `ScriptedGuide` and `FailingGuide` for deterministic runs without API calls
//! - `ScriptedRecognizer` for frame-driven sessions without a camera
//! - `TestHarness` for sessions backed by a temporary directory
//! - A bundled two-floor sample building

use crate::guide::{GuideError, GuideRequest, InstructionGenerator};
use crate::landmark::{LandmarkId, LandmarkRegistry, RegistryFile};
use crate::matcher::Detection;
use crate::recognition::{TextRecognizer, TextRegion};
use crate::session::{NavigationSession, SessionConfig};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use thiserror::Error;

/// Registry JSON for the sample building: a lower level and floor 1 joined
/// at the stairs.
pub const SAMPLE_BUILDING: &str = include_str!("../data/sample_building.json");

/// The sample building as a registry.
///
/// Panics if the bundled JSON is invalid.
pub fn sample_registry() -> LandmarkRegistry {
    let file: RegistryFile =
        serde_json::from_str(SAMPLE_BUILDING).expect("bundled sample building is valid JSON");
    LandmarkRegistry::from_files(vec![file]).expect("bundled sample building is a valid registry")
}

/// A generator that returns scripted instructions in order.
///
/// Once the script runs out every call fails with `Unavailable`. Every
/// request is recorded for later inspection.
#[derive(Debug, Default)]
pub struct ScriptedGuide {
    script: Mutex<VecDeque<Result<String, ()>>>,
    requests: Mutex<Vec<GuideRequest>>,
}

impl ScriptedGuide {
    pub fn new<I, S>(instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(instructions.into_iter().map(|s| Ok(s.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue an instruction.
    pub fn then(self, instruction: impl Into<String>) -> Self {
        self.lock_script().push_back(Ok(instruction.into()));
        self
    }

    /// Queue a failure.
    pub fn then_fail(self) -> Self {
        self.lock_script().push_back(Err(()));
        self
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.lock_requests().len()
    }

    /// Every request seen, in order.
    pub fn requests(&self) -> Vec<GuideRequest> {
        self.lock_requests().clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, ()>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_requests(&self) -> std::sync::MutexGuard<'_, Vec<GuideRequest>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl InstructionGenerator for ScriptedGuide {
    async fn generate(&self, request: &GuideRequest) -> Result<String, GuideError> {
        self.lock_requests().push(request.clone());
        match self.lock_script().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(())) => Err(GuideError::Timeout),
            None => Err(GuideError::Unavailable),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A generator that always times out.
#[derive(Debug, Default)]
pub struct FailingGuide {
    calls: AtomicUsize,
}

impl FailingGuide {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstructionGenerator for FailingGuide {
    async fn generate(&self, _request: &GuideRequest) -> Result<String, GuideError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GuideError::Timeout)
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Error returned by [`ScriptedRecognizer`] for a queued failure.
#[derive(Debug, Error)]
#[error("recognition failed: {0}")]
pub struct RecognitionFailure(pub String);

/// A recognizer that replays scripted readings, one per recognized frame.
///
/// Frames are plain frame numbers. Every frame handed to `recognize` is
/// recorded; once the script runs out frames read as empty.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    script: VecDeque<Result<Vec<TextRegion>, String>>,
    frames: Vec<u32>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame that reads `texts`, each with high confidence.
    pub fn then_read(mut self, texts: &[&str]) -> Self {
        let regions = texts
            .iter()
            .map(|text| TextRegion {
                quad: [(0.0, 0.0), (100.0, 0.0), (100.0, 30.0), (0.0, 30.0)],
                text: (*text).to_string(),
                confidence: 0.9,
            })
            .collect();
        self.script.push_back(Ok(regions));
        self
    }

    /// Queue a failed recognition.
    pub fn then_fail(mut self, reason: impl Into<String>) -> Self {
        self.script.push_back(Err(reason.into()));
        self
    }

    /// Frame numbers that reached the recognizer.
    pub fn frames(&self) -> &[u32] {
        &self.frames
    }
}

impl TextRecognizer for ScriptedRecognizer {
    type Frame = u32;
    type Error = RecognitionFailure;

    fn recognize(&mut self, frame: &u32) -> Result<Vec<TextRegion>, RecognitionFailure> {
        self.frames.push(*frame);
        match self.script.pop_front() {
            Some(Ok(regions)) => Ok(regions),
            Some(Err(reason)) => Err(RecognitionFailure(reason)),
            None => Ok(Vec::new()),
        }
    }
}

/// One detection with high confidence.
pub fn sighting(text: &str) -> Vec<Detection> {
    vec![Detection::new(text, 0.9)]
}

/// Sessions over the sample building with state files in a temp directory.
pub struct TestHarness {
    dir: TempDir,
    registry: LandmarkRegistry,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_registry(sample_registry())
    }

    pub fn with_registry(registry: LandmarkRegistry) -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            registry,
        }
    }

    pub fn lexicon_path(&self) -> PathBuf {
        self.dir.path().join("sign_map.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.path().join("guide_history.json")
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    pub fn registry(&self) -> &LandmarkRegistry {
        &self.registry
    }

    /// Offline config pointing at this harness's files.
    pub fn config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_lexicon_path(self.lexicon_path())
            .with_history_path(self.history_path())
            .offline(true)
    }

    /// Start a session to `destination`. Panics on start errors.
    pub async fn start(
        &self,
        destination: &str,
        guide: impl InstructionGenerator + 'static,
    ) -> NavigationSession {
        self.start_with(self.config(), destination, guide).await
    }

    pub async fn start_with(
        &self,
        config: SessionConfig,
        destination: &str,
        guide: impl InstructionGenerator + 'static,
    ) -> NavigationSession {
        NavigationSession::start(
            &config,
            self.registry.clone(),
            &LandmarkId::from(destination),
            Box::new(guide),
        )
        .await
        .expect("session should start")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert the session is on `expected`.
pub fn assert_at(session: &NavigationSession, expected: &str) {
    let status = session.status();
    assert_eq!(
        status.current.as_str(),
        expected,
        "Expected to be at {expected}, but at {}",
        status.current
    );
}

/// Assert the session has arrived.
pub fn assert_arrived(session: &NavigationSession) {
    assert!(session.is_completed(), "Expected navigation to be complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sample_registry_shape() {
        let registry = sample_registry();
        assert_eq!(registry.floors().len(), 2);
        assert_eq!(registry.start(), &LandmarkId::from("entrance"));
        assert_eq!(registry.declared_signs().len(), 13);
    }

    #[tokio::test]
    async fn test_scripted_guide_runs_out() {
        let guide = ScriptedGuide::new(["one"]).then_fail().then("three");
        let harness = TestHarness::new();
        let guide = Arc::new(guide);
        let mut session = harness.start("130", guide.clone()).await;

        session.tick(&sighting("Room 045")).await;
        session.tick(&sighting("Room 040")).await;
        session.tick(&sighting("Stairs up")).await;
        session.tick(&sighting("Room 125")).await;

        assert_eq!(guide.calls(), 4);
        assert_at(&session, "125");
        // "one" and "three" were generated; the failure and the exhausted
        // script fell back.
        assert_eq!(session.history().len(), 2);
    }
}
