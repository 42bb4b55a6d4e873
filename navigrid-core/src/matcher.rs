//! Resolve one tick's text detections to at most one landmark.

use crate::landmark::LandmarkId;
use crate::lexicon::{normalize, SignLexicon};
use crate::store::PersistError;
use tracing::debug;

/// Default minimum recognizer confidence; comparison is strictly greater.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.4;

/// A recognized piece of text with its confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub text: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// A detection that resolved to a landmark.
#[derive(Debug, Clone, PartialEq)]
pub struct SignMatch {
    pub landmark: LandmarkId,
    /// The detection text as recognized, before normalization.
    pub text: String,
    pub confidence: f32,
}

/// Result of matching one batch.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matched: Option<SignMatch>,
    /// Set when the match was learned in memory but could not be persisted.
    pub learn_error: Option<PersistError>,
}

/// Scans detections against the lexicon in order; the first hit wins.
#[derive(Debug, Clone, Copy)]
pub struct DetectionMatcher {
    min_confidence: f32,
}

impl Default for DetectionMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}

impl DetectionMatcher {
    pub fn new(min_confidence: f32) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// Find the first lexicon phrase contained in a detection's text.
    ///
    /// Detections are tried in the given order and, for each, phrases in
    /// lexicon insertion order. This does not touch the lexicon.
    pub fn find(&self, lexicon: &SignLexicon, detections: &[Detection]) -> Option<SignMatch> {
        detections
            .iter()
            .filter(|d| d.confidence > self.min_confidence)
            .find_map(|detection| {
                let text = normalize(&detection.text);
                lexicon
                    .entries()
                    .iter()
                    .find(|(phrase, _)| text.contains(phrase.as_str()))
                    .map(|(_, landmark)| SignMatch {
                        landmark: landmark.clone(),
                        text: detection.text.clone(),
                        confidence: detection.confidence,
                    })
            })
    }

    /// Match a batch and learn the full text of a hit as a new phrase.
    pub async fn resolve(
        &self,
        lexicon: &mut SignLexicon,
        detections: &[Detection],
    ) -> MatchOutcome {
        let Some(matched) = self.find(lexicon, detections) else {
            if !detections.is_empty() {
                debug!(detections = detections.len(), "no sign matched");
            }
            return MatchOutcome::default();
        };

        debug!(
            landmark = %matched.landmark,
            text = %matched.text,
            confidence = matched.confidence,
            "sign matched"
        );

        let learn_error = lexicon
            .insert(&matched.text, &matched.landmark)
            .await
            .err();

        MatchOutcome {
            matched: Some(matched),
            learn_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lexicon(dir: &TempDir, pairs: &[(&str, &str)]) -> SignLexicon {
        SignLexicon::with_entries(
            dir.path().join("sign_map.json"),
            pairs
                .iter()
                .map(|(p, id)| (p.to_string(), LandmarkId::from(*id))),
        )
    }

    #[tokio::test]
    async fn test_substring_match_learns_full_text() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut lexicon = lexicon(&dir, &[("045", "room_045")]);
        let matcher = DetectionMatcher::default();

        let outcome = matcher
            .resolve(&mut lexicon, &[Detection::new("Room 045", 0.9)])
            .await;

        let matched = outcome.matched.unwrap();
        assert_eq!(matched.landmark, LandmarkId::from("room_045"));
        assert_eq!(matched.text, "Room 045");
        assert!(outcome.learn_error.is_none());
        assert_eq!(lexicon.get("room 045"), Some(&LandmarkId::from("room_045")));
    }

    #[tokio::test]
    async fn test_threshold_is_strict() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut lexicon = lexicon(&dir, &[("045", "room_045")]);
        let matcher = DetectionMatcher::default();

        let outcome = matcher
            .resolve(&mut lexicon, &[Detection::new("045", 0.4)])
            .await;
        assert!(outcome.matched.is_none());
        assert_eq!(lexicon.len(), 1);
    }

    #[tokio::test]
    async fn test_first_detection_wins() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut lexicon = lexicon(&dir, &[("045", "room_045"), ("040", "room_040")]);
        let matcher = DetectionMatcher::default();

        let outcome = matcher
            .resolve(
                &mut lexicon,
                &[
                    Detection::new("Exit 040", 0.3),
                    Detection::new("Lab 040", 0.8),
                    Detection::new("Room 045", 0.99),
                ],
            )
            .await;
        assert_eq!(
            outcome.matched.unwrap().landmark,
            LandmarkId::from("room_040")
        );
    }

    #[test]
    fn test_insertion_order_breaks_ties() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let lexicon = lexicon(&dir, &[("stair", "stairs"), ("040", "room_040")]);
        let matcher = DetectionMatcher::default();

        let found = matcher
            .find(&lexicon, &[Detection::new("040 near stairwell", 0.9)])
            .unwrap();
        assert_eq!(found.landmark, LandmarkId::from("stairs"));
    }

    #[test]
    fn test_configured_threshold() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let lexicon = lexicon(&dir, &[("exit", "exit")]);
        let matcher = DetectionMatcher::new(0.8);

        assert!(matcher
            .find(&lexicon, &[Detection::new("EXIT", 0.75)])
            .is_none());
        assert!(matcher
            .find(&lexicon, &[Detection::new("EXIT", 0.81)])
            .is_some());
    }

    #[test]
    fn test_empty_batch() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let lexicon = lexicon(&dir, &[("exit", "exit")]);
        assert!(DetectionMatcher::default().find(&lexicon, &[]).is_none());
    }
}
