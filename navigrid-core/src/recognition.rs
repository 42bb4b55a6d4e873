//! Frame sampling and the text-recognition boundary.
//!
//! Recognition is expensive, so only every k-th frame is handed to the
//! recognizer. The recognizer itself lives outside this crate.

use crate::matcher::Detection;

/// Default sampling interval in frames.
pub const DEFAULT_SAMPLE_EVERY: u32 = 5;

/// Fires on every k-th observed frame.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    every: u32,
    seen: u64,
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_EVERY)
    }
}

impl FrameSampler {
    /// `every == 0` is treated as 1.
    pub fn new(every: u32) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }

    /// Count one frame; true when this frame should be recognized.
    pub fn observe(&mut self) -> bool {
        self.seen += 1;
        self.seen % u64::from(self.every) == 0
    }

    pub fn every(&self) -> u32 {
        self.every
    }

    pub fn frames_seen(&self) -> u64 {
        self.seen
    }
}

/// A piece of text found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    /// Corner points, clockwise from top-left.
    pub quad: [(f32, f32); 4],
    pub text: String,
    pub confidence: f32,
}

impl From<TextRegion> for Detection {
    fn from(region: TextRegion) -> Self {
        Detection::new(region.text, region.confidence)
    }
}

/// Finds text in a frame.
pub trait TextRecognizer {
    type Frame;
    type Error: std::error::Error + Send + Sync + 'static;

    fn recognize(&mut self, frame: &Self::Frame) -> Result<Vec<TextRegion>, Self::Error>;
}
