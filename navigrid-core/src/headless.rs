//! Line protocol for driving a session without a camera.
//!
//! Each input line is one sampling tick: `;`-separated detections written as
//! `text@confidence` (confidence defaults to 1.0). Lines starting with `#`
//! are commands. Output lines carry a bracketed tag so scripts can parse
//! them.

use crate::guide::GuideError;
use crate::matcher::Detection;
use crate::navigator::{InstructionSource, NavigationStatus, UpdateOutcome};
use crate::route::ComposedRoute;
use crate::session::TickReport;

/// Commands available on the line protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Route,
    Help,
    Quit,
    Unknown(String),
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Blank,
    Command(Command),
    Detections(Vec<Detection>),
}

pub const HELP: &str = "\
[HELP]
  text@0.9;other text@0.5 - one tick of detections (confidence defaults to 1.0)
  #status                  - show current progress
  #route                   - show the full route
  #help                    - show this help
  #quit                    - stop navigating";

/// Parse one input line.
pub fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }

    if let Some(command) = line.strip_prefix('#') {
        let word = command.split_whitespace().next().unwrap_or("");
        return Input::Command(match word.to_ascii_lowercase().as_str() {
            "status" => Command::Status,
            "route" => Command::Route,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(word.to_string()),
        });
    }

    Input::Detections(line.split(';').filter_map(parse_detection).collect())
}

/// Parse `text@confidence`. A trailing `@...` that is not a number is part
/// of the text.
fn parse_detection(item: &str) -> Option<Detection> {
    let item = item.trim();
    if item.is_empty() {
        return None;
    }

    if let Some((text, confidence)) = item.rsplit_once('@') {
        if let Ok(confidence) = confidence.trim().parse::<f32>() {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            return Some(Detection::new(text, confidence.clamp(0.0, 1.0)));
        }
    }
    Some(Detection::new(item, 1.0))
}

/// Tagged output lines for one tick.
pub fn render_report(report: &TickReport) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(matched) = &report.matched {
        lines.push(format!(
            "[MATCH] {} ← \"{}\" ({:.2})",
            matched.landmark, matched.text, matched.confidence
        ));
    }
    for warning in &report.warnings {
        lines.push(format!("[WARN] {warning}"));
    }

    match &report.outcome {
        UpdateOutcome::Ignored => {}
        UpdateOutcome::Advanced {
            step,
            landmark,
            instruction,
            source,
            ..
        } => {
            lines.push(format!("[STEP] {step} {landmark}"));
            match source {
                InstructionSource::Fallback(GuideError::Unavailable) => {}
                InstructionSource::Fallback(reason) => {
                    lines.push(format!("[WARN] instruction generator failed: {reason}"));
                }
                InstructionSource::Generated => {}
            }
            lines.push(format!("[GUIDE] {instruction}"));
        }
        UpdateOutcome::Arrived { message, .. } => {
            lines.push(format!("[ARRIVED] {message}"));
        }
    }
    lines
}

pub fn render_status(status: &NavigationStatus) -> String {
    format!("[STATUS] {status}")
}

pub fn render_route(route: &ComposedRoute) -> String {
    format!("[STATUS] route: {}", route.describe())
}
