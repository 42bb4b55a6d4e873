//! Integration tests that call the real Claude API.
//!
//! These tests require ANTHROPIC_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p navigrid-core --test api_integration -- --ignored`
//!
//! These are marked #[ignore] by default to avoid API costs in CI and
//! failures when no key is available.

use navigrid_core::guide::{FloorChange, GuideRequest};
use navigrid_core::history::HistoryEntry;
use navigrid_core::navigator::{InstructionSource, UpdateOutcome};
use navigrid_core::testing::sighting;
use navigrid_core::{guide_from_config, ClaudeGuide, InstructionGenerator, TestHarness};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

#[tokio::test]
#[ignore] // Run with: cargo test -p navigrid-core --test api_integration -- --ignored
async fn test_claude_generates_floor_change_instruction() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let guide = ClaudeGuide::from_env().expect("Failed to create guide");
    let request = GuideRequest {
        current: "stairs".into(),
        next: "125".into(),
        floor: "floor1".into(),
        floor_label: "Floor 1".into(),
        floor_change: Some(FloorChange {
            from: "Lower Level".into(),
            to: "Floor 1".into(),
            via: "stairs".into(),
        }),
        progress: "3/6".into(),
        history: vec![HistoryEntry {
            current: "room_040".into(),
            next: "stairs".into(),
            instruction: "The stairs are just past Room 040.".into(),
            progress: "2/6".into(),
        }],
    };

    let instruction = guide
        .generate(&request)
        .await
        .expect("Claude should respond");
    println!("Instruction: {instruction}");

    assert!(!instruction.is_empty());
    assert_eq!(instruction, instruction.trim());
}

#[tokio::test]
#[ignore]
async fn test_session_with_live_guide() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let harness = TestHarness::new();
    let config = harness.config().offline(false);
    let guide = guide_from_config(&config);
    assert_ne!(guide.name(), "offline");

    let mut session = harness.start_with(config, "room_040", guide).await;
    let report = session.tick(&sighting("Room 045")).await;

    match report.outcome {
        UpdateOutcome::Advanced {
            instruction,
            source,
            ..
        } => {
            println!("Instruction: {instruction}");
            assert!(matches!(source, InstructionSource::Generated));
            assert_eq!(session.history().len(), 1);
        }
        other => panic!("expected an advance, got {other:?}"),
    }
}
