//! Sign-driven indoor navigation.
//!
//! This crate provides:
//! - A landmark registry with one canonical walking order per floor
//! - Route composition across floors at a shared junction landmark
//! - A persisted sign lexicon that learns new phrases as signs are read
//! - A forward-only route tracker with AI-generated walking instructions
//! - A line protocol for driving sessions from scripts
//!
//! # Quick Start
//!
//! ```ignore
//! use navigrid_core::{guide_from_config, NavigationSession, SessionConfig};
//! use navigrid_core::matcher::Detection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new()
//!         .with_registry("building.json")
//!         .with_env_overrides();
//!     let registry = config.load_registry().await?;
//!     let guide = guide_from_config(&config);
//!
//!     let mut session =
//!         NavigationSession::start(&config, registry, &"room_040".into(), guide).await?;
//!
//!     let report = session.tick(&[Detection::new("Room 045", 0.93)]).await;
//!     println!("{}", session.status().last_instruction);
//!     Ok(())
//! }
//! ```

pub mod guide;
pub mod headless;
pub mod history;
pub mod landmark;
pub mod lexicon;
pub mod matcher;
pub mod menu;
pub mod navigator;
pub mod recognition;
pub mod route;
pub mod seed;
pub mod session;
pub mod store;
pub mod testing;

// Primary public API
pub use guide::{ClaudeGuide, GuideError, InstructionGenerator, OfflineGuide};
pub use landmark::{FloorId, LandmarkId, LandmarkRegistry, RegistryError};
pub use menu::{ChoiceError, DestinationMenu};
pub use navigator::{NavigationStatus, UpdateOutcome};
pub use route::{ComposedRoute, RouteComposer, RouteError};
pub use session::{guide_from_config, NavigationSession, SessionConfig, SessionError, TickReport};
pub use store::PersistError;
pub use testing::{FailingGuide, ScriptedGuide, TestHarness};
