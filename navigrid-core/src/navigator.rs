//! Route progress tracking.
//!
//! The navigator only moves forward, one waypoint at a time, and only when
//! the sighted landmark is exactly the next expected one. Its state is
//! published as a snapshot on a `watch` channel so readers never see a
//! half-applied transition.

use crate::guide::{FloorChange, GuideError, GuideRequest, InstructionGenerator};
use crate::history::{HistoryEntry, InstructionHistory, CONTEXT_WINDOW};
use crate::landmark::{FloorId, LandmarkId, LandmarkRegistry};
use crate::route::ComposedRoute;
use crate::store::PersistError;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Immutable view of navigation progress.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationStatus {
    pub step: usize,
    pub last_step: usize,
    pub current: LandmarkId,
    pub current_floor: FloorId,
    pub floor_label: String,
    /// Next expected landmark; `None` once completed.
    pub next: Option<LandmarkId>,
    pub destination: LandmarkId,
    pub completed: bool,
    pub last_instruction: String,
}

impl NavigationStatus {
    /// `"{step}/{last step}"`.
    pub fn progress(&self) -> String {
        format!("{}/{}", self.step, self.last_step)
    }
}

impl fmt::Display for NavigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.next {
            Some(next) if !self.completed => write!(
                f,
                "[{}] {} | → {} ({})",
                self.floor_label,
                self.current,
                next,
                self.progress()
            ),
            _ => write!(f, "Arrived at {}!", self.destination),
        }
    }
}

/// Where an instruction came from.
#[derive(Debug)]
pub enum InstructionSource {
    Generated,
    Fallback(GuideError),
}

/// Result of offering a sighted landmark to the navigator.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// Completed already, or not the next expected landmark.
    Ignored,
    Advanced {
        step: usize,
        landmark: LandmarkId,
        instruction: String,
        source: InstructionSource,
        /// The history entry was kept in memory but not written.
        persist_error: Option<PersistError>,
    },
    Arrived {
        landmark: LandmarkId,
        message: String,
    },
}

/// Instruction shown before the first sighting.
pub fn initial_instruction(next: &LandmarkId) -> String {
    format!("Walk straight down the corridor to {next}.")
}

/// Instruction used when the generator fails.
pub fn fallback_instruction(current: &LandmarkId, next: &LandmarkId) -> String {
    format!("Continue from {current} to {next}.")
}

pub fn arrival_message(destination: &LandmarkId) -> String {
    format!("You have arrived at {destination}!")
}

/// Forward-only progress tracker for one composed route.
#[derive(Debug)]
pub struct Navigator {
    route: ComposedRoute,
    floor_labels: HashMap<FloorId, String>,
    context_window: usize,
    state: watch::Sender<NavigationStatus>,
}

impl Navigator {
    /// Start at the first waypoint. A single-waypoint route is complete
    /// immediately.
    pub fn new(route: ComposedRoute, registry: &LandmarkRegistry) -> Self {
        let floor_labels: HashMap<FloorId, String> = registry
            .floors()
            .iter()
            .map(|f| (f.id.clone(), f.label.clone()))
            .collect();

        let start = route.start().clone();
        let destination = route.destination().landmark.clone();
        let (next, last_instruction) = match route.get(1) {
            Some(next) => (
                Some(next.landmark.clone()),
                initial_instruction(&next.landmark),
            ),
            None => (None, arrival_message(&destination)),
        };

        let (state, _) = watch::channel(NavigationStatus {
            step: 0,
            last_step: route.last_step(),
            floor_label: label_of(&floor_labels, &start.floor),
            current: start.landmark,
            current_floor: start.floor,
            completed: next.is_none(),
            next,
            destination,
            last_instruction,
        });

        Self {
            route,
            floor_labels,
            context_window: CONTEXT_WINDOW,
            state,
        }
    }

    /// How many history entries the generator sees.
    pub fn with_context_window(mut self, entries: usize) -> Self {
        self.context_window = entries;
        self
    }

    pub fn route(&self) -> &ComposedRoute {
        &self.route
    }

    /// Current snapshot.
    pub fn status(&self) -> NavigationStatus {
        self.state.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<NavigationStatus> {
        self.state.subscribe()
    }

    pub fn is_completed(&self) -> bool {
        self.state.borrow().completed
    }

    /// The landmark that would advance the route.
    pub fn expected(&self) -> Option<LandmarkId> {
        let status = self.state.borrow();
        if status.completed {
            return None;
        }
        self.route.get(status.step + 1).map(|w| w.landmark.clone())
    }

    fn floor_label(&self, floor: &FloorId) -> String {
        label_of(&self.floor_labels, floor)
    }

    /// Offer a sighted landmark.
    ///
    /// Anything other than the next expected landmark is ignored. On an
    /// advance to a non-final waypoint the generator is asked for the next
    /// instruction; generated text is appended to `history`, fallback text is
    /// not.
    pub async fn update<G: InstructionGenerator + ?Sized>(
        &mut self,
        candidate: &LandmarkId,
        guide: &G,
        history: &mut InstructionHistory,
    ) -> UpdateOutcome {
        let current = self.status();
        if current.completed {
            debug!(landmark = %candidate, "sighting after arrival ignored");
            return UpdateOutcome::Ignored;
        }

        let step = current.step + 1;
        let Some(waypoint) = self.route.get(step).cloned() else {
            return UpdateOutcome::Ignored;
        };
        if &waypoint.landmark != candidate {
            debug!(
                landmark = %candidate,
                expected = %waypoint.landmark,
                "out-of-order sighting ignored"
            );
            return UpdateOutcome::Ignored;
        }

        let floor_label = self.floor_label(&waypoint.floor);
        info!(
            step,
            landmark = %waypoint.landmark,
            floor = %waypoint.floor,
            "reached waypoint"
        );

        let Some(upcoming) = self.route.get(step + 1).cloned() else {
            let message = arrival_message(&waypoint.landmark);
            self.state.send_replace(NavigationStatus {
                step,
                current: waypoint.landmark.clone(),
                current_floor: waypoint.floor,
                floor_label,
                next: None,
                completed: true,
                last_instruction: message.clone(),
                ..current
            });
            info!(destination = %waypoint.landmark, "arrived");
            return UpdateOutcome::Arrived {
                landmark: waypoint.landmark,
                message,
            };
        };

        let progress = format!("{}/{}", step, self.route.last_step());
        // The junction waypoint already carries the destination floor.
        let floor_change = self
            .route
            .get(step - 1)
            .filter(|previous| previous.floor != waypoint.floor)
            .map(|previous| FloorChange {
                from: self.floor_label(&previous.floor),
                to: floor_label.clone(),
                via: waypoint.landmark.clone(),
            });

        let request = GuideRequest {
            current: waypoint.landmark.clone(),
            next: upcoming.landmark.clone(),
            floor: waypoint.floor.clone(),
            floor_label: floor_label.clone(),
            floor_change,
            progress: progress.clone(),
            history: history.recent(self.context_window).to_vec(),
        };

        let (instruction, source, persist_error) = match guide.generate(&request).await {
            Ok(text) => {
                let entry = HistoryEntry {
                    current: waypoint.landmark.clone(),
                    next: upcoming.landmark.clone(),
                    instruction: text.clone(),
                    progress,
                };
                let persist_error = history.record(entry).await.err();
                if let Some(e) = &persist_error {
                    warn!(error = %e, "could not persist instruction history");
                }
                (text, InstructionSource::Generated, persist_error)
            }
            Err(e) => {
                warn!(guide = guide.name(), error = %e, "using fallback instruction");
                (
                    fallback_instruction(&waypoint.landmark, &upcoming.landmark),
                    InstructionSource::Fallback(e),
                    None,
                )
            }
        };

        self.state.send_replace(NavigationStatus {
            step,
            current: waypoint.landmark.clone(),
            current_floor: waypoint.floor,
            floor_label,
            next: Some(upcoming.landmark),
            last_instruction: instruction.clone(),
            ..current
        });

        UpdateOutcome::Advanced {
            step,
            landmark: waypoint.landmark,
            instruction,
            source,
            persist_error,
        }
    }
}

fn label_of(labels: &HashMap<FloorId, String>, floor: &FloorId) -> String {
    labels
        .get(floor)
        .cloned()
        .unwrap_or_else(|| floor.to_string())
}
