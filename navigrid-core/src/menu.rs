//! Destination selection.

use crate::landmark::{FloorId, LandmarkId, LandmarkRegistry};
use crate::route::RouteComposer;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Rejected menu input. The caller should prompt again.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChoiceError {
    #[error("please enter a number")]
    NotANumber,

    #[error("choose a number between 1 and {max}")]
    OutOfRange { max: usize },
}

/// One selectable destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub id: LandmarkId,
    pub label: String,
    pub floor: FloorId,
    pub floor_label: String,
}

/// Numbered list of reachable destinations.
#[derive(Debug, Clone)]
pub struct DestinationMenu {
    entries: Vec<Destination>,
}

impl DestinationMenu {
    /// Every routed landmark except the start, each id once, start floor
    /// first, then the remaining floors in declaration order. Landmarks no
    /// route can be composed to are left out.
    pub fn from_registry(registry: &LandmarkRegistry) -> Self {
        let composer = RouteComposer::new(registry);
        let start_floor = registry.start_floor();
        let floors = std::iter::once(start_floor).chain(
            registry
                .floors()
                .iter()
                .filter(|f| f.id != start_floor.id),
        );

        let mut seen: HashSet<&LandmarkId> = HashSet::new();
        seen.insert(registry.start());

        let mut entries = Vec::new();
        for floor in floors {
            for id in &floor.route {
                if !seen.insert(id) {
                    continue;
                }
                if let Err(e) = composer.compose(id) {
                    debug!(landmark = %id, error = %e, "unreachable destination left off the menu");
                    continue;
                }
                let label = registry
                    .landmark(&floor.id, id)
                    .map(|l| l.display_name().to_string())
                    .unwrap_or_else(|| id.to_string());
                entries.push(Destination {
                    id: id.clone(),
                    label,
                    floor: floor.id.clone(),
                    floor_label: floor.label.clone(),
                });
            }
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[Destination] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a 1-based menu choice.
    pub fn choose(&self, input: &str) -> Result<&Destination, ChoiceError> {
        let n: usize = input.trim().parse().map_err(|_| ChoiceError::NotANumber)?;
        n.checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .ok_or(ChoiceError::OutOfRange {
                max: self.entries.len(),
            })
    }

    /// Look a destination up by landmark id.
    pub fn find(&self, id: &LandmarkId) -> Option<&Destination> {
        self.entries.iter().find(|d| &d.id == id)
    }
}

impl fmt::Display for DestinationMenu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            writeln!(f, "{}. {} [{}]", i + 1, entry.label, entry.floor_label)?;
        }
        Ok(())
    }
}
