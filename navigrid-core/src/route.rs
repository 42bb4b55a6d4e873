//! Route composition across one or two floors.
//!
//! Each floor has exactly one canonical walking order, so a route is a prefix
//! of the start floor's order, optionally spliced at a junction landmark onto
//! a slice of the destination floor's order. No path search is performed.

use crate::landmark::{Floor, FloorId, LandmarkId, LandmarkRegistry};
use thiserror::Error;

/// Errors from route composition. All are fatal for the session being set up.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("unknown destination '{0}'")]
    UnknownDestination(LandmarkId),

    #[error("destination '{0}' is not on any floor's canonical route")]
    NotOnRoute(LandmarkId),

    #[error("no junction connects floor '{from}' to '{to}' before '{destination}'")]
    NoJunction {
        from: FloorId,
        to: FloorId,
        destination: LandmarkId,
    },
}

/// One stop on a composed route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waypoint {
    pub landmark: LandmarkId,
    /// Floor the walker is on when standing at this waypoint.
    pub floor: FloorId,
}

/// Ordered waypoints for one navigation session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedRoute {
    waypoints: Vec<Waypoint>,
    junction: Option<usize>,
}

impl ComposedRoute {
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, step: usize) -> Option<&Waypoint> {
        self.waypoints.get(step)
    }

    /// Index of the last waypoint.
    pub fn last_step(&self) -> usize {
        self.waypoints.len().saturating_sub(1)
    }

    pub fn start(&self) -> &Waypoint {
        &self.waypoints[0]
    }

    pub fn destination(&self) -> &Waypoint {
        &self.waypoints[self.last_step()]
    }

    pub fn crosses_floors(&self) -> bool {
        self.junction.is_some()
    }

    /// Index of the splice landmark for multi-floor routes.
    pub fn junction_step(&self) -> Option<usize> {
        self.junction
    }

    pub fn landmark_ids(&self) -> impl Iterator<Item = &LandmarkId> {
        self.waypoints.iter().map(|w| &w.landmark)
    }

    /// `a → b → c` rendering for operator output.
    pub fn describe(&self) -> String {
        self.landmark_ids()
            .map(LandmarkId::as_str)
            .collect::<Vec<_>>()
            .join(" → ")
    }
}

/// Builds routes from the registry's canonical floor orders.
#[derive(Debug, Clone, Copy)]
pub struct RouteComposer<'a> {
    registry: &'a LandmarkRegistry,
}

impl<'a> RouteComposer<'a> {
    pub fn new(registry: &'a LandmarkRegistry) -> Self {
        Self { registry }
    }

    /// Compose the route from the fixed start to `destination`.
    pub fn compose(&self, destination: &LandmarkId) -> Result<ComposedRoute, RouteError> {
        if !self.registry.contains(destination) {
            return Err(RouteError::UnknownDestination(destination.clone()));
        }

        let start_floor = self.registry.start_floor();
        if let Some(index) = start_floor.position(destination) {
            return Ok(ComposedRoute {
                waypoints: waypoints_on(start_floor, &start_floor.route[..=index]),
                junction: None,
            });
        }

        let target_floor = self
            .registry
            .floors_routing(destination)
            .next()
            .ok_or_else(|| RouteError::NotOnRoute(destination.clone()))?;
        let target_index = target_floor
            .position(destination)
            .ok_or_else(|| RouteError::NotOnRoute(destination.clone()))?;

        let (start_index, splice_index) = start_floor
            .route
            .iter()
            .enumerate()
            .find_map(|(i, id)| {
                target_floor
                    .position(id)
                    .filter(|&j| j <= target_index)
                    .map(|j| (i, j))
            })
            .ok_or_else(|| RouteError::NoJunction {
                from: start_floor.id.clone(),
                to: target_floor.id.clone(),
                destination: destination.clone(),
            })?;

        // The junction itself is reached on the way up, so it is recorded on
        // the destination floor.
        let mut waypoints = waypoints_on(start_floor, &start_floor.route[..start_index]);
        waypoints.extend(waypoints_on(
            target_floor,
            &target_floor.route[splice_index..=target_index],
        ));

        Ok(ComposedRoute {
            waypoints,
            junction: Some(start_index),
        })
    }
}

fn waypoints_on(floor: &Floor, ids: &[LandmarkId]) -> Vec<Waypoint> {
    ids.iter()
        .map(|id| Waypoint {
            landmark: id.clone(),
            floor: floor.id.clone(),
        })
        .collect()
}
