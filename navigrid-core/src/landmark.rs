//! Landmark registry: the static, per-floor set of landmarks for a building.
//!
//! A registry is assembled from one or more JSON node maps. Each floor's
//! canonical walking order is either declared in a `routes` table or derived
//! from the nodes' `order` fields. A floor whose nodes carry no `order` at all
//! is walked bottom to top, by descending `y`. The registry is loaded once at
//! startup and is immutable afterwards.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Errors raised while loading or validating a registry. All are fatal.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("cannot read registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("registry declares no floors")]
    Empty,

    #[error("landmark '{0}' has no floor and its file declares no default floor")]
    MissingFloor(String),

    #[error("landmark '{id}' is declared twice on floor '{floor}'")]
    DuplicateLandmark { floor: FloorId, id: LandmarkId },

    #[error("route for floor '{floor}' names unknown landmark '{id}'")]
    UnknownRouteLandmark { floor: FloorId, id: LandmarkId },

    #[error("route for floor '{floor}' visits '{id}' twice")]
    RepeatedRouteLandmark { floor: FloorId, id: LandmarkId },

    #[error("floor '{floor}' gives order {order} to both '{first}' and '{second}'")]
    DuplicateOrder {
        floor: FloorId,
        order: u32,
        first: LandmarkId,
        second: LandmarkId,
    },

    #[error("start floor '{0}' has no canonical route")]
    NoStartRoute(FloorId),
}

/// Stable identifier of a landmark, e.g. `room_045`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkId(String);

impl LandmarkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LandmarkId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for LandmarkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for LandmarkId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for LandmarkId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Identifier of a floor, e.g. `lower` or `floor1`.
///
/// Floors are declared by registry data, so this is a string newtype rather
/// than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FloorId(String);

impl FloorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FloorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FloorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Axis-aligned box in floorplan pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// A physical location in the building.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub id: LandmarkId,
    pub floor: FloorId,
    pub x: f64,
    pub y: f64,
    pub bounds: BoundingBox,
    /// Human-readable name for menus; falls back to the id.
    pub label: Option<String>,
}

impl Landmark {
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(self.id.as_str())
    }
}

/// A floor with its canonical walking order.
#[derive(Debug, Clone)]
pub struct Floor {
    pub id: FloorId,
    pub label: String,
    /// The single allowed walking order on this floor. Empty only for a
    /// floor with no nodes.
    pub route: Vec<LandmarkId>,
}

impl Floor {
    pub fn position(&self, id: &LandmarkId) -> Option<usize> {
        self.route.iter().position(|r| r == id)
    }
}

// ============================================================================
// On-disk format
// ============================================================================

/// One registry file as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    /// Default floor for nodes that omit one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<FloorId>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub floors: Vec<FloorSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_floor: Option<FloorId>,

    /// Explicit canonical routes; take precedence over node `order` fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routes: BTreeMap<FloorId, Vec<LandmarkId>>,

    pub nodes: Vec<NodeRecord>,
}

/// Floor declaration in a registry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorSpec {
    pub id: FloorId,
    #[serde(default)]
    pub label: Option<String>,
}

/// A landmark node as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: LandmarkId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<FloorId>,
    pub x: f64,
    pub y: f64,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Sign phrases that identify this landmark; seeds the sign lexicon.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signs: Vec<String>,
}

// ============================================================================
// Registry
// ============================================================================

/// The immutable landmark registry for one building.
#[derive(Debug, Clone)]
pub struct LandmarkRegistry {
    floors: Vec<Floor>,
    landmarks: HashMap<(FloorId, LandmarkId), Landmark>,
    start_floor: FloorId,
    signs: Vec<(String, LandmarkId)>,
}

impl LandmarkRegistry {
    /// Load and merge registry files.
    pub async fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, RegistryError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let content = fs::read_to_string(path)
                .await
                .map_err(|source| RegistryError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            let file: RegistryFile =
                serde_json::from_str(&content).map_err(|source| RegistryError::Json {
                    path: path.to_path_buf(),
                    source,
                })?;
            files.push(file);
        }

        let registry = Self::from_files(files)?;
        info!(
            floors = registry.floors.len(),
            landmarks = registry.landmarks.len(),
            start_floor = %registry.start_floor,
            "loaded landmark registry"
        );
        Ok(registry)
    }

    /// Build a registry from already-parsed files.
    pub fn from_files(files: Vec<RegistryFile>) -> Result<Self, RegistryError> {
        if files.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut floor_order: Vec<FloorId> = Vec::new();
        let mut labels: HashMap<FloorId, String> = HashMap::new();
        let mut landmarks = HashMap::new();
        let mut ordered: HashMap<FloorId, Vec<(u32, LandmarkId)>> = HashMap::new();
        let mut positioned: HashMap<FloorId, Vec<(f64, LandmarkId)>> = HashMap::new();
        let mut explicit: HashMap<FloorId, Vec<LandmarkId>> = HashMap::new();
        let mut signs = Vec::new();
        let mut start_floor = None;

        for file in files {
            if start_floor.is_none() {
                start_floor = file.start_floor.clone();
            }
            for spec in &file.floors {
                note_floor(&spec.id, &mut floor_order);
                if let Some(label) = &spec.label {
                    labels.insert(spec.id.clone(), label.clone());
                }
            }
            if let Some(default) = &file.floor {
                note_floor(default, &mut floor_order);
            }

            for node in file.nodes {
                let floor = node
                    .floor
                    .clone()
                    .or_else(|| file.floor.clone())
                    .ok_or_else(|| RegistryError::MissingFloor(node.id.to_string()))?;
                note_floor(&floor, &mut floor_order);

                let key = (floor.clone(), node.id.clone());
                if landmarks.contains_key(&key) {
                    return Err(RegistryError::DuplicateLandmark {
                        floor,
                        id: node.id,
                    });
                }

                if let Some(order) = node.order {
                    ordered
                        .entry(floor.clone())
                        .or_default()
                        .push((order, node.id.clone()));
                }
                positioned
                    .entry(floor.clone())
                    .or_default()
                    .push((node.y, node.id.clone()));
                for sign in &node.signs {
                    signs.push((sign.clone(), node.id.clone()));
                }

                landmarks.insert(
                    key,
                    Landmark {
                        id: node.id,
                        floor,
                        x: node.x,
                        y: node.y,
                        bounds: BoundingBox {
                            x1: node.x1,
                            y1: node.y1,
                            x2: node.x2,
                            y2: node.y2,
                        },
                        label: node.label,
                    },
                );
            }

            for (floor, route) in file.routes {
                note_floor(&floor, &mut floor_order);
                explicit.insert(floor, route);
            }
        }

        let mut floors = Vec::with_capacity(floor_order.len());
        for id in floor_order {
            let route = match explicit.remove(&id) {
                Some(route) => route,
                None => derive_route(
                    &id,
                    ordered.remove(&id).unwrap_or_default(),
                    positioned.remove(&id).unwrap_or_default(),
                )?,
            };

            let mut seen = HashSet::new();
            for landmark in &route {
                if !landmarks.contains_key(&(id.clone(), landmark.clone())) {
                    return Err(RegistryError::UnknownRouteLandmark {
                        floor: id,
                        id: landmark.clone(),
                    });
                }
                if !seen.insert(landmark) {
                    return Err(RegistryError::RepeatedRouteLandmark {
                        floor: id,
                        id: landmark.clone(),
                    });
                }
            }

            let label = labels
                .remove(&id)
                .unwrap_or_else(|| id.as_str().to_string());
            floors.push(Floor { id, label, route });
        }

        let start_floor = match (start_floor, floors.first()) {
            (Some(start), _) => start,
            (None, Some(first)) => first.id.clone(),
            (None, None) => return Err(RegistryError::Empty),
        };
        match floors.iter().find(|f| f.id == start_floor) {
            Some(floor) if !floor.route.is_empty() => {}
            _ => return Err(RegistryError::NoStartRoute(start_floor)),
        }

        Ok(Self {
            floors,
            landmarks,
            start_floor,
            signs,
        })
    }

    /// Floors in declaration order.
    pub fn floors(&self) -> &[Floor] {
        &self.floors
    }

    pub fn floor(&self, id: &FloorId) -> Option<&Floor> {
        self.floors.iter().find(|f| &f.id == id)
    }

    pub fn start_floor(&self) -> &Floor {
        // Presence is checked in `from_files`.
        self.floor(&self.start_floor)
            .unwrap_or(&self.floors[0])
    }

    /// The fixed start landmark: first waypoint of the start floor's route.
    pub fn start(&self) -> &LandmarkId {
        &self.start_floor().route[0]
    }

    pub fn landmark(&self, floor: &FloorId, id: &LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&(floor.clone(), id.clone()))
    }

    /// Whether any floor registers this id.
    pub fn contains(&self, id: &LandmarkId) -> bool {
        self.landmarks.keys().any(|(_, l)| l == id)
    }

    /// Every floor on which the id appears in the canonical route.
    pub fn floors_routing(&self, id: &LandmarkId) -> impl Iterator<Item = &Floor> {
        let id = id.clone();
        self.floors
            .iter()
            .filter(move |f| f.route.contains(&id))
    }

    /// Sign phrases declared on registry nodes, in file order.
    pub fn declared_signs(&self) -> &[(String, LandmarkId)] {
        &self.signs
    }
}

/// Walking order for a floor without an explicit route.
///
/// Nodes with an `order` are routed by it and the rest are left off the route.
/// When no node on the floor has one, every node is routed by descending `y`
/// (file order among equal `y`).
fn derive_route(
    floor: &FloorId,
    mut ordered: Vec<(u32, LandmarkId)>,
    mut positioned: Vec<(f64, LandmarkId)>,
) -> Result<Vec<LandmarkId>, RegistryError> {
    if ordered.is_empty() {
        positioned.sort_by(|a, b| b.0.total_cmp(&a.0));
        return Ok(positioned.into_iter().map(|(_, id)| id).collect());
    }

    ordered.sort_by_key(|(order, _)| *order);
    if let Some(pair) = ordered.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(RegistryError::DuplicateOrder {
            floor: floor.clone(),
            order: pair[0].0,
            first: pair[0].1.clone(),
            second: pair[1].1.clone(),
        });
    }
    Ok(ordered.into_iter().map(|(_, id)| id).collect())
}

fn note_floor(floor: &FloorId, order: &mut Vec<FloorId>) {
    if !order.contains(floor) {
        order.push(floor.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, order: Option<u32>) -> NodeRecord {
        NodeRecord {
            id: id.into(),
            floor: None,
            x: 10.0,
            y: 20.0,
            x1: 0.0,
            y1: 10.0,
            x2: 20.0,
            y2: 30.0,
            order,
            label: None,
            signs: Vec::new(),
        }
    }

    fn lower() -> RegistryFile {
        RegistryFile {
            floor: Some("lower".into()),
            nodes: vec![
                node("room_040", Some(2)),
                node("entrance", Some(0)),
                node("room_045", Some(1)),
                node("stairs", Some(3)),
                node("elevator", None),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_route_derived_from_order() {
        let registry = LandmarkRegistry::from_files(vec![lower()]).unwrap();
        let floor = registry.start_floor();
        assert_eq!(floor.id, FloorId::from("lower"));
        assert_eq!(
            floor.route,
            vec![
                LandmarkId::from("entrance"),
                "room_045".into(),
                "room_040".into(),
                "stairs".into()
            ]
        );
        assert_eq!(registry.start(), &LandmarkId::from("entrance"));
        // Unordered nodes are registered but not routed.
        assert!(registry.contains(&"elevator".into()));
        assert_eq!(registry.floors_routing(&"elevator".into()).count(), 0);
    }

    #[test]
    fn test_explicit_route_wins() {
        let mut file = lower();
        file.routes.insert(
            "lower".into(),
            vec!["entrance".into(), "stairs".into()],
        );
        let registry = LandmarkRegistry::from_files(vec![file]).unwrap();
        assert_eq!(registry.start_floor().route.len(), 2);
    }

    #[test]
    fn test_explicit_route_unknown_landmark_is_fatal() {
        let mut file = lower();
        file.routes.insert(
            "lower".into(),
            vec!["entrance".into(), "room_999".into()],
        );
        let err = LandmarkRegistry::from_files(vec![file]).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownRouteLandmark { .. }));
    }

    #[test]
    fn test_duplicate_on_same_floor_is_fatal() {
        let mut file = lower();
        file.nodes.push(node("stairs", None));
        let err = LandmarkRegistry::from_files(vec![file]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateLandmark { .. }));
    }

    #[test]
    fn test_same_id_on_two_floors_is_a_junction() {
        let upper = RegistryFile {
            floor: Some("floor1".into()),
            floors: vec![FloorSpec {
                id: "floor1".into(),
                label: Some("Floor 1".into()),
            }],
            nodes: vec![node("stairs", Some(0)), node("125", Some(1))],
            ..Default::default()
        };
        let registry = LandmarkRegistry::from_files(vec![lower(), upper]).unwrap();
        assert_eq!(registry.floors().len(), 2);
        assert_eq!(registry.floors_routing(&"stairs".into()).count(), 2);
        assert_eq!(registry.floor(&"floor1".into()).unwrap().label, "Floor 1");
        assert_eq!(registry.floor(&"lower".into()).unwrap().label, "lower");
    }

    #[test]
    fn test_node_without_floor_is_fatal() {
        let file = RegistryFile {
            nodes: vec![node("entrance", Some(0))],
            ..Default::default()
        };
        let err = LandmarkRegistry::from_files(vec![file]).unwrap_err();
        assert!(matches!(err, RegistryError::MissingFloor(_)));
    }

    #[test]
    fn test_start_floor_without_route_is_fatal() {
        let mut file = lower();
        file.start_floor = Some("roof".into());
        let err = LandmarkRegistry::from_files(vec![file]).unwrap_err();
        assert!(matches!(err, RegistryError::NoStartRoute(_)));
    }

    #[test]
    fn test_duplicate_order_is_fatal() {
        let mut file = lower();
        file.nodes.push(node("room_030", Some(2)));
        let err = LandmarkRegistry::from_files(vec![file]).unwrap_err();
        match err {
            RegistryError::DuplicateOrder {
                floor,
                order,
                first,
                second,
            } => {
                assert_eq!(floor, FloorId::from("lower"));
                assert_eq!(order, 2);
                assert_eq!(first, LandmarkId::from("room_040"));
                assert_eq!(second, LandmarkId::from("room_030"));
            }
            other => panic!("expected DuplicateOrder, got {other:?}"),
        }
    }

    #[test]
    fn test_unordered_floor_walks_by_descending_y() {
        // Plain node map: no `order`, no `routes`, plus an `edges` list.
        let raw = r#"{
            "nodes": [
                {"id": "room_040", "floor": "lower", "x": 300, "y": 410,
                 "x1": 280, "y1": 390, "x2": 320, "y2": 430},
                {"id": "entrance", "floor": "lower", "x": 412, "y": 880,
                 "x1": 380, "y1": 850, "x2": 444, "y2": 910},
                {"id": "stairs", "floor": "lower", "x": 120, "y": 95,
                 "x1": 100, "y1": 80, "x2": 140, "y2": 110},
                {"id": "room_045", "floor": "lower", "x": 350, "y": 640,
                 "x1": 330, "y1": 620, "x2": 370, "y2": 660}
            ],
            "edges": []
        }"#;
        let file: RegistryFile = serde_json::from_str(raw).unwrap();
        let registry = LandmarkRegistry::from_files(vec![file]).unwrap();
        assert_eq!(
            registry.start_floor().route,
            vec![
                LandmarkId::from("entrance"),
                "room_045".into(),
                "room_040".into(),
                "stairs".into()
            ]
        );
        assert_eq!(registry.start(), &LandmarkId::from("entrance"));
    }

    #[test]
    fn test_parse_minimal_node() {
        let raw = r#"{"nodes": [
            {"id": "entrance", "floor": "lower", "x": 412, "y": 880,
             "x1": 380, "y1": 850, "x2": 444, "y2": 910, "order": 0}
        ]}"#;
        let file: RegistryFile = serde_json::from_str(raw).unwrap();
        let registry = LandmarkRegistry::from_files(vec![file]).unwrap();
        let landmark = registry
            .landmark(&"lower".into(), &"entrance".into())
            .unwrap();
        assert_eq!(landmark.bounds.center(), (412.0, 880.0));
        assert_eq!(landmark.display_name(), "entrance");
    }
}
