//! Offline bootstrapping of registry files from floorplan annotations.
//!
//! Annotations are drawn against a possibly resized copy of the floorplan, so
//! every box is scaled to the real image size before it becomes a node.
//! Coordinates are truncated to whole pixels.

use crate::landmark::{FloorId, LandmarkId, NodeRecord, RegistryFile};
use crate::store::{JsonFile, PersistError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Detector boxes at or below this confidence are dropped.
pub const DEFAULT_DETECTION_CONFIDENCE: f32 = 0.3;

/// Grid used when a detector finds nothing.
const FALLBACK_GRID: u32 = 4;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read annotations {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("annotations {path} are not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("annotations {path} are not valid CSV: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("annotation '{label}' has a zero image size")]
    ZeroImageSize { label: String },

    #[error("invalid image size '{0}', expected WIDTHxHEIGHT")]
    BadImageSize(String),

    #[error("cannot write registry: {0}")]
    Write(#[from] PersistError),
}

/// A labelled box drawn on a floorplan image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAnnotation {
    #[serde(alias = "label_name")]
    pub label: String,
    pub bbox_x: f64,
    pub bbox_y: f64,
    pub bbox_width: f64,
    pub bbox_height: f64,
    /// Size of the image the box was drawn on.
    pub image_width: u32,
    pub image_height: u32,
    /// Position on the floor's walking route, if known.
    #[serde(default)]
    pub order: Option<u32>,
}

/// Pixel size of the real floorplan image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl std::str::FromStr for ImageSize {
    type Err = SeedError;

    /// Parse `WIDTHxHEIGHT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || SeedError::BadImageSize(s.to_string());
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(bad)?;
        let width: u32 = w.trim().parse().map_err(|_| bad())?;
        let height: u32 = h.trim().parse().map_err(|_| bad())?;
        if width == 0 || height == 0 {
            return Err(bad());
        }
        Ok(Self { width, height })
    }
}

/// Convert one annotation into a node on `floor`.
pub fn node_from_annotation(
    annotation: &RegionAnnotation,
    image: ImageSize,
    floor: &FloorId,
) -> Result<NodeRecord, SeedError> {
    if annotation.image_width == 0 || annotation.image_height == 0 {
        return Err(SeedError::ZeroImageSize {
            label: annotation.label.clone(),
        });
    }
    let sx = f64::from(image.width) / f64::from(annotation.image_width);
    let sy = f64::from(image.height) / f64::from(annotation.image_height);

    let x = (annotation.bbox_x.trunc() * sx).trunc();
    let y = (annotation.bbox_y.trunc() * sy).trunc();
    let w = (annotation.bbox_width.trunc() * sx).trunc();
    let h = (annotation.bbox_height.trunc() * sy).trunc();

    Ok(NodeRecord {
        id: LandmarkId::new(annotation.label.trim()),
        floor: Some(floor.clone()),
        x: x + (w / 2.0).floor(),
        y: y + (h / 2.0).floor(),
        x1: x,
        y1: y,
        x2: x + w,
        y2: y + h,
        order: annotation.order,
        label: None,
        signs: Vec::new(),
    })
}

/// Build a registry file for one floor from its annotations.
pub fn registry_from_annotations(
    annotations: &[RegionAnnotation],
    image: ImageSize,
    floor: &FloorId,
) -> Result<RegistryFile, SeedError> {
    let nodes = annotations
        .iter()
        .map(|a| node_from_annotation(a, image, floor))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RegistryFile {
        floor: Some(floor.clone()),
        nodes,
        ..Default::default()
    })
}

/// Read annotations from a `.csv` export (one row per box, with a header
/// row) or from a JSON array. The file extension picks the format.
pub async fn load_annotations(
    path: impl AsRef<Path>,
) -> Result<Vec<RegionAnnotation>, SeedError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        return parse_csv(&content).map_err(|source| SeedError::Csv {
            path: path.to_path_buf(),
            source,
        });
    }

    serde_json::from_str(&content).map_err(|source| SeedError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_csv(content: &str) -> Result<Vec<RegionAnnotation>, csv::Error> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes())
        .deserialize()
        .collect()
}

/// Write a registry file atomically.
pub async fn write_registry(
    registry: &RegistryFile,
    path: impl Into<PathBuf>,
) -> Result<(), SeedError> {
    let file = JsonFile::new(path);
    file.write(registry).await?;
    info!(
        path = %file.path().display(),
        nodes = registry.nodes.len(),
        "wrote registry"
    );
    Ok(())
}

/// A box found by an object/region detector, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedRegion {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub confidence: f32,
}

/// Finds candidate landmark regions on a floorplan image.
pub trait RegionDetector {
    type Image;
    type Error: std::error::Error + Send + Sync + 'static;

    fn detect(&mut self, image: &Self::Image) -> Result<Vec<DetectedRegion>, Self::Error>;
}

/// Turn detector output into provisional nodes named `N1`, `N2`, ...
///
/// Boxes at or below `min_confidence` are dropped. When nothing survives,
/// the image is split into a 4x4 grid so there is still something to label.
pub fn nodes_from_regions(
    regions: &[DetectedRegion],
    image: ImageSize,
    floor: &FloorId,
    min_confidence: f32,
) -> Vec<NodeRecord> {
    let mut boxes: Vec<(u32, u32, u32, u32)> = regions
        .iter()
        .filter(|r| r.confidence > min_confidence)
        .map(|r| (r.x1, r.y1, r.x2, r.y2))
        .collect();

    if boxes.is_empty() {
        let gw = image.width / FALLBACK_GRID;
        let gh = image.height / FALLBACK_GRID;
        for row in 0..FALLBACK_GRID {
            for col in 0..FALLBACK_GRID {
                boxes.push((col * gw, row * gh, (col + 1) * gw, (row + 1) * gh));
            }
        }
    }

    boxes
        .into_iter()
        .enumerate()
        .map(|(i, (x1, y1, x2, y2))| NodeRecord {
            id: LandmarkId::new(format!("N{}", i + 1)),
            floor: Some(floor.clone()),
            x: f64::from((x1 + x2) / 2),
            y: f64::from((y1 + y2) / 2),
            x1: f64::from(x1),
            y1: f64::from(y1),
            x2: f64::from(x2),
            y2: f64::from(y2),
            order: None,
            label: None,
            signs: Vec::new(),
        })
        .collect()
}

/// Run a detector and convert its output.
pub fn detect_nodes<D: RegionDetector>(
    detector: &mut D,
    image: &D::Image,
    size: ImageSize,
    floor: &FloorId,
) -> Result<Vec<NodeRecord>, D::Error> {
    let regions = detector.detect(image)?;
    Ok(nodes_from_regions(
        &regions,
        size,
        floor,
        DEFAULT_DETECTION_CONFIDENCE,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(label: &str) -> RegionAnnotation {
        RegionAnnotation {
            label: label.into(),
            bbox_x: 100.0,
            bbox_y: 50.0,
            bbox_width: 41.0,
            bbox_height: 21.0,
            image_width: 1000,
            image_height: 500,
            order: None,
        }
    }

    #[test]
    fn test_annotation_scaled_to_image() {
        let node = node_from_annotation(
            &annotation("room_045"),
            ImageSize {
                width: 2000,
                height: 1000,
            },
            &"lower".into(),
        )
        .unwrap();

        assert_eq!((node.x1, node.y1, node.x2, node.y2), (200.0, 100.0, 282.0, 142.0));
        assert_eq!((node.x, node.y), (241.0, 121.0));
        assert_eq!(node.floor, Some(FloorId::from("lower")));
    }

    #[test]
    fn test_scaling_truncates() {
        let node = node_from_annotation(
            &annotation("exit"),
            ImageSize {
                width: 333,
                height: 500,
            },
            &"floor1".into(),
        )
        .unwrap();
        // 100 * 0.333 = 33.3, 41 * 0.333 = 13.65
        assert_eq!(node.x1, 33.0);
        assert_eq!(node.x2, 46.0);
        assert_eq!(node.x, 39.0);
    }

    #[test]
    fn test_zero_image_size_is_rejected() {
        let mut bad = annotation("x");
        bad.image_width = 0;
        let err = node_from_annotation(
            &bad,
            ImageSize {
                width: 10,
                height: 10,
            },
            &"lower".into(),
        )
        .unwrap_err();
        assert!(matches!(err, SeedError::ZeroImageSize { .. }));
    }

    #[test]
    fn test_label_name_alias() {
        let raw = r#"[{"label_name": "stairs", "bbox_x": 1, "bbox_y": 2,
                       "bbox_width": 3, "bbox_height": 4,
                       "image_width": 10, "image_height": 10}]"#;
        let parsed: Vec<RegionAnnotation> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].label, "stairs");
        assert_eq!(parsed[0].order, None);
    }

    #[tokio::test]
    async fn test_load_csv_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lower_level_annotations.csv");
        std::fs::write(
            &path,
            "label_name,bbox_x,bbox_y,bbox_width,bbox_height,image_name,image_width,image_height\n\
             entrance,100,50,41,21,lower_level.jpg,1000,500\n\
             room_045, 120 ,80,30,20,lower_level.jpg,1000,500\n",
        )
        .unwrap();

        let annotations = load_annotations(&path).await.unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0], annotation("entrance"));
        assert_eq!(annotations[1].label, "room_045");
        assert_eq!(annotations[1].bbox_x, 120.0);
        assert_eq!(annotations[1].order, None);
    }

    #[tokio::test]
    async fn test_load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("floor1.json");
        std::fs::write(
            &json,
            r#"[{"label_name": "stairs", "bbox_x": 1, "bbox_y": 2, "bbox_width": 3,
                 "bbox_height": 4, "image_width": 10, "image_height": 10, "order": 0}]"#,
        )
        .unwrap();
        let parsed = load_annotations(&json).await.unwrap();
        assert_eq!(parsed[0].order, Some(0));

        let bad = dir.path().join("floor1.CSV");
        std::fs::write(&bad, "label_name,bbox_x\nstairs,not-a-number\n").unwrap();
        let err = load_annotations(&bad).await.unwrap_err();
        assert!(matches!(err, SeedError::Csv { .. }));
    }

    #[test]
    fn test_image_size_parse() {
        assert_eq!(
            "1920x1080".parse::<ImageSize>().unwrap(),
            ImageSize {
                width: 1920,
                height: 1080
            }
        );
        assert!("1920".parse::<ImageSize>().is_err());
        assert!("0x10".parse::<ImageSize>().is_err());
        assert!("axb".parse::<ImageSize>().is_err());
    }

    #[test]
    fn test_registry_from_annotations_loads() {
        let mut first = annotation("entrance");
        first.order = Some(0);
        let mut second = annotation("room_045");
        second.order = Some(1);
        let file = registry_from_annotations(
            &[first, second],
            ImageSize {
                width: 1000,
                height: 500,
            },
            &"lower".into(),
        )
        .unwrap();

        let registry = crate::landmark::LandmarkRegistry::from_files(vec![file]).unwrap();
        assert_eq!(registry.start(), &LandmarkId::from("entrance"));
    }

    #[test]
    fn test_detector_fallback_grid() {
        let size = ImageSize {
            width: 400,
            height: 400,
        };
        let weak = [DetectedRegion {
            x1: 0,
            y1: 0,
            x2: 10,
            y2: 10,
            confidence: 0.2,
        }];
        let nodes = nodes_from_regions(&weak, size, &"lower".into(), DEFAULT_DETECTION_CONFIDENCE);
        assert_eq!(nodes.len(), 16);
        assert_eq!(nodes[5].id, LandmarkId::from("N6"));
        assert_eq!((nodes[5].x1, nodes[5].y1), (100.0, 100.0));
    }

    #[test]
    fn test_detector_boxes_become_nodes() {
        struct Fixed;
        impl RegionDetector for Fixed {
            type Image = ();
            type Error = std::io::Error;
            fn detect(&mut self, _image: &()) -> Result<Vec<DetectedRegion>, std::io::Error> {
                Ok(vec![DetectedRegion {
                    x1: 10,
                    y1: 20,
                    x2: 31,
                    y2: 40,
                    confidence: 0.9,
                }])
            }
        }

        let nodes = detect_nodes(
            &mut Fixed,
            &(),
            ImageSize {
                width: 100,
                height: 100,
            },
            &"lower".into(),
        )
        .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!((nodes[0].x, nodes[0].y), (20.0, 30.0));
    }
}
