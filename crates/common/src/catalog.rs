//! Static camera catalog.
//!
//! The catalog is a JSON object keyed by camera id. Each entry carries the
//! camera's location, a baseline per-lane metric and two ordered lists of lane
//! masks: `mask1` for the exit side and `mask2` for the entry side of the
//! camera's view.

use crate::geo::{GeoPoint, Polygon};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Catalog entry as authored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraEntry {
    pub latitude: f64,
    pub longitude: f64,

    /// Baseline metric per lane; its length defines the lane count
    pub average_speed: Vec<f64>,

    /// Exit-side lane masks, one polygon per lane
    #[serde(default)]
    pub mask1: Vec<Polygon>,

    /// Entry-side lane masks, one polygon per lane
    #[serde(default)]
    pub mask2: Vec<Polygon>,
}

/// Immutable description of one roadside camera
#[derive(Debug, Clone, PartialEq)]
pub struct CameraStaticInfo {
    pub id: String,
    pub location: GeoPoint,
    /// Exit-side masks (direction +1)
    pub side_a: Vec<Polygon>,
    /// Entry-side masks (direction -1)
    pub side_b: Vec<Polygon>,
    pub baseline: Vec<f64>,
}

impl CameraStaticInfo {
    pub fn lane_count(&self) -> usize {
        self.baseline.len()
    }

    fn from_entry(id: String, entry: CameraEntry) -> Result<Self> {
        let lanes = entry.average_speed.len();
        if lanes == 0 {
            bail!("camera '{}' declares no lanes", id);
        }
        if entry.mask1.len() > lanes || entry.mask2.len() > lanes {
            bail!(
                "camera '{}' has more lane masks ({} exit, {} entry) than lanes ({})",
                id,
                entry.mask1.len(),
                entry.mask2.len(),
                lanes
            );
        }
        if !entry.latitude.is_finite() || !entry.longitude.is_finite() {
            bail!("camera '{}' has a non-finite location", id);
        }

        Ok(Self {
            id,
            location: GeoPoint::new(entry.latitude, entry.longitude),
            side_a: entry.mask1,
            side_b: entry.mask2,
            baseline: entry.average_speed,
        })
    }
}

/// All known cameras, iterated in ascending id order
#[derive(Debug, Clone, Default)]
pub struct CameraCatalog {
    cameras: BTreeMap<String, Arc<CameraStaticInfo>>,
}

impl CameraCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: BTreeMap<String, CameraEntry> =
            serde_json::from_str(json).context("camera catalog is not valid JSON")?;
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: BTreeMap<String, CameraEntry>) -> Result<Self> {
        let mut cameras = BTreeMap::new();
        for (id, entry) in entries {
            let info = CameraStaticInfo::from_entry(id.clone(), entry)?;
            debug!(camera_id = %id, lanes = info.lane_count(), "loaded camera");
            cameras.insert(id, Arc::new(info));
        }
        Ok(Self { cameras })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read camera catalog {}", path.display()))?;
        let catalog = Self::from_json(&json)
            .with_context(|| format!("invalid camera catalog {}", path.display()))?;
        info!(
            path = %path.display(),
            cameras = catalog.len(),
            "camera catalog loaded"
        );
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<Arc<CameraStaticInfo>> {
        self.cameras.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    /// Camera closest to `point`, with its distance. Ties resolve to the
    /// lowest camera id.
    pub fn nearest(&self, point: &GeoPoint) -> Option<(Arc<CameraStaticInfo>, f64)> {
        self.cameras
            .values()
            .map(|camera| (camera, camera.location.planar_distance(point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(camera, distance)| (camera.clone(), distance))
    }
}
