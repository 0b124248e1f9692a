use crate::error::LaneFault;
use common::catalog::{CameraCatalog, CameraStaticInfo};
use common::geo::GeoPoint;
use std::collections::HashSet;
use std::sync::Arc;

/// Nearest camera to `point`, if it lies strictly within `tolerance`
pub fn nearest_within(
    catalog: &CameraCatalog,
    point: &GeoPoint,
    tolerance: f64,
) -> Option<Arc<CameraStaticInfo>> {
    catalog
        .nearest(point)
        .filter(|(_, distance)| *distance < tolerance)
        .map(|(camera, _)| camera)
}

/// Whether `point` is strictly within `tolerance` of the camera's location
pub fn is_at(camera: &CameraStaticInfo, point: &GeoPoint, tolerance: f64) -> bool {
    camera.location.planar_distance(point) < tolerance
}

/// Map route points to the ordered, deduplicated list of cameras they pass.
///
/// Cameras already in `used` are never returned, and every returned id is
/// added to it. Points with no camera in range are skipped.
pub fn match_route(
    catalog: &CameraCatalog,
    points: &[GeoPoint],
    tolerance: f64,
    used: &mut HashSet<String>,
) -> Vec<String> {
    let mut matched = Vec::new();
    for point in points {
        match nearest_within(catalog, point, tolerance) {
            Some(camera) => {
                if used.insert(camera.id.clone()) {
                    matched.push(camera.id.clone());
                }
            }
            None => LaneFault::RouteMatchMiss {
                latitude: point.latitude,
                longitude: point.longitude,
            }
            .record(),
        }
    }
    matched
}
