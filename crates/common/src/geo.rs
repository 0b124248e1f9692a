//! Planar geometry helpers shared by route matching and lane classification.
//!
//! Route matching deliberately compares latitude/longitude pairs with plain
//! Euclidean distance. The cameras sit along a single corridor and the
//! tolerance is tuned in degrees, so no geodetic projection is applied.

use serde::{Deserialize, Serialize};

/// A position reported by the operator or stored in the camera catalog
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Euclidean distance in degree space
    pub fn planar_distance(&self, other: &GeoPoint) -> f64 {
        (self.latitude - other.latitude).hypot(self.longitude - other.longitude)
    }
}

/// A point in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &PixelPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Closed polygon in frame pixel coordinates.
///
/// Serialized as a list of `[x, y]` pairs, which is how lane masks are
/// authored in the camera catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct Polygon {
    vertices: Vec<PixelPoint>,
}

const EDGE_EPSILON: f64 = 1e-9;

impl Polygon {
    pub fn new(vertices: Vec<PixelPoint>) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[PixelPoint] {
        &self.vertices
    }

    /// Iterate over the closing edges `(v[i], v[i + 1])`, wrapping around
    pub fn edges(&self) -> impl Iterator<Item = (PixelPoint, PixelPoint)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Point-in-polygon test; points on an edge or vertex count as inside
    pub fn contains(&self, point: PixelPoint) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }

        if self.edges().any(|(a, b)| on_segment(point, a, b)) {
            return true;
        }

        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

fn on_segment(p: PixelPoint, a: PixelPoint, b: PixelPoint) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EDGE_EPSILON * (1.0 + a.distance(&b)) {
        return false;
    }
    p.x >= a.x.min(b.x) - EDGE_EPSILON
        && p.x <= a.x.max(b.x) + EDGE_EPSILON
        && p.y >= a.y.min(b.y) - EDGE_EPSILON
        && p.y <= a.y.max(b.y) + EDGE_EPSILON
}

impl From<Vec<[f64; 2]>> for Polygon {
    fn from(points: Vec<[f64; 2]>) -> Self {
        Self::new(points.into_iter().map(|[x, y]| PixelPoint::new(x, y)).collect())
    }
}

impl From<Polygon> for Vec<[f64; 2]> {
    fn from(polygon: Polygon) -> Self {
        polygon.vertices.into_iter().map(|p| [p.x, p.y]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Polygon {
        Polygon::from(vec![[3.0, 306.0], [92.0, 306.0], [118.0, 281.0], [45.0, 281.0]])
    }

    #[test]
    fn test_planar_distance() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(3.0, 4.0);
        assert!((a.planar_distance(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_polygon_contains_interior() {
        assert!(quad().contains(PixelPoint::new(60.0, 295.0)));
        assert!(!quad().contains(PixelPoint::new(200.0, 295.0)));
        assert!(!quad().contains(PixelPoint::new(60.0, 320.0)));
    }

    #[test]
    fn test_polygon_boundary_is_inside() {
        let polygon = quad();
        // bottom edge
        assert!(polygon.contains(PixelPoint::new(50.0, 306.0)));
        // vertex
        assert!(polygon.contains(PixelPoint::new(118.0, 281.0)));
        // slanted edge midpoint
        assert!(polygon.contains(PixelPoint::new(105.0, 293.5)));
    }

    #[test]
    fn test_degenerate_polygon_contains_nothing() {
        let line = Polygon::from(vec![[0.0, 0.0], [10.0, 0.0]]);
        assert!(!line.contains(PixelPoint::new(5.0, 0.0)));
    }

    #[test]
    fn test_polygon_serde_as_pairs() {
        let polygon: Polygon = serde_json::from_str("[[0,0],[4,0],[4,4]]").unwrap();
        assert_eq!(polygon.vertices().len(), 3);
        let json = serde_json::to_string(&polygon).unwrap();
        assert_eq!(json, "[[0.0,0.0],[4.0,0.0],[4.0,4.0]]");
    }
}
