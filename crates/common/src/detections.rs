//! Detector contracts shared by the detector plugins and the tracking core.

use crate::geo::PixelPoint;
use serde::{Deserialize, Serialize};

/// Bounding box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Bottom-centre of the box, where a vehicle meets the road surface.
    /// Lane masks are drawn on the road, so this is the point that gets
    /// tracked and classified.
    pub fn ground_point(&self) -> PixelPoint {
        PixelPoint::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64,
        )
    }
}

/// One object reported by a detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    /// Object class/label
    pub class: String,

    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,

    pub bbox: BoundingBox,
}

/// Detector plugin metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<serde_json::Value>,

    pub requires_gpu: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_point_is_bottom_centre() {
        let bbox = BoundingBox {
            x: 100,
            y: 200,
            width: 50,
            height: 30,
        };
        assert_eq!(bbox.ground_point(), PixelPoint::new(125.0, 230.0));
    }

    #[test]
    fn test_detection_deserialization() {
        let json = r#"{"class":"car","confidence":0.9,"bbox":{"x":1,"y":2,"width":3,"height":4}}"#;
        let detection: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(detection.class, "car");
        assert_eq!(detection.bbox.height, 4);
    }
}
