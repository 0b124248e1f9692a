use anyhow::{Context, Result};
use common::catalog::CameraStaticInfo;
use common::detections::BoundingBox;
use common::geo::Polygon;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::io::Cursor;

const MASK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Outline every lane mask of the camera
pub fn draw_masks(frame: &mut RgbImage, camera: &CameraStaticInfo) {
    for mask in camera.side_a.iter().chain(camera.side_b.iter()) {
        draw_polygon(frame, mask, MASK_COLOR);
    }
}

pub fn draw_polygon(frame: &mut RgbImage, polygon: &Polygon, color: Rgb<u8>) {
    for (start, end) in polygon.edges() {
        draw_line_segment_mut(
            frame,
            (start.x as f32, start.y as f32),
            (end.x as f32, end.y as f32),
            color,
        );
    }
}

pub fn draw_boxes<'a>(frame: &mut RgbImage, boxes: impl IntoIterator<Item = &'a BoundingBox>) {
    for bbox in boxes {
        let rect = Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width.max(1), bbox.height.max(1));
        draw_hollow_rect_mut(frame, rect, BOX_COLOR);
    }
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    frame
        .write_with_encoder(encoder)
        .context("failed to encode frame as JPEG")?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::geo::GeoPoint;

    fn camera() -> CameraStaticInfo {
        CameraStaticInfo {
            id: "cam".into(),
            location: GeoPoint::new(0.0, 0.0),
            side_a: vec![Polygon::from(vec![[2.0, 2.0], [10.0, 2.0], [10.0, 10.0], [2.0, 10.0]])],
            side_b: vec![],
            baseline: vec![1.0],
        }
    }

    #[test]
    fn test_masks_are_outlined() {
        let mut frame = RgbImage::new(16, 16);
        draw_masks(&mut frame, &camera());
        assert_eq!(*frame.get_pixel(2, 2), MASK_COLOR);
        assert_eq!(*frame.get_pixel(6, 2), MASK_COLOR);
        // interior untouched
        assert_eq!(*frame.get_pixel(6, 6), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_boxes_are_outlined() {
        let mut frame = RgbImage::new(16, 16);
        let bbox = BoundingBox {
            x: 4,
            y: 4,
            width: 5,
            height: 5,
        };
        draw_boxes(&mut frame, [&bbox]);
        assert_eq!(*frame.get_pixel(4, 4), BOX_COLOR);
        assert_eq!(*frame.get_pixel(8, 8), BOX_COLOR);
        assert_eq!(*frame.get_pixel(6, 6), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_boxes_outside_frame_are_clipped() {
        let mut frame = RgbImage::new(8, 8);
        let bbox = BoundingBox {
            x: 6,
            y: 6,
            width: 20,
            height: 0,
        };
        draw_boxes(&mut frame, [&bbox]);
        assert_eq!(*frame.get_pixel(6, 6), BOX_COLOR);
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([120, 30, 200]));
        let jpeg = encode_jpeg(&frame, 80).unwrap();
        assert_eq!(&jpeg[..3], &[0xFF, 0xD8, 0xFF]);
    }
}
