//! Crop geometry: center-preserving scale-up of a face box, clipped to the image.

use crate::types::BoundingBox;
use image::DynamicImage;
use serde::Serialize;
use std::path::Path;

/// Integer pixel rectangle, half-open: columns `x1..x2`, rows `y1..y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRegion {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl CropRegion {
    pub fn width(&self) -> i64 {
        (self.x2 - self.x1).max(0)
    }

    pub fn height(&self) -> i64 {
        (self.y2 - self.y1).max(0)
    }

    /// True when clipping left nothing to crop.
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }
}

/// Scale a detected face box by `scale` around its center, then clip it to
/// an `image_width` × `image_height` image.
///
/// Box corners are truncated to whole pixels first, the center is taken with
/// floor division, and the scaled size is truncated, so the result is stable
/// for a given detection. Arithmetic saturates, so non-finite or huge
/// coordinates yield a clipped (possibly empty) region instead of overflowing.
pub fn expand_box(bbox: &BoundingBox, scale: f32, image_width: u32, image_height: u32) -> CropRegion {
    let (fx1, fy1, fx2, fy2) = bbox.corners();
    let (x1, y1, x2, y2) = (fx1 as i64, fy1 as i64, fx2 as i64, fy2 as i64);

    let face_w = x2.saturating_sub(x1);
    let face_h = y2.saturating_sub(y1);

    let center_x = x1.saturating_add(x2).div_euclid(2);
    let center_y = y1.saturating_add(y2).div_euclid(2);

    let new_w = (face_w as f64 * scale as f64) as i64;
    let new_h = (face_h as f64 * scale as f64) as i64;

    let nx1 = center_x.saturating_sub(new_w.div_euclid(2));
    let ny1 = center_y.saturating_sub(new_h.div_euclid(2));
    let nx2 = nx1.saturating_add(new_w);
    let ny2 = ny1.saturating_add(new_h);

    CropRegion {
        x1: nx1.max(0),
        y1: ny1.max(0),
        x2: nx2.min(image_width as i64),
        y2: ny2.min(image_height as i64),
    }
}

/// Cut `region` out of `image`. Returns `None` when the region is empty.
pub fn crop_image(image: &DynamicImage, region: &CropRegion) -> Option<DynamicImage> {
    if region.is_empty() {
        return None;
    }
    Some(image.crop_imm(
        region.x1 as u32,
        region.y1 as u32,
        region.width() as u32,
        region.height() as u32,
    ))
}

/// Output file name for the `index`-th (1-based) matching face of `source`:
/// `{stem}_face_{index}{.ext}`, keeping the source extension as written.
pub fn crop_file_name(source: &Path, index: usize) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match source.extension() {
        Some(ext) => format!("{stem}_face_{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}_face_{index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn corners(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: 0.9,
            landmarks: None,
        }
    }

    #[test]
    fn test_expand_box_doubles_around_center() {
        let region = expand_box(&corners(100.0, 100.0, 200.0, 160.0), 2.0, 1000, 1000);
        assert_eq!(region, CropRegion { x1: 50, y1: 70, x2: 250, y2: 190 });
        // Center preserved
        assert_eq!((region.x1 + region.x2) / 2, 150);
        assert_eq!((region.y1 + region.y2) / 2, 130);
    }

    #[test]
    fn test_expand_box_scale_one_is_identity() {
        let region = expand_box(&corners(10.0, 20.0, 50.0, 80.0), 1.0, 100, 100);
        assert_eq!(region, CropRegion { x1: 10, y1: 20, x2: 50, y2: 80 });
    }

    #[test]
    fn test_expand_box_truncates_float_corners() {
        // 10.9 → 10, 21.7 → 21, 50.2 → 50, 79.99 → 79
        let region = expand_box(&corners(10.9, 21.7, 50.2, 79.99), 1.0, 100, 100);
        assert_eq!(region, CropRegion { x1: 10, y1: 21, x2: 50, y2: 79 });
    }

    #[test]
    fn test_expand_box_odd_size_floors_center_and_half() {
        // w = 11, center = floor(21/2) = 10, new_w = trunc(16.5) = 16
        let region = expand_box(&corners(5.0, 5.0, 16.0, 16.0), 1.5, 100, 100);
        assert_eq!(region, CropRegion { x1: 2, y1: 2, x2: 18, y2: 18 });
    }

    #[test]
    fn test_expand_box_clips_to_image_bounds() {
        let region = expand_box(&corners(0.0, 0.0, 40.0, 40.0), 2.0, 50, 30);
        assert_eq!(region, CropRegion { x1: 0, y1: 0, x2: 50, y2: 30 });
    }

    #[test]
    fn test_expand_box_negative_corner_uses_floor_center() {
        // x1 = trunc(-5.5) = -5, center = floor((-5 + 4) / 2) = -1
        let region = expand_box(&corners(-5.5, 0.0, 4.0, 10.0), 2.0, 100, 100);
        assert_eq!(region.x1, 0);
        assert_eq!(region.x2, -1 - 9 + 18);
    }

    #[test]
    fn test_expand_box_always_within_image() {
        let boxes = [
            corners(-30.0, -30.0, 10.0, 10.0),
            corners(90.0, 90.0, 130.0, 140.0),
            corners(0.0, 0.0, 100.0, 60.0),
            corners(45.0, 25.0, 55.0, 35.0),
        ];
        for bbox in &boxes {
            for scale in [1.0, 1.5, 2.0, 3.0] {
                let r = expand_box(bbox, scale, 100, 60);
                assert!(r.x1 >= 0 && r.y1 >= 0, "{r:?}");
                assert!(r.x2 <= 100 && r.y2 <= 60, "{r:?}");
            }
        }
    }

    #[test]
    fn test_expand_box_outside_image_is_empty() {
        let region = expand_box(&corners(200.0, 200.0, 220.0, 220.0), 2.0, 100, 100);
        assert!(region.is_empty());
        assert_eq!(region.width(), 0);
    }

    #[test]
    fn test_expand_box_non_finite_box_does_not_overflow() {
        let boxes = [
            (f32::INFINITY, 10.0, 20.0, 20.0),
            (f32::NEG_INFINITY, f32::NEG_INFINITY, f32::INFINITY, f32::INFINITY),
            (f32::MAX, f32::MAX, f32::MAX, f32::MAX),
            (f32::NAN, 5.0, f32::NAN, 5.0),
        ];
        for (x, y, width, height) in boxes {
            let bbox = BoundingBox { x, y, width, height, confidence: 0.9, landmarks: None };
            let region = expand_box(&bbox, 2.0, 100, 80);
            assert!(region.x1 >= 0 && region.y1 >= 0, "{region:?}");
            assert!(region.x2 <= 100 && region.y2 <= 80, "{region:?}");
        }
    }

    #[test]
    fn test_crop_image_matches_region() {
        let mut img = RgbImage::from_pixel(40, 30, Rgb([0, 0, 0]));
        img.put_pixel(12, 7, Rgb([255, 0, 0]));
        let img = DynamicImage::ImageRgb8(img);

        let region = CropRegion { x1: 10, y1: 5, x2: 25, y2: 20 };
        let cropped = crop_image(&img, &region).unwrap();
        assert_eq!(cropped.dimensions(), (15, 15));
        assert_eq!(cropped.to_rgb8().get_pixel(2, 2), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_crop_image_empty_region() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let region = CropRegion { x1: 10, y1: 0, x2: 10, y2: 10 };
        assert!(crop_image(&img, &region).is_none());
    }

    #[test]
    fn test_crop_file_name_keeps_extension_case() {
        assert_eq!(crop_file_name(Path::new("photos/IMG_1004.JPG"), 1), "IMG_1004_face_1.JPG");
        assert_eq!(crop_file_name(Path::new("a.b.png"), 3), "a.b_face_3.png");
        assert_eq!(crop_file_name(Path::new("noext"), 2), "noext_face_2");
    }
}
