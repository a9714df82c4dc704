//! Still-frame preparation for submission and brightness sampling.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use checkin_core::TargetRegion;
use image::{codecs::jpeg::JpegEncoder, imageops, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("still frame is empty")]
    EmptyFrame,
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Mirror the frame horizontally (to match the selfie preview), encode it
/// as JPEG and return the base64 payload without a data-URL prefix.
pub fn encode_still(frame: &RgbImage, quality: u8) -> Result<String, CaptureError> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(CaptureError::EmptyFrame);
    }

    let mirrored = imageops::flip_horizontal(frame);
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(&mirrored)?;

    tracing::debug!(
        width = frame.width(),
        height = frame.height(),
        bytes = jpeg.len(),
        quality,
        "still encoded"
    );
    Ok(STANDARD.encode(&jpeg))
}

/// Mean of (R+G+B)/3 over the square bounding the target circle, clipped to the frame.
///
/// Returns 0.0 when the square does not overlap the frame.
pub fn mean_brightness(frame: &RgbImage, region: &TargetRegion) -> f32 {
    let x0 = (region.center.x - region.radius).max(0.0) as u32;
    let y0 = (region.center.y - region.radius).max(0.0) as u32;
    let x1 = ((region.center.x + region.radius).max(0.0) as u32).min(frame.width());
    let y1 = ((region.center.y + region.radius).max(0.0) as u32).min(frame.height());

    if x0 >= x1 || y0 >= y1 {
        return 0.0;
    }

    let mut total = 0.0f64;
    for y in y0..y1 {
        for x in x0..x1 {
            let [r, g, b] = frame.get_pixel(x, y).0;
            total += (r as f64 + g as f64 + b as f64) / 3.0;
        }
    }
    let count = ((x1 - x0) as f64) * ((y1 - y0) as f64);
    (total / count) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// 16x8 frame: left 8x8 block black, right 8x8 block white.
    fn split_frame() -> RgbImage {
        RgbImage::from_fn(16, 8, |x, _| {
            if x < 8 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn test_encode_still_is_mirrored_jpeg() {
        let b64 = encode_still(&split_frame(), 90).unwrap();
        assert!(!b64.starts_with("data:"));

        let bytes = STANDARD.decode(b64).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (16, 8));
        // White block moved to the left.
        assert!(decoded.get_pixel(2, 4).0[0] > 200);
        assert!(decoded.get_pixel(13, 4).0[0] < 50);
    }

    #[test]
    fn test_encode_empty_frame_fails() {
        let empty = RgbImage::new(0, 0);
        assert!(matches!(
            encode_still(&empty, 90),
            Err(CaptureError::EmptyFrame)
        ));
    }

    #[test]
    fn test_mean_brightness_uniform() {
        let frame = RgbImage::from_pixel(64, 48, Rgb([90, 120, 150]));
        let region = TargetRegion::for_frame(64, 48);
        assert!((mean_brightness(&frame, &region) - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_mean_brightness_ignores_outside_square() {
        // Bright border outside the target square, dark inside.
        let region = TargetRegion::for_frame(200, 100);
        // radius 48 around x = 100 -> columns 52..148
        let frame = RgbImage::from_fn(200, 100, |x, _| {
            if (52..148).contains(&x) {
                Rgb([20, 20, 20])
            } else {
                Rgb([250, 250, 250])
            }
        });
        assert!((mean_brightness(&frame, &region) - 20.0).abs() < 1e-3);
    }
}
