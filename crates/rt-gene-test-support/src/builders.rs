//! Synthetic eye image builders for testing.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

/// Skin tone used around the synthetic eye.
const SKIN: [u8; 3] = [224, 172, 140];
/// Sclera color.
const SCLERA: [u8; 3] = [240, 236, 230];
/// Iris color.
const IRIS: [u8; 3] = [90, 60, 40];
/// Pupil color.
const PUPIL: [u8; 3] = [10, 10, 12];

/// Builder for creating synthetic eye crops.
///
/// RT-GENE eye patches are 60x36 RGB crops; the builders accept any size so
/// preprocessing can be exercised on odd aspect ratios too.
pub struct SyntheticEyeBuilder;

impl SyntheticEyeBuilder {
    /// Creates an eye looking straight ahead.
    #[must_use]
    pub fn eye(width: u32, height: u32) -> DynamicImage {
        Self::eye_looking(width, height, 0.0)
    }

    /// Creates an eye whose iris is shifted horizontally.
    ///
    /// `offset` ranges from -1.0 (far left) to 1.0 (far right).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn eye_looking(width: u32, height: u32, offset: f32) -> DynamicImage {
        let w = width as f32;
        let h = height as f32;
        let cx = w / 2.0;
        let cy = h / 2.0;
        let iris_x = cx + offset.clamp(-1.0, 1.0) * w / 4.0;
        let iris_r = h / 3.0;

        let img = RgbImage::from_fn(width, height, |x, y| {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;

            // almond-shaped opening
            let ex = (px - cx) / (w / 2.0);
            let ey = (py - cy) / (h / 2.5);
            if ex * ex + ey * ey > 1.0 {
                return Rgb(SKIN);
            }

            let d = ((px - iris_x).powi(2) + (py - cy).powi(2)).sqrt();
            if d < iris_r * 0.4 {
                Rgb(PUPIL)
            } else if d < iris_r {
                Rgb(IRIS)
            } else {
                Rgb(SCLERA)
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    /// Creates a uniform grayscale image.
    #[must_use]
    pub fn grayscale(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
    }

    /// Writes `image` as `dir/name` and returns the path.
    ///
    /// The format follows the extension of `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write(image: &DynamicImage, dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
        let path = dir.join(name);
        image.save(&path)?;
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_eye_dimensions() {
        let eye = SyntheticEyeBuilder::eye(60, 36);
        assert_eq!(eye.width(), 60);
        assert_eq!(eye.height(), 36);
    }

    #[test]
    fn test_eye_has_dark_pupil_and_skin_corners() {
        let eye = SyntheticEyeBuilder::eye(60, 36).to_rgb8();
        assert_eq!(eye.get_pixel(30, 18).0, PUPIL);
        assert_eq!(eye.get_pixel(0, 0).0, SKIN);
        assert_eq!(eye.get_pixel(59, 35).0, SKIN);
    }

    #[test]
    fn test_eye_looking_moves_pupil() {
        let left = SyntheticEyeBuilder::eye_looking(60, 36, -1.0).to_rgb8();
        let right = SyntheticEyeBuilder::eye_looking(60, 36, 1.0).to_rgb8();
        assert_eq!(left.get_pixel(15, 18).0, PUPIL);
        assert_eq!(right.get_pixel(45, 18).0, PUPIL);
        assert_ne!(left.get_pixel(45, 18).0, PUPIL);
    }

    #[test]
    fn test_grayscale() {
        let gray = SyntheticEyeBuilder::grayscale(4, 3, 77);
        assert!(gray.to_luma8().pixels().all(|p| p.0 == [77]));
    }

    #[test]
    fn test_write_png() {
        let dir = tempfile::tempdir().unwrap();
        let path =
            SyntheticEyeBuilder::write(&SyntheticEyeBuilder::eye(60, 36), dir.path(), "left.png")
                .unwrap();
        let back = image::open(path).unwrap();
        assert_eq!((back.width(), back.height()), (60, 36));
    }
}
