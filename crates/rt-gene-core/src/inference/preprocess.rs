//! ImageNet-style preprocessing of eye crops.
//!
//! Matches the evaluation transform the backbones were trained with: resize
//! the short side to 256 (bicubic), centre crop 224x224, scale to `[0, 1]`,
//! then normalise per channel.

// Allow common ML/image code patterns
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::{GazeError, Result};

/// Target length of the short side before cropping.
pub const RESIZE_SHORT_SIDE: u32 = 256;
/// Side length of the square crop fed to the backbones.
pub const CROP_SIZE: u32 = 224;
/// ImageNet channel means (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Dimensions after scaling the short side to [`RESIZE_SHORT_SIDE`].
///
/// The long side is truncated, as torchvision does.
#[must_use]
pub fn resized_dimensions(width: u32, height: u32) -> (u32, u32) {
    let target = u64::from(RESIZE_SHORT_SIDE);
    if width <= height {
        let long = target * u64::from(height) / u64::from(width.max(1));
        (RESIZE_SHORT_SIDE, long as u32)
    } else {
        let long = target * u64::from(width) / u64::from(height.max(1));
        (long as u32, RESIZE_SHORT_SIDE)
    }
}

/// Offset of a centred [`CROP_SIZE`] window along a side of `length` pixels.
///
/// Halves round to even, matching Python's `round`.
#[must_use]
pub fn crop_offset(length: u32) -> u32 {
    let excess = f64::from(length.saturating_sub(CROP_SIZE));
    (excess / 2.0).round_ties_even() as u32
}

/// Resizes and centre crops an eye image to `CROP_SIZE x CROP_SIZE` RGB.
///
/// # Errors
///
/// Returns [`GazeError::Shape`] for an empty image.
pub fn resize_and_crop(image: &DynamicImage) -> Result<image::RgbImage> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Err(GazeError::shape(
            "eye image",
            "non-empty image",
            &[width as usize, height as usize],
        ));
    }

    let (new_w, new_h) = resized_dimensions(width, height);
    let resized = image.resize_exact(new_w, new_h, FilterType::CatmullRom);
    let cropped = resized.crop_imm(crop_offset(new_w), crop_offset(new_h), CROP_SIZE, CROP_SIZE);
    Ok(cropped.to_rgb8())
}

/// Converts an eye image into a normalised `(3, 224, 224)` tensor.
///
/// # Errors
///
/// Returns an error for an empty image or if tensor creation fails.
pub fn preprocess_eye(image: &DynamicImage, device: &Device) -> Result<Tensor> {
    let rgb = resize_and_crop(image)?;
    let side = CROP_SIZE as usize;

    let mut data = vec![0f32; 3 * side * side];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * side + x as usize;
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            data[c * side * side + offset] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    Ok(Tensor::from_vec(data, (3, side, side), device)?)
}

/// Stacks per-image `(3, H, W)` tensors into one `(batch, 3, H, W)` batch.
///
/// # Errors
///
/// Returns an error if `images` is empty or shapes differ.
pub fn stack_batch(images: &[Tensor]) -> Result<Tensor> {
    if images.is_empty() {
        return Err(GazeError::shape("image batch", "at least one image", &[0]));
    }
    Ok(Tensor::stack(images, 0)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn uniform(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_resized_dimensions_keep_aspect() {
        assert_eq!(resized_dimensions(640, 480), (341, 256));
        assert_eq!(resized_dimensions(480, 640), (256, 341));
        assert_eq!(resized_dimensions(60, 36), (426, 256));
        assert_eq!(resized_dimensions(300, 300), (256, 256));
    }

    #[test]
    fn test_crop_offset_rounds_half_to_even() {
        assert_eq!(crop_offset(256), 16);
        // (341 - 224) / 2 = 58.5
        assert_eq!(crop_offset(341), 58);
        // (427 - 224) / 2 = 101.5
        assert_eq!(crop_offset(427), 102);
        assert_eq!(crop_offset(224), 0);
    }

    #[test]
    fn test_preprocess_shape_and_normalisation() {
        let image = uniform(60, 36, [255, 128, 0]);
        let tensor = preprocess_eye(&image, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[3, 224, 224]);

        let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let plane = 224 * 224;
        let expected = [
            (1.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0],
            (128.0 / 255.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1],
            (0.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2],
        ];
        for (c, want) in expected.iter().enumerate() {
            let got = values[c * plane + plane / 2];
            assert!((got - want).abs() < 1e-4, "channel {c}: {got} vs {want}");
        }
    }

    #[test]
    fn test_grayscale_input_becomes_rgb() {
        let image = DynamicImage::ImageLuma8(image::GrayImage::new(40, 30));
        let tensor = preprocess_eye(&image, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[3, 224, 224]);
    }

    #[test]
    fn test_empty_image_rejected() {
        let image = uniform(0, 10, [0, 0, 0]);
        assert!(preprocess_eye(&image, &Device::Cpu).unwrap_err().is_shape());
    }

    #[test]
    fn test_stack_batch() {
        let a = preprocess_eye(&uniform(64, 64, [10, 20, 30]), &Device::Cpu).unwrap();
        let b = preprocess_eye(&uniform(80, 40, [40, 50, 60]), &Device::Cpu).unwrap();
        let batch = stack_batch(&[a, b]).unwrap();
        assert_eq!(batch.dims(), &[2, 3, 224, 224]);
        assert!(stack_batch(&[]).unwrap_err().is_shape());
    }
}
