//! Filesystem adapter for loading eye images.

use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use tracing::debug;

/// Supported image extensions.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Checks if a path has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

/// Loads an eye crop from the filesystem.
///
/// # Errors
///
/// Returns an error if the extension is unsupported or the file cannot be decoded.
pub fn load_eye_image(path: &Path) -> Result<DynamicImage> {
    if !is_supported_image(path) {
        anyhow::bail!("Unsupported image type: {}", path.display());
    }

    let image =
        image::open(path).with_context(|| format!("Failed to open image: {}", path.display()))?;
    debug!(
        "Loaded {} ({}x{})",
        path.display(),
        image.width(),
        image.height()
    );
    Ok(image)
}
