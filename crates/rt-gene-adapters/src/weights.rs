//! Pretrained backbone weight downloading and caching adapter.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::{Device, Tensor};
use rt_gene_core::inference::read_safetensors;
use rt_gene_core::{BackboneVariant, PretrainedWeights};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Pretrained weight file metadata.
#[derive(Debug, Clone)]
pub struct WeightsInfo {
    /// Backbone these weights belong to.
    pub variant: BackboneVariant,
    /// Download URL.
    pub url: &'static str,
    /// Expected SHA256 hash, if pinned.
    pub sha256: Option<&'static str>,
    /// Filename in the weights directory.
    pub filename: &'static str,
}

/// torchvision ImageNet weights, as republished in safetensors format.
pub const WEIGHTS: &[WeightsInfo] = &[
    WeightsInfo {
        variant: BackboneVariant::Resnet18,
        url: "https://huggingface.co/timm/resnet18.tv_in1k/resolve/main/model.safetensors",
        sha256: None,
        filename: "resnet18.safetensors",
    },
    WeightsInfo {
        variant: BackboneVariant::Resnet50,
        url: "https://huggingface.co/timm/resnet50.tv_in1k/resolve/main/model.safetensors",
        sha256: None,
        filename: "resnet50.safetensors",
    },
    WeightsInfo {
        variant: BackboneVariant::Resnet101,
        url: "https://huggingface.co/timm/resnet101.tv_in1k/resolve/main/model.safetensors",
        sha256: None,
        filename: "resnet101.safetensors",
    },
];

/// Progress callback: `(name, downloaded_bytes, total_bytes)`.
pub type ProgressCallback = Box<dyn Fn(&str, u64, Option<u64>) + Send + Sync>;

/// Returns the default weights directory.
///
/// Uses `XDG_DATA_HOME/rt-gene/weights` or `~/.local/share/rt-gene/weights`.
#[must_use]
pub fn default_weights_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rt-gene")
        .join("weights")
}

/// Returns the metadata for a backbone's weights.
#[must_use]
pub fn weights_info(variant: BackboneVariant) -> &'static WeightsInfo {
    match variant {
        BackboneVariant::Resnet18 => &WEIGHTS[0],
        BackboneVariant::Resnet50 => &WEIGHTS[1],
        BackboneVariant::Resnet101 => &WEIGHTS[2],
    }
}

/// Returns the cached weights path for `variant` inside `dir`.
#[must_use]
pub fn weights_path(dir: &Path, variant: BackboneVariant) -> PathBuf {
    dir.join(weights_info(variant).filename)
}

/// Lists every known backbone with whether its weights are cached in `dir`.
#[must_use]
pub fn list_weights(dir: &Path) -> Vec<(BackboneVariant, bool)> {
    WEIGHTS
        .iter()
        .map(|w| (w.variant, dir.join(w.filename).exists()))
        .collect()
}

/// Ensures the weights for `variant` are cached in `dir`, downloading if needed.
///
/// # Errors
///
/// Returns an error if:
/// - The weights directory cannot be created
/// - The download fails
/// - The file's checksum doesn't match
pub fn ensure_weights(
    dir: &Path,
    variant: BackboneVariant,
    progress: Option<&ProgressCallback>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create weights directory {}", dir.display()))?;

    let info = weights_info(variant);
    let path = dir.join(info.filename);
    if path.exists() {
        debug!("Weights for {} already cached", info.variant);
        return Ok(path);
    }

    download(info, dir, progress)?;
    Ok(path)
}

/// Streams `info.url` into `dir`, verifies it and moves it into place.
///
/// The download lands in a temporary file next to its destination; it is
/// removed on every failure path and renamed atomically on success.
fn download(info: &WeightsInfo, dir: &Path, progress: Option<&ProgressCallback>) -> Result<()> {
    let name = info.variant.name();
    info!("Downloading {name} weights from {}", info.url);

    let mut response =
        reqwest::blocking::get(info.url).with_context(|| format!("Failed to download {name}"))?;
    if !response.status().is_success() {
        anyhow::bail!("Download of {name} failed with status: {}", response.status());
    }
    let total = response.content_length();

    let tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    let mut writer = HashingWriter {
        inner: tmp,
        hasher: Sha256::new(),
        written: 0,
        report: |written| {
            if let Some(cb) = progress {
                cb(name, written, total);
            }
        },
    };
    io::copy(&mut response, &mut writer)
        .with_context(|| format!("Failed to read response for {name}"))?;
    writer.flush()?;

    let HashingWriter {
        inner: tmp,
        hasher,
        written,
        ..
    } = writer;
    verify_checksum(name, info.sha256, &format!("{:x}", hasher.finalize()))?;

    let dest = dir.join(info.filename);
    tmp.persist(&dest)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    info!("Downloaded {name} ({written} bytes)");
    Ok(())
}

/// Compares a digest against the pinned hash, if any.
///
/// # Errors
///
/// Returns an error naming both digests on mismatch.
pub fn verify_checksum(name: &str, expected: Option<&str>, actual: &str) -> Result<()> {
    match expected {
        None => {
            debug!("No pinned checksum for {name}, skipping verification");
            Ok(())
        }
        Some(expected) if expected.eq_ignore_ascii_case(actual) => Ok(()),
        Some(expected) => anyhow::bail!(
            "Checksum mismatch for {name}: expected {expected}, got {actual}. \
             The partial download was discarded; re-run to fetch a fresh copy."
        ),
    }
}

/// Writer that hashes and counts everything passing through it.
struct HashingWriter<W, F> {
    inner: W,
    hasher: Sha256,
    written: u64,
    report: F,
}

impl<W: Write, F: FnMut(u64)> Write for HashingWriter<W, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        (self.report)(self.written);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// [`PretrainedWeights`] backed by the on-disk cache, downloading on a miss.
pub struct HubWeights {
    dir: PathBuf,
    progress: Option<ProgressCallback>,
}

impl HubWeights {
    /// Creates a provider caching into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            progress: None,
        }
    }

    /// Reports download progress through `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Default for HubWeights {
    fn default() -> Self {
        Self::new(default_weights_dir())
    }
}

impl PretrainedWeights for HubWeights {
    fn backbone_tensors(
        &self,
        variant: BackboneVariant,
        device: &Device,
    ) -> Result<HashMap<String, Tensor>> {
        let path = ensure_weights(&self.dir, variant, self.progress.as_ref())?;
        let tensors = read_safetensors(&path, device)
            .with_context(|| format!("Failed to load {variant} weights"))?;
        Ok(tensors)
    }
}
