//! Configuration file support for rt-gene.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/rt-gene/config.toml` (lowest priority)
//! - Project-local: `.rt-gene.toml` (searched up directory tree)
//! - CLI flags (highest priority, applied separately)

use std::path::{Path, PathBuf};

use rt_gene_core::BackboneVariant;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Name of the project-local config file.
const PROJECT_CONFIG: &str = ".rt-gene.toml";

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Model construction settings.
    pub model: ModelConfig,
    /// Pretrained weight cache settings.
    pub weights: WeightsConfig,
    /// Output formatting settings.
    pub output: OutputConfig,
}

/// Model configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Backbone: resnet18/50/101 or small/medium/large.
    pub variant: Option<String>,
    /// Number of regression outputs.
    pub num_outputs: Option<usize>,
    /// Trained safetensors checkpoint to load instead of pretrained backbones.
    pub checkpoint: Option<PathBuf>,
    /// Re-initialise the regression head with the variant's policy.
    pub init_head: Option<bool>,
}

/// Weights configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    /// Custom weights directory path.
    pub dir: Option<PathBuf>,
}

/// Output formatting configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "json" or "jsonl".
    pub format: Option<String>,
    /// Pretty-print JSON output.
    pub pretty: Option<bool>,
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Priority (lowest to highest):
    /// 1. XDG config: `~/.config/rt-gene/config.toml`
    /// 2. Project-local: `.rt-gene.toml` (searched up from cwd)
    ///
    /// Missing files are silently ignored. Invalid values are logged as warnings.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config = xdg_config;
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.merge(project_config);
            }
        }

        if let Err(e) = config.validate() {
            eprintln!("warning: {e}");
        }

        config
    }

    /// Parsed backbone variant, if one is configured and valid.
    #[must_use]
    pub fn variant(&self) -> Option<BackboneVariant> {
        self.model
            .variant
            .as_deref()
            .and_then(|v| v.parse().ok())
    }

    /// Validate configuration values are within acceptable ranges.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref v) = self.model.variant {
            v.parse::<BackboneVariant>()
                .map_err(|e| format!("model.variant: {e}"))?;
        }
        if self.model.num_outputs == Some(0) {
            return Err("model.num_outputs must be at least 1".to_string());
        }
        if let Some(ref f) = self.output.format {
            if f != "json" && f != "jsonl" {
                return Err(format!(
                    "output.format must be 'json' or 'jsonl', got '{f}'"
                ));
            }
        }
        Ok(())
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    fn merge(&mut self, other: Self) {
        // Model
        self.model.variant = other.model.variant.or_else(|| self.model.variant.take());
        self.model.num_outputs = other.model.num_outputs.or(self.model.num_outputs);
        self.model.checkpoint = other
            .model
            .checkpoint
            .or_else(|| self.model.checkpoint.take());
        self.model.init_head = other.model.init_head.or(self.model.init_head);

        // Weights
        self.weights.dir = other.weights.dir.or_else(|| self.weights.dir.take());

        // Output
        self.output.format = other.output.format.or_else(|| self.output.format.take());
        self.output.pretty = other.output.pretty.or(self.output.pretty);
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rt-gene").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.rt-gene.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(PROJECT_CONFIG))
        .find(|path| path.exists())
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}
