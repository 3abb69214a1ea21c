use crate::resolver::ResolverOptions;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// How checkbox and radio values reach the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FillStrategy {
    /// Text fields interactively, toggles as drawn marks.
    #[default]
    Hybrid,
    /// Every field interactively, nothing drawn.
    Direct,
}

impl FillStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillStrategy::Hybrid => "hybrid",
            FillStrategy::Direct => "direct",
        }
    }
}

/// Pipeline behavior that is not part of a single request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub strategy: FillStrategy,
    pub resolver: ResolverOptions,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./storage")
}

fn default_max_concurrent_fills() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_flatten() -> bool {
    true
}

/// Service configuration, read from JSON. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FillConfig {
    pub storage_root: PathBuf,
    pub max_concurrent_fills: usize,
    pub flatten: bool,
    pub strategy: FillStrategy,
    pub ignore_case: bool,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            max_concurrent_fills: default_max_concurrent_fills(),
            flatten: default_flatten(),
            strategy: FillStrategy::default(),
            ignore_case: false,
        }
    }
}

impl FillConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            strategy: self.strategy,
            resolver: ResolverOptions {
                ignore_case: self.ignore_case,
            },
        }
    }
}
