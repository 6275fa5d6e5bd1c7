//! Editor configuration.
//!
//! Loaded from a JSON file; every field is optional and falls back to its default.
//!
//! ```json
//! {
//!   "task_manager": { "workers": 2, "max_commit_retries": 5 },
//!   "terrain": { "page_size": 32.0, "extent": [0.0, 0.0, 512.0, 512.0] },
//!   "demo": { "frames": 60 }
//! }
//! ```

use std::{fs, io, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine_state::terrain::BoundingBox;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("could not read config {path}: {source}")]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The file is not valid JSON for `EditorConfig`.
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskManagerConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Units a single worker may hold at once. 1 keeps each worker strictly FIFO.
    pub max_tasks_in_flight: usize,
    /// Extra frames a refused commit is retried before its visual update is dropped.
    pub max_commit_retries: u32,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_tasks_in_flight: 1,
            max_commit_retries: 3,
        }
    }
}

/// Terrain store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Edge length of a terrain page in world units.
    pub page_size: f32,
    /// Optional `[min_x, min_y, max_x, max_y]` bounds every area must lie within.
    pub extent: Option<[f32; 4]>,
    /// Most pages a single area may be indexed on. Larger shapes are rejected.
    pub max_pages_per_area: u64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            page_size: 64.0,
            extent: None,
            max_pages_per_area: 4096,
        }
    }
}

impl TerrainConfig {
    /// The extent as a bounding box.
    pub fn extent_bbox(&self) -> Option<BoundingBox> {
        self.extent
            .map(|[min_x, min_y, max_x, max_y]| BoundingBox::from_coords(min_x, min_y, max_x, max_y))
    }
}

/// Settings for the headless demo driven by `run()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Frames to simulate.
    pub frames: u32,
    /// Target frame time.
    pub frame_millis: u64,
    /// Areas laid out before editing starts.
    pub areas: u32,
    /// Shader layers the areas are spread over.
    pub layers: u32,
    /// Edits attempted per frame.
    pub edits_per_frame: u32,
    /// Seed for the edit generator; random if unset.
    pub seed: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 120,
            frame_millis: 16,
            areas: 16,
            layers: 3,
            edits_per_frame: 4,
            seed: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Worker pool settings.
    pub task_manager: TaskManagerConfig,
    /// Terrain store settings.
    pub terrain: TerrainConfig,
    /// Demo settings.
    pub demo: DemoConfig,
}

impl EditorConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Parses and validates a JSON config string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EditorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_manager.workers == 0 {
            return Err(ConfigError::Invalid(
                "task_manager.workers must be at least 1".to_string(),
            ));
        }
        if self.task_manager.max_tasks_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "task_manager.max_tasks_in_flight must be at least 1".to_string(),
            ));
        }
        let page_size = self.terrain.page_size;
        if !page_size.is_finite() || page_size <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "terrain.page_size must be positive, got {page_size}"
            )));
        }
        if let Some([min_x, min_y, max_x, max_y]) = self.terrain.extent {
            if !(min_x < max_x && min_y < max_y) {
                return Err(ConfigError::Invalid(format!(
                    "terrain.extent must have min < max, got [{min_x}, {min_y}, {max_x}, {max_y}]"
                )));
            }
        }
        if self.terrain.max_pages_per_area == 0 {
            return Err(ConfigError::Invalid(
                "terrain.max_pages_per_area must be at least 1".to_string(),
            ));
        }
        if self.demo.layers == 0 {
            return Err(ConfigError::Invalid(
                "demo.layers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
