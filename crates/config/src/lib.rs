//! Engine configuration for chisel
//!
//! This crate is the single source of truth for the tunables of the
//! sculpting core: octree bucketing, adaptive subdivision limits, undo
//! depth and symmetry matching. Every section has documented defaults,
//! can be loaded from JSON, and can be overridden from `CHISEL_*`
//! environment variables at startup.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "bevy")]
use bevy::prelude::Resource;

/// Default maximum number of undoable strokes kept in history
pub const DEFAULT_HISTORY_DEPTH: usize = 64;

/// Default octree leaf capacity before a node splits
pub const DEFAULT_NODE_CAPACITY: usize = 32;

/// Default maximum subdivision depth (each level halves edge lengths)
pub const DEFAULT_SUBDIVISION_DEPTH: u8 = 6;

/// Default distance under which two vertices are considered mirror partners
pub const DEFAULT_SYMMETRY_TOLERANCE: f32 = 1e-4;

/// Errors produced while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// A coordinate axis, used to name mirror planes and constraint planes.
///
/// The plane associated with an axis passes through the origin and has
/// that axis as its normal (e.g. `X` names the plane x = 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Axis {
    #[default]
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    /// Unit vector along this axis as `[x, y, z]`.
    pub fn unit(self) -> [f32; 3] {
        match self {
            Axis::X => [1.0, 0.0, 0.0],
            Axis::Y => [0.0, 1.0, 0.0],
            Axis::Z => [0.0, 0.0, 1.0],
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "x" => Some(Axis::X),
            "y" => Some(Axis::Y),
            "z" => Some(Axis::Z),
            _ => None,
        }
    }
}

/// Octree bucketing parameters for the face spatial index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeSettings {
    /// Faces a node may hold before it splits (default: 32)
    pub node_capacity: usize,
    /// Subtree face count under which children merge back (default: 8)
    pub low_water_mark: usize,
    /// Maximum node depth below the root (default: 10)
    pub max_depth: u8,
    /// Relative padding added around the mesh bounds for the root (default: 0.1)
    pub root_padding: f32,
}

impl Default for OctreeSettings {
    fn default() -> Self {
        Self {
            node_capacity: DEFAULT_NODE_CAPACITY,
            low_water_mark: 8,
            max_depth: 10,
            root_padding: 0.1,
        }
    }
}

/// Limits for the adaptive subdivision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdivisionSettings {
    /// Whether density-increasing brushes refine the mesh at all (default: true)
    pub enabled: bool,
    /// Maximum subdivision depth; each level halves edge lengths (default: 6)
    pub max_depth: u8,
    /// Edge splits allowed per pick event (default: 4096)
    pub max_splits_per_event: usize,
    /// Edge collapses allowed per pick event (default: 1024)
    pub max_collapses_per_event: usize,
    /// Target edge length is `(1 - detail_factor) * radius` (default: 0.75)
    pub detail_factor: f32,
    /// Reduce threshold is `reduce_ratio * (1 + intensity) * target` (default: 1.0)
    pub reduce_ratio: f32,
}

impl Default for SubdivisionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_depth: DEFAULT_SUBDIVISION_DEPTH,
            max_splits_per_event: 4096,
            max_collapses_per_event: 1024,
            detail_factor: 0.75,
            reduce_ratio: 1.0,
        }
    }
}

/// Undo history settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Maximum number of undoable strokes (default: 64)
    pub max_depth: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

/// Mirrored editing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymmetrySettings {
    /// Whether strokes are mirrored when the pipeline starts (default: false)
    pub enabled: bool,
    /// Axis naming the mirror plane (default: X)
    pub axis: Axis,
    /// Maximum distance for matching a mirrored vertex (default: 1e-4)
    pub tolerance: f32,
}

impl Default for SymmetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            axis: Axis::X,
            tolerance: DEFAULT_SYMMETRY_TOLERANCE,
        }
    }
}

/// Stroke-level brush settings shared by every brush kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushSettings {
    /// Spacing between applied events is `factor * ln(radius + 1)` (default: 0.1)
    pub step_width_factor: f32,
    /// Radius used by brush presets (default: 0.2)
    pub default_radius: f32,
    /// Intensity used by brush presets (default: 0.5)
    pub default_intensity: f32,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            step_width_factor: 0.1,
            default_radius: 0.2,
            default_intensity: 0.5,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "bevy", derive(Resource))]
#[serde(default)]
pub struct SculptConfig {
    pub octree: OctreeSettings,
    pub subdivision: SubdivisionSettings,
    pub history: HistorySettings,
    pub symmetry: SymmetrySettings,
    pub brush: BrushSettings,
}

impl SculptConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Default configuration with `CHISEL_*` environment overrides applied.
    ///
    /// Recognised variables: `CHISEL_HISTORY_DEPTH`, `CHISEL_SUBDIVISION_DEPTH`,
    /// `CHISEL_SYMMETRY` (`x`, `y`, `z` or `off`) and `CHISEL_NODE_CAPACITY`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(depth) = lookup("CHISEL_HISTORY_DEPTH").and_then(|v| v.parse().ok()) {
            debug!("History depth overridden from environment: {}", depth);
            self.history.max_depth = depth;
        }
        if let Some(depth) = lookup("CHISEL_SUBDIVISION_DEPTH").and_then(|v| v.parse().ok()) {
            debug!("Subdivision depth overridden from environment: {}", depth);
            self.subdivision.max_depth = depth;
        }
        if let Some(capacity) = lookup("CHISEL_NODE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.octree.node_capacity = capacity;
        }
        match lookup("CHISEL_SYMMETRY").as_deref() {
            Some("off") => self.symmetry.enabled = false,
            Some(value) => {
                if let Some(axis) = Axis::parse(value) {
                    self.symmetry.enabled = true;
                    self.symmetry.axis = axis;
                }
            }
            None => {}
        }
    }

    /// Check value ranges that the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.octree.node_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "octree.node_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.octree.low_water_mark >= self.octree.node_capacity {
            return Err(ConfigError::InvalidValue {
                field: "octree.low_water_mark",
                reason: format!(
                    "must be below node_capacity ({})",
                    self.octree.node_capacity
                ),
            });
        }
        if !(0.0..1.0).contains(&self.subdivision.detail_factor) {
            return Err(ConfigError::InvalidValue {
                field: "subdivision.detail_factor",
                reason: format!("{} is outside [0, 1)", self.subdivision.detail_factor),
            });
        }
        if self.history.max_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history.max_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.symmetry.tolerance <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "symmetry.tolerance",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
