//! Core sculpting types.
//!
//! Brush kinds and flags are plain serializable values so that a stroke can
//! be described by the host (UI, IPC) without touching engine internals.

use chisel_config::ConfigError;
use chisel_mesh::MeshError;
use serde::{Deserialize, Serialize};

/// Type of sculpting deformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BrushKind {
    /// Push vertices out along their own normal (inward with `invert`)
    #[default]
    Carve = 0,
    /// Like carve, but tuned for broad swelling of a region
    Inflate = 1,
    /// Translate the region by the pointer movement, re-picking every event
    Drag = 2,
    /// Translate the region captured at stroke start, topology locked
    Grab = 3,
    /// Move vertices toward the centroid of their neighbours
    Smooth = 4,
    /// Project vertices onto the best-fit plane of the region
    Flatten = 5,
    /// Pull vertices toward the brush center in the tangent plane
    Pinch = 6,
    /// Sharpen ridges and valleys
    Crease = 7,
    /// Collapse short edges, no displacement
    Reduce = 8,
}

impl BrushKind {
    pub const ALL: [BrushKind; 9] = [
        BrushKind::Carve,
        BrushKind::Inflate,
        BrushKind::Drag,
        BrushKind::Grab,
        BrushKind::Smooth,
        BrushKind::Flatten,
        BrushKind::Pinch,
        BrushKind::Crease,
        BrushKind::Reduce,
    ];

    /// Kinds that call for adaptive subdivision in the region after displacement.
    pub fn is_density_increasing(self) -> bool {
        matches!(self, BrushKind::Carve | BrushKind::Inflate | BrushKind::Crease)
    }

    /// Kinds whose region follows the pointer rather than the surface.
    ///
    /// After the first event these kinds do not re-pick: the new point is the
    /// intersection of the pick ray with the view plane through the last point.
    pub fn is_anchored(self) -> bool {
        matches!(self, BrushKind::Drag | BrushKind::Grab)
    }

    /// Kinds that forbid topology changes for the rest of the stroke.
    pub fn locks_topology(self) -> bool {
        matches!(self, BrushKind::Grab)
    }

    /// Kinds that only change topology.
    pub fn is_topological_only(self) -> bool {
        matches!(self, BrushKind::Reduce)
    }
}

/// Behaviour modifiers that apply to any brush kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushFlags {
    /// Ignore vertices whose normal faces away from the viewer
    pub discard_backfaces: bool,
    /// Project displacements onto the brush's primary plane
    pub along_primary_plane: bool,
    /// Smooth only: remove the normal component of the displacement
    pub relax_only: bool,
    /// Reverse the direction of carve, inflate, pinch and crease
    pub invert: bool,
}

/// Errors from the sculpting engine.
#[derive(Debug, thiserror::Error)]
pub enum SculptError {
    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error("No stroke is active")]
    NoActiveStroke,

    #[error("A stroke is already active")]
    StrokeInProgress,

    #[error("Invalid brush: {0}")]
    InvalidBrush(String),

    #[error("Invalid pick input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to decode command: {0}")]
    Command(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let increasing: Vec<_> = BrushKind::ALL
            .iter()
            .filter(|k| k.is_density_increasing())
            .collect();
        assert_eq!(
            increasing,
            vec![&BrushKind::Carve, &BrushKind::Inflate, &BrushKind::Crease]
        );
        assert!(BrushKind::Grab.locks_topology());
        assert!(!BrushKind::Drag.locks_topology());
        assert!(BrushKind::Drag.is_anchored());
        assert!(BrushKind::Reduce.is_topological_only());
    }

    #[test]
    fn test_flags_default_from_partial_json() {
        let flags: BrushFlags = serde_json::from_str(r#"{"invert": true}"#).unwrap();
        assert!(flags.invert);
        assert!(!flags.discard_backfaces);
    }
}
