//! Interactive sculpting for chisel.
//!
//! This crate turns pick events into mesh edits:
//! - Brush-based deformation (Carve, Inflate, Drag, Grab, Smooth, Flatten,
//!   Pinch, Crease, Reduce)
//! - Adaptive subdivision around the brush, and reduction for the Reduce brush
//! - Mirrored editing across a symmetry plane
//! - Stroke-granular undo/redo by replaying invertible mesh patches
//!
//! # Architecture
//!
//! The mesh itself lives in `chisel-mesh`; every edit made here goes through
//! its validated patch path, so the mesh is manifold after every event.
//!
//! ## Key Components
//!
//! - **Spatial**: Face octree answering ray and sphere queries under mutation
//! - **Brush**: Brush parameters, falloff curves and stroke spacing
//! - **Deformation**: Per-kind displacement kernels and the degeneracy clamp
//! - **Tessellation**: Edge split/collapse for density near the brush
//! - **Symmetry**: Mirror pass matching partners by position
//! - **History**: Bounded undo/redo stacks of actions
//! - **Pipeline**: Orchestrates pick → deform → subdivide → mirror → commit
//! - **Gpu**: Snapshot diffing for partial buffer uploads

pub mod brush;
pub mod commands;
pub mod deformation;
pub mod gpu;
pub mod history;
pub mod input;
pub mod pipeline;
pub mod spatial;
pub mod symmetry;
pub mod tessellation;
pub mod types;

#[cfg(test)]
mod test_meshes;

pub use brush::{Brush, FalloffCurve, StrokeSpacing, step_width};
pub use commands::{SculptCommand, SculptResponse};
pub use deformation::{Dab, DabStats};
pub use gpu::{GpuSync, GpuUpdate};
pub use history::{Action, ActionHistory};
pub use input::{PickEvent, PickInput};
pub use pipeline::{EventResult, SculptingPipeline, StrokeEndResult};
pub use spatial::{FaceOctree, RayHit};
pub use symmetry::{MirrorPlane, MirrorStats, PartnerMap, SymmetryController};
pub use tessellation::TessellationStats;
pub use types::{BrushFlags, BrushKind, SculptError};
