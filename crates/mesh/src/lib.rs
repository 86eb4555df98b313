//! Indexed mesh store for the chisel sculpting core.
//!
//! This crate owns the mesh data every other part of the engine queries
//! and mutates:
//! - A winged-edge triangle mesh stored as parallel slot arrays addressed by
//!   stable integer ids ([`WingedMesh`])
//! - Atomic, invertible mesh patches ([`MeshPatch`]) through which every
//!   mutation is validated and applied
//! - Geometric primitives shared with the spatial index and brushes
//!   ([`Ray`], [`Plane`], [`Sphere`], [`Aabb`])
//! - Read-only renderer snapshots with per-element change sets
//!
//! # Commit model
//!
//! Mutations are buffered as a [`ChangeSet`] of touched vertices and faces.
//! Consumers drain it at well-defined commit points:
//!
//! ```text
//! split / collapse / flip / move
//!         │
//!         ▼
//!   apply_patch ──► journal (undo/redo)
//!         │
//!         ├──► pending changes  ──► spatial index (per brush application)
//!         └──► snapshot changes ──► renderer (per snapshot)
//! ```

pub mod primitives;
pub mod snapshot;
pub mod winged;

pub use primitives::{
    Aabb, Plane, Ray, Sphere, TriangleHit, interpolate_vec3, ray_triangle_intersection,
    triangle_area,
};
pub use snapshot::{GpuVertex, MeshSnapshot};
pub use winged::{
    ChangeSet, Edge, EdgeId, Face, FaceId, FaceRecord, HeldIds, MeshError, MeshPatch, Vertex,
    VertexFan, VertexId, VertexMove, VertexRecord, WingedMesh,
};
