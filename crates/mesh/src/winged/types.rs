//! Type definitions for the winged-edge mesh.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Type-safe vertex identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub u32);

/// Type-safe edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

/// Type-safe face identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId(pub u32);

impl VertexId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FaceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A vertex in the winged-edge mesh.
///
/// Normals are derived from the incident faces and served from a lazy cache
/// on [`WingedMesh`](super::WingedMesh), so they are not stored here.
#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: VertexId,
    pub position: Vec3,
    /// One incident edge (None only for isolated vertices)
    pub edge: Option<EdgeId>,
}

/// An undirected edge with its two wings.
///
/// The left face traverses the edge from `vertex1` to `vertex2`, the right
/// face from `vertex2` to `vertex1`. Predecessor and successor are the edges
/// before and after this one when walking around the respective face.
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub vertex1: VertexId,
    pub vertex2: VertexId,
    pub left_face: Option<FaceId>,
    pub right_face: Option<FaceId>,
    pub left_predecessor: Option<EdgeId>,
    pub left_successor: Option<EdgeId>,
    pub right_predecessor: Option<EdgeId>,
    pub right_successor: Option<EdgeId>,
}

impl Edge {
    /// A boundary edge has exactly one adjacent face.
    pub fn is_boundary(&self) -> bool {
        self.left_face.is_none() || self.right_face.is_none()
    }

    pub fn has_vertex(&self, vertex: VertexId) -> bool {
        self.vertex1 == vertex || self.vertex2 == vertex
    }

    pub fn other_vertex(&self, vertex: VertexId) -> Option<VertexId> {
        if self.vertex1 == vertex {
            Some(self.vertex2)
        } else if self.vertex2 == vertex {
            Some(self.vertex1)
        } else {
            None
        }
    }

    /// The face on the other wing from `face`.
    pub fn other_face(&self, face: FaceId) -> Option<FaceId> {
        if self.left_face == Some(face) {
            self.right_face
        } else if self.right_face == Some(face) {
            self.left_face
        } else {
            None
        }
    }

    /// Adjacent faces, left first.
    pub fn faces(&self) -> impl Iterator<Item = FaceId> {
        self.left_face.into_iter().chain(self.right_face)
    }

    /// Edge following this one around `face`.
    pub fn successor_in(&self, face: FaceId) -> Option<EdgeId> {
        if self.left_face == Some(face) {
            self.left_successor
        } else if self.right_face == Some(face) {
            self.right_successor
        } else {
            None
        }
    }

    /// Edge preceding this one around `face`.
    pub fn predecessor_in(&self, face: FaceId) -> Option<EdgeId> {
        if self.left_face == Some(face) {
            self.left_predecessor
        } else if self.right_face == Some(face) {
            self.right_predecessor
        } else {
            None
        }
    }
}

/// A triangle.
///
/// `edges[i]` joins `vertices[i]` and `vertices[(i + 1) % 3]`. The vertex
/// order defines the winding (counter-clockwise when seen from outside).
#[derive(Debug, Clone)]
pub struct Face {
    pub id: FaceId,
    pub edges: [EdgeId; 3],
    pub vertices: [VertexId; 3],
    /// Number of edge bisections that produced this face
    pub level: u8,
}

impl Face {
    /// Index of `vertex` within the face, if present.
    pub fn corner_of(&self, vertex: VertexId) -> Option<usize> {
        self.vertices.iter().position(|&v| v == vertex)
    }

    /// The vertex not on edge `a`-`b`.
    pub fn opposite_vertex(&self, a: VertexId, b: VertexId) -> Option<VertexId> {
        self.vertices.iter().copied().find(|&v| v != a && v != b)
    }
}

/// Errors that can occur during mesh operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    /// The operation would break manifoldness; nothing was applied.
    #[error("{operation} rejected: {reason}")]
    Integrity {
        operation: &'static str,
        reason: String,
    },
    #[error("Unknown vertex {0:?}")]
    UnknownVertex(VertexId),
    #[error("Unknown edge {0:?}")]
    UnknownEdge(EdgeId),
    #[error("Unknown face {0:?}")]
    UnknownFace(FaceId),
    #[error("Invalid mesh data: {0}")]
    InvalidInput(String),
}

impl MeshError {
    pub(crate) fn integrity(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Integrity {
            operation,
            reason: reason.into(),
        }
    }

    /// Whether this is the manifold-integrity kind.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}
