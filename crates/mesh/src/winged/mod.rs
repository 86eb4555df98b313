//! Winged-edge triangle mesh store
//!
//! Vertices, edges and faces live in parallel slot arrays addressed by
//! integer ids. Each edge stores its two wings (adjacent faces) and the
//! previous/next edge around each wing, which gives constant-time walks
//! around a face or a vertex fan.
//!
//! ## Identifier lifetime
//!
//! Deleting an element retires its id. Retired ids are never handed out
//! again until [`WingedMesh::reclaim_identifiers`] runs with the set of ids
//! still held elsewhere (the action history), so re-inserting an element
//! during undo/redo always finds its original slot free.
//!
//! ## Mutation
//!
//! Every mutation is expressed as a [`MeshPatch`] and goes through
//! [`WingedMesh::apply_patch`], which validates the manifold invariant on the
//! touched neighbourhood before changing anything.

mod construction;
mod modification;
mod normals;
mod patch;
mod topology;
mod types;
mod validation;

use std::collections::{BTreeSet, HashMap, HashSet};

pub use patch::{FaceRecord, MeshPatch, VertexMove, VertexRecord};
pub use topology::VertexFan;
pub use types::{Edge, EdgeId, Face, FaceId, MeshError, Vertex, VertexId};

use normals::NormalCell;

/// Vertex and face ids touched by mutations since a consumer last drained them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub vertices: BTreeSet<VertexId>,
    pub faces: BTreeSet<FaceId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.faces.is_empty()
    }

    pub fn extend(&mut self, other: &ChangeSet) {
        self.vertices.extend(other.vertices.iter().copied());
        self.faces.extend(other.faces.iter().copied());
    }
}

/// Ids that an external holder (the action history) may still re-insert.
#[derive(Debug, Clone, Default)]
pub struct HeldIds {
    pub vertices: HashSet<VertexId>,
    pub faces: HashSet<FaceId>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct IdSets {
    pub(crate) vertices: BTreeSet<u32>,
    pub(crate) edges: BTreeSet<u32>,
    pub(crate) faces: BTreeSet<u32>,
}

/// Winged-edge mesh data structure
#[derive(Debug, Clone, Default)]
pub struct WingedMesh {
    pub(crate) vertices: Vec<Option<Vertex>>,
    pub(crate) edges: Vec<Option<Edge>>,
    pub(crate) faces: Vec<Option<Face>>,
    /// Map from sorted vertex pair to edge
    pub(crate) edge_map: HashMap<(VertexId, VertexId), EdgeId>,
    /// Slots that may be reused
    pub(crate) free: IdSets,
    /// Deleted ids waiting for a reclaim pass
    pub(crate) retired: IdSets,
    pub(crate) normals: NormalCell,
    /// Patches applied while recording, in application order
    pub(crate) journal: Option<Vec<MeshPatch>>,
    /// Changes not yet reported to the spatial index
    pub(crate) pending: ChangeSet,
    /// Changes not yet handed to the renderer
    pub(crate) unsnapshotted: ChangeSet,
    pub(crate) vertex_count: usize,
    pub(crate) edge_count: usize,
    pub(crate) face_count: usize,
}

pub(crate) fn edge_key(a: VertexId, b: VertexId) -> (VertexId, VertexId) {
    if a <= b { (a, b) } else { (b, a) }
}

impl WingedMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn face_count(&self) -> usize {
        self.face_count
    }

    pub fn is_empty(&self) -> bool {
        self.face_count == 0
    }

    // ========================================================================
    // Journal and change tracking
    // ========================================================================

    /// Start recording applied patches. Any previous recording is discarded.
    pub fn begin_journal(&mut self) {
        self.journal = Some(Vec::new());
    }

    /// Stop recording and return the patches applied since `begin_journal`.
    pub fn take_journal(&mut self) -> Vec<MeshPatch> {
        self.journal.take().unwrap_or_default()
    }

    pub fn is_journaling(&self) -> bool {
        self.journal.is_some()
    }

    /// Drain the changes accumulated since the last commit point.
    pub fn take_pending_changes(&mut self) -> ChangeSet {
        std::mem::take(&mut self.pending)
    }

    /// Changes accumulated since the last commit point, without draining.
    pub fn pending_changes(&self) -> &ChangeSet {
        &self.pending
    }

    // ========================================================================
    // Identifier management
    // ========================================================================

    /// Ids that `count` new vertices would receive, without allocating them.
    pub(crate) fn reserve_vertex_ids(&self, count: usize) -> Vec<VertexId> {
        reserve(&self.free.vertices, self.vertices.len(), count)
            .into_iter()
            .map(VertexId)
            .collect()
    }

    pub(crate) fn reserve_face_ids(&self, count: usize) -> Vec<FaceId> {
        reserve(&self.free.faces, self.faces.len(), count)
            .into_iter()
            .map(FaceId)
            .collect()
    }

    pub(crate) fn allocate_edge_id(&mut self) -> EdgeId {
        let id = match self.free.edges.pop_first() {
            Some(id) => id,
            None => self.edges.len() as u32,
        };
        ensure_slot(&mut self.edges, &mut self.free.edges, id);
        EdgeId(id)
    }

    /// Number of retired ids waiting for reclamation (vertices, edges, faces).
    pub fn retired_counts(&self) -> (usize, usize, usize) {
        (
            self.retired.vertices.len(),
            self.retired.edges.len(),
            self.retired.faces.len(),
        )
    }

    /// Make retired ids reusable, except those still held externally.
    ///
    /// Edge ids are never held outside the mesh and are always reclaimed.
    /// Returns the number of ids released.
    pub fn reclaim_identifiers(&mut self, held: &HeldIds) -> usize {
        let mut released = 0;

        let vertices: Vec<u32> = self
            .retired
            .vertices
            .iter()
            .copied()
            .filter(|&id| !held.vertices.contains(&VertexId(id)))
            .collect();
        for id in vertices {
            self.retired.vertices.remove(&id);
            if self.vertices.get(id as usize).is_some_and(|slot| slot.is_none()) {
                self.free.vertices.insert(id);
                released += 1;
            }
        }

        let faces: Vec<u32> = self
            .retired
            .faces
            .iter()
            .copied()
            .filter(|&id| !held.faces.contains(&FaceId(id)))
            .collect();
        for id in faces {
            self.retired.faces.remove(&id);
            if self.faces.get(id as usize).is_some_and(|slot| slot.is_none()) {
                self.free.faces.insert(id);
                released += 1;
            }
        }

        for id in std::mem::take(&mut self.retired.edges) {
            if self.edges.get(id as usize).is_some_and(|slot| slot.is_none()) {
                self.free.edges.insert(id);
                released += 1;
            }
        }

        tracing::debug!("Reclaimed {} identifiers", released);
        released
    }
}

/// Pick `count` ids: free slots first (ascending), then fresh ones.
fn reserve(free: &BTreeSet<u32>, len: usize, count: usize) -> Vec<u32> {
    let mut ids: Vec<u32> = free.iter().copied().take(count).collect();
    let mut next = len as u32;
    while ids.len() < count {
        ids.push(next);
        next += 1;
    }
    ids
}

/// Grow `slots` so that `id` is addressable, registering skipped slots as free.
pub(crate) fn ensure_slot<T>(slots: &mut Vec<Option<T>>, free: &mut BTreeSet<u32>, id: u32) {
    let index = id as usize;
    while slots.len() <= index {
        let skipped = slots.len() as u32;
        slots.push(None);
        if skipped != id {
            free.insert(skipped);
        }
    }
    free.remove(&id);
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::WingedMesh;

    /// Unit square in the XZ plane split along its diagonal.
    pub fn unit_square() -> WingedMesh {
        WingedMesh::from_indexed(
            &[
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 0.0, 1.0],
                [0.0, 0.0, 1.0],
            ],
            &[0, 2, 1, 0, 3, 2],
        )
        .unwrap()
    }

    /// Regular octahedron (closed, every vertex has valence 4).
    pub fn octahedron() -> WingedMesh {
        WingedMesh::from_indexed(
            &[
                [1.0, 0.0, 0.0],
                [-1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, -1.0, 0.0],
                [0.0, 0.0, 1.0],
                [0.0, 0.0, -1.0],
            ],
            &[
                0, 2, 4, 2, 1, 4, 1, 3, 4, 3, 0, 4, //
                2, 0, 5, 1, 2, 5, 3, 1, 5, 0, 3, 5,
            ],
        )
        .unwrap()
    }

    /// Flat `n` x `n` quad grid of side 1 in the XZ plane, upward facing.
    pub fn grid(n: usize) -> WingedMesh {
        let mut positions = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                positions.push([i as f32 / n as f32, 0.0, j as f32 / n as f32]);
            }
        }
        let mut indices = Vec::new();
        let row = (n + 1) as u32;
        for j in 0..n as u32 {
            for i in 0..n as u32 {
                let a = j * row + i;
                let b = a + 1;
                let c = a + row;
                let d = c + 1;
                indices.extend_from_slice(&[a, c, b, b, c, d]);
            }
        }
        WingedMesh::from_indexed(&positions, &indices).unwrap()
    }
}
