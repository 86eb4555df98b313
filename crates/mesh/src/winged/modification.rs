//! Topology and geometry edits for WingedMesh.
//!
//! Each edit builds a [`MeshPatch`] and hands it to `apply_patch`, which
//! performs the final manifold check. The checks here reject the cases that
//! have a clearer explanation than a broken fan (boundary flips, link
//! condition failures, merging boundary loops).

use std::collections::BTreeSet;

use glam::Vec3;
use tracing::trace;

use super::WingedMesh;
use super::patch::{FaceRecord, MeshPatch, VertexMove, VertexRecord};
use super::types::{EdgeId, FaceId, MeshError, VertexId};

impl WingedMesh {
    /// Rotate the corners of `face` so that `from -> to` is the first edge.
    fn corners_starting_at(
        &self,
        face: FaceId,
        from: VertexId,
        to: VertexId,
    ) -> Option<[VertexId; 3]> {
        let v = self.face(face)?.vertices;
        (0..3)
            .find(|&i| v[i] == from && v[(i + 1) % 3] == to)
            .map(|i| [v[i], v[(i + 1) % 3], v[(i + 2) % 3]])
    }

    fn face_record(&self, face: FaceId) -> Result<FaceRecord, MeshError> {
        let f = self.face(face).ok_or(MeshError::UnknownFace(face))?;
        Ok(FaceRecord {
            id: face,
            vertices: f.vertices,
            level: f.level,
        })
    }

    /// Split an edge at its midpoint. Returns the new vertex.
    pub fn split_edge(&mut self, edge: EdgeId) -> Result<VertexId, MeshError> {
        let (a, b) = self.edge_endpoints(edge).ok_or(MeshError::UnknownEdge(edge))?;
        self.split_edge_at(edge, (a + b) * 0.5)
    }

    /// Split an edge at `position`, replacing each adjacent face by two.
    pub fn split_edge_at(&mut self, edge: EdgeId, position: Vec3) -> Result<VertexId, MeshError> {
        let e = self.edge(edge).ok_or(MeshError::UnknownEdge(edge))?;
        let (v1, v2) = (e.vertex1, e.vertex2);
        let wings: Vec<(FaceId, VertexId, VertexId)> = [
            e.left_face.map(|f| (f, v1, v2)),
            e.right_face.map(|f| (f, v2, v1)),
        ]
        .into_iter()
        .flatten()
        .collect();

        let mid = self
            .reserve_vertex_ids(1)
            .first()
            .copied()
            .ok_or_else(|| MeshError::integrity("split_edge", "could not reserve a vertex id"))?;
        let new_ids = self.reserve_face_ids(wings.len() * 2);

        let mut patch = MeshPatch {
            inserted_vertices: vec![VertexRecord { id: mid, position }],
            ..Default::default()
        };
        for (k, &(face, from, to)) in wings.iter().enumerate() {
            let old = self.face_record(face)?;
            let [x, y, z] = self
                .corners_starting_at(face, from, to)
                .ok_or(MeshError::UnknownFace(face))?;
            let level = old.level.saturating_add(1);
            patch.removed_faces.push(old);
            patch.inserted_faces.push(FaceRecord {
                id: new_ids[2 * k],
                vertices: [x, mid, z],
                level,
            });
            patch.inserted_faces.push(FaceRecord {
                id: new_ids[2 * k + 1],
                vertices: [mid, y, z],
                level,
            });
        }

        self.apply_patch(&patch)?;
        trace!("Split edge {:?} -> vertex {:?}", edge, mid);
        Ok(mid)
    }

    /// Replace the diagonal of the quad formed by an interior edge's two faces.
    pub fn flip_edge(&mut self, edge: EdgeId) -> Result<(), MeshError> {
        const OPERATION: &str = "flip_edge";
        let e = self.edge(edge).ok_or(MeshError::UnknownEdge(edge))?;
        let (Some(left), Some(right)) = (e.left_face, e.right_face) else {
            return Err(MeshError::integrity(OPERATION, "boundary edges cannot be flipped"));
        };
        let (a, b) = (e.vertex1, e.vertex2);
        let [_, _, c] = self
            .corners_starting_at(left, a, b)
            .ok_or(MeshError::UnknownFace(left))?;
        let [_, _, d] = self
            .corners_starting_at(right, b, a)
            .ok_or(MeshError::UnknownFace(right))?;
        if c == d {
            return Err(MeshError::integrity(OPERATION, "wings share their opposite vertex"));
        }
        if self.find_edge(c, d).is_some() {
            return Err(MeshError::integrity(
                OPERATION,
                format!("edge {:?}-{:?} already exists", c, d),
            ));
        }

        let old_left = self.face_record(left)?;
        let old_right = self.face_record(right)?;
        let level = old_left.level.max(old_right.level);
        // Quad a, d, b, c re-triangulated along c-d
        let patch = MeshPatch {
            removed_faces: vec![old_left, old_right],
            inserted_faces: vec![
                FaceRecord {
                    id: left,
                    vertices: [c, a, d],
                    level,
                },
                FaceRecord {
                    id: right,
                    vertices: [d, b, c],
                    level,
                },
            ],
            ..Default::default()
        };
        self.apply_patch(&patch)?;
        trace!("Flipped edge {:?}", edge);
        Ok(())
    }

    /// Collapse an edge into its first endpoint placed at the midpoint.
    pub fn collapse_edge(&mut self, edge: EdgeId) -> Result<VertexId, MeshError> {
        let (a, b) = self.edge_endpoints(edge).ok_or(MeshError::UnknownEdge(edge))?;
        self.collapse_edge_to(edge, (a + b) * 0.5)
    }

    /// Whether collapsing `edge` passes the topological checks.
    pub fn can_collapse_edge(&self, edge: EdgeId) -> Result<(), MeshError> {
        const OPERATION: &str = "collapse_edge";
        let e = self.edge(edge).ok_or(MeshError::UnknownEdge(edge))?;
        let (keep, remove) = (e.vertex1, e.vertex2);

        // Link condition: shared neighbours are exactly the wing apexes
        let opposite: BTreeSet<VertexId> = self.opposite_vertices(edge).into_iter().collect();
        let keep_ring: BTreeSet<VertexId> = self.neighbors_of(keep).into_iter().collect();
        let common: BTreeSet<VertexId> = self
            .neighbors_of(remove)
            .into_iter()
            .filter(|v| keep_ring.contains(v))
            .collect();
        if common != opposite {
            return Err(MeshError::integrity(
                OPERATION,
                format!(
                    "link condition fails: {} shared neighbours, {} wing apexes",
                    common.len(),
                    opposite.len()
                ),
            ));
        }

        if !e.is_boundary() && self.is_boundary_vertex(keep) && self.is_boundary_vertex(remove) {
            return Err(MeshError::integrity(
                OPERATION,
                "interior edge joins two boundary vertices and would merge boundary loops",
            ));
        }
        Ok(())
    }

    /// Collapse an edge, keeping `vertex1` at `position` and removing `vertex2`.
    pub fn collapse_edge_to(&mut self, edge: EdgeId, position: Vec3) -> Result<VertexId, MeshError> {
        self.can_collapse_edge(edge)?;
        let e = self.edge(edge).ok_or(MeshError::UnknownEdge(edge))?;
        let (keep, remove) = (e.vertex1, e.vertex2);
        let keep_position = self.position(keep).ok_or(MeshError::UnknownVertex(keep))?;
        let remove_position = self.position(remove).ok_or(MeshError::UnknownVertex(remove))?;

        let mut patch = MeshPatch::default();
        if keep_position != position {
            patch.moves.push(VertexMove {
                vertex: keep,
                before: keep_position,
                after: position,
            });
        }
        for face in self.vertex_faces(remove) {
            let old = self.face_record(face)?;
            patch.removed_faces.push(old);
            if old.vertices.contains(&keep) {
                continue;
            }
            let vertices = old.vertices.map(|v| if v == remove { keep } else { v });
            patch.inserted_faces.push(FaceRecord { vertices, ..old });
        }
        patch.removed_vertices.push(VertexRecord {
            id: remove,
            position: remove_position,
        });

        self.apply_patch(&patch)?;
        trace!("Collapsed edge {:?}: {:?} into {:?}", edge, remove, keep);
        Ok(keep)
    }

    /// Move one vertex.
    pub fn move_vertex(&mut self, vertex: VertexId, position: Vec3) -> Result<(), MeshError> {
        self.move_vertices(&[(vertex, position)])
    }

    /// Move several vertices as one atomic commit.
    pub fn move_vertices(&mut self, targets: &[(VertexId, Vec3)]) -> Result<(), MeshError> {
        let mut moves = Vec::with_capacity(targets.len());
        for &(vertex, after) in targets {
            let before = self.position(vertex).ok_or(MeshError::UnknownVertex(vertex))?;
            if !after.is_finite() {
                return Err(MeshError::InvalidInput(format!(
                    "non-finite position for {:?}",
                    vertex
                )));
            }
            if before != after {
                moves.push(VertexMove {
                    vertex,
                    before,
                    after,
                });
            }
        }
        if moves.is_empty() {
            return Ok(());
        }
        self.apply_patch(&MeshPatch::from_moves(moves))?;
        Ok(())
    }
}
