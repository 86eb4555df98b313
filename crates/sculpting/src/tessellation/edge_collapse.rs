//! Edge collapse candidates for the reduce brush.
//!
//! Collapsing an edge merges its two endpoints at the midpoint and removes
//! the faces that shared it:
//!
//! ```text
//!        C                    C
//!       /|\                  / \
//!      / | \                /   \
//!     A--+--B      ->      M-----+
//!      \ | /                \   /
//!       \|/                  \ /
//!        D                    D
//! ```
//!
//! Topological legality (link condition, boundary loops) is decided by the
//! mesh store. This module adds the geometric side: a collapse is refused if
//! any surviving face would flip or degenerate, and otherwise scored by how
//! much it turns the surviving face normals.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chisel_mesh::{EdgeId, FaceId, Sphere, VertexId, WingedMesh};
use glam::Vec3;

use crate::deformation::DEGENERATE_AREA_EPSILON;

/// An edge that the reduce brush may collapse.
#[derive(Debug, Clone, Copy)]
pub struct CollapseCandidate {
    pub edge: EdgeId,
    /// Sum over surviving faces of `1 - n_before · n_after`
    pub error: f32,
}

impl CollapseCandidate {
    /// Candidate for `edge` if it touches `region`, is shorter than
    /// `min_length`, keeps the boundary intact and collapses cleanly.
    pub fn evaluate(
        mesh: &WingedMesh,
        edge: EdgeId,
        region: &Sphere,
        min_length: f32,
    ) -> Option<Self> {
        let e = mesh.edge(edge)?;
        let (a, b) = mesh.edge_endpoints(edge)?;
        if a.distance(b) >= min_length || !region.intersects_segment(a, b) {
            return None;
        }
        if mesh.is_boundary_vertex(e.vertex1) || mesh.is_boundary_vertex(e.vertex2) {
            return None;
        }
        mesh.can_collapse_edge(edge).ok()?;
        let error = collapse_error(mesh, edge, (a + b) * 0.5)?;
        Some(Self { edge, error })
    }
}

impl PartialEq for CollapseCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CollapseCandidate {}

impl PartialOrd for CollapseCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CollapseCandidate {
    /// Lowest error first, then lowest edge id.
    fn cmp(&self, other: &Self) -> Ordering {
        self.error
            .total_cmp(&other.error)
            .then_with(|| self.edge.cmp(&other.edge))
    }
}

/// Normal change caused by merging the endpoints of `edge` at `target`.
///
/// Returns `None` if a surviving face would flip or lose its area.
pub fn collapse_error(mesh: &WingedMesh, edge: EdgeId, target: Vec3) -> Option<f32> {
    let e = mesh.edge(edge)?;
    let (a, b) = (e.vertex1, e.vertex2);
    let faces: BTreeSet<FaceId> = mesh
        .vertex_faces(a)
        .into_iter()
        .chain(mesh.vertex_faces(b))
        .collect();

    let mut error = 0.0;
    for face in faces {
        let corners = mesh.face_vertices(face)?;
        if corners.contains(&a) && corners.contains(&b) {
            continue;
        }
        let before = mesh.face_normal(face)?;
        let after = moved_face_normal(mesh, corners, &[a, b], target)?;
        if would_cause_flip(before, after) {
            return None;
        }
        error += 1.0 - before.dot(after);
    }
    Some(error)
}

/// Check if a face normal reversed direction.
pub fn would_cause_flip(before: Vec3, after: Vec3) -> bool {
    before.dot(after) <= 0.0
}

/// Unit normal of a face after moving `moving` corners to `target`.
/// `None` if the moved face is degenerate.
fn moved_face_normal(
    mesh: &WingedMesh,
    corners: [VertexId; 3],
    moving: &[VertexId],
    target: Vec3,
) -> Option<Vec3> {
    let mut p = [Vec3::ZERO; 3];
    for (slot, corner) in p.iter_mut().zip(corners) {
        *slot = if moving.contains(&corner) {
            target
        } else {
            mesh.position(corner)?
        };
    }
    let cross = (p[1] - p[0]).cross(p[2] - p[0]);
    if cross.length() * 0.5 < DEGENERATE_AREA_EPSILON {
        return None;
    }
    Some(cross.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes;

    fn interior_edge(mesh: &WingedMesh) -> EdgeId {
        mesh.edge_ids()
            .find(|&e| {
                let edge = mesh.edge(e).unwrap();
                !mesh.is_boundary_vertex(edge.vertex1) && !mesh.is_boundary_vertex(edge.vertex2)
            })
            .unwrap()
    }

    #[test]
    fn test_flat_collapse_has_zero_error() {
        let mesh = test_meshes::grid(4, 0.5);
        let edge = interior_edge(&mesh);
        let (a, b) = mesh.edge_endpoints(edge).unwrap();
        let error = collapse_error(&mesh, edge, (a + b) * 0.5).unwrap();
        assert!(error.abs() < 1e-6);
    }

    #[test]
    fn test_far_target_is_rejected() {
        let mesh = test_meshes::grid(4, 0.5);
        let edge = interior_edge(&mesh);
        assert!(collapse_error(&mesh, edge, Vec3::new(3.0, 0.0, 3.0)).is_none());
    }

    #[test]
    fn test_boundary_edges_are_not_candidates() {
        let mesh = test_meshes::grid(4, 0.5);
        let region = Sphere::new(Vec3::ZERO, 2.0);
        for edge in mesh.edge_ids() {
            let e = mesh.edge(edge).unwrap();
            let touches_boundary =
                mesh.is_boundary_vertex(e.vertex1) || mesh.is_boundary_vertex(e.vertex2);
            let candidate = CollapseCandidate::evaluate(&mesh, edge, &region, 1.0);
            if touches_boundary {
                assert!(candidate.is_none());
            }
        }
        assert!(CollapseCandidate::evaluate(&mesh, interior_edge(&mesh), &region, 1.0).is_some());
    }

    #[test]
    fn test_candidates_sort_by_error_then_id() {
        let mut candidates = vec![
            CollapseCandidate { edge: EdgeId(7), error: 0.1 },
            CollapseCandidate { edge: EdgeId(3), error: 0.0 },
            CollapseCandidate { edge: EdgeId(1), error: 0.1 },
        ];
        candidates.sort();
        let order: Vec<u32> = candidates.iter().map(|c| c.edge.0).collect();
        assert_eq!(order, vec![3, 1, 7]);
    }
}
