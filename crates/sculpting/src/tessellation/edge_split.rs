//! Longest-edge-first split queue.
//!
//! ```text
//!        C                    C
//!       / \                  /|\
//!      /   \                / | \
//!     A-----B      ->      A--M--B
//!      \   /                \ | /
//!       \ /                  \|/
//!        D                    D
//! ```
//!
//! Splitting AB at its midpoint M replaces each adjacent face by two, one
//! level deeper than the face it came from. Candidates are popped longest
//! first with ties going to the lowest edge id, which keeps the result
//! independent of hash or insertion order.

use std::cmp::Ordering;

use chisel_mesh::{EdgeId, Sphere, WingedMesh};

/// An edge waiting to be split.
#[derive(Debug, Clone, Copy)]
pub struct SplitCandidate {
    pub edge: EdgeId,
    pub length: f32,
}

impl SplitCandidate {
    /// Queue entry for `edge` if it touches `region` and is longer than `target`.
    pub fn evaluate(mesh: &WingedMesh, edge: EdgeId, region: &Sphere, target: f32) -> Option<Self> {
        let (a, b) = mesh.edge_endpoints(edge)?;
        let length = a.distance(b);
        (length > target && region.intersects_segment(a, b)).then_some(Self { edge, length })
    }
}

impl PartialEq for SplitCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SplitCandidate {}

impl PartialOrd for SplitCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SplitCandidate {
    /// Max-heap order: longer first, then lower edge id.
    fn cmp(&self, other: &Self) -> Ordering {
        self.length
            .total_cmp(&other.length)
            .then_with(|| other.edge.cmp(&self.edge))
    }
}

/// Whether every face adjacent to `edge` is below `max_level`.
pub fn within_depth(mesh: &WingedMesh, edge: EdgeId, max_level: u8) -> bool {
    mesh.edge(edge).is_some_and(|e| {
        e.faces()
            .all(|f| mesh.face(f).is_some_and(|face| face.level < max_level))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes;
    use glam::Vec3;
    use std::collections::BinaryHeap;

    #[test]
    fn test_heap_pops_longest_then_lowest_id() {
        let mut heap = BinaryHeap::new();
        heap.push(SplitCandidate { edge: EdgeId(4), length: 1.0 });
        heap.push(SplitCandidate { edge: EdgeId(2), length: 1.0 });
        heap.push(SplitCandidate { edge: EdgeId(9), length: 1.5 });
        heap.push(SplitCandidate { edge: EdgeId(1), length: 0.5 });

        let order: Vec<u32> = std::iter::from_fn(|| heap.pop()).map(|c| c.edge.0).collect();
        assert_eq!(order, vec![9, 2, 4, 1]);
    }

    #[test]
    fn test_evaluate_filters_short_and_distant_edges() {
        let mesh = test_meshes::unit_square();
        let everywhere = Sphere::new(Vec3::new(0.5, 0.0, 0.5), 2.0);
        let nowhere = Sphere::new(Vec3::new(5.0, 0.0, 5.0), 0.1);
        for edge in mesh.edge_ids() {
            assert!(SplitCandidate::evaluate(&mesh, edge, &everywhere, 0.5).is_some());
            assert!(SplitCandidate::evaluate(&mesh, edge, &everywhere, 2.0).is_none());
            assert!(SplitCandidate::evaluate(&mesh, edge, &nowhere, 0.5).is_none());
        }
    }

    #[test]
    fn test_within_depth() {
        let mut mesh = test_meshes::unit_square();
        let diagonal = mesh
            .edge_ids()
            .max_by(|&a, &b| mesh.edge_length(a).unwrap().total_cmp(&mesh.edge_length(b).unwrap()))
            .unwrap();
        assert!(within_depth(&mesh, diagonal, 1));
        let mid = mesh.split_edge(diagonal).unwrap();
        for edge in mesh.vertex_edges(mid) {
            assert!(!within_depth(&mesh, edge, 1));
            assert!(within_depth(&mesh, edge, 2));
        }
    }
}
