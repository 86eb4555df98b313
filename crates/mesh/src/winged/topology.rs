//! Topology queries for WingedMesh.
//!
//! Vertex fans are walked through the edge wings: inside a face, the edge
//! sharing a vertex with the current edge is either its predecessor or its
//! successor, and the other wing of that edge continues the fan.

use glam::Vec3;

use super::types::{Edge, EdgeId, Face, FaceId, Vertex, VertexId};
use super::{WingedMesh, edge_key};
use crate::primitives::Aabb;

/// Edges and faces around a vertex in rotational order.
#[derive(Debug, Clone, Default)]
pub struct VertexFan {
    pub edges: Vec<EdgeId>,
    pub faces: Vec<FaceId>,
    /// False when the vertex lies on a boundary
    pub closed: bool,
}

impl WingedMesh {
    // ========================================================================
    // Element access
    // ========================================================================

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.index())?.as_ref()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())?.as_ref()
    }

    pub fn face(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(id.index())?.as_ref()
    }

    pub fn position(&self, id: VertexId) -> Option<Vec3> {
        self.vertex(id).map(|v| v.position)
    }

    /// Live vertex ids in ascending order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.iter().flatten().map(|v| v.id)
    }

    /// Live edge ids in ascending order.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.iter().flatten().map(|e| e.id)
    }

    /// Live face ids in ascending order.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces.iter().flatten().map(|f| f.id)
    }

    /// Edge joining two vertices, in either direction.
    pub fn find_edge(&self, a: VertexId, b: VertexId) -> Option<EdgeId> {
        self.edge_map.get(&edge_key(a, b)).copied()
    }

    /// The face that traverses `a -> b`, if any.
    pub fn face_using_directed(&self, a: VertexId, b: VertexId) -> Option<FaceId> {
        let edge = self.edge(self.find_edge(a, b)?)?;
        if edge.vertex1 == a {
            edge.left_face
        } else {
            edge.right_face
        }
    }

    pub fn face_vertices(&self, face: FaceId) -> Option<[VertexId; 3]> {
        self.face(face).map(|f| f.vertices)
    }

    pub fn face_positions(&self, face: FaceId) -> Option<[Vec3; 3]> {
        let [a, b, c] = self.face_vertices(face)?;
        Some([self.position(a)?, self.position(b)?, self.position(c)?])
    }

    /// Edges of a face in winding order, walked through the successor links.
    pub fn face_edge_loop(&self, face: FaceId) -> Option<[EdgeId; 3]> {
        let first = self.face(face)?.edges[0];
        let second = self.edge(first)?.successor_in(face)?;
        let third = self.edge(second)?.successor_in(face)?;
        Some([first, second, third])
    }

    pub fn face_centroid(&self, face: FaceId) -> Option<Vec3> {
        let [a, b, c] = self.face_positions(face)?;
        Some((a + b + c) / 3.0)
    }

    pub fn face_area(&self, face: FaceId) -> Option<f32> {
        let [a, b, c] = self.face_positions(face)?;
        Some(crate::primitives::triangle_area(a, b, c))
    }

    pub fn face_aabb(&self, face: FaceId) -> Option<Aabb> {
        Aabb::from_points(self.face_positions(face)?)
    }

    pub fn edge_endpoints(&self, edge: EdgeId) -> Option<(Vec3, Vec3)> {
        let e = self.edge(edge)?;
        Some((self.position(e.vertex1)?, self.position(e.vertex2)?))
    }

    pub fn edge_length(&self, edge: EdgeId) -> Option<f32> {
        let (a, b) = self.edge_endpoints(edge)?;
        Some(a.distance(b))
    }

    /// Third vertices of the faces on either wing of an edge.
    pub fn opposite_vertices(&self, edge: EdgeId) -> Vec<VertexId> {
        let Some(e) = self.edge(edge) else {
            return Vec::new();
        };
        e.faces()
            .filter_map(|f| self.face(f)?.opposite_vertex(e.vertex1, e.vertex2))
            .collect()
    }

    /// Bounds of every live vertex.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter().flatten().map(|v| v.position))
    }

    // ========================================================================
    // Fans
    // ========================================================================

    /// The edge of `face` other than `edge` that touches `vertex`.
    fn fan_step(&self, face: FaceId, edge: &Edge, vertex: VertexId) -> Option<EdgeId> {
        [edge.successor_in(face)?, edge.predecessor_in(face)?]
            .into_iter()
            .find(|&candidate| {
                self.edge(candidate)
                    .is_some_and(|c| c.has_vertex(vertex))
            })
    }

    /// Walk the fan of `vertex` from one wing of `start` until it closes or
    /// reaches a boundary. Returns whether the walk closed.
    fn walk_fan(
        &self,
        vertex: VertexId,
        start: EdgeId,
        first_face: Option<FaceId>,
        edges: &mut Vec<EdgeId>,
        faces: &mut Vec<FaceId>,
    ) -> bool {
        let limit = self.edge_count + 1;
        let mut face = first_face;
        let mut current = start;
        for _ in 0..limit {
            let Some(f) = face else {
                return false;
            };
            faces.push(f);
            let Some(edge) = self.edge(current) else {
                return false;
            };
            let Some(next) = self.fan_step(f, edge, vertex) else {
                return false;
            };
            if next == start {
                return true;
            }
            edges.push(next);
            face = self.edge(next).and_then(|e| e.other_face(f));
            current = next;
        }
        false
    }

    /// Edges and faces around `vertex` in rotational order.
    pub fn vertex_fan(&self, vertex: VertexId) -> VertexFan {
        let Some(start) = self.vertex(vertex).and_then(|v| v.edge) else {
            return VertexFan::default();
        };
        let Some(start_edge) = self.edge(start) else {
            return VertexFan::default();
        };
        let (first, second) = match (start_edge.left_face, start_edge.right_face) {
            (Some(l), r) => (Some(l), r),
            (None, r) => (r, None),
        };

        let mut edges = vec![start];
        let mut faces = Vec::new();
        if self.walk_fan(vertex, start, first, &mut edges, &mut faces) {
            return VertexFan {
                edges,
                faces,
                closed: true,
            };
        }

        // Hit a boundary: walk the other way from the start edge
        let mut back_edges = Vec::new();
        let mut back_faces = Vec::new();
        self.walk_fan(vertex, start, second, &mut back_edges, &mut back_faces);
        back_edges.reverse();
        back_faces.reverse();
        back_edges.extend(edges);
        back_faces.extend(faces);
        VertexFan {
            edges: back_edges,
            faces: back_faces,
            closed: false,
        }
    }

    /// Faces incident to a vertex.
    pub fn vertex_faces(&self, vertex: VertexId) -> Vec<FaceId> {
        self.vertex_fan(vertex).faces
    }

    /// Edges incident to a vertex.
    pub fn vertex_edges(&self, vertex: VertexId) -> Vec<EdgeId> {
        self.vertex_fan(vertex).edges
    }

    /// Vertices sharing an edge with `vertex`, in fan order.
    pub fn neighbors_of(&self, vertex: VertexId) -> Vec<VertexId> {
        self.vertex_edges(vertex)
            .into_iter()
            .filter_map(|e| self.edge(e)?.other_vertex(vertex))
            .collect()
    }

    pub fn valence(&self, vertex: VertexId) -> usize {
        self.vertex_edges(vertex).len()
    }

    pub fn is_boundary_vertex(&self, vertex: VertexId) -> bool {
        self.vertex(vertex).is_some_and(|v| v.edge.is_some()) && !self.vertex_fan(vertex).closed
    }

    pub fn is_boundary_edge(&self, edge: EdgeId) -> bool {
        self.edge(edge).is_some_and(|e| e.is_boundary())
    }

    /// Average position of the neighbours of `vertex`.
    pub fn neighbor_centroid(&self, vertex: VertexId) -> Option<Vec3> {
        let neighbors = self.neighbors_of(vertex);
        if neighbors.is_empty() {
            return None;
        }
        let sum: Vec3 = neighbors.iter().filter_map(|&n| self.position(n)).sum();
        Some(sum / neighbors.len() as f32)
    }
}
