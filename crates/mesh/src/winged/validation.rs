//! Full-mesh consistency checks.
//!
//! Mutations only check the neighbourhood they touch; `validate` walks the
//! whole mesh and is meant for tests and debug builds.

use std::collections::HashMap;

use super::types::{MeshError, VertexId};
use super::{WingedMesh, edge_key};

const OPERATION: &str = "validate";

fn violation(reason: String) -> MeshError {
    MeshError::integrity(OPERATION, reason)
}

impl WingedMesh {
    /// Check connectivity, wing links and the manifold invariant everywhere.
    pub fn validate(&self) -> Result<(), MeshError> {
        let mut live_edges = 0;
        for edge in self.edges.iter().flatten() {
            live_edges += 1;
            if self.vertex(edge.vertex1).is_none() || self.vertex(edge.vertex2).is_none() {
                return Err(violation(format!("edge {:?} has a dead endpoint", edge.id)));
            }
            if self.edge_map.get(&edge_key(edge.vertex1, edge.vertex2)) != Some(&edge.id) {
                return Err(violation(format!("edge {:?} missing from edge map", edge.id)));
            }
            if edge.left_face.is_none() && edge.right_face.is_none() {
                return Err(violation(format!("edge {:?} has no faces", edge.id)));
            }
            for (face_id, from, to) in [
                (edge.left_face, edge.vertex1, edge.vertex2),
                (edge.right_face, edge.vertex2, edge.vertex1),
            ] {
                let Some(face_id) = face_id else {
                    continue;
                };
                let face = self
                    .face(face_id)
                    .ok_or_else(|| violation(format!("edge {:?} wings dead face {:?}", edge.id, face_id)))?;
                let Some(corner) = (0..3).find(|&i| {
                    face.vertices[i] == from && face.vertices[(i + 1) % 3] == to
                }) else {
                    return Err(violation(format!(
                        "face {:?} does not traverse edge {:?} in wing order",
                        face_id, edge.id
                    )));
                };
                if face.edges[corner] != edge.id
                    || edge.successor_in(face_id) != Some(face.edges[(corner + 1) % 3])
                    || edge.predecessor_in(face_id) != Some(face.edges[(corner + 2) % 3])
                {
                    return Err(violation(format!(
                        "edge {:?} has stale links in face {:?}",
                        edge.id, face_id
                    )));
                }
            }
        }
        if live_edges != self.edge_count || self.edge_map.len() != self.edge_count {
            return Err(violation("edge count out of sync".to_string()));
        }

        let mut faces_per_vertex: HashMap<VertexId, usize> = HashMap::new();
        let mut live_faces = 0;
        for face in self.faces.iter().flatten() {
            live_faces += 1;
            let [a, b, c] = face.vertices;
            if a == b || b == c || a == c {
                return Err(violation(format!("face {:?} repeats a corner", face.id)));
            }
            for i in 0..3 {
                let edge = self
                    .edge(face.edges[i])
                    .ok_or_else(|| violation(format!("face {:?} uses a dead edge", face.id)))?;
                if edge.left_face != Some(face.id) && edge.right_face != Some(face.id) {
                    return Err(violation(format!(
                        "face {:?} not winged by edge {:?}",
                        face.id, edge.id
                    )));
                }
                *faces_per_vertex.entry(face.vertices[i]).or_default() += 1;
            }
        }
        if live_faces != self.face_count {
            return Err(violation("face count out of sync".to_string()));
        }

        let mut live_vertices = 0;
        for vertex in self.vertices.iter().flatten() {
            live_vertices += 1;
            let expected = faces_per_vertex.get(&vertex.id).copied().unwrap_or(0);
            match vertex.edge {
                None if expected == 0 => continue,
                None => {
                    return Err(violation(format!(
                        "vertex {:?} has faces but no edge",
                        vertex.id
                    )));
                }
                Some(edge) => {
                    if !self.edge(edge).is_some_and(|e| e.has_vertex(vertex.id)) {
                        return Err(violation(format!(
                            "vertex {:?} anchored on foreign edge {:?}",
                            vertex.id, edge
                        )));
                    }
                }
            }
            // A single fan reaches every incident face
            let fan = self.vertex_fan(vertex.id);
            if fan.faces.len() != expected {
                return Err(violation(format!(
                    "vertex {:?} fan reaches {} of {} faces",
                    vertex.id,
                    fan.faces.len(),
                    expected
                )));
            }
        }
        if live_vertices != self.vertex_count {
            return Err(violation("vertex count out of sync".to_string()));
        }
        Ok(())
    }
}
