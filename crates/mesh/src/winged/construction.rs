//! Construction from, and reduction to, the persisted representation.
//!
//! The persisted form is an ordered position list plus an ordered triangle
//! index list. A freshly built mesh assigns vertex id `i` to position `i` and
//! face id `t` to triangle `t`, so converting back reproduces the input.

use std::collections::HashMap;

use glam::Vec3;
use tracing::debug;

use super::patch::{FaceRecord, MeshPatch};
use super::types::{FaceId, MeshError, VertexId};
use super::{ChangeSet, WingedMesh};

impl WingedMesh {
    /// Build a mesh from positions and triangle indices.
    ///
    /// Fails with [`MeshError::InvalidInput`] if the indices are malformed or
    /// describe a non-manifold surface.
    pub fn from_indexed(positions: &[[f32; 3]], indices: &[u32]) -> Result<Self, MeshError> {
        if indices.len() % 3 != 0 {
            return Err(MeshError::InvalidInput(
                "Index count not divisible by 3".to_string(),
            ));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(MeshError::InvalidInput(format!(
                "Index {} out of range for {} positions",
                bad,
                positions.len()
            )));
        }
        if let Some(i) = positions.iter().position(|p| p.iter().any(|c| !c.is_finite())) {
            return Err(MeshError::InvalidInput(format!(
                "Position {} is not finite",
                i
            )));
        }

        let mut mesh = Self::new();
        for (i, p) in positions.iter().enumerate() {
            mesh.put_vertex(VertexId(i as u32), Vec3::from_array(*p));
        }

        let patch = MeshPatch {
            inserted_faces: indices
                .chunks_exact(3)
                .enumerate()
                .map(|(t, tri)| FaceRecord {
                    id: FaceId(t as u32),
                    vertices: [VertexId(tri[0]), VertexId(tri[1]), VertexId(tri[2])],
                    level: 0,
                })
                .collect(),
            ..Default::default()
        };
        mesh.apply_patch(&patch)
            .map_err(|e| MeshError::InvalidInput(format!("Non-manifold input: {}", e)))?;

        mesh.pending = ChangeSet::default();
        mesh.unsnapshotted = ChangeSet::default();

        debug!(
            "Built mesh: {} vertices, {} edges, {} faces",
            mesh.vertex_count, mesh.edge_count, mesh.face_count
        );
        Ok(mesh)
    }

    /// Reduce the mesh to positions and triangle indices.
    ///
    /// Vertices and faces are emitted in ascending id order with indices
    /// renumbered densely.
    pub fn to_indexed(&self) -> (Vec<[f32; 3]>, Vec<u32>) {
        let mut remap: HashMap<VertexId, u32> = HashMap::with_capacity(self.vertex_count);
        let mut positions = Vec::with_capacity(self.vertex_count);
        for vertex in self.vertices.iter().flatten() {
            remap.insert(vertex.id, positions.len() as u32);
            positions.push(vertex.position.to_array());
        }

        let mut indices = Vec::with_capacity(self.face_count * 3);
        for face in self.faces.iter().flatten() {
            for v in face.vertices {
                if let Some(&i) = remap.get(&v) {
                    indices.push(i);
                }
            }
        }
        (positions, indices)
    }

    /// Live faces with their corners, in id order.
    pub fn face_records(&self) -> Vec<FaceRecord> {
        self.faces
            .iter()
            .flatten()
            .map(|f| FaceRecord {
                id: f.id,
                vertices: f.vertices,
                level: f.level,
            })
            .collect()
    }

    /// Build from a Bevy mesh with positions and triangle indices.
    #[cfg(feature = "bevy")]
    pub fn from_bevy_mesh(mesh: &bevy::prelude::Mesh) -> Result<Self, MeshError> {
        use bevy::mesh::Indices;
        use bevy::prelude::Mesh;

        let positions = mesh
            .attribute(Mesh::ATTRIBUTE_POSITION)
            .and_then(|attr| attr.as_float3())
            .ok_or_else(|| MeshError::InvalidInput("Mesh has no position attribute".to_string()))?;
        let indices: Vec<u32> = match mesh.indices() {
            Some(Indices::U16(idx)) => idx.iter().map(|&i| i as u32).collect(),
            Some(Indices::U32(idx)) => idx.to_vec(),
            None => return Err(MeshError::InvalidInput("Mesh has no indices".to_string())),
        };
        Self::from_indexed(positions, &indices)
    }

    /// Convert to a Bevy mesh with shared vertices and smooth normals.
    #[cfg(feature = "bevy")]
    pub fn to_bevy_mesh(&self) -> bevy::prelude::Mesh {
        use bevy::asset::RenderAssetUsages;
        use bevy::mesh::{Indices, PrimitiveTopology};
        use bevy::prelude::Mesh;

        let (positions, indices) = self.to_indexed();
        let normals: Vec<[f32; 3]> = self
            .vertex_ids()
            .map(|v| self.vertex_normal(v).unwrap_or(Vec3::Y).to_array())
            .collect();

        let mut mesh = Mesh::new(
            PrimitiveTopology::TriangleList,
            RenderAssetUsages::default(),
        );
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
        mesh.insert_indices(Indices::U32(indices));
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexed_roundtrip_is_exact() {
        let positions = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0],
        ];
        let indices = [0, 2, 1, 0, 3, 2];
        let mesh = WingedMesh::from_indexed(&positions, &indices).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.edge_count(), 5);
        assert_eq!(mesh.face_count(), 2);

        let (out_positions, out_indices) = mesh.to_indexed();
        assert_eq!(out_positions, positions.to_vec());
        assert_eq!(out_indices, indices.to_vec());
    }

    #[test]
    fn test_rejects_malformed_input() {
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        assert!(matches!(
            WingedMesh::from_indexed(&positions, &[0, 1]),
            Err(MeshError::InvalidInput(_))
        ));
        assert!(matches!(
            WingedMesh::from_indexed(&positions, &[0, 1, 7]),
            Err(MeshError::InvalidInput(_))
        ));
        assert!(matches!(
            WingedMesh::from_indexed(&positions, &[0, 1, 1]),
            Err(MeshError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_non_manifold_edge() {
        // Three triangles sharing the edge 0-1
        let positions = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.5, 1.0, 0.0],
            [0.5, -1.0, 0.0],
            [0.5, 0.0, 1.0],
        ];
        let indices = [0, 1, 2, 1, 0, 3, 0, 1, 4];
        assert!(WingedMesh::from_indexed(&positions, &indices).is_err());
    }

    #[test]
    fn test_rejects_bowtie_vertex() {
        // Two triangles touching only at vertex 0
        let positions = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [-1.0, 0.0, 0.0],
            [-1.0, -1.0, 0.0],
        ];
        let indices = [0, 1, 2, 0, 3, 4];
        assert!(WingedMesh::from_indexed(&positions, &indices).is_err());
    }

    #[test]
    fn test_unreferenced_positions_survive() {
        let positions = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [5.0, 5.0, 5.0],
        ];
        let mesh = WingedMesh::from_indexed(&positions, &[0, 1, 2]).unwrap();
        let (out_positions, _) = mesh.to_indexed();
        assert_eq!(out_positions.len(), 4);
        assert_eq!(out_positions[3], [5.0, 5.0, 5.0]);
    }
}
