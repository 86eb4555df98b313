//! Read-only mesh snapshots handed to the renderer.
//!
//! A snapshot is built at a commit boundary and shared behind an `Arc`; the
//! mesh never mutates it afterwards. Alongside it the mesh reports which
//! vertex and face ids changed since the previous snapshot, so a consumer
//! holding its own copy can patch GPU buffers instead of re-uploading.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use tracing::debug;

use crate::winged::{ChangeSet, FaceId, VertexId, WingedMesh};

/// Vertex layout uploaded to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Immutable copy of the mesh geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshSnapshot {
    pub vertices: Vec<GpuVertex>,
    /// Three indices into `vertices` per triangle
    pub indices: Vec<u32>,
    /// Mesh id of each entry in `vertices`
    pub vertex_ids: Vec<VertexId>,
    /// Mesh id of each triangle in `indices`
    pub face_ids: Vec<FaceId>,
}

impl MeshSnapshot {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Raw vertex bytes for a GPU buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

impl WingedMesh {
    /// Take a snapshot and drain the change set accumulated since the last one.
    pub fn snapshot(&mut self) -> (Arc<MeshSnapshot>, ChangeSet) {
        let snapshot = Arc::new(self.build_snapshot());
        let changes = std::mem::take(&mut self.unsnapshotted);
        debug!(
            "Snapshot: {} vertices, {} triangles, {} changed vertices, {} changed faces",
            snapshot.vertices.len(),
            snapshot.triangle_count(),
            changes.vertices.len(),
            changes.faces.len()
        );
        (snapshot, changes)
    }

    /// Changes accumulated since the last snapshot, without draining them.
    pub fn changes_since_snapshot(&self) -> &ChangeSet {
        &self.unsnapshotted
    }

    fn build_snapshot(&self) -> MeshSnapshot {
        let mut snapshot = MeshSnapshot::default();
        let mut slot_of = vec![u32::MAX; self.vertices.len()];

        for vertex in self.vertices.iter().flatten() {
            slot_of[vertex.id.index()] = snapshot.vertices.len() as u32;
            let normal = self.vertex_normal(vertex.id).unwrap_or(Vec3::Y);
            snapshot.vertices.push(GpuVertex {
                position: vertex.position.to_array(),
                normal: normal.to_array(),
            });
            snapshot.vertex_ids.push(vertex.id);
        }
        for face in self.faces.iter().flatten() {
            snapshot
                .indices
                .extend(face.vertices.iter().map(|v| slot_of[v.index()]));
            snapshot.face_ids.push(face.id);
        }
        snapshot
    }
}
