//! GPU synchronization for sculpted meshes.
//!
//! The pipeline hands out immutable snapshots together with the ids that
//! changed since the previous snapshot. [`GpuSync`] remembers what was last
//! uploaded and turns each new snapshot into one of two update modes:
//!
//! - **Full rebuild**: the vertex or triangle layout changed (subdivision,
//!   reduction, undo of either), so every buffer is re-uploaded
//! - **Vertex patching**: only positions and normals changed, so just the
//!   touched vertex slots are rewritten

use std::collections::BTreeSet;
use std::sync::Arc;

#[cfg(feature = "bevy")]
use bevy::prelude::*;

use chisel_mesh::{ChangeSet, MeshSnapshot};
use tracing::trace;

/// What a renderer must do to catch up with a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuUpdate {
    Unchanged,
    /// Rewrite the listed slots of the vertex buffer; indices are unchanged.
    PatchVertices {
        snapshot: Arc<MeshSnapshot>,
        slots: Vec<usize>,
    },
    /// Upload vertex and index buffers from scratch.
    Rebuild(Arc<MeshSnapshot>),
}

/// Tracks the snapshot currently on the GPU.
#[derive(Debug, Clone, Default)]
pub struct GpuSync {
    uploaded: Option<Arc<MeshSnapshot>>,
}

impl GpuSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify `snapshot` against the last uploaded one and remember it.
    pub fn update(&mut self, snapshot: Arc<MeshSnapshot>, changes: &ChangeSet) -> GpuUpdate {
        let update = match &self.uploaded {
            None => GpuUpdate::Rebuild(snapshot.clone()),
            Some(_) if changes.is_empty() => GpuUpdate::Unchanged,
            Some(previous) if same_layout(previous, &snapshot) => {
                let slots = changed_slots(&snapshot, changes);
                trace!("GpuSync: patching {} vertex slots", slots.len());
                GpuUpdate::PatchVertices {
                    snapshot: snapshot.clone(),
                    slots,
                }
            }
            Some(_) => {
                trace!("GpuSync: layout changed, rebuilding");
                GpuUpdate::Rebuild(snapshot.clone())
            }
        };
        if !matches!(update, GpuUpdate::Unchanged) {
            self.uploaded = Some(snapshot);
        }
        update
    }

    /// Forget the uploaded state, forcing the next update to rebuild.
    pub fn invalidate(&mut self) {
        self.uploaded = None;
    }
}

fn same_layout(a: &MeshSnapshot, b: &MeshSnapshot) -> bool {
    a.vertex_ids == b.vertex_ids && a.indices == b.indices
}

/// Vertex slots whose position or normal may differ: the changed vertices
/// plus every corner of a changed face, since moving one vertex alters the
/// normals of its neighbours.
fn changed_slots(snapshot: &MeshSnapshot, changes: &ChangeSet) -> Vec<usize> {
    let mut slots = BTreeSet::new();
    for vertex in &changes.vertices {
        if let Ok(slot) = snapshot.vertex_ids.binary_search(vertex) {
            slots.insert(slot);
        }
    }
    for face in &changes.faces {
        if let Ok(triangle) = snapshot.face_ids.binary_search(face) {
            for &index in &snapshot.indices[triangle * 3..triangle * 3 + 3] {
                slots.insert(index as usize);
            }
        }
    }
    slots.into_iter().collect()
}

/// Build a Bevy mesh from a snapshot.
#[cfg(feature = "bevy")]
pub fn snapshot_to_bevy_mesh(snapshot: &MeshSnapshot) -> Mesh {
    use bevy::asset::RenderAssetUsages;
    use bevy::mesh::{Indices, PrimitiveTopology};

    let positions: Vec<[f32; 3]> = snapshot.vertices.iter().map(|v| v.position).collect();
    let normals: Vec<[f32; 3]> = snapshot.vertices.iter().map(|v| v.normal).collect();
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_indices(Indices::U32(snapshot.indices.clone()));
    mesh
}

/// Apply an update to the Bevy mesh asset behind `handle`.
///
/// Returns false if the asset is missing or a patch finds attributes in an
/// unexpected format, in which case the caller should invalidate and retry.
#[cfg(feature = "bevy")]
pub fn apply_to_bevy(update: &GpuUpdate, meshes: &mut Assets<Mesh>, handle: &Handle<Mesh>) -> bool {
    let Some(mesh) = meshes.get_mut(handle) else {
        return false;
    };
    match update {
        GpuUpdate::Unchanged => true,
        GpuUpdate::Rebuild(snapshot) => {
            *mesh = snapshot_to_bevy_mesh(snapshot);
            true
        }
        GpuUpdate::PatchVertices { snapshot, slots } => {
            patch_attribute(mesh, Mesh::ATTRIBUTE_POSITION, slots, snapshot, |v| v.position)
                && patch_attribute(mesh, Mesh::ATTRIBUTE_NORMAL, slots, snapshot, |v| v.normal)
        }
    }
}

#[cfg(feature = "bevy")]
fn patch_attribute(
    mesh: &mut Mesh,
    attribute: bevy::mesh::MeshVertexAttribute,
    slots: &[usize],
    snapshot: &MeshSnapshot,
    field: impl Fn(&chisel_mesh::GpuVertex) -> [f32; 3],
) -> bool {
    use bevy::mesh::VertexAttributeValues;

    let Some(VertexAttributeValues::Float32x3(values)) = mesh.attribute_mut(attribute) else {
        return false;
    };
    for &slot in slots {
        let (Some(target), Some(source)) = (values.get_mut(slot), snapshot.vertices.get(slot)) else {
            return false;
        };
        *target = field(source);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes;
    use chisel_mesh::VertexId;
    use glam::Vec3;

    #[test]
    fn test_first_update_rebuilds() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let mut sync = GpuSync::new();
        let (snapshot, changes) = mesh.snapshot();
        assert!(matches!(sync.update(snapshot, &changes), GpuUpdate::Rebuild(_)));

        let (snapshot, changes) = mesh.snapshot();
        assert_eq!(sync.update(snapshot, &changes), GpuUpdate::Unchanged);
    }

    #[test]
    fn test_move_patches_neighbourhood() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let mut sync = GpuSync::new();
        let (snapshot, changes) = mesh.snapshot();
        sync.update(snapshot, &changes);

        // Corner vertex 2 touches the single triangle (1, 5, 2)
        mesh.move_vertex(VertexId(2), Vec3::new(0.5, 0.1, -0.5)).unwrap();
        let (snapshot, changes) = mesh.snapshot();
        let GpuUpdate::PatchVertices { slots, .. } = sync.update(snapshot, &changes) else {
            panic!("expected a vertex patch");
        };
        assert_eq!(slots, vec![1, 2, 5]);
    }

    #[test]
    fn test_topology_change_rebuilds() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let mut sync = GpuSync::new();
        let (snapshot, changes) = mesh.snapshot();
        sync.update(snapshot, &changes);

        let edge = mesh.edge_ids().next().unwrap();
        mesh.split_edge(edge).unwrap();
        let (snapshot, changes) = mesh.snapshot();
        let update = sync.update(snapshot.clone(), &changes);
        assert_eq!(update, GpuUpdate::Rebuild(snapshot));

        sync.invalidate();
        let (snapshot, changes) = mesh.snapshot();
        assert!(matches!(sync.update(snapshot, &changes), GpuUpdate::Rebuild(_)));
    }
}
