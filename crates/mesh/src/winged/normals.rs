//! Lazily computed, memoized face and vertex normals.

use std::sync::{Mutex, MutexGuard, PoisonError};

use glam::Vec3;

use super::{FaceId, VertexId, WingedMesh};

/// Interior-mutable holder for [`NormalCache`] that keeps the mesh `Sync`.
#[derive(Debug, Default)]
pub(crate) struct NormalCell(Mutex<NormalCache>);

impl NormalCell {
    /// A poisoned cache only ever holds stale memos, so recover it.
    pub(crate) fn lock(&self) -> MutexGuard<'_, NormalCache> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for NormalCell {
    fn clone(&self) -> Self {
        Self(Mutex::new(self.lock().clone()))
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct NormalCache {
    vertex: Vec<Option<Vec3>>,
    face: Vec<Option<Vec3>>,
}

fn slot<T: Copy>(slots: &mut Vec<Option<T>>, index: usize) -> &mut Option<T> {
    if slots.len() <= index {
        slots.resize(index + 1, None);
    }
    &mut slots[index]
}

impl NormalCache {
    pub(crate) fn invalidate_vertex(&mut self, vertex: VertexId) {
        if let Some(entry) = self.vertex.get_mut(vertex.index()) {
            *entry = None;
        }
    }

    pub(crate) fn invalidate_face(&mut self, face: FaceId) {
        if let Some(entry) = self.face.get_mut(face.index()) {
            *entry = None;
        }
    }
}

impl WingedMesh {
    /// Unit face normal from the winding order. Zero for degenerate faces.
    pub fn face_normal(&self, face: FaceId) -> Option<Vec3> {
        if let Some(Some(cached)) = self.normals.lock().face.get(face.index()).copied() {
            return Some(cached);
        }
        let [a, b, c] = self.face_positions(face)?;
        let normal = (b - a).cross(c - a).normalize_or_zero();
        *slot(&mut self.normals.lock().face, face.index()) = Some(normal);
        Some(normal)
    }

    /// Area-weighted average of the incident face normals.
    pub fn vertex_normal(&self, vertex: VertexId) -> Option<Vec3> {
        if let Some(Some(cached)) = self.normals.lock().vertex.get(vertex.index()).copied() {
            return Some(cached);
        }
        self.vertex(vertex)?;
        let mut sum = Vec3::ZERO;
        for face in self.vertex_faces(vertex) {
            if let Some([a, b, c]) = self.face_positions(face) {
                sum += (b - a).cross(c - a);
            }
        }
        let normal = sum.normalize_or_zero();
        *slot(&mut self.normals.lock().vertex, vertex.index()) = Some(normal);
        Some(normal)
    }

    /// Drop cached normals that depend on the position of `vertex`.
    pub(crate) fn invalidate_normals_around(&self, vertex: VertexId) {
        let faces = self.vertex_faces(vertex);
        let mut cache = self.normals.lock();
        cache.invalidate_vertex(vertex);
        for face in faces {
            cache.invalidate_face(face);
            if let Some(f) = self.face(face) {
                for v in f.vertices {
                    cache.invalidate_vertex(v);
                }
            }
        }
    }
}
