//! Atomic, invertible mesh patches.
//!
//! A patch lists everything one mutation does to the mesh. It is applied in
//! a fixed order:
//!
//! ```text
//! insert vertices → move vertices → remove faces → insert faces → remove vertices
//! ```
//!
//! Swapping the insert/remove lists and the move endpoints yields the exact
//! inverse, which is what undo replays. Before anything changes, the patch is
//! checked against the manifold invariant on every vertex it touches, so a
//! rejected patch leaves the mesh exactly as it was.

use std::collections::{BTreeSet, HashMap, HashSet};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::types::{Edge, EdgeId, Face, FaceId, MeshError, Vertex, VertexId};
use super::{ChangeSet, WingedMesh, edge_key, ensure_slot};

const OPERATION: &str = "apply_patch";

/// A vertex as it exists right before removal or right after insertion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexRecord {
    pub id: VertexId,
    pub position: Vec3,
}

/// A face as it exists right before removal or right after insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub id: FaceId,
    pub vertices: [VertexId; 3],
    pub level: u8,
}

/// A position change of one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexMove {
    pub vertex: VertexId,
    pub before: Vec3,
    pub after: Vec3,
}

/// One atomic mesh mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshPatch {
    pub inserted_vertices: Vec<VertexRecord>,
    pub moves: Vec<VertexMove>,
    pub removed_faces: Vec<FaceRecord>,
    pub inserted_faces: Vec<FaceRecord>,
    pub removed_vertices: Vec<VertexRecord>,
}

impl MeshPatch {
    /// A patch that only moves vertices.
    pub fn from_moves(moves: Vec<VertexMove>) -> Self {
        Self {
            moves,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted_vertices.is_empty()
            && self.moves.is_empty()
            && self.removed_faces.is_empty()
            && self.inserted_faces.is_empty()
            && self.removed_vertices.is_empty()
    }

    /// Whether the patch changes connectivity (anything besides moves).
    pub fn is_topological(&self) -> bool {
        !(self.inserted_vertices.is_empty()
            && self.removed_faces.is_empty()
            && self.inserted_faces.is_empty()
            && self.removed_vertices.is_empty())
    }

    /// The patch that exactly undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            inserted_vertices: self.removed_vertices.clone(),
            moves: self
                .moves
                .iter()
                .rev()
                .map(|m| VertexMove {
                    vertex: m.vertex,
                    before: m.after,
                    after: m.before,
                })
                .collect(),
            removed_faces: self.inserted_faces.clone(),
            inserted_faces: self.removed_faces.clone(),
            removed_vertices: self.inserted_vertices.clone(),
        }
    }

    /// Fold a later move-only patch into this move-only patch.
    ///
    /// Returns false (and changes nothing) if either patch is topological.
    pub fn absorb_moves(&mut self, later: &MeshPatch) -> bool {
        if self.is_topological() || later.is_topological() {
            return false;
        }
        let mut index: HashMap<VertexId, usize> = self
            .moves
            .iter()
            .enumerate()
            .map(|(i, m)| (m.vertex, i))
            .collect();
        for m in &later.moves {
            match index.get(&m.vertex) {
                Some(&i) => self.moves[i].after = m.after,
                None => {
                    index.insert(m.vertex, self.moves.len());
                    self.moves.push(*m);
                }
            }
        }
        true
    }

    /// Every vertex id the patch references.
    pub fn referenced_vertices(&self) -> BTreeSet<VertexId> {
        let mut ids = BTreeSet::new();
        ids.extend(self.inserted_vertices.iter().map(|r| r.id));
        ids.extend(self.removed_vertices.iter().map(|r| r.id));
        ids.extend(self.moves.iter().map(|m| m.vertex));
        for face in self.removed_faces.iter().chain(&self.inserted_faces) {
            ids.extend(face.vertices);
        }
        ids
    }

    /// Every face id the patch references.
    pub fn referenced_faces(&self) -> BTreeSet<FaceId> {
        self.removed_faces
            .iter()
            .chain(&self.inserted_faces)
            .map(|f| f.id)
            .collect()
    }
}

/// Result of validating a patch: the post-patch faces around each touched vertex.
struct PatchPlan {
    fans: Vec<(VertexId, Vec<FaceId>)>,
}

fn same_cycle(a: [VertexId; 3], b: [VertexId; 3]) -> bool {
    (0..3).any(|r| a[0] == b[r] && a[1] == b[(r + 1) % 3] && a[2] == b[(r + 2) % 3])
}

fn sorted_triple(v: [VertexId; 3]) -> [VertexId; 3] {
    let mut s = v;
    s.sort();
    s
}

/// Check that the wedges `(next, prev)` around one vertex chain into a single fan.
fn check_single_fan(vertex: VertexId, wedges: &[(VertexId, VertexId)]) -> Result<(), MeshError> {
    let mut chain: HashMap<VertexId, VertexId> = HashMap::with_capacity(wedges.len());
    let mut ends: HashSet<VertexId> = HashSet::with_capacity(wedges.len());
    for &(from, to) in wedges {
        if chain.insert(from, to).is_some() || !ends.insert(to) {
            return Err(MeshError::integrity(
                OPERATION,
                format!("vertex {:?} would have a non-manifold fan", vertex),
            ));
        }
    }

    let mut starts = wedges.iter().map(|w| w.0).filter(|v| !ends.contains(v));
    let (start, closed) = match (starts.next(), starts.next()) {
        (None, _) => (wedges[0].0, true),
        (Some(s), None) => (s, false),
        (Some(_), Some(_)) => {
            return Err(MeshError::integrity(
                OPERATION,
                format!("vertex {:?} would join two separate fans", vertex),
            ));
        }
    };

    let mut steps = 0;
    let mut current = start;
    while let Some(&next) = chain.get(&current) {
        steps += 1;
        current = next;
        if current == start || steps > wedges.len() {
            break;
        }
    }
    if steps != wedges.len() {
        return Err(MeshError::integrity(
            OPERATION,
            format!("vertex {:?} would have a fan split into pieces", vertex),
        ));
    }
    if closed && wedges.len() < 3 {
        return Err(MeshError::integrity(
            OPERATION,
            format!("vertex {:?} would close its fan with {} faces", vertex, wedges.len()),
        ));
    }
    Ok(())
}

impl WingedMesh {
    /// Validate and apply a patch atomically.
    ///
    /// Returns the vertices and faces whose geometry or connectivity changed.
    /// On error the mesh is untouched.
    pub fn apply_patch(&mut self, patch: &MeshPatch) -> Result<ChangeSet, MeshError> {
        let plan = self.check_patch(patch)?;
        let changes = self.commit_patch(patch, plan);
        if let Some(journal) = self.journal.as_mut() {
            journal.push(patch.clone());
        }
        self.pending.extend(&changes);
        self.unsnapshotted.extend(&changes);
        Ok(changes)
    }

    fn check_patch(&self, patch: &MeshPatch) -> Result<PatchPlan, MeshError> {
        let removed_faces: HashSet<FaceId> = patch.removed_faces.iter().map(|f| f.id).collect();
        let inserted_vertices: HashSet<VertexId> =
            patch.inserted_vertices.iter().map(|v| v.id).collect();
        let removed_vertices: HashSet<VertexId> =
            patch.removed_vertices.iter().map(|v| v.id).collect();

        if inserted_vertices.len() != patch.inserted_vertices.len() {
            return Err(MeshError::integrity(OPERATION, "duplicate inserted vertex"));
        }
        for record in &patch.inserted_vertices {
            if self.vertex(record.id).is_some() {
                return Err(MeshError::integrity(
                    OPERATION,
                    format!("vertex id {:?} is in use", record.id),
                ));
            }
        }
        for record in &patch.removed_vertices {
            if self.vertex(record.id).is_none() {
                return Err(MeshError::UnknownVertex(record.id));
            }
        }
        let exists_after = |v: VertexId| {
            inserted_vertices.contains(&v)
                || (self.vertex(v).is_some() && !removed_vertices.contains(&v))
        };
        for m in &patch.moves {
            if !exists_after(m.vertex) {
                return Err(MeshError::UnknownVertex(m.vertex));
            }
        }
        for record in &patch.removed_faces {
            let face = self
                .face(record.id)
                .ok_or(MeshError::UnknownFace(record.id))?;
            if !same_cycle(face.vertices, record.vertices) {
                return Err(MeshError::integrity(
                    OPERATION,
                    format!("face {:?} does not match its removal record", record.id),
                ));
            }
        }

        // Inserted faces: ids, corners, directed-edge uniqueness, no doubled triangles
        let mut inserted_ids = HashSet::new();
        let mut directed = HashSet::new();
        let mut triples = HashSet::new();
        for record in &patch.inserted_faces {
            if !inserted_ids.insert(record.id) {
                return Err(MeshError::integrity(OPERATION, "duplicate inserted face"));
            }
            if self.face(record.id).is_some() && !removed_faces.contains(&record.id) {
                return Err(MeshError::integrity(
                    OPERATION,
                    format!("face id {:?} is in use", record.id),
                ));
            }
            let [a, b, c] = record.vertices;
            if a == b || b == c || a == c {
                return Err(MeshError::integrity(
                    OPERATION,
                    format!("face {:?} repeats a corner", record.id),
                ));
            }
            if let Some(&missing) = record.vertices.iter().find(|&&v| !exists_after(v)) {
                return Err(MeshError::UnknownVertex(missing));
            }
            if !triples.insert(sorted_triple(record.vertices)) {
                return Err(MeshError::integrity(
                    OPERATION,
                    format!("face {:?} doubles another inserted face", record.id),
                ));
            }
            for i in 0..3 {
                let (from, to) = (record.vertices[i], record.vertices[(i + 1) % 3]);
                let third = record.vertices[(i + 2) % 3];
                if !directed.insert((from, to)) {
                    return Err(MeshError::integrity(
                        OPERATION,
                        format!("edge {:?}-{:?} would be used twice in one direction", from, to),
                    ));
                }
                if let Some(existing) = self.face_using_directed(from, to) {
                    if !removed_faces.contains(&existing) {
                        return Err(MeshError::integrity(
                            OPERATION,
                            format!("edge {:?}-{:?} would gain a third face", from, to),
                        ));
                    }
                }
                if let Some(twin) = self.face_using_directed(to, from) {
                    let doubled = !removed_faces.contains(&twin)
                        && self
                            .face(twin)
                            .and_then(|f| f.opposite_vertex(from, to))
                            == Some(third);
                    if doubled {
                        return Err(MeshError::integrity(
                            OPERATION,
                            format!("face {:?} would double face {:?}", record.id, twin),
                        ));
                    }
                }
            }
        }

        // Fans of every touched vertex after the patch
        let mut inserted_by_vertex: HashMap<VertexId, Vec<&FaceRecord>> = HashMap::new();
        for record in &patch.inserted_faces {
            for v in record.vertices {
                inserted_by_vertex.entry(v).or_default().push(record);
            }
        }
        let mut touched: BTreeSet<VertexId> = BTreeSet::new();
        touched.extend(inserted_vertices.iter().copied());
        touched.extend(removed_vertices.iter().copied());
        for record in patch.removed_faces.iter().chain(&patch.inserted_faces) {
            touched.extend(record.vertices);
        }

        let mut fans = Vec::with_capacity(touched.len());
        for vertex in touched {
            let mut incident: Vec<(FaceId, [VertexId; 3])> = Vec::new();
            if self.vertex(vertex).is_some() {
                for face in self.vertex_faces(vertex) {
                    if removed_faces.contains(&face) {
                        continue;
                    }
                    if let Some(f) = self.face(face) {
                        incident.push((face, f.vertices));
                    }
                }
            }
            if let Some(records) = inserted_by_vertex.get(&vertex) {
                incident.extend(records.iter().map(|r| (r.id, r.vertices)));
            }

            if removed_vertices.contains(&vertex) {
                if !incident.is_empty() {
                    return Err(MeshError::integrity(
                        OPERATION,
                        format!("removed vertex {:?} is still referenced", vertex),
                    ));
                }
                continue;
            }
            if incident.is_empty() {
                return Err(MeshError::integrity(
                    OPERATION,
                    format!("vertex {:?} would be left without faces", vertex),
                ));
            }

            let wedges: Vec<(VertexId, VertexId)> = incident
                .iter()
                .filter_map(|(_, verts)| {
                    let corner = verts.iter().position(|&v| v == vertex)?;
                    Some((verts[(corner + 1) % 3], verts[(corner + 2) % 3]))
                })
                .collect();
            check_single_fan(vertex, &wedges)?;
            fans.push((vertex, incident.into_iter().map(|(f, _)| f).collect()));
        }

        Ok(PatchPlan { fans })
    }

    fn commit_patch(&mut self, patch: &MeshPatch, plan: PatchPlan) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for record in &patch.inserted_vertices {
            self.put_vertex(record.id, record.position);
            changes.vertices.insert(record.id);
        }
        for m in &patch.moves {
            if let Some(Some(vertex)) = self.vertices.get_mut(m.vertex.index()) {
                vertex.position = m.after;
            }
            changes.vertices.insert(m.vertex);
        }
        let mut bare_edges = Vec::new();
        for record in &patch.removed_faces {
            self.unlink_face(record.id, &mut bare_edges);
            changes.faces.insert(record.id);
        }
        for record in &patch.inserted_faces {
            self.link_face(record);
            changes.faces.insert(record.id);
        }
        // Edges re-linked by an inserted face keep their id
        for edge in bare_edges {
            self.retire_edge_if_bare(edge);
        }
        for record in &patch.removed_vertices {
            self.drop_vertex(record.id);
            changes.vertices.insert(record.id);
        }

        // Re-anchor touched vertices on a surviving incident edge
        for (vertex, faces) in &plan.fans {
            let anchor = faces.first().and_then(|&f| {
                let face = self.face(f)?;
                let corner = face.corner_of(*vertex)?;
                Some(face.edges[corner])
            });
            if let Some(Some(v)) = self.vertices.get_mut(vertex.index()) {
                v.edge = anchor;
            }
        }

        // Moved vertices reshape every face around them
        for m in &patch.moves {
            for face in self.vertex_faces(m.vertex) {
                changes.faces.insert(face);
                if let Some(f) = self.face(face) {
                    changes.vertices.extend(f.vertices);
                }
            }
        }
        for record in &patch.inserted_faces {
            changes.vertices.extend(record.vertices);
        }
        for (vertex, _) in &plan.fans {
            changes.vertices.insert(*vertex);
        }

        {
            let mut cache = self.normals.lock();
            for record in &patch.removed_faces {
                cache.invalidate_face(record.id);
            }
            for &vertex in &changes.vertices {
                cache.invalidate_vertex(vertex);
            }
        }
        for &vertex in &changes.vertices {
            self.invalidate_normals_around(vertex);
        }

        trace!(
            "Applied patch: +{}v -{}v +{}f -{}f {} moves",
            patch.inserted_vertices.len(),
            patch.removed_vertices.len(),
            patch.inserted_faces.len(),
            patch.removed_faces.len(),
            patch.moves.len()
        );
        changes
    }

    // ========================================================================
    // Slot-level primitives (only called from commit_patch and construction)
    // ========================================================================

    pub(crate) fn put_vertex(&mut self, id: VertexId, position: Vec3) {
        ensure_slot(&mut self.vertices, &mut self.free.vertices, id.0);
        self.retired.vertices.remove(&id.0);
        self.vertices[id.index()] = Some(Vertex {
            id,
            position,
            edge: None,
        });
        self.vertex_count += 1;
    }

    fn drop_vertex(&mut self, id: VertexId) {
        if let Some(slot) = self.vertices.get_mut(id.index()) {
            if slot.take().is_some() {
                self.vertex_count -= 1;
                self.retired.vertices.insert(id.0);
                self.normals.lock().invalidate_vertex(id);
            }
        }
    }

    /// Detach a face from its edges. Edges left without faces are pushed to
    /// `bare` and stay in the edge map until [`Self::retire_edge_if_bare`].
    fn unlink_face(&mut self, id: FaceId, bare: &mut Vec<EdgeId>) {
        let Some(face) = self.faces.get_mut(id.index()).and_then(Option::take) else {
            return;
        };
        self.face_count -= 1;
        self.retired.faces.insert(id.0);

        for edge_id in face.edges {
            let Some(Some(edge)) = self.edges.get_mut(edge_id.index()) else {
                continue;
            };
            if edge.left_face == Some(id) {
                edge.left_face = None;
                edge.left_predecessor = None;
                edge.left_successor = None;
            }
            if edge.right_face == Some(id) {
                edge.right_face = None;
                edge.right_predecessor = None;
                edge.right_successor = None;
            }
            if edge.left_face.is_none() && edge.right_face.is_none() {
                bare.push(edge_id);
            }
        }
    }

    fn retire_edge_if_bare(&mut self, id: EdgeId) {
        let Some(Some(edge)) = self.edges.get(id.index()) else {
            return;
        };
        if edge.left_face.is_some() || edge.right_face.is_some() {
            return;
        }
        let key = edge_key(edge.vertex1, edge.vertex2);
        self.edges[id.index()] = None;
        self.edge_map.remove(&key);
        self.retired.edges.insert(id.0);
        self.edge_count -= 1;
    }

    pub(crate) fn link_face(&mut self, record: &FaceRecord) {
        let v = record.vertices;
        let mut edges = [EdgeId(0); 3];
        for i in 0..3 {
            let (a, b) = (v[i], v[(i + 1) % 3]);
            edges[i] = match self.find_edge(a, b) {
                Some(existing) => existing,
                None => {
                    let id = self.allocate_edge_id();
                    self.edges[id.index()] = Some(Edge {
                        id,
                        vertex1: a,
                        vertex2: b,
                        left_face: None,
                        right_face: None,
                        left_predecessor: None,
                        left_successor: None,
                        right_predecessor: None,
                        right_successor: None,
                    });
                    self.edge_map.insert(edge_key(a, b), id);
                    self.edge_count += 1;
                    id
                }
            };
        }

        for i in 0..3 {
            let predecessor = edges[(i + 2) % 3];
            let successor = edges[(i + 1) % 3];
            if let Some(Some(edge)) = self.edges.get_mut(edges[i].index()) {
                if edge.vertex1 == v[i] {
                    edge.left_face = Some(record.id);
                    edge.left_predecessor = Some(predecessor);
                    edge.left_successor = Some(successor);
                } else {
                    edge.right_face = Some(record.id);
                    edge.right_predecessor = Some(predecessor);
                    edge.right_successor = Some(successor);
                }
            }
        }

        ensure_slot(&mut self.faces, &mut self.free.faces, record.id.0);
        self.retired.faces.remove(&record.id.0);
        self.faces[record.id.index()] = Some(Face {
            id: record.id,
            edges,
            vertices: v,
            level: record.level,
        });
        self.face_count += 1;
        self.normals.lock().invalidate_face(record.id);

        for (i, &vertex) in v.iter().enumerate() {
            if let Some(Some(vx)) = self.vertices.get_mut(vertex.index()) {
                if vx.edge.is_none() {
                    vx.edge = Some(edges[i]);
                }
            }
        }
    }
}
