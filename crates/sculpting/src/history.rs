//! Undo/redo by patch replay.
//!
//! An [`Action`] is the ordered list of mesh patches one stroke produced.
//! Every patch carries both sides of its change, so undo applies the
//! inverses in reverse order and redo re-applies the patches forward. No
//! mesh snapshots are stored.
//!
//! Retired element ids stay reserved while any action in either stack still
//! mentions them; [`ActionHistory::compact`] hands the rest back to the mesh.

use std::collections::VecDeque;

use chisel_mesh::{ChangeSet, HeldIds, MeshError, MeshPatch, VertexId, WingedMesh};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Edits produced by one stroke, in application order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    patches: Vec<MeshPatch>,
}

impl Action {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a patch, folding consecutive move-only patches together.
    pub fn push(&mut self, patch: MeshPatch) {
        if patch.is_empty() {
            return;
        }
        if let Some(last) = self.patches.last_mut() {
            if last.absorb_moves(&patch) {
                return;
            }
        }
        self.patches.push(patch);
    }

    pub fn extend(&mut self, patches: impl IntoIterator<Item = MeshPatch>) {
        for patch in patches {
            self.push(patch);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn patches(&self) -> &[MeshPatch] {
        &self.patches
    }

    /// Number of patches that change connectivity.
    pub fn topology_edits(&self) -> usize {
        self.patches.iter().filter(|p| p.is_topological()).count()
    }

    /// Net (before, after) position of every vertex moved and still alive
    /// at the end of the action, sorted by vertex id.
    pub fn net_moves(&self) -> Vec<(VertexId, Vec3, Vec3)> {
        let mut net: std::collections::BTreeMap<VertexId, (Vec3, Vec3)> = Default::default();
        for patch in &self.patches {
            for m in &patch.moves {
                net.entry(m.vertex)
                    .and_modify(|(_, after)| *after = m.after)
                    .or_insert((m.before, m.after));
            }
            for removed in &patch.removed_vertices {
                net.remove(&removed.id);
            }
        }
        net.into_iter()
            .filter(|(_, (before, after))| before != after)
            .map(|(v, (before, after))| (v, before, after))
            .collect()
    }

    /// Add every id this action could re-insert to `held`.
    pub fn hold_ids(&self, held: &mut HeldIds) {
        for patch in &self.patches {
            held.vertices.extend(patch.referenced_vertices());
            held.faces.extend(patch.referenced_faces());
        }
    }

    /// Apply the patches forward. On failure the mesh is rolled back.
    pub fn apply(&self, mesh: &mut WingedMesh) -> Result<ChangeSet, MeshError> {
        replay(mesh, self.patches.iter().cloned())
    }

    /// Apply the inverse patches in reverse order. On failure the mesh is
    /// rolled back.
    pub fn revert(&self, mesh: &mut WingedMesh) -> Result<ChangeSet, MeshError> {
        replay(mesh, self.patches.iter().rev().map(MeshPatch::inverse))
    }
}

/// Apply `patches` in order, undoing the applied prefix if one fails.
fn replay(
    mesh: &mut WingedMesh,
    patches: impl Iterator<Item = MeshPatch>,
) -> Result<ChangeSet, MeshError> {
    let mut applied: Vec<MeshPatch> = Vec::new();
    let mut changes = ChangeSet::default();
    for patch in patches {
        match mesh.apply_patch(&patch) {
            Ok(changed) => {
                changes.extend(&changed);
                applied.push(patch);
            }
            Err(err) => {
                for done in applied.iter().rev() {
                    if let Err(rollback) = mesh.apply_patch(&done.inverse()) {
                        error!("Action rollback failed: {}", rollback);
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(changes)
}

/// Bounded undo/redo stacks of actions.
#[derive(Debug, Clone)]
pub struct ActionHistory {
    undo: VecDeque<Action>,
    redo: Vec<Action>,
    max_depth: usize,
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::new(chisel_config::DEFAULT_HISTORY_DEPTH)
    }
}

impl ActionHistory {
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Record an action that has already been applied to the mesh.
    ///
    /// Clears the redo tail and evicts the oldest actions beyond the depth
    /// bound. Returns the number of actions dropped.
    pub fn commit(&mut self, action: Action) -> usize {
        if action.is_empty() {
            return 0;
        }
        let mut dropped = self.redo.len();
        self.redo.clear();
        self.undo.push_back(action);
        while self.undo.len() > self.max_depth {
            self.undo.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            debug!("ActionHistory::commit: dropped {} actions", dropped);
        }
        dropped
    }

    /// Revert the latest action. Returns the touched elements, or `None`
    /// when there is nothing to undo or the replay was refused.
    pub fn undo(&mut self, mesh: &mut WingedMesh) -> Option<ChangeSet> {
        let action = self.undo.pop_back()?;
        match action.revert(mesh) {
            Ok(changes) => {
                self.redo.push(action);
                Some(changes)
            }
            Err(err) => {
                error!("Undo failed, history left unchanged: {}", err);
                self.undo.push_back(action);
                None
            }
        }
    }

    /// Re-apply the latest undone action.
    pub fn redo(&mut self, mesh: &mut WingedMesh) -> Option<ChangeSet> {
        let action = self.redo.pop()?;
        match action.apply(mesh) {
            Ok(changes) => {
                self.undo.push_back(action);
                Some(changes)
            }
            Err(err) => {
                error!("Redo failed, history left unchanged: {}", err);
                self.redo.push(action);
                None
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Ids referenced by any action in either stack.
    pub fn held_ids(&self) -> HeldIds {
        let mut held = HeldIds::default();
        for action in self.undo.iter().chain(&self.redo) {
            action.hold_ids(&mut held);
        }
        held
    }

    /// Release retired ids no action can bring back. Returns how many.
    pub fn compact(&self, mesh: &mut WingedMesh) -> usize {
        mesh.reclaim_identifiers(&self.held_ids())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes;

    fn positions(mesh: &WingedMesh) -> (Vec<[f32; 3]>, Vec<u32>) {
        mesh.to_indexed()
    }

    fn record(mesh: &mut WingedMesh, edit: impl FnOnce(&mut WingedMesh)) -> Action {
        mesh.begin_journal();
        edit(mesh);
        let mut action = Action::new();
        action.extend(mesh.take_journal());
        action
    }

    fn lift(mesh: &mut WingedMesh, amount: f32) -> Action {
        record(mesh, |m| {
            let v = m.vertex_ids().nth(4).unwrap();
            let p = m.position(v).unwrap();
            m.move_vertex(v, p + Vec3::Y * amount).unwrap();
        })
    }

    #[test]
    fn test_consecutive_moves_are_merged() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let action = record(&mut mesh, |m| {
            let v = VertexId(4);
            m.move_vertex(v, Vec3::new(0.0, 0.1, 0.0)).unwrap();
            m.move_vertex(v, Vec3::new(0.0, 0.2, 0.0)).unwrap();
        });
        assert_eq!(action.patches().len(), 1);
        assert_eq!(
            action.net_moves(),
            vec![(VertexId(4), Vec3::ZERO, Vec3::new(0.0, 0.2, 0.0))]
        );
    }

    #[test]
    fn test_undo_redo_restore_exact_state() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let original = positions(&mesh);
        let action = record(&mut mesh, |m| {
            let edge = m.edge_ids().next().unwrap();
            let mid = m.split_edge(edge).unwrap();
            let p = m.position(mid).unwrap();
            m.move_vertex(mid, p + Vec3::Y * 0.1).unwrap();
        });
        let after = positions(&mesh);
        assert_eq!(action.topology_edits(), 1);

        let mut history = ActionHistory::new(8);
        history.commit(action);
        assert!(history.undo(&mut mesh).is_some());
        assert_eq!(positions(&mesh), original);
        mesh.validate().unwrap();

        assert!(history.redo(&mut mesh).is_some());
        assert_eq!(positions(&mesh), after);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_empty_stacks_report_no_effect() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let before = positions(&mesh);
        let mut history = ActionHistory::default();
        assert!(history.undo(&mut mesh).is_none());
        assert!(history.redo(&mut mesh).is_none());
        assert_eq!(positions(&mesh), before);
    }

    #[test]
    fn test_commit_truncates_redo_tail() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let mut history = ActionHistory::new(8);
        let first = lift(&mut mesh, 0.1);
        history.commit(first);
        let second = lift(&mut mesh, 0.1);
        history.commit(second);

        history.undo(&mut mesh).unwrap();
        assert!(history.can_redo());
        let third = lift(&mut mesh, -0.3);
        assert_eq!(history.commit(third), 1);
        assert!(!history.can_redo());
        assert_eq!(history.undo_len(), 2);
    }

    #[test]
    fn test_depth_bound_evicts_oldest() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let mut history = ActionHistory::new(2);
        for _ in 0..3 {
            let action = lift(&mut mesh, 0.05);
            history.commit(action);
        }
        assert_eq!(history.undo_len(), 2);
        assert!(history.undo(&mut mesh).is_some());
        assert!(history.undo(&mut mesh).is_some());
        assert!(history.undo(&mut mesh).is_none());
        let v = mesh.vertex_ids().nth(4).unwrap();
        assert!((mesh.position(v).unwrap().y - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_failed_revert_leaves_mesh_untouched() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let action = record(&mut mesh, |m| {
            let edge = m.edge_ids().next().unwrap();
            m.split_edge(edge).unwrap();
            m.move_vertex(VertexId(0), Vec3::new(-0.6, 0.0, -0.6)).unwrap();
        });
        // Replace the faces around the split vertex behind the action's back
        // so the revert no longer finds the faces it has to remove.
        let foreign = record(&mut mesh, |m| {
            let edge = m.vertex_edges(VertexId(9))[0];
            m.split_edge(edge).unwrap();
        });
        assert!(!foreign.is_empty());
        let before = positions(&mesh);

        let mut history = ActionHistory::new(4);
        history.commit(action);
        assert!(history.undo(&mut mesh).is_none());
        assert_eq!(positions(&mesh), before);
        assert!(history.can_undo());
        mesh.validate().unwrap();
    }

    #[test]
    fn test_compaction_keeps_held_ids() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let mut history = ActionHistory::new(1);
        let action = record(&mut mesh, |m| {
            let edge = m.edge_ids().next().unwrap();
            m.split_edge(edge).unwrap();
        });
        history.commit(action);
        let (_, _, retired_faces) = mesh.retired_counts();
        assert!(retired_faces > 0);
        history.compact(&mut mesh);
        assert_eq!(mesh.retired_counts().2, retired_faces);

        let evicting = lift(&mut mesh, 0.1);
        history.commit(evicting);
        history.compact(&mut mesh);
        assert_eq!(mesh.retired_counts(), (0, 0, 0));
    }
}
