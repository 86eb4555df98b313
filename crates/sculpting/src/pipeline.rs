//! Sculpting pipeline orchestration.
//!
//! This module coordinates the complete sculpting workflow for one mesh:
//! 1. Pick event → ray → surface hit (or the view plane for drag and grab)
//! 2. Hit → dab → vertex deformation
//! 3. Mirror pass across the symmetry plane (if enabled)
//! 4. Adaptive subdivision or reduction around the dab, in mirrored pairs
//!    when symmetry is on
//! 5. Stroke end → one action committed to the history
//!
//! Every event is fully committed (mesh mutated, octree synced) before the
//! next one is accepted, so nothing outside the pipeline ever sees a
//! half-applied event. An event that fails midway is rolled back.

use std::sync::Arc;

use chisel_config::{SculptConfig, SubdivisionSettings};
use chisel_mesh::{ChangeSet, MeshError, MeshSnapshot, Sphere, WingedMesh};
use glam::Vec3;
use tracing::{debug, error, trace, warn};

#[cfg(feature = "bevy")]
use bevy::prelude::Resource;

use crate::brush::{Brush, StrokeSpacing};
use crate::deformation::{AffectedVertex, Dab, DabStats, apply_dab, gather};
use crate::history::{Action, ActionHistory};
use crate::input::{PickEvent, view_plane_point};
use crate::spatial::FaceOctree;
use crate::symmetry::{MirrorPlane, MirrorStats, PartnerMap, SymmetryController};
use crate::tessellation::{
    TessellationStats, ensure_density_mirrored, reduce_threshold, relax_mirrored,
    target_edge_length,
};
use crate::types::{BrushKind, SculptError};

/// Result of processing a single pick event.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EventResult {
    /// Whether a dab was applied; false on a miss or when spacing skipped it
    pub applied: bool,
    /// Resolved pick point
    pub hit: Option<Vec3>,
    pub dab: DabStats,
    pub tessellation: TessellationStats,
    /// Mirror pass statistics (if symmetry is enabled)
    pub mirror: Option<MirrorStats>,
}

/// Result of ending a stroke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrokeEndResult {
    /// Whether an action was pushed onto the history
    pub committed: bool,
    /// Events applied during the stroke
    pub events: usize,
    /// Patches in the committed action
    pub patches: usize,
    /// Actions evicted from the bottom of the history
    pub evicted: usize,
    /// Retired ids made reusable by compaction
    pub ids_reclaimed: usize,
}

/// State tracked during an active stroke.
#[derive(Debug, Clone)]
struct ActiveStroke {
    /// Brush captured at stroke start; later `set_brush` calls apply to the next stroke.
    brush: Brush,
    action: Action,
    spacing: StrokeSpacing,
    events: usize,
    /// Where the previous dab landed, for drag and grab anchoring.
    last_point: Option<Vec3>,
    last_normal: Vec3,
    /// Region picked up by the first grab dab.
    captured: Option<Vec<AffectedVertex>>,
}

impl ActiveStroke {
    fn new(brush: Brush) -> Self {
        Self {
            brush,
            action: Action::new(),
            spacing: StrokeSpacing::default(),
            events: 0,
            last_point: None,
            last_normal: Vec3::Y,
            captured: None,
        }
    }
}

/// The sculpting pipeline orchestrates pick → deform → subdivide → mirror → commit.
///
/// It owns the mesh together with everything that must stay consistent
/// with it: the spatial index and the action history.
#[derive(Debug)]
#[cfg_attr(feature = "bevy", derive(Resource))]
pub struct SculptingPipeline {
    mesh: WingedMesh,
    octree: FaceOctree,
    config: SculptConfig,
    brush: Brush,
    symmetry: Option<SymmetryController>,
    history: ActionHistory,
    stroke: Option<ActiveStroke>,
}

impl SculptingPipeline {
    /// Create a pipeline around `mesh`, validating `config` first.
    pub fn new(mut mesh: WingedMesh, config: SculptConfig) -> Result<Self, SculptError> {
        config.validate()?;
        let octree = FaceOctree::build(&mesh, config.octree.clone());
        // The octree was built from the current state.
        mesh.take_pending_changes();
        let brush = Brush::from_settings(BrushKind::default(), &config.brush);

        debug!(
            "SculptingPipeline: vertices={} faces={} octree_nodes={}",
            mesh.vertex_count(),
            mesh.face_count(),
            octree.node_count()
        );
        Ok(Self {
            symmetry: SymmetryController::from_settings(&config.symmetry),
            history: ActionHistory::new(config.history.max_depth),
            mesh,
            octree,
            config,
            brush,
            stroke: None,
        })
    }

    /// Create a pipeline from the persisted position and index lists.
    pub fn from_indexed(
        positions: &[[f32; 3]],
        indices: &[u32],
        config: SculptConfig,
    ) -> Result<Self, SculptError> {
        Self::new(WingedMesh::from_indexed(positions, indices)?, config)
    }

    pub fn mesh(&self) -> &WingedMesh {
        &self.mesh
    }

    pub fn octree(&self) -> &FaceOctree {
        &self.octree
    }

    pub fn config(&self) -> &SculptConfig {
        &self.config
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    /// Replace the brush used by the next stroke.
    pub fn set_brush(&mut self, brush: Brush) -> Result<(), SculptError> {
        brush.validate()?;
        debug!("set_brush: {:?} radius={} intensity={}", brush.kind, brush.radius, brush.intensity);
        self.brush = brush;
        Ok(())
    }

    pub fn symmetry(&self) -> Option<&SymmetryController> {
        self.symmetry.as_ref()
    }

    /// Enable mirroring across `plane`, or disable it with `None`.
    pub fn set_symmetry(&mut self, plane: Option<MirrorPlane>) -> Result<(), SculptError> {
        self.symmetry = match plane {
            None => None,
            Some(plane) => {
                let plane = plane.to_plane().ok_or_else(|| {
                    SculptError::InvalidInput("mirror plane needs a non-zero normal".to_string())
                })?;
                Some(SymmetryController::new(plane, self.config.symmetry.tolerance))
            }
        };
        debug!("set_symmetry: {:?}", self.symmetry.map(|s| s.plane()));
        Ok(())
    }

    pub fn is_stroke_active(&self) -> bool {
        self.stroke.is_some()
    }

    /// Begin a new stroke with the current brush.
    pub fn begin_stroke(&mut self) -> Result<(), SculptError> {
        if self.stroke.is_some() {
            return Err(SculptError::StrokeInProgress);
        }
        debug!("begin_stroke: {:?}", self.brush.kind);
        self.stroke = Some(ActiveStroke::new(self.brush));
        Ok(())
    }

    /// Apply one pick event of the active stroke.
    ///
    /// A pick that misses the mesh, or lands closer than the step width to
    /// the previous dab, is not an error: it returns with `applied` false.
    pub fn process_event(&mut self, event: &PickEvent) -> Result<EventResult, SculptError> {
        let Self {
            mesh,
            octree,
            config,
            symmetry,
            stroke,
            ..
        } = self;
        let stroke = stroke.as_mut().ok_or(SculptError::NoActiveStroke)?;
        let brush = stroke.brush;
        let ray = event
            .input
            .to_ray()
            .ok_or_else(|| SculptError::InvalidInput("pick does not resolve to a ray".to_string()))?;

        let anchor = stroke.last_point.filter(|_| brush.kind.is_anchored());
        let (center, normal, delta) = match anchor {
            Some(last) => {
                let delta = match event.drag {
                    Some(drag) => drag,
                    None => match view_plane_point(&ray, last) {
                        Some(point) => point - last,
                        None => {
                            trace!("process_event: ray parallel to the view plane");
                            return Ok(EventResult::default());
                        }
                    },
                };
                (last, stroke.last_normal, delta)
            }
            None => {
                let Some(hit) = octree.query_ray(&ray, mesh) else {
                    trace!("process_event: miss");
                    return Ok(EventResult::default());
                };
                (hit.point, hit.normal, event.drag.unwrap_or(Vec3::ZERO))
            }
        };

        if !stroke
            .spacing
            .admit(&brush, center, config.brush.step_width_factor)
        {
            trace!("process_event: within step width of the previous dab");
            return Ok(EventResult {
                hit: Some(center),
                ..Default::default()
            });
        }

        let dab = Dab {
            center,
            normal,
            view_direction: ray.direction,
            delta,
        };
        if brush.kind.locks_topology() && stroke.captured.is_none() {
            stroke.captured = Some(gather(mesh, octree, &brush, &dab));
        }

        let mut fragment = Action::new();
        let outcome = run_event(
            mesh,
            octree,
            &config.subdivision,
            symmetry.as_ref(),
            &brush,
            &dab,
            stroke.captured.as_deref(),
            &mut fragment,
        );
        let mut result = match outcome {
            Ok(result) => result,
            Err(err) => {
                error!("process_event: rolling back failed event: {}", err);
                if let Err(rollback) = fragment.revert(mesh) {
                    error!("process_event: rollback failed: {}", rollback);
                }
                octree.sync(mesh);
                return Err(err.into());
            }
        };
        result.hit = Some(center);

        stroke.action.extend(fragment.patches().iter().cloned());
        stroke.events += 1;
        stroke.last_point = Some(center + delta);
        stroke.last_normal = normal;

        trace!(
            "process_event: moved={} split={} collapsed={}",
            result.dab.moved, result.tessellation.edges_split, result.tessellation.edges_collapsed
        );
        #[cfg(debug_assertions)]
        debug_validate(mesh, "brush event");
        Ok(result)
    }

    /// End the active stroke and commit its action.
    pub fn end_stroke(&mut self) -> Result<StrokeEndResult, SculptError> {
        let stroke = self.stroke.take().ok_or(SculptError::NoActiveStroke)?;
        let mut result = StrokeEndResult {
            events: stroke.events,
            ..Default::default()
        };
        if stroke.action.is_empty() {
            debug!("end_stroke: nothing to commit");
            return Ok(result);
        }

        result.patches = stroke.action.patches().len();
        result.evicted = self.history.commit(stroke.action);
        result.committed = true;
        result.ids_reclaimed = self.history.compact(&mut self.mesh);

        debug!(
            "end_stroke: events={} patches={} evicted={} reclaimed={} faces={}",
            result.events,
            result.patches,
            result.evicted,
            result.ids_reclaimed,
            self.mesh.face_count()
        );
        #[cfg(debug_assertions)]
        debug_validate(&self.mesh, "stroke commit");
        Ok(result)
    }

    /// Abort the active stroke, undoing everything it applied.
    ///
    /// Returns whether the mesh changed. If reverting fails the stroke stays
    /// active and the mesh is left as it was before the call.
    pub fn cancel_stroke(&mut self) -> Result<bool, SculptError> {
        let stroke = self.stroke.take().ok_or(SculptError::NoActiveStroke)?;
        if stroke.action.is_empty() {
            return Ok(false);
        }
        if let Err(err) = stroke.action.revert(&mut self.mesh) {
            self.stroke = Some(stroke);
            return Err(err.into());
        }
        self.octree.sync(&mut self.mesh);
        debug!("cancel_stroke: reverted {} events", stroke.events);
        Ok(true)
    }

    /// Undo the most recent action. Returns whether the mesh changed.
    pub fn undo(&mut self) -> bool {
        if self.stroke.is_some() {
            warn!("undo ignored while a stroke is active");
            return false;
        }
        let changed = self.history.undo(&mut self.mesh).is_some();
        if changed {
            self.octree.sync(&mut self.mesh);
            #[cfg(debug_assertions)]
            debug_validate(&self.mesh, "undo");
        }
        changed
    }

    /// Redo the most recently undone action. Returns whether the mesh changed.
    pub fn redo(&mut self) -> bool {
        if self.stroke.is_some() {
            warn!("redo ignored while a stroke is active");
            return false;
        }
        let changed = self.history.redo(&mut self.mesh).is_some();
        if changed {
            self.octree.sync(&mut self.mesh);
            #[cfg(debug_assertions)]
            debug_validate(&self.mesh, "redo");
        }
        changed
    }

    /// Renderer snapshot plus the ids changed since the previous one.
    pub fn snapshot(&mut self) -> (Arc<MeshSnapshot>, ChangeSet) {
        self.mesh.snapshot()
    }

    /// Persisted representation: positions and triangle indices.
    pub fn to_indexed(&self) -> (Vec<[f32; 3]>, Vec<u32>) {
        self.mesh.to_indexed()
    }
}

/// Deform, mirror and adapt density for one dab, recording every patch in `fragment`.
///
/// The mirror pass reflects the dab's moves first, so the density pass sees
/// a symmetric mesh and can split or collapse both sides in pairs.
#[allow(clippy::too_many_arguments)]
fn run_event(
    mesh: &mut WingedMesh,
    octree: &mut FaceOctree,
    subdivision: &SubdivisionSettings,
    symmetry: Option<&SymmetryController>,
    brush: &Brush,
    dab: &Dab,
    captured: Option<&[AffectedVertex]>,
    fragment: &mut Action,
) -> Result<EventResult, MeshError> {
    let region = Sphere::new(dab.center, brush.radius);
    let mut result = EventResult {
        applied: true,
        ..Default::default()
    };

    mesh.begin_journal();
    let deformed = apply_dab(mesh, octree, brush, dab, captured);
    fragment.extend(mesh.take_journal());
    result.dab = deformed?;
    octree.sync(mesh);

    let mut partners = None;
    if let Some(symmetry) = symmetry {
        let moves = fragment.net_moves();
        mesh.begin_journal();
        let mirrored = symmetry.mirror_moves(&moves, mesh, octree);
        fragment.extend(mesh.take_journal());
        result.mirror = Some(mirrored?);
        partners = Some(PartnerMap::new(*symmetry));
    }

    mesh.begin_journal();
    result.tessellation = adapt_density(mesh, octree, brush, &region, subdivision, partners.as_mut());
    fragment.extend(mesh.take_journal());
    Ok(result)
}

/// Subdivide after density-increasing brushes, reduce after the reduce brush.
///
/// Grab never changes topology, so the region it captured stays valid for
/// the whole stroke.
fn adapt_density(
    mesh: &mut WingedMesh,
    octree: &mut FaceOctree,
    brush: &Brush,
    region: &Sphere,
    settings: &SubdivisionSettings,
    mirror: Option<&mut PartnerMap>,
) -> TessellationStats {
    if brush.kind.is_topological_only() {
        let threshold = reduce_threshold(brush.radius, brush.intensity, settings);
        relax_mirrored(mesh, octree, region, threshold, settings, mirror)
    } else if settings.enabled && brush.kind.is_density_increasing() {
        let target = target_edge_length(brush.radius, settings);
        ensure_density_mirrored(mesh, octree, region, target, settings, mirror)
    } else {
        TessellationStats::default()
    }
}

/// Validate the whole mesh in debug builds.
///
/// Skip with `CHISEL_SKIP_MESH_VALIDATION=1` when sculpting large meshes
/// interactively.
#[cfg(debug_assertions)]
fn debug_validate(mesh: &WingedMesh, stage: &str) {
    if std::env::var("CHISEL_SKIP_MESH_VALIDATION").is_err() {
        if let Err(e) = mesh.validate() {
            error!("MESH CORRUPTION after {}: {}", stage, e);
            panic!("Mesh corrupted after {stage}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes;
    use chisel_config::{Axis, SymmetrySettings};

    fn down(x: f32, z: f32) -> PickEvent {
        PickEvent::ray(Vec3::new(x, 2.0, z), Vec3::NEG_Y)
    }

    fn grid_pipeline(config: SculptConfig) -> SculptingPipeline {
        SculptingPipeline::new(test_meshes::grid(8, 0.5), config).unwrap()
    }

    fn stroke(pipeline: &mut SculptingPipeline, points: &[(f32, f32)]) -> StrokeEndResult {
        pipeline.begin_stroke().unwrap();
        for &(x, z) in points {
            pipeline.process_event(&down(x, z)).unwrap();
        }
        pipeline.end_stroke().unwrap()
    }

    /// Grid with a committed bump so every brush kind has something to act on.
    fn bumpy_pipeline() -> SculptingPipeline {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        pipeline
            .set_brush(Brush {
                radius: 0.3,
                intensity: 1.0,
                ..Brush::carve()
            })
            .unwrap();
        stroke(&mut pipeline, &[(0.0, 0.0), (0.1, 0.05)]);
        pipeline
    }

    #[test]
    fn test_stroke_state_errors() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        assert!(matches!(
            pipeline.process_event(&down(0.0, 0.0)),
            Err(SculptError::NoActiveStroke)
        ));
        assert!(matches!(pipeline.end_stroke(), Err(SculptError::NoActiveStroke)));

        pipeline.begin_stroke().unwrap();
        assert!(matches!(pipeline.begin_stroke(), Err(SculptError::StrokeInProgress)));
        assert!(pipeline.is_stroke_active());
    }

    #[test]
    fn test_miss_is_not_an_error() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        pipeline.begin_stroke().unwrap();
        let result = pipeline.process_event(&down(5.0, 5.0)).unwrap();
        assert!(!result.applied);
        let end = pipeline.end_stroke().unwrap();
        assert!(!end.committed);
        assert!(!pipeline.history().can_undo());
    }

    #[test]
    fn test_spacing_skips_nearby_picks() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        pipeline.begin_stroke().unwrap();
        assert!(pipeline.process_event(&down(0.0, 0.0)).unwrap().applied);
        assert!(!pipeline.process_event(&down(0.001, 0.0)).unwrap().applied);
        assert_eq!(pipeline.end_stroke().unwrap().events, 1);
    }

    #[test]
    fn test_carve_subdivides_and_commits_one_action() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        let faces_before = pipeline.mesh().face_count();
        pipeline.begin_stroke().unwrap();
        let result = pipeline.process_event(&down(0.0, 0.0)).unwrap();
        assert!(result.applied);
        assert!(result.dab.moved > 0);
        assert!(result.tessellation.edges_split > 0);
        let end = pipeline.end_stroke().unwrap();

        assert!(end.committed);
        assert!(pipeline.mesh().face_count() > faces_before);
        assert_eq!(pipeline.history().undo_len(), 1);
        assert_eq!(pipeline.octree().len(), pipeline.mesh().face_count());
        pipeline.mesh().validate().unwrap();
    }

    #[test]
    fn test_undo_redo_exact_for_every_brush_kind() {
        for kind in BrushKind::ALL {
            let mut pipeline = bumpy_pipeline();
            let before = pipeline.to_indexed();

            let radius = if kind == BrushKind::Reduce { 0.4 } else { 0.3 };
            pipeline
                .set_brush(Brush {
                    radius,
                    ..Brush::preset(kind)
                })
                .unwrap();
            stroke(&mut pipeline, &[(0.0, 0.0), (0.1, 0.0), (0.2, 0.05)]);
            let after = pipeline.to_indexed();
            assert_ne!(after, before, "{kind:?} left the mesh unchanged");
            pipeline.mesh().validate().unwrap();

            assert!(pipeline.undo(), "{kind:?}");
            assert_eq!(pipeline.to_indexed(), before, "{kind:?} undo");
            pipeline.mesh().validate().unwrap();

            assert!(pipeline.redo(), "{kind:?}");
            assert_eq!(pipeline.to_indexed(), after, "{kind:?} redo");
            assert_eq!(pipeline.octree().len(), pipeline.mesh().face_count());
        }
    }

    #[test]
    fn test_reduce_lowers_triangle_count() {
        let mut pipeline = bumpy_pipeline();
        let faces_before = pipeline.mesh().face_count();
        pipeline
            .set_brush(Brush {
                radius: 0.4,
                ..Brush::reduce()
            })
            .unwrap();
        stroke(&mut pipeline, &[(0.0, 0.0)]);
        assert!(pipeline.mesh().face_count() < faces_before);
    }

    #[test]
    fn test_drag_follows_view_plane() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        pipeline.set_brush(Brush::drag()).unwrap();
        let center = pipeline
            .mesh()
            .vertex_ids()
            .find(|&v| pipeline.mesh().position(v).unwrap().length() < 1e-6)
            .unwrap();

        pipeline.begin_stroke().unwrap();
        pipeline.process_event(&down(0.0, 0.0)).unwrap();
        // Second pick is off to the side; the anchor plane turns it into a drag.
        let result = pipeline.process_event(&down(0.1, 0.0)).unwrap();
        assert!(result.applied);
        pipeline.end_stroke().unwrap();

        let moved = pipeline.mesh().position(center).unwrap();
        assert!((moved.x - 0.1).abs() < 1e-4);
        assert!(moved.y.abs() < 1e-6);
    }

    #[test]
    fn test_explicit_drag_vector_wins() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        pipeline.set_brush(Brush::grab()).unwrap();
        pipeline.begin_stroke().unwrap();
        pipeline.process_event(&down(0.0, 0.0)).unwrap();
        let result = pipeline
            .process_event(&down(0.3, 0.0).with_drag(Vec3::new(0.0, 0.05, 0.0)))
            .unwrap();
        assert!(result.dab.moved > 0);
        pipeline.end_stroke().unwrap();

        let (positions, _) = pipeline.to_indexed();
        let peak = positions.iter().map(|p| p[1]).fold(f32::MIN, f32::max);
        assert!((peak - 0.05).abs() < 1e-5);
        assert!(positions.iter().all(|p| p[0].abs() <= 0.5 + 1e-6));
    }

    #[test]
    fn test_cancel_restores_mesh() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        let before = pipeline.to_indexed();
        pipeline.begin_stroke().unwrap();
        pipeline.process_event(&down(0.0, 0.0)).unwrap();
        assert!(pipeline.cancel_stroke().unwrap());

        assert_eq!(pipeline.to_indexed(), before);
        assert!(!pipeline.is_stroke_active());
        assert!(!pipeline.history().can_undo());
        assert_eq!(pipeline.octree().len(), pipeline.mesh().face_count());
    }

    #[test]
    fn test_history_commands_report_effect() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        assert!(!pipeline.undo());
        assert!(!pipeline.redo());

        stroke(&mut pipeline, &[(0.0, 0.0)]);
        pipeline.begin_stroke().unwrap();
        assert!(!pipeline.undo(), "undo during a stroke");
        pipeline.cancel_stroke().unwrap();

        assert!(pipeline.undo());
        assert!(!pipeline.undo());
        assert!(pipeline.redo());
        assert!(!pipeline.redo());
    }

    #[test]
    fn test_symmetric_stroke_stays_symmetric() {
        let config = SculptConfig {
            symmetry: SymmetrySettings {
                enabled: true,
                axis: Axis::X,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.subdivision.enabled);
        let mut pipeline = grid_pipeline(config);
        pipeline
            .set_brush(Brush {
                radius: 0.3,
                intensity: 1.0,
                ..Brush::carve()
            })
            .unwrap();

        pipeline.begin_stroke().unwrap();
        let result = pipeline.process_event(&down(0.2, 0.1)).unwrap();
        assert!(result.mirror.is_some_and(|m| m.matched > 0));
        assert!(result.tessellation.edges_split > 0);
        assert!(result.tessellation.mirrored > 0);
        assert!(test_meshes::is_mirror_symmetric_x(pipeline.mesh(), 1e-5));
        pipeline.process_event(&down(0.25, -0.1)).unwrap();
        pipeline.end_stroke().unwrap();

        assert!(test_meshes::is_mirror_symmetric_x(pipeline.mesh(), 1e-5));
        pipeline.mesh().validate().unwrap();

        // The mirror pass is part of the same action
        assert!(pipeline.undo());
        assert!(pipeline.to_indexed().0.iter().all(|p| p[1] == 0.0));
    }

    #[test]
    fn test_set_symmetry_rejects_zero_normal() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        let bad = MirrorPlane::Custom {
            normal: Vec3::ZERO,
            distance: 0.0,
        };
        assert!(pipeline.set_symmetry(Some(bad)).is_err());
        pipeline
            .set_symmetry(Some(MirrorPlane::Axis { axis: Axis::Z }))
            .unwrap();
        assert_eq!(pipeline.symmetry().unwrap().plane().normal, Vec3::Z);
        pipeline.set_symmetry(None).unwrap();
        assert!(pipeline.symmetry().is_none());
    }

    #[test]
    fn test_invalid_config_and_brush_rejected() {
        let mut config = SculptConfig::default();
        config.history.max_depth = 0;
        assert!(SculptingPipeline::new(test_meshes::grid(2, 0.5), config).is_err());

        let mut pipeline = grid_pipeline(SculptConfig::default());
        let bad = Brush {
            radius: -1.0,
            ..Brush::default()
        };
        assert!(matches!(pipeline.set_brush(bad), Err(SculptError::InvalidBrush(_))));
    }

    #[test]
    fn test_snapshot_reports_stroke_changes() {
        let mut pipeline = grid_pipeline(SculptConfig::default());
        let (_, initial) = pipeline.snapshot();
        stroke(&mut pipeline, &[(0.0, 0.0)]);
        let (snapshot, changes) = pipeline.snapshot();

        assert!(initial.is_empty());
        assert!(!changes.vertices.is_empty());
        assert_eq!(snapshot.triangle_count(), pipeline.mesh().face_count());
    }
}
