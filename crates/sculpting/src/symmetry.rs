//! Mirrored editing across a symmetry plane.
//!
//! A brush event is first applied on the picked side. The controller then
//! looks at the net moves that event produced and writes their reflection
//! onto the mirrored vertices of the existing mesh. Partners are matched by
//! nearest pre-event position within a tolerance, never duplicated, so
//! vertices on the plane stay shared and no seam opens there.
//!
//! Density edits after the dab run in mirrored pairs: a [`PartnerMap`] finds
//! the twin of each split or collapsed edge, and the twin is edited at the
//! reflected position, so inserted vertices are mirrored as well.

use std::collections::{BTreeMap, HashMap};

use chisel_config::{Axis, SymmetrySettings};
use chisel_mesh::{EdgeId, MeshError, Plane, Sphere, VertexId, WingedMesh};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::deformation::clamp_degenerate;
use crate::spatial::FaceOctree;

/// Where the mirror plane lies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MirrorPlane {
    /// Plane through the origin with `axis` as its normal.
    Axis { axis: Axis },
    /// Plane `normal · p = distance`.
    Custom { normal: Vec3, distance: f32 },
}

impl Default for MirrorPlane {
    fn default() -> Self {
        MirrorPlane::Axis { axis: Axis::X }
    }
}

impl MirrorPlane {
    /// `None` for a custom plane with a zero normal.
    pub fn to_plane(self) -> Option<Plane> {
        match self {
            MirrorPlane::Axis { axis } => Some(Plane::through_origin(axis.unit())),
            MirrorPlane::Custom { normal, distance } => Plane::new(normal, distance),
        }
    }
}

/// Outcome of one mirror pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Moves whose mirrored partner was found
    pub matched: usize,
    /// Moves with no vertex near their reflection
    pub unmatched: usize,
    /// Vertices actually written
    pub moved: usize,
    pub clamped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetryController {
    plane: Plane,
    tolerance: f32,
}

impl SymmetryController {
    pub fn new(plane: Plane, tolerance: f32) -> Self {
        Self {
            plane,
            tolerance: tolerance.max(0.0),
        }
    }

    pub fn from_axis(axis: Axis, tolerance: f32) -> Self {
        Self::new(Plane::through_origin(axis.unit()), tolerance)
    }

    /// Controller for the configured axis, or `None` when symmetry is off.
    pub fn from_settings(settings: &SymmetrySettings) -> Option<Self> {
        settings
            .enabled
            .then(|| Self::from_axis(settings.axis, settings.tolerance))
    }

    pub fn plane(&self) -> Plane {
        self.plane
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Reflect a brush region across the plane.
    pub fn mirror_sphere(&self, sphere: &Sphere) -> Sphere {
        Sphere::new(self.plane.reflect_point(sphere.center), sphere.radius)
    }

    pub fn reflect(&self, point: Vec3) -> Vec3 {
        self.plane.reflect_point(point)
    }

    /// Midpoint of `point` and its reflection, which lies on the plane.
    pub fn project(&self, point: Vec3) -> Vec3 {
        0.5 * (point + self.plane.reflect_point(point))
    }

    /// Vertex whose pre-event position is closest to `point`, within tolerance.
    ///
    /// `before` holds the pre-event positions of the vertices the event moved;
    /// every other vertex is still where it was.
    fn partner(
        &self,
        point: Vec3,
        search_radius: f32,
        before: &BTreeMap<VertexId, (Vec3, Vec3)>,
        mesh: &WingedMesh,
        octree: &FaceOctree,
    ) -> Option<VertexId> {
        let mut best: Option<(f32, VertexId)> = None;
        for v in octree.vertices_in_sphere(&Sphere::new(point, search_radius), mesh) {
            let Some(original) = before
                .get(&v)
                .map(|&(b, _)| b)
                .or_else(|| mesh.position(v))
            else {
                continue;
            };
            let distance = original.distance(point);
            if distance > self.tolerance {
                continue;
            }
            // Candidates arrive in id order, so strict `<` keeps the lowest id on ties.
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, v));
            }
        }
        best.map(|(_, v)| v)
    }

    /// Write the reflection of `moves` onto the mirrored vertices.
    ///
    /// `moves` are the net `(vertex, before, after)` positions of one brush
    /// event. A vertex and its partner that both moved meet halfway, each at
    /// the reflection of the other; a vertex on the plane is its own partner.
    /// The resulting targets go through the degeneracy clamp and are committed
    /// as a single move. The octree is synced on return.
    pub fn mirror_moves(
        &self,
        moves: &[(VertexId, Vec3, Vec3)],
        mesh: &mut WingedMesh,
        octree: &mut FaceOctree,
    ) -> Result<MirrorStats, MeshError> {
        let mut stats = MirrorStats::default();
        if moves.is_empty() {
            return Ok(stats);
        }
        octree.sync(mesh);

        let moved: BTreeMap<VertexId, (Vec3, Vec3)> =
            moves.iter().map(|&(v, b, a)| (v, (b, a))).collect();
        let max_shift = moves
            .iter()
            .map(|&(_, b, a)| b.distance(a))
            .fold(0.0f32, f32::max);
        let search_radius = self.tolerance + max_shift;

        let mut targets: BTreeMap<VertexId, Vec3> = BTreeMap::new();
        for (&v, &(before, after)) in &moved {
            let reflected = self.plane.reflect_point(before);
            let Some(p) = self.partner(reflected, search_radius, &moved, mesh, octree) else {
                stats.unmatched += 1;
                trace!("mirror: no partner for {:?} near {:?}", v, reflected);
                continue;
            };
            stats.matched += 1;
            if p == v {
                targets.insert(v, 0.5 * (after + self.plane.reflect_point(after)));
            } else if let Some(&(_, partner_after)) = moved.get(&p) {
                targets.insert(v, 0.5 * (after + self.plane.reflect_point(partner_after)));
            } else {
                targets
                    .entry(p)
                    .or_insert_with(|| self.plane.reflect_point(after));
            }
        }

        let displacements: Vec<(VertexId, Vec3)> = targets
            .into_iter()
            .filter_map(|(v, target)| Some((v, target - mesh.position(v)?)))
            .collect();
        let (targets, clamped) = clamp_degenerate(mesh, &displacements);
        mesh.move_vertices(&targets)?;
        octree.sync(mesh);

        stats.moved = targets.len();
        stats.clamped = clamped;
        debug!(
            "mirror: matched={} unmatched={} moved={} clamped={}",
            stats.matched, stats.unmatched, stats.moved, stats.clamped
        );
        Ok(stats)
    }
}

/// Mirror partners of vertices, kept current while a density pass edits
/// edges in mirrored pairs.
///
/// Unknown vertices are matched by position through the octree on first use;
/// vertices created by a paired edit are recorded with [`PartnerMap::pair`].
#[derive(Debug, Clone)]
pub struct PartnerMap {
    controller: SymmetryController,
    partners: HashMap<VertexId, VertexId>,
}

impl PartnerMap {
    pub fn new(controller: SymmetryController) -> Self {
        Self {
            controller,
            partners: HashMap::new(),
        }
    }

    pub fn controller(&self) -> &SymmetryController {
        &self.controller
    }

    /// Partner of `vertex`; the vertex itself when it lies on the plane.
    pub fn vertex(
        &mut self,
        vertex: VertexId,
        mesh: &mut WingedMesh,
        octree: &mut FaceOctree,
    ) -> Option<VertexId> {
        let reflected = self.controller.reflect(mesh.position(vertex)?);
        if let Some(&partner) = self.partners.get(&vertex) {
            let still_mirrored = mesh
                .position(partner)
                .is_some_and(|p| p.distance(reflected) <= self.controller.tolerance);
            if still_mirrored {
                return Some(partner);
            }
        }
        // Faces replaced earlier in the pass must be indexed before searching
        octree.sync(mesh);
        let partner = self.controller.partner(
            reflected,
            self.controller.tolerance,
            &BTreeMap::new(),
            mesh,
            octree,
        )?;
        self.pair(vertex, partner);
        Some(partner)
    }

    /// Edge joining the partners of `edge`'s endpoints.
    ///
    /// Returns `edge` itself for an edge that crosses or lies on the plane,
    /// and `None` when the mesh has no mirrored twin for it.
    pub fn edge(
        &mut self,
        edge: EdgeId,
        mesh: &mut WingedMesh,
        octree: &mut FaceOctree,
    ) -> Option<EdgeId> {
        let e = mesh.edge(edge)?;
        let (a, b) = (e.vertex1, e.vertex2);
        let pa = self.vertex(a, mesh, octree)?;
        let pb = self.vertex(b, mesh, octree)?;
        mesh.find_edge(pa, pb)
    }

    /// Record `a` and `b` as mirror partners.
    pub fn pair(&mut self, a: VertexId, b: VertexId) {
        self.partners.insert(a, b);
        self.partners.insert(b, a);
    }
}
