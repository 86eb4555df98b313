//! Vertex deformation for one brush application.
//!
//! A dab runs in four steps:
//! 1. [`gather`] the vertices inside the brush sphere and weight them
//! 2. compute a displacement per vertex for the brush kind
//! 3. constrain (primary plane) and clamp (degenerate faces)
//! 4. commit every move as a single mesh patch
//!
//! Displacements are always computed from the positions at the start of the
//! dab, so the result does not depend on the order vertices are visited in.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chisel_mesh::{FaceId, MeshError, Plane, Sphere, VertexId, WingedMesh};
use glam::Vec3;
use tracing::trace;

use crate::brush::{Brush, DISPLACEMENT_SCALE};
use crate::spatial::FaceOctree;
use crate::types::BrushKind;

/// Faces whose area would drop under this are considered degenerate.
pub const DEGENERATE_AREA_EPSILON: f32 = 1e-9;

/// Rounds of halving a displacement before it is dropped entirely.
const CLAMP_ITERATIONS: usize = 16;

/// Cosine of the dihedral angle above which an edge counts as a ridge (20°).
const CREASE_RIDGE_COS: f32 = 0.939_692_6;

/// Tangential pull of the pinch brush at full weight, relative to the
/// distance to the brush center.
const PINCH_RATE: f32 = 0.5;

/// One brush application resolved to world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dab {
    /// Center of the brush sphere
    pub center: Vec3,
    /// Surface normal at the center
    pub normal: Vec3,
    /// Direction of the pick ray
    pub view_direction: Vec3,
    /// World-space pointer movement for drag and grab
    pub delta: Vec3,
}

/// A vertex inside the brush sphere with its influence weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffectedVertex {
    pub id: VertexId,
    pub position: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub weight: f32,
}

/// Counters for one dab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DabStats {
    pub affected: usize,
    pub moved: usize,
    pub clamped: usize,
}

/// Collect the weighted vertices under the brush.
///
/// Vertices at or beyond the radius get weight 0 and are dropped. With
/// `discard_backfaces`, vertices whose normal points away from the viewer
/// are dropped before weighting.
pub fn gather(mesh: &WingedMesh, octree: &FaceOctree, brush: &Brush, dab: &Dab) -> Vec<AffectedVertex> {
    let sphere = Sphere::new(dab.center, brush.radius);
    let toward_viewer = -dab.view_direction;

    octree
        .vertices_in_sphere(&sphere, mesh)
        .into_iter()
        .filter_map(|id| {
            let position = mesh.position(id)?;
            let normal = mesh.vertex_normal(id).unwrap_or(Vec3::ZERO);
            if brush.flags.discard_backfaces && normal.dot(toward_viewer) < 0.0 {
                return None;
            }
            let distance = position.distance(dab.center);
            let weight = brush.weight(distance);
            (weight > 0.0).then_some(AffectedVertex {
                id,
                position,
                normal,
                distance,
                weight,
            })
        })
        .collect()
}

/// Per-vertex displacement for the brush kind, sorted by vertex id.
pub fn compute_displacements(
    mesh: &WingedMesh,
    brush: &Brush,
    dab: &Dab,
    affected: &[AffectedVertex],
) -> Vec<(VertexId, Vec3)> {
    let sign = if brush.flags.invert { -1.0 } else { 1.0 };
    let scale = DISPLACEMENT_SCALE * brush.radius;

    let mut displacements: Vec<(VertexId, Vec3)> = match brush.kind {
        BrushKind::Carve | BrushKind::Inflate => affected
            .iter()
            .map(|a| (a.id, a.normal * (a.weight * sign * scale)))
            .collect(),
        BrushKind::Drag | BrushKind::Grab => {
            affected.iter().map(|a| (a.id, dab.delta * a.weight)).collect()
        }
        BrushKind::Smooth => smooth(mesh, brush, affected),
        BrushKind::Flatten => flatten(dab, affected),
        BrushKind::Pinch => affected
            .iter()
            .map(|a| {
                let to_center = dab.center - a.position;
                let tangent = to_center - dab.normal * to_center.dot(dab.normal);
                (a.id, tangent * (a.weight * PINCH_RATE * sign))
            })
            .collect(),
        BrushKind::Crease => crease(mesh, dab, affected, sign * scale),
        BrushKind::Reduce => Vec::new(),
    };

    displacements.retain(|(_, d)| d.is_finite() && *d != Vec3::ZERO);
    displacements.sort_by_key(|(v, _)| *v);
    displacements
}

fn smooth(mesh: &WingedMesh, brush: &Brush, affected: &[AffectedVertex]) -> Vec<(VertexId, Vec3)> {
    affected
        .iter()
        .filter(|a| !mesh.is_boundary_vertex(a.id))
        .filter_map(|a| {
            let centroid = mesh.neighbor_centroid(a.id)?;
            let mut d = (centroid - a.position) * a.weight;
            if brush.flags.relax_only {
                d -= a.normal * d.dot(a.normal);
            }
            Some((a.id, d))
        })
        .collect()
}

/// Project toward the least-squares plane of the affected vertices.
fn flatten(dab: &Dab, affected: &[AffectedVertex]) -> Vec<(VertexId, Vec3)> {
    let Some((origin, normal)) = fit_plane(affected, dab.normal) else {
        return Vec::new();
    };
    affected
        .iter()
        .map(|a| {
            let distance = (a.position - origin).dot(normal);
            (a.id, -normal * distance * a.weight)
        })
        .collect()
}

/// Least-squares plane through the affected positions, oriented to agree
/// with their average normal (or `hint`).
///
/// Falls back to the average normal when the points do not span a plane.
fn fit_plane(affected: &[AffectedVertex], hint: Vec3) -> Option<(Vec3, Vec3)> {
    if affected.is_empty() {
        return None;
    }
    let n = affected.len() as f32;
    let centroid = affected.iter().map(|a| a.position).sum::<Vec3>() / n;
    let average_normal = affected.iter().map(|a| a.normal).sum::<Vec3>().try_normalize();

    let (mut xx, mut xy, mut xz, mut yy, mut yz, mut zz) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    for a in affected {
        let r = a.position - centroid;
        xx += r.x * r.x;
        xy += r.x * r.y;
        xz += r.x * r.z;
        yy += r.y * r.y;
        yz += r.y * r.z;
        zz += r.z * r.z;
    }

    // Smallest-eigenvalue direction of the covariance via the largest minor.
    let det_x = yy * zz - yz * yz;
    let det_y = xx * zz - xz * xz;
    let det_z = xx * yy - xy * xy;
    let det_max = det_x.max(det_y).max(det_z);

    let fitted = if det_max <= f32::EPSILON * (xx + yy + zz).powi(2) {
        None
    } else if det_max == det_x {
        Vec3::new(det_x, xz * yz - xy * zz, xy * yz - xz * yy).try_normalize()
    } else if det_max == det_y {
        Vec3::new(xz * yz - xy * zz, det_y, xy * xz - yz * xx).try_normalize()
    } else {
        Vec3::new(xy * yz - xz * yy, xy * xz - yz * xx, det_z).try_normalize()
    };

    let reference = average_normal.unwrap_or(hint);
    let normal = match fitted {
        Some(normal) if normal.dot(reference) < 0.0 => -normal,
        Some(normal) => normal,
        None => reference.try_normalize()?,
    };
    Some((centroid, normal))
}

/// Sharpen ridges and valleys inside the brush.
///
/// Endpoints of ridge edges move along their normal (outward on convex
/// ridges, inward in valleys) and the opposite corners of the ridge faces
/// move the other way. Without any ridge the dab presses a groove.
fn crease(
    mesh: &WingedMesh,
    dab: &Dab,
    affected: &[AffectedVertex],
    scale: f32,
) -> Vec<(VertexId, Vec3)> {
    let inside: HashMap<VertexId, &AffectedVertex> = affected.iter().map(|a| (a.id, a)).collect();

    let mut edges = BTreeSet::new();
    for a in affected {
        for e in mesh.vertex_edges(a.id) {
            edges.insert(e);
        }
    }

    let mut ridge: BTreeMap<VertexId, f32> = BTreeMap::new();
    let mut flank: BTreeMap<VertexId, f32> = BTreeMap::new();
    for e in edges {
        let Some(edge) = mesh.edge(e) else { continue };
        if !inside.contains_key(&edge.vertex1) || !inside.contains_key(&edge.vertex2) {
            continue;
        }
        let (Some(left), Some(right)) = (edge.left_face, edge.right_face) else {
            continue;
        };
        let (Some(nl), Some(nr)) = (mesh.face_normal(left), mesh.face_normal(right)) else {
            continue;
        };
        if nl.dot(nr) > CREASE_RIDGE_COS {
            continue;
        }
        let Some(apex) = mesh
            .face(right)
            .and_then(|f| f.opposite_vertex(edge.vertex1, edge.vertex2))
            .and_then(|v| mesh.position(v))
        else {
            continue;
        };
        let Some(base) = mesh.position(edge.vertex1) else { continue };
        let convexity = if (apex - base).dot(nl) < 0.0 { 1.0 } else { -1.0 };

        *ridge.entry(edge.vertex1).or_default() += convexity;
        *ridge.entry(edge.vertex2).or_default() += convexity;
        for v in mesh.opposite_vertices(e) {
            *flank.entry(v).or_default() -= convexity;
        }
    }

    if ridge.is_empty() {
        return affected
            .iter()
            .map(|a| {
                let to_center = dab.center - a.position;
                let tangent = to_center - dab.normal * to_center.dot(dab.normal);
                let press = -dab.normal * (a.weight * scale);
                (a.id, press + tangent * (a.weight * PINCH_RATE * 0.5))
            })
            .collect();
    }

    affected
        .iter()
        .filter_map(|a| {
            let side = match (ridge.get(&a.id), flank.get(&a.id)) {
                (Some(&r), _) if r != 0.0 => r.signum(),
                (_, Some(&f)) if f != 0.0 => f.signum(),
                _ => return None,
            };
            Some((a.id, a.normal * (a.weight * scale * side)))
        })
        .collect()
}

/// Remove the component of each displacement along the plane normal.
pub fn constrain_to_plane(displacements: &mut [(VertexId, Vec3)], plane: &Plane) {
    for (_, d) in displacements.iter_mut() {
        *d = plane.project_vector(*d);
    }
}

/// Turn displacements into target positions, shortening any displacement
/// that would leave an incident face degenerate or flipped.
///
/// Every face around a moving vertex is checked against the final targets
/// of all its corners. The moving corners of a failing face have their
/// displacement halved and the whole set is checked again; after
/// `CLAMP_ITERATIONS` rounds they are pinned to where they started. A face
/// whose corners all stay put is valid, so the loop ends with no failing
/// face. Returns the targets that differ from the current position and the
/// number of clamped vertices.
pub fn clamp_degenerate(
    mesh: &WingedMesh,
    displacements: &[(VertexId, Vec3)],
) -> (Vec<(VertexId, Vec3)>, usize) {
    // vertex -> (start, displacement, scale)
    let mut moving: BTreeMap<VertexId, (Vec3, Vec3, f32)> = displacements
        .iter()
        .filter_map(|&(v, d)| Some((v, (mesh.position(v)?, d, 1.0))))
        .collect();
    let faces: BTreeSet<FaceId> = moving
        .keys()
        .flat_map(|&v| mesh.vertex_faces(v))
        .collect();

    let mut round = 0;
    loop {
        let targets: HashMap<VertexId, Vec3> = moving
            .iter()
            .map(|(&v, &(start, d, scale))| (v, start + d * scale))
            .collect();
        let shrink: BTreeSet<VertexId> = faces
            .iter()
            .filter(|&&f| !face_stays_valid(mesh, f, &targets))
            .filter_map(|&f| mesh.face_vertices(f))
            .flatten()
            .filter(|v| moving.get(v).is_some_and(|&(_, _, scale)| scale > 0.0))
            .collect();
        if shrink.is_empty() {
            break;
        }
        for v in &shrink {
            if let Some((_, _, scale)) = moving.get_mut(v) {
                *scale = if round < CLAMP_ITERATIONS { *scale * 0.5 } else { 0.0 };
            }
        }
        round += 1;
    }

    let clamped = moving.values().filter(|&&(_, _, scale)| scale < 1.0).count();
    let result: Vec<(VertexId, Vec3)> = moving
        .into_iter()
        .map(|(v, (start, d, scale))| (v, start, start + d * scale))
        .filter(|&(_, start, target)| start != target)
        .map(|(v, _, target)| (v, target))
        .collect();
    (result, clamped)
}

/// Whether `face` keeps its orientation and a non-degenerate area with its
/// corners at `targets` (corners not in `targets` stay where they are).
fn face_stays_valid(mesh: &WingedMesh, face: FaceId, targets: &HashMap<VertexId, Vec3>) -> bool {
    let (Some(corners), Some(current)) = (mesh.face_vertices(face), mesh.face_positions(face)) else {
        return true;
    };
    let current_cross = (current[1] - current[0]).cross(current[2] - current[0]);
    // Faces that are already degenerate cannot get worse in a way we can detect.
    if current_cross.length() * 0.5 < DEGENERATE_AREA_EPSILON {
        return true;
    }
    let reference = current_cross.normalize();
    let next = [0, 1, 2].map(|i| targets.get(&corners[i]).copied().unwrap_or(current[i]));
    let signed_area = (next[1] - next[0]).cross(next[2] - next[0]).dot(reference) * 0.5;
    signed_area >= DEGENERATE_AREA_EPSILON
}
