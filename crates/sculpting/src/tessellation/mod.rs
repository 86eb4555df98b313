//! Adaptive subdivision for sculpting.
//!
//! Density follows the brush: after a density-increasing dab,
//! [`ensure_density`] splits every edge in the brush region that is longer
//! than the target length; the reduce brush calls [`relax`] to collapse the
//! edges that are shorter than its threshold.
//!
//! ## Determinism
//!
//! Both passes must produce the same topology for the same input so that
//! symmetric strokes and tests are reproducible:
//! - split candidates pop longest first, ties by lowest edge id
//! - collapse candidates run lowest error first, ties by lowest edge id
//! - candidate sets are gathered in id order from the spatial index
//!
//! ## Termination
//!
//! Every split produces faces one level deeper than the face they replace,
//! and faces at the depth bound are never split, so `ensure_density` ends
//! even on degenerate input. A per-event split budget caps the work further.

mod edge_collapse;
mod edge_split;
mod metrics;

pub use edge_collapse::{CollapseCandidate, collapse_error, would_cause_flip};
pub use edge_split::{SplitCandidate, within_depth};
pub use metrics::{
    MIN_EDGE_LENGTH, is_degenerate_triangle, max_face_level, reduce_threshold, target_edge_length,
};

use std::collections::{BTreeSet, BinaryHeap};

use chisel_config::SubdivisionSettings;
use chisel_mesh::{EdgeId, FaceId, Sphere, WingedMesh};
use tracing::{debug, trace};

use crate::spatial::FaceOctree;
use crate::symmetry::PartnerMap;

/// Statistics from one subdivision pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TessellationStats {
    /// Number of edges that were split
    pub edges_split: usize,
    /// Number of edges that were collapsed
    pub edges_collapsed: usize,
    /// Splits and collapses made on the mirrored side to pair a primary edit
    pub mirrored: usize,
    /// Long edges left alone because a neighbouring face hit the depth bound
    pub depth_limited: usize,
    /// Edits the mesh store refused
    pub rejected: usize,
    /// Whether the per-event budget stopped the pass early
    pub budget_exhausted: bool,
}

/// Edges of all faces the spatial index reports for any of `regions`.
fn edges_in_regions(mesh: &WingedMesh, octree: &FaceOctree, regions: &[Sphere]) -> BTreeSet<EdgeId> {
    regions
        .iter()
        .flat_map(|region| octree.query_sphere(region))
        .filter_map(|f| mesh.face(f))
        .flat_map(|face| face.edges)
        .collect()
}

/// The brush region plus its reflection when edits are mirrored.
fn regions_for(region: &Sphere, mirror: Option<&PartnerMap>) -> Vec<Sphere> {
    let mut regions = vec![*region];
    if let Some(map) = mirror {
        let reflected = map.controller().mirror_sphere(region);
        if reflected.center != region.center {
            regions.push(reflected);
        }
    }
    regions
}

/// The mirrored twin of `edge`, split into "another edge" and "its own twin".
fn twin_of(
    mirror: Option<&mut PartnerMap>,
    edge: EdgeId,
    mesh: &mut WingedMesh,
    octree: &mut FaceOctree,
) -> (Option<EdgeId>, bool) {
    let Some(map) = mirror else {
        return (None, false);
    };
    match map.edge(edge, mesh, octree) {
        Some(twin) if twin == edge => (None, true),
        Some(twin) => (Some(twin), false),
        None => {
            trace!("no mirrored twin for {:?}", edge);
            (None, false)
        }
    }
}

/// Whether collapsing `a` leaves everything that decides the collapse of `b`
/// untouched: no face lies around an endpoint of both.
fn independent(mesh: &WingedMesh, a: EdgeId, b: EdgeId) -> bool {
    let faces_around = |edge: EdgeId| -> BTreeSet<FaceId> {
        mesh.edge(edge)
            .map(|e| {
                let mut faces = mesh.vertex_faces(e.vertex1);
                faces.extend(mesh.vertex_faces(e.vertex2));
                faces.into_iter().collect()
            })
            .unwrap_or_default()
    };
    faces_around(a).is_disjoint(&faces_around(b))
}

/// Split edges touching `region` until none is longer than `target_edge_length`.
///
/// Edges whose adjacent faces already sit at the depth bound are skipped,
/// so a few long edges may remain when the bound is reached. The octree is
/// brought up to date before returning.
pub fn ensure_density(
    mesh: &mut WingedMesh,
    octree: &mut FaceOctree,
    region: &Sphere,
    target_edge_length: f32,
    settings: &SubdivisionSettings,
) -> TessellationStats {
    ensure_density_mirrored(mesh, octree, region, target_edge_length, settings, None)
}

/// [`ensure_density`] over `region` and its reflection, splitting each
/// edge together with its mirrored twin.
///
/// The twin is split at the reflection of the primary midpoint, and an edge
/// that is its own twin is split on the plane, so a mesh that is symmetric
/// before the pass stays symmetric after it.
pub fn ensure_density_mirrored(
    mesh: &mut WingedMesh,
    octree: &mut FaceOctree,
    region: &Sphere,
    target_edge_length: f32,
    settings: &SubdivisionSettings,
    mut mirror: Option<&mut PartnerMap>,
) -> TessellationStats {
    let mut stats = TessellationStats::default();
    if !(target_edge_length > 0.0) {
        return stats;
    }
    let max_level = max_face_level(settings.max_depth);
    let regions = regions_for(region, mirror.as_deref());
    let evaluate = |mesh: &WingedMesh, edge: EdgeId| {
        regions
            .iter()
            .find_map(|r| SplitCandidate::evaluate(mesh, edge, r, target_edge_length))
    };

    let mut queue: BinaryHeap<SplitCandidate> = edges_in_regions(mesh, octree, &regions)
        .into_iter()
        .filter_map(|e| evaluate(mesh, e))
        .collect();
    trace!("ensure_density: {} initial candidates", queue.len());

    while let Some(candidate) = queue.pop() {
        // Split edges are retired, never reused within a pass
        if mesh.edge(candidate.edge).is_none() {
            continue;
        }
        if stats.edges_split >= settings.max_splits_per_event {
            stats.budget_exhausted = true;
            debug!(
                "ensure_density: reached max splits per event ({}), stopping",
                settings.max_splits_per_event
            );
            break;
        }
        let (twin, on_plane) = twin_of(mirror.as_deref_mut(), candidate.edge, mesh, octree);
        if twin.is_some() && stats.edges_split + 2 > settings.max_splits_per_event {
            stats.budget_exhausted = true;
            debug!("ensure_density: no budget left for a mirrored pair, stopping");
            break;
        }
        let deep = |edge: EdgeId| !within_depth(mesh, edge, max_level);
        if deep(candidate.edge) || twin.is_some_and(deep) {
            stats.depth_limited += 1;
            continue;
        }
        let Some((a, b)) = mesh.edge_endpoints(candidate.edge) else {
            continue;
        };
        let mut position = (a + b) * 0.5;
        if on_plane {
            if let Some(map) = mirror.as_deref() {
                position = map.controller().project(position);
            }
        }

        let mid = match mesh.split_edge_at(candidate.edge, position) {
            Ok(mid) => mid,
            Err(err) => {
                stats.rejected += 1;
                debug!("ensure_density: split of {:?} rejected: {}", candidate.edge, err);
                continue;
            }
        };
        stats.edges_split += 1;
        queue.extend(mesh.vertex_edges(mid).into_iter().filter_map(|e| evaluate(mesh, e)));

        let Some(map) = mirror.as_deref_mut() else {
            continue;
        };
        if on_plane {
            map.pair(mid, mid);
        }
        let Some(twin) = twin else {
            continue;
        };
        let reflected = map.controller().reflect(position);
        match mesh.split_edge_at(twin, reflected) {
            Ok(twin_mid) => {
                stats.edges_split += 1;
                stats.mirrored += 1;
                map.pair(mid, twin_mid);
                queue.extend(
                    mesh.vertex_edges(twin_mid)
                        .into_iter()
                        .filter_map(|e| evaluate(mesh, e)),
                );
            }
            Err(err) => {
                stats.rejected += 1;
                debug!("ensure_density: mirrored split of {:?} rejected: {}", twin, err);
            }
        }
    }

    octree.sync(mesh);
    debug!(
        "ensure_density: split={} mirrored={} depth_limited={} faces={}",
        stats.edges_split,
        stats.mirrored,
        stats.depth_limited,
        mesh.face_count()
    );
    stats
}

/// Collapse edges touching `region` that are shorter than `min_edge_length`.
///
/// Candidates are ranked by [`collapse_error`] and re-checked against the
/// current mesh right before each collapse, since earlier collapses change
/// their neighbourhood. Edges with a boundary endpoint are never collapsed,
/// so the region's boundary loop stays as it was.
pub fn relax(
    mesh: &mut WingedMesh,
    octree: &mut FaceOctree,
    region: &Sphere,
    min_edge_length: f32,
    settings: &SubdivisionSettings,
) -> TessellationStats {
    relax_mirrored(mesh, octree, region, min_edge_length, settings, None)
}

/// [`relax`] over `region` and its reflection, collapsing each edge together
/// with its mirrored twin. A pair is skipped unless both edges can collapse.
pub fn relax_mirrored(
    mesh: &mut WingedMesh,
    octree: &mut FaceOctree,
    region: &Sphere,
    min_edge_length: f32,
    settings: &SubdivisionSettings,
    mut mirror: Option<&mut PartnerMap>,
) -> TessellationStats {
    let mut stats = TessellationStats::default();
    let regions = regions_for(region, mirror.as_deref());
    let evaluate = |mesh: &WingedMesh, edge: EdgeId| {
        regions
            .iter()
            .find_map(|r| CollapseCandidate::evaluate(mesh, edge, r, min_edge_length))
    };

    let mut candidates: Vec<CollapseCandidate> = edges_in_regions(mesh, octree, &regions)
        .into_iter()
        .filter_map(|e| evaluate(mesh, e))
        .collect();
    candidates.sort();
    trace!("relax: {} candidates", candidates.len());

    for candidate in candidates {
        if stats.edges_collapsed >= settings.max_collapses_per_event {
            stats.budget_exhausted = true;
            debug!(
                "relax: reached max collapses per event ({}), stopping",
                settings.max_collapses_per_event
            );
            break;
        }
        let Some(current) = evaluate(mesh, candidate.edge) else {
            continue;
        };
        let (twin, on_plane) = twin_of(mirror.as_deref_mut(), current.edge, mesh, octree);
        if let Some(twin) = twin {
            if stats.edges_collapsed + 2 > settings.max_collapses_per_event {
                stats.budget_exhausted = true;
                debug!("relax: no budget left for a mirrored pair, stopping");
                break;
            }
            if evaluate(mesh, twin).is_none() || !independent(mesh, current.edge, twin) {
                trace!("relax: mirrored twin {:?} cannot collapse, skipping pair", twin);
                continue;
            }
        }
        let Some((a, b)) = mesh.edge_endpoints(current.edge) else {
            continue;
        };
        let mut target = (a + b) * 0.5;
        if on_plane {
            if let Some(map) = mirror.as_deref() {
                target = map.controller().project(target);
            }
        }

        let kept = match mesh.collapse_edge_to(current.edge, target) {
            Ok(kept) => kept,
            Err(err) => {
                stats.rejected += 1;
                trace!("relax: collapse of {:?} rejected: {}", current.edge, err);
                continue;
            }
        };
        stats.edges_collapsed += 1;

        let Some(map) = mirror.as_deref_mut() else {
            continue;
        };
        if on_plane {
            map.pair(kept, kept);
        }
        let Some(twin) = twin else {
            continue;
        };
        match mesh.collapse_edge_to(twin, map.controller().reflect(target)) {
            Ok(twin_kept) => {
                stats.edges_collapsed += 1;
                stats.mirrored += 1;
                map.pair(kept, twin_kept);
            }
            Err(err) => {
                stats.rejected += 1;
                trace!("relax: mirrored collapse of {:?} rejected: {}", twin, err);
            }
        }
    }

    octree.sync(mesh);
    debug!(
        "relax: collapsed={} mirrored={} rejected={} faces={}",
        stats.edges_collapsed,
        stats.mirrored,
        stats.rejected,
        mesh.face_count()
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::SymmetryController;
    use crate::test_meshes;
    use chisel_config::{Axis, OctreeSettings};
    use glam::Vec3;

    fn settings(max_depth: u8) -> SubdivisionSettings {
        SubdivisionSettings {
            max_depth,
            ..Default::default()
        }
    }

    fn boundary_loop(mesh: &WingedMesh) -> BTreeSet<[[u32; 3]; 2]> {
        mesh.edge_ids()
            .filter(|&e| mesh.is_boundary_edge(e))
            .map(|e| {
                let (a, b) = mesh.edge_endpoints(e).unwrap();
                let mut ends = [a, b].map(|p| p.to_array().map(f32::to_bits));
                ends.sort();
                ends
            })
            .collect()
    }

    #[test]
    fn test_unit_square_subdivides_to_128_triangles() {
        let mut mesh = test_meshes::unit_square();
        let mut octree = FaceOctree::build(&mesh, OctreeSettings::default());
        let region = Sphere::new(Vec3::new(0.5, 0.0, 0.5), 1.0);

        let stats = ensure_density(&mut mesh, &mut octree, &region, 0.18, &settings(3));

        assert_eq!(mesh.face_count(), 128);
        // 9 x 9 vertex lattice grown from the 4 corners, one vertex per split
        assert_eq!(stats.edges_split, 77);
        assert!(!stats.budget_exhausted);
        for edge in mesh.edge_ids() {
            assert!(mesh.edge_length(edge).unwrap() <= 0.18);
        }
        mesh.validate().unwrap();
        assert_eq!(octree.len(), 128);
    }

    #[test]
    fn test_depth_bound_stops_subdivision() {
        let mut mesh = test_meshes::unit_square();
        let mut octree = FaceOctree::build(&mesh, OctreeSettings::default());
        let region = Sphere::new(Vec3::new(0.5, 0.0, 0.5), 1.0);

        let stats = ensure_density(&mut mesh, &mut octree, &region, 0.01, &settings(3));

        assert_eq!(mesh.face_count(), 128);
        assert!(stats.depth_limited > 0);
        for face in mesh.face_ids() {
            assert_eq!(mesh.face(face).unwrap().level, 6);
        }
    }

    #[test]
    fn test_no_long_edges_left_in_region() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let mut octree = FaceOctree::build(&mesh, OctreeSettings::default());
        let region = Sphere::new(Vec3::new(0.1, 0.0, -0.05), 0.2);

        let stats = ensure_density(&mut mesh, &mut octree, &region, 0.1, &settings(6));
        assert!(stats.edges_split > 0);
        assert_eq!(stats.depth_limited, 0);
        for edge in mesh.edge_ids() {
            let (a, b) = mesh.edge_endpoints(edge).unwrap();
            if region.intersects_segment(a, b) {
                assert!(a.distance(b) <= 0.1, "edge {edge:?} too long");
            }
        }
        mesh.validate().unwrap();
    }

    #[test]
    fn test_split_budget_is_respected() {
        let mut mesh = test_meshes::unit_square();
        let mut octree = FaceOctree::build(&mesh, OctreeSettings::default());
        let region = Sphere::new(Vec3::new(0.5, 0.0, 0.5), 1.0);
        let limited = SubdivisionSettings {
            max_splits_per_event: 3,
            ..settings(3)
        };

        let stats = ensure_density(&mut mesh, &mut octree, &region, 0.18, &limited);
        assert_eq!(stats.edges_split, 3);
        assert!(stats.budget_exhausted);
        mesh.validate().unwrap();
    }

    #[test]
    fn test_relax_reduces_dense_patch_and_keeps_boundary() {
        let mut mesh = test_meshes::unit_square();
        let mut octree = FaceOctree::build(&mesh, OctreeSettings::default());
        let everywhere = Sphere::new(Vec3::new(0.5, 0.0, 0.5), 1.0);
        ensure_density(&mut mesh, &mut octree, &everywhere, 0.18, &settings(3));
        let boundary = boundary_loop(&mesh);
        let before = mesh.face_count();

        let region = Sphere::new(Vec3::new(0.5, 0.0, 0.5), 0.3);
        let stats = relax(&mut mesh, &mut octree, &region, 0.2, &SubdivisionSettings::default());

        assert!(stats.edges_collapsed > 0);
        assert!(mesh.face_count() < before);
        assert_eq!(boundary_loop(&mesh), boundary);
        mesh.validate().unwrap();
        assert_eq!(octree.len(), mesh.face_count());
        for face in mesh.face_ids() {
            assert!(mesh.face_normal(face).unwrap().y > 0.0);
        }
    }

    #[test]
    fn test_relax_respects_collapse_budget() {
        let mut mesh = test_meshes::grid(8, 0.5);
        let mut octree = FaceOctree::build(&mesh, OctreeSettings::default());
        let region = Sphere::new(Vec3::ZERO, 0.5);
        let limited = SubdivisionSettings {
            max_collapses_per_event: 1,
            ..Default::default()
        };

        let before = mesh.face_count();
        let stats = relax(&mut mesh, &mut octree, &region, 0.2, &limited);
        assert_eq!(stats.edges_collapsed, 1);
        assert!(stats.budget_exhausted);
        assert_eq!(mesh.face_count(), before - 2);
    }

    #[test]
    fn test_mirrored_passes_keep_grid_symmetric() {
        let mut mesh = test_meshes::grid(8, 0.5);
        let mut octree = FaceOctree::build(&mesh, OctreeSettings::default());
        let controller = SymmetryController::from_axis(Axis::X, 1e-4);
        let region = Sphere::new(Vec3::new(0.3, 0.0, 0.1), 0.15);

        let mut partners = PartnerMap::new(controller);
        let split = ensure_density_mirrored(
            &mut mesh,
            &mut octree,
            &region,
            0.05,
            &settings(6),
            Some(&mut partners),
        );
        assert!(split.mirrored > 0);
        assert_eq!(split.edges_split, 2 * split.mirrored);
        assert!(test_meshes::is_mirror_symmetric_x(&mesh, 1e-6));
        mesh.validate().unwrap();

        let mut partners = PartnerMap::new(controller);
        let relaxed = relax_mirrored(
            &mut mesh,
            &mut octree,
            &region,
            0.08,
            &settings(6),
            Some(&mut partners),
        );
        assert!(relaxed.mirrored > 0);
        assert_eq!(relaxed.edges_collapsed, 2 * relaxed.mirrored);
        assert!(test_meshes::is_mirror_symmetric_x(&mesh, 1e-6));
        mesh.validate().unwrap();
        assert_eq!(octree.len(), mesh.face_count());
    }

    #[test]
    fn test_one_sided_split_breaks_symmetry() {
        let mut mesh = test_meshes::grid(8, 0.5);
        let mut octree = FaceOctree::build(&mesh, OctreeSettings::default());
        let region = Sphere::new(Vec3::new(0.3, 0.0, 0.1), 0.15);

        let stats = ensure_density(&mut mesh, &mut octree, &region, 0.05, &settings(6));
        assert!(stats.edges_split > 0);
        assert_eq!(stats.mirrored, 0);
        assert!(!test_meshes::is_mirror_symmetric_x(&mesh, 1e-6));
    }
}
