//! Spatial data structures for efficient sculpting queries.
//!
//! [`FaceOctree`] buckets mesh faces by their bounding boxes and answers the
//! two questions a brush asks on every pick event:
//! - which face does this ray hit first
//! - which faces does this sphere touch
//!
//! The octree never owns geometry. It stores face ids together with the
//! bounds they had when last reported, so callers must forward every mesh
//! change through [`FaceOctree::notify_mutated`] (or [`FaceOctree::sync`])
//! before querying again. Rebalancing is local: nodes split when they
//! overflow and merge back when their subtree runs low, only along the paths
//! of the faces that were touched.

use std::collections::{BTreeSet, HashMap};

use chisel_config::OctreeSettings;
use chisel_mesh::{
    Aabb, FaceId, Ray, Sphere, VertexId, WingedMesh, interpolate_vec3, ray_triangle_intersection,
};
use glam::Vec3;
use tracing::{debug, trace};

/// Relative tolerance under which two ray hits count as equally close.
const RAY_TIE_EPSILON: f32 = 1e-6;

/// Upper bound on root growth steps for a single insertion.
const MAX_ROOT_GROWTH: usize = 32;

/// Closest intersection of a pick ray with the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub face: FaceId,
    /// World-space hit point
    pub point: Vec3,
    /// Weights of the face's three corners, in face vertex order
    pub barycentric: Vec3,
    /// Distance along the (normalized) ray
    pub distance: f32,
    /// Interpolated vertex normal at the hit
    pub normal: Vec3,
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb,
    depth: u8,
    parent: Option<usize>,
    children: Option<[usize; 8]>,
    /// Faces whose bounds fit this node but no single child
    faces: Vec<(FaceId, Aabb)>,
    /// Faces stored in this node and all of its descendants
    subtree_count: usize,
}

impl Node {
    fn leaf(bounds: Aabb, depth: u8, parent: Option<usize>) -> Self {
        Self {
            bounds,
            depth,
            parent,
            children: None,
            faces: Vec::new(),
            subtree_count: 0,
        }
    }
}

/// Loose octree over face bounding boxes.
#[derive(Debug, Clone)]
pub struct FaceOctree {
    nodes: Vec<Node>,
    free_nodes: Vec<usize>,
    root: usize,
    /// Node currently holding each face
    locations: HashMap<FaceId, usize>,
    settings: OctreeSettings,
}

impl FaceOctree {
    /// Create an empty octree covering `bounds`.
    pub fn new(bounds: Aabb, settings: OctreeSettings) -> Self {
        Self {
            nodes: vec![Node::leaf(bounds, 0, None)],
            free_nodes: Vec::new(),
            root: 0,
            locations: HashMap::new(),
            settings,
        }
    }

    /// Build an octree over every face of `mesh`.
    pub fn build(mesh: &WingedMesh, settings: OctreeSettings) -> Self {
        let bounds = match mesh.bounds() {
            Some(b) => {
                let half = (b.size().max_element() * 0.5).max(1e-3) * (1.0 + settings.root_padding);
                Aabb::cube(b.center(), half)
            }
            None => Aabb::cube(Vec3::ZERO, 1.0),
        };
        let mut octree = Self::new(bounds, settings);
        for face in mesh.face_ids() {
            if let Some(aabb) = mesh.face_aabb(face) {
                octree.insert(face, aabb);
            }
        }
        debug!(
            "FaceOctree::build: {} faces in {} nodes",
            octree.len(),
            octree.node_count()
        );
        octree
    }

    /// Number of faces indexed.
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_nodes.len()
    }

    /// Bounds of the root node.
    pub fn bounds(&self) -> Aabb {
        self.nodes[self.root].bounds
    }

    pub fn contains_face(&self, face: FaceId) -> bool {
        self.locations.contains_key(&face)
    }

    /// Re-bucket the given faces after a mesh mutation.
    ///
    /// Faces that no longer exist are dropped, the rest are reinserted with
    /// their current bounds.
    pub fn notify_mutated(&mut self, faces: impl IntoIterator<Item = FaceId>, mesh: &WingedMesh) {
        let faces: BTreeSet<FaceId> = faces.into_iter().collect();
        for &face in &faces {
            self.remove(face);
        }
        for &face in &faces {
            if let Some(aabb) = mesh.face_aabb(face) {
                self.insert(face, aabb);
            }
        }
        trace!(
            "FaceOctree::notify_mutated: {} faces, {} nodes",
            faces.len(),
            self.node_count()
        );
    }

    /// Drain the mesh's pending changes into the octree.
    pub fn sync(&mut self, mesh: &mut WingedMesh) {
        let changes = mesh.take_pending_changes();
        if !changes.faces.is_empty() {
            self.notify_mutated(changes.faces.iter().copied(), mesh);
        }
    }

    /// All faces whose stored bounds intersect `sphere`, sorted by id.
    pub fn query_sphere(&self, sphere: &Sphere) -> Vec<FaceId> {
        let mut result = Vec::new();
        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if index != self.root && !node.bounds.intersects_sphere(sphere) {
                continue;
            }
            result.extend(
                node.faces
                    .iter()
                    .filter(|(_, aabb)| aabb.intersects_sphere(sphere))
                    .map(|(face, _)| *face),
            );
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
        result.sort_unstable();
        result
    }

    /// Vertices of the faces touching `sphere` that lie inside it, sorted by id.
    pub fn vertices_in_sphere(&self, sphere: &Sphere, mesh: &WingedMesh) -> Vec<VertexId> {
        let mut vertices = BTreeSet::new();
        for face in self.query_sphere(sphere) {
            let Some(corners) = mesh.face_vertices(face) else {
                continue;
            };
            for v in corners {
                if mesh.position(v).is_some_and(|p| sphere.contains(p)) {
                    vertices.insert(v);
                }
            }
        }
        vertices.into_iter().collect()
    }

    /// Closest face hit by `ray`. Equally close hits resolve to the lowest face id.
    pub fn query_ray(&self, ray: &Ray, mesh: &WingedMesh) -> Option<RayHit> {
        let mut best: Option<(f32, FaceId, f32, f32)> = None;
        let mut stack = vec![self.root];

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if index != self.root {
                let Some(entry) = node.bounds.intersects_ray(ray) else {
                    continue;
                };
                if best.is_some_and(|(t, ..)| entry > t + tie_tolerance(t)) {
                    continue;
                }
            }

            for &(face, aabb) in &node.faces {
                let Some(entry) = aabb.intersects_ray(ray) else {
                    continue;
                };
                if best.is_some_and(|(t, ..)| entry > t + tie_tolerance(t)) {
                    continue;
                }
                let Some([p0, p1, p2]) = mesh.face_positions(face) else {
                    continue;
                };
                let Some(hit) = ray_triangle_intersection(ray, p0, p1, p2) else {
                    continue;
                };
                let closer = match best {
                    None => true,
                    Some((t, best_face, ..)) => {
                        if (hit.t - t).abs() <= tie_tolerance(t) {
                            face < best_face
                        } else {
                            hit.t < t
                        }
                    }
                };
                if closer {
                    best = Some((hit.t, face, hit.u, hit.v));
                }
            }

            if let Some(children) = node.children {
                stack.extend(children);
            }
        }

        let (distance, face, u, v) = best?;
        let corners = mesh.face_vertices(face)?;
        let normals = corners.map(|c| mesh.vertex_normal(c).unwrap_or(Vec3::ZERO));
        let normal = interpolate_vec3(normals[0], normals[1], normals[2], u, v)
            .try_normalize()
            .or_else(|| mesh.face_normal(face))
            .unwrap_or(Vec3::Y);

        Some(RayHit {
            face,
            point: ray.at(distance),
            barycentric: Vec3::new(1.0 - u - v, u, v),
            distance,
            normal,
        })
    }

    fn insert(&mut self, face: FaceId, aabb: Aabb) {
        if aabb.min.is_finite() && aabb.max.is_finite() {
            let mut steps = 0;
            while !self.nodes[self.root].bounds.contains(&aabb) && steps < MAX_ROOT_GROWTH {
                self.grow_root(aabb.center());
                steps += 1;
            }
        }

        let mut index = self.root;
        while let Some(children) = self.nodes[index].children {
            match children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].bounds.contains(&aabb))
            {
                Some(child) => index = child,
                None => break,
            }
        }

        self.nodes[index].faces.push((face, aabb));
        self.locations.insert(face, index);
        self.adjust_counts(index, 1);
        self.maybe_split(index);
    }

    fn remove(&mut self, face: FaceId) -> bool {
        let Some(index) = self.locations.remove(&face) else {
            return false;
        };
        let faces = &mut self.nodes[index].faces;
        if let Some(pos) = faces.iter().position(|(f, _)| *f == face) {
            faces.swap_remove(pos);
        }
        self.adjust_counts(index, -1);
        self.maybe_merge(index);
        true
    }

    fn adjust_counts(&mut self, mut index: usize, delta: isize) {
        loop {
            let node = &mut self.nodes[index];
            node.subtree_count = node.subtree_count.saturating_add_signed(delta);
            match node.parent {
                Some(parent) => index = parent,
                None => break,
            }
        }
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free_nodes.pop() {
            Some(index) => {
                self.nodes[index] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn maybe_split(&mut self, index: usize) {
        let node = &self.nodes[index];
        if node.children.is_some()
            || node.faces.len() <= self.settings.node_capacity
            || node.depth >= self.settings.max_depth
        {
            return;
        }

        let bounds = node.bounds;
        let depth = node.depth + 1;
        let mut children = [0usize; 8];
        for (octant, slot) in children.iter_mut().enumerate() {
            *slot = self.alloc(Node::leaf(bounds.octant_bounds(octant), depth, Some(index)));
        }
        self.nodes[index].children = Some(children);

        let faces = std::mem::take(&mut self.nodes[index].faces);
        let mut kept = Vec::new();
        for (face, aabb) in faces {
            match children
                .iter()
                .copied()
                .find(|&c| self.nodes[c].bounds.contains(&aabb))
            {
                Some(child) => {
                    let child_node = &mut self.nodes[child];
                    child_node.faces.push((face, aabb));
                    child_node.subtree_count += 1;
                    self.locations.insert(face, child);
                }
                None => kept.push((face, aabb)),
            }
        }
        self.nodes[index].faces = kept;

        for child in children {
            self.maybe_split(child);
        }
    }

    /// Collapse the highest ancestor of `index` whose subtree fell under the
    /// low-water mark.
    fn maybe_merge(&mut self, index: usize) {
        let mut target = None;
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            let node = &self.nodes[i];
            if node.children.is_some() {
                if node.subtree_count >= self.settings.low_water_mark {
                    break;
                }
                target = Some(i);
            }
            cursor = node.parent;
        }
        if let Some(target) = target {
            self.collapse_subtree(target);
        }
    }

    fn collapse_subtree(&mut self, index: usize) {
        let Some(children) = self.nodes[index].children.take() else {
            return;
        };
        let mut stack: Vec<usize> = children.to_vec();
        let mut gathered = Vec::new();
        while let Some(child) = stack.pop() {
            let node = &mut self.nodes[child];
            gathered.append(&mut node.faces);
            if let Some(grandchildren) = node.children.take() {
                stack.extend(grandchildren);
            }
            self.free_nodes.push(child);
        }
        for &(face, _) in &gathered {
            self.locations.insert(face, index);
        }
        self.nodes[index].faces.extend(gathered);
    }

    /// Double the root toward `target`, keeping the old root as one octant.
    fn grow_root(&mut self, target: Vec3) {
        let old_root = self.root;
        let old = self.nodes[old_root].bounds;
        let size = old.size();
        let center = old.center();

        let mut min = old.min;
        let mut max = old.max;
        for axis in 0..3 {
            if target[axis] < center[axis] {
                min[axis] -= size[axis];
            } else {
                max[axis] += size[axis];
            }
        }
        let grown = Aabb::new(min, max);
        let old_octant = grown.octant_for_point(center);

        let new_root = self.alloc(Node::leaf(grown, 0, None));
        let mut children = [0usize; 8];
        for (octant, slot) in children.iter_mut().enumerate() {
            *slot = if octant == old_octant {
                old_root
            } else {
                self.alloc(Node::leaf(
                    grown.octant_bounds(octant),
                    1.min(self.settings.max_depth),
                    Some(new_root),
                ))
            };
        }

        let count = self.nodes[old_root].subtree_count;
        self.nodes[old_root].parent = Some(new_root);
        // Nodes pushed to the depth limit absorb their subtrees
        let max_depth = self.settings.max_depth;
        let mut stack = vec![old_root];
        let mut capped = Vec::new();
        while let Some(i) = stack.pop() {
            let node = &mut self.nodes[i];
            node.depth = node.depth.saturating_add(1).min(max_depth);
            match node.children {
                Some(_) if node.depth >= max_depth => capped.push(i),
                Some(grandchildren) => stack.extend(grandchildren),
                None => {}
            }
        }
        for index in capped {
            self.collapse_subtree(index);
        }

        let root = &mut self.nodes[new_root];
        root.children = Some(children);
        root.subtree_count = count;
        self.root = new_root;
        debug!("FaceOctree: grew root to {:?}", grown);
    }
}

fn tie_tolerance(t: f32) -> f32 {
    RAY_TIE_EPSILON * t.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_meshes;

    fn small_settings() -> OctreeSettings {
        OctreeSettings {
            node_capacity: 4,
            low_water_mark: 2,
            max_depth: 6,
            root_padding: 0.1,
        }
    }

    fn brute_force_sphere(mesh: &WingedMesh, sphere: &Sphere) -> Vec<FaceId> {
        mesh.face_ids()
            .filter(|&f| mesh.face_aabb(f).is_some_and(|b| b.intersects_sphere(sphere)))
            .collect()
    }

    fn brute_force_ray(mesh: &WingedMesh, ray: &Ray) -> Option<(FaceId, f32)> {
        let mut best: Option<(FaceId, f32)> = None;
        for face in mesh.face_ids() {
            let [a, b, c] = mesh.face_positions(face).unwrap();
            if let Some(hit) = ray_triangle_intersection(ray, a, b, c) {
                let better = match best {
                    None => true,
                    Some((f, t)) => {
                        if (hit.t - t).abs() <= tie_tolerance(t) {
                            face < f
                        } else {
                            hit.t < t
                        }
                    }
                };
                if better {
                    best = Some((face, hit.t));
                }
            }
        }
        best
    }

    fn sample_spheres() -> Vec<Sphere> {
        let mut spheres = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                let center = Vec3::new(-0.6 + 0.3 * i as f32, 0.05 * j as f32, -0.6 + 0.3 * j as f32);
                spheres.push(Sphere::new(center, 0.05 + 0.07 * ((i + j) % 4) as f32));
            }
        }
        spheres
    }

    #[test]
    fn test_build_indexes_every_face() {
        let mesh = test_meshes::grid(8, 0.5);
        let octree = FaceOctree::build(&mesh, small_settings());
        assert_eq!(octree.len(), mesh.face_count());
        assert!(octree.node_count() > 1);
        for face in mesh.face_ids() {
            assert!(octree.contains_face(face));
        }
    }

    #[test]
    fn test_sphere_query_matches_brute_force() {
        let mesh = test_meshes::grid(8, 0.5);
        let octree = FaceOctree::build(&mesh, small_settings());
        for sphere in sample_spheres() {
            assert_eq!(
                octree.query_sphere(&sphere),
                brute_force_sphere(&mesh, &sphere),
                "sphere {sphere:?}"
            );
        }
    }

    #[test]
    fn test_sphere_query_after_mutations() {
        let mut mesh = test_meshes::grid(6, 0.5);
        let mut octree = FaceOctree::build(&mesh, small_settings());
        mesh.take_pending_changes();

        let edges: Vec<_> = mesh.edge_ids().step_by(3).collect();
        for edge in edges {
            if mesh.edge(edge).is_some() {
                mesh.split_edge(edge).unwrap();
            }
        }
        let lifted: Vec<_> = mesh
            .vertex_ids()
            .step_by(4)
            .map(|v| (v, mesh.position(v).unwrap() + Vec3::new(0.0, 0.2, 0.05)))
            .collect();
        mesh.move_vertices(&lifted).unwrap();
        octree.sync(&mut mesh);

        assert_eq!(octree.len(), mesh.face_count());
        for sphere in sample_spheres() {
            assert_eq!(octree.query_sphere(&sphere), brute_force_sphere(&mesh, &sphere));
        }
    }

    #[test]
    fn test_root_grows_for_far_faces() {
        let mut mesh = test_meshes::grid(2, 0.5);
        let mut octree = FaceOctree::build(&mesh, small_settings());
        let far = mesh.vertex_ids().next().unwrap();
        mesh.move_vertex(far, Vec3::new(-12.0, 3.0, 7.5)).unwrap();
        octree.sync(&mut mesh);

        assert!(octree.bounds().contains_point(Vec3::new(-12.0, 3.0, 7.5)));
        let sphere = Sphere::new(Vec3::new(-12.0, 3.0, 7.5), 0.1);
        let found = octree.query_sphere(&sphere);
        assert!(!found.is_empty());
        assert_eq!(found, brute_force_sphere(&mesh, &sphere));
    }

    #[test]
    fn test_root_growth_respects_max_depth() {
        let settings = OctreeSettings {
            node_capacity: 2,
            max_depth: 3,
            ..small_settings()
        };
        let mut mesh = test_meshes::grid(8, 0.5);
        let mut octree = FaceOctree::build(&mesh, settings.clone());
        let far = mesh.vertex_ids().next().unwrap();
        for step in 1..=4 {
            let target = Vec3::new(-6.0, 1.0, 4.0) * step as f32;
            mesh.move_vertex(far, target).unwrap();
            octree.sync(&mut mesh);
        }

        let mut stack = vec![octree.root];
        while let Some(index) = stack.pop() {
            let node = &octree.nodes[index];
            assert!(node.depth <= settings.max_depth, "node {index} at depth {}", node.depth);
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
        assert_eq!(octree.len(), mesh.face_count());
        for sphere in sample_spheres() {
            assert_eq!(octree.query_sphere(&sphere), brute_force_sphere(&mesh, &sphere));
        }
    }

    #[test]
    fn test_nodes_merge_when_faces_leave() {
        let mesh = test_meshes::grid(8, 0.5);
        let mut octree = FaceOctree::build(&mesh, small_settings());
        assert!(octree.node_count() > 1);
        for face in mesh.face_ids() {
            assert!(octree.remove(face));
        }
        assert!(octree.is_empty());
        assert_eq!(octree.node_count(), 1);
    }

    #[test]
    fn test_ray_query_matches_brute_force() {
        let mesh = test_meshes::icosphere(2);
        let octree = FaceOctree::build(&mesh, small_settings());

        let origins = [
            Vec3::new(0.0, 0.0, 3.0),
            Vec3::new(2.0, 1.5, -1.0),
            Vec3::new(-3.0, 0.2, 0.1),
            Vec3::new(0.3, -4.0, 0.2),
        ];
        for origin in origins {
            for offset in [Vec3::ZERO, Vec3::new(0.2, 0.1, 0.0), Vec3::new(-0.3, 0.25, 0.15)] {
                let ray = Ray::new(origin, offset - origin).unwrap();
                let hit = octree.query_ray(&ray, &mesh);
                let expected = brute_force_ray(&mesh, &ray);
                match (hit, expected) {
                    (Some(hit), Some((face, t))) => {
                        assert_eq!(hit.face, face);
                        assert!((hit.distance - t).abs() < 1e-5);
                        assert!(hit.normal.dot(ray.direction) < 0.0);
                    }
                    (None, None) => {}
                    other => panic!("mismatch for ray {ray:?}: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_ray_miss_is_empty() {
        let mesh = test_meshes::grid(4, 0.5);
        let octree = FaceOctree::build(&mesh, small_settings());
        let ray = Ray::new(Vec3::new(5.0, 1.0, 5.0), Vec3::NEG_Y).unwrap();
        assert!(octree.query_ray(&ray, &mesh).is_none());
    }

    #[test]
    fn test_vertices_in_sphere() {
        let mesh = test_meshes::grid(4, 0.5);
        let octree = FaceOctree::build(&mesh, small_settings());
        let sphere = Sphere::new(Vec3::ZERO, 0.26);
        let inside = octree.vertices_in_sphere(&sphere, &mesh);
        let expected: Vec<_> = mesh
            .vertex_ids()
            .filter(|&v| sphere.contains(mesh.position(v).unwrap()))
            .collect();
        assert_eq!(inside, expected);
        assert_eq!(inside.len(), 5);
    }
}
