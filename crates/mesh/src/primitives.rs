//! Geometric primitives shared by the mesh store, spatial index and brushes.
//!
//! Ray-triangle intersection uses the Moller-Trumbore algorithm and is
//! double-sided so that picks land on back faces of open meshes too.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Epsilon for floating point comparisons in ray intersection
const EPSILON: f32 = 1e-6;

/// A ray with a normalized direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray, normalizing `direction`. Returns `None` for a zero direction.
    pub fn new(origin: Vec3, direction: Vec3) -> Option<Self> {
        let direction = direction.try_normalize()?;
        Some(Self { origin, direction })
    }

    /// Point at parameter `t` along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Intersect the ray with a plane. Returns the hit parameter `t >= 0`.
    pub fn intersect_plane(&self, plane: &Plane) -> Option<f32> {
        let denom = plane.normal.dot(self.direction);
        if denom.abs() < EPSILON {
            return None;
        }
        let t = (plane.distance - plane.normal.dot(self.origin)) / denom;
        (t >= 0.0).then_some(t)
    }
}

/// An oriented plane `normal · p = distance` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Create a plane from a normal (normalized here) and offset from the origin.
    pub fn new(normal: Vec3, distance: f32) -> Option<Self> {
        let length = normal.length();
        if length < EPSILON {
            return None;
        }
        Some(Self {
            normal: normal / length,
            distance: distance / length,
        })
    }

    /// Plane through `point` with the given normal.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Option<Self> {
        let normal = normal.try_normalize()?;
        Some(Self {
            normal,
            distance: normal.dot(point),
        })
    }

    /// Plane through the origin perpendicular to a unit axis.
    pub fn through_origin(axis: [f32; 3]) -> Self {
        Self {
            normal: Vec3::from(axis).normalize_or(Vec3::X),
            distance: 0.0,
        }
    }

    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.distance
    }

    /// Orthogonal projection of a point onto the plane.
    pub fn project_point(&self, point: Vec3) -> Vec3 {
        point - self.normal * self.signed_distance(point)
    }

    /// Remove the component of `vector` along the plane normal.
    pub fn project_vector(&self, vector: Vec3) -> Vec3 {
        vector - self.normal * self.normal.dot(vector)
    }

    /// Mirror a point across the plane.
    pub fn reflect_point(&self, point: Vec3) -> Vec3 {
        point - self.normal * (2.0 * self.signed_distance(point))
    }

    /// Mirror a direction across the plane.
    pub fn reflect_vector(&self, vector: Vec3) -> Vec3 {
        vector - self.normal * (2.0 * self.normal.dot(vector))
    }
}

/// A sphere used for region queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.distance_squared(self.center) <= self.radius * self.radius
    }

    /// Whether the segment `a..b` passes within the sphere.
    pub fn intersects_segment(&self, a: Vec3, b: Vec3) -> bool {
        let ab = b - a;
        let len_sq = ab.length_squared();
        let t = if len_sq > 0.0 {
            ((self.center - a).dot(ab) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.contains(a + ab * t)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing all points. Returns `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut aabb = Self::new(first, first);
        for p in points {
            aabb.min = aabb.min.min(p);
            aabb.max = aabb.max.max(p);
        }
        Some(aabb)
    }

    /// Cube centred on `center` with the given half extent.
    pub fn cube(center: Vec3, half_extent: f32) -> Self {
        Self::new(center - Vec3::splat(half_extent), center + Vec3::splat(half_extent))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains(&self, other: &Aabb) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        let closest = sphere.center.clamp(self.min, self.max);
        closest.distance_squared(sphere.center) <= sphere.radius * sphere.radius
    }

    /// Slab test. Returns the entry distance along the ray (0 if the origin is inside).
    pub fn intersects_ray(&self, ray: &Ray) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_max = f32::INFINITY;
        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if dir.abs() < 1e-12 {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let (t1, t2) = ((lo - origin) * inv, (hi - origin) * inv);
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }

    /// Octant index of a point: bit 0 = +x, bit 1 = +y, bit 2 = +z.
    pub fn octant_for_point(&self, point: Vec3) -> usize {
        let center = self.center();
        let mut octant = 0;
        if point.x >= center.x {
            octant |= 1;
        }
        if point.y >= center.y {
            octant |= 2;
        }
        if point.z >= center.z {
            octant |= 4;
        }
        octant
    }

    /// Bounds of one of the eight child octants.
    pub fn octant_bounds(&self, octant: usize) -> Aabb {
        let center = self.center();
        let pick = |bit: usize, axis: usize| {
            if octant & bit != 0 {
                (center[axis], self.max[axis])
            } else {
                (self.min[axis], center[axis])
            }
        };
        let (x0, x1) = pick(1, 0);
        let (y0, y1) = pick(2, 1);
        let (z0, z1) = pick(4, 2);
        Aabb::new(Vec3::new(x0, y0, z0), Vec3::new(x1, y1, z1))
    }
}

/// Result of a ray-triangle intersection test
#[derive(Debug, Clone, Copy)]
pub struct TriangleHit {
    /// Distance along the ray to the intersection point
    pub t: f32,
    /// Barycentric coordinate u (weight for vertex 1)
    pub u: f32,
    /// Barycentric coordinate v (weight for vertex 2)
    pub v: f32,
}

/// Moller-Trumbore ray-triangle intersection.
///
/// Returns the hit distance and barycentric coordinates if the ray crosses
/// the triangle in front of its origin. Both windings are accepted.
pub fn ray_triangle_intersection(ray: &Ray, v0: Vec3, v1: Vec3, v2: Vec3) -> Option<TriangleHit> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let pvec = ray.direction.cross(edge2);
    let det = edge1.dot(pvec);

    // Ray parallel to the triangle plane
    if det.abs() < EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let tvec = ray.origin - v0;

    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let qvec = tvec.cross(edge1);
    let v = ray.direction.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(qvec) * inv_det;
    if t < EPSILON {
        return None;
    }

    Some(TriangleHit { t, u, v })
}

/// Interpolate a Vec3 attribute using barycentric coordinates.
pub fn interpolate_vec3(v0: Vec3, v1: Vec3, v2: Vec3, u: f32, v: f32) -> Vec3 {
    let w = 1.0 - u - v;
    v0 * w + v1 * u + v2 * v
}

/// Area of the triangle `a, b, c`.
pub fn triangle_area(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    (b - a).cross(c - a).length() * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down_ray(x: f32, y: f32) -> Ray {
        Ray::new(Vec3::new(x, y, 5.0), Vec3::NEG_Z).unwrap()
    }

    #[test]
    fn test_ray_hits_triangle() {
        let hit = ray_triangle_intersection(
            &down_ray(0.25, 0.25),
            Vec3::ZERO,
            Vec3::X,
            Vec3::Y,
        )
        .unwrap();
        assert!((hit.t - 5.0).abs() < 0.001);
        assert!((hit.u - 0.25).abs() < 0.001);
        assert!((hit.v - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_ray_misses_and_hits_back_face() {
        assert!(ray_triangle_intersection(&down_ray(2.0, 2.0), Vec3::ZERO, Vec3::X, Vec3::Y).is_none());
        // Reversed winding is still hit
        assert!(ray_triangle_intersection(&down_ray(0.2, 0.2), Vec3::ZERO, Vec3::Y, Vec3::X).is_some());
    }

    #[test]
    fn test_aabb_ray_slab() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let t = aabb.intersects_ray(&down_ray(0.0, 0.0)).unwrap();
        assert!((t - 4.0).abs() < 0.001);
        assert!(aabb.intersects_ray(&down_ray(3.0, 0.0)).is_none());

        let inside = Ray::new(Vec3::ZERO, Vec3::X).unwrap();
        assert_eq!(aabb.intersects_ray(&inside), Some(0.0));
    }

    #[test]
    fn test_aabb_sphere() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.intersects_sphere(&Sphere::new(Vec3::new(1.5, 0.5, 0.5), 0.6)));
        assert!(!aabb.intersects_sphere(&Sphere::new(Vec3::new(1.5, 1.5, 1.5), 0.5)));
    }

    #[test]
    fn test_octants_partition_box() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(2.0));
        for octant in 0..8 {
            let child = aabb.octant_bounds(octant);
            assert!(aabb.contains(&child));
            assert_eq!(aabb.octant_for_point(child.center()), octant);
        }
    }

    #[test]
    fn test_plane_reflection() {
        let plane = Plane::through_origin([1.0, 0.0, 0.0]);
        let p = Vec3::new(0.3, 1.0, -2.0);
        assert_eq!(plane.reflect_point(p), Vec3::new(-0.3, 1.0, -2.0));
        assert_eq!(plane.reflect_point(plane.reflect_point(p)), p);
        assert_eq!(plane.project_vector(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(0.0, 2.0, 3.0));
    }
}
