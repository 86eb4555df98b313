//! Pick events delivered by the UI layer.

use chisel_mesh::{Plane, Ray};
use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// How the pointer maps into the scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PickInput {
    /// A world-space ray.
    Ray { origin: Vec3, direction: Vec3 },
    /// A pointer position in viewport pixels (origin top-left) with the
    /// inverse of the camera's view-projection matrix.
    Pointer {
        position: Vec2,
        viewport: Vec2,
        inverse_view_projection: Mat4,
    },
}

impl PickInput {
    /// Resolve to a world-space ray.
    ///
    /// Pointer input is unprojected at the near (NDC z = 0) and far
    /// (NDC z = 1) planes. Returns `None` for a zero direction, an empty
    /// viewport or a matrix that does not unproject to finite points.
    pub fn to_ray(&self) -> Option<Ray> {
        match *self {
            PickInput::Ray { origin, direction } => Ray::new(origin, direction),
            PickInput::Pointer {
                position,
                viewport,
                inverse_view_projection,
            } => {
                if !(viewport.x > 0.0 && viewport.y > 0.0) {
                    return None;
                }
                let ndc = Vec2::new(
                    2.0 * position.x / viewport.x - 1.0,
                    1.0 - 2.0 * position.y / viewport.y,
                );
                let near = inverse_view_projection.project_point3(ndc.extend(0.0));
                let far = inverse_view_projection.project_point3(ndc.extend(1.0));
                if !near.is_finite() || !far.is_finite() {
                    return None;
                }
                Ray::new(near, far - near)
            }
        }
    }
}

/// One event of a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickEvent {
    pub input: PickInput,
    /// Explicit world-space drag vector for drag and grab; when absent the
    /// vector is derived from consecutive picks.
    #[serde(default)]
    pub drag: Option<Vec3>,
}

impl PickEvent {
    pub fn ray(origin: Vec3, direction: Vec3) -> Self {
        Self {
            input: PickInput::Ray { origin, direction },
            drag: None,
        }
    }

    pub fn with_drag(mut self, drag: Vec3) -> Self {
        self.drag = Some(drag);
        self
    }
}

/// Point where `ray` crosses the plane through `anchor` facing the viewer.
///
/// Drag and grab strokes follow the pointer on this plane once the ray
/// leaves the surface.
pub fn view_plane_point(ray: &Ray, anchor: Vec3) -> Option<Vec3> {
    let plane = Plane::from_point_normal(anchor, -ray.direction)?;
    let t = ray.intersect_plane(&plane)?;
    Some(ray.at(t))
}
