//! Edge length thresholds for subdivision decisions.
//!
//! Both thresholds scale with the brush radius so that detail follows the
//! size of the tool rather than the camera.

use chisel_config::SubdivisionSettings;
use glam::Vec3;

/// Smallest edge length either threshold will produce.
pub const MIN_EDGE_LENGTH: f32 = 1e-4;

/// Edge length that density-increasing brushes subdivide down to.
pub fn target_edge_length(radius: f32, settings: &SubdivisionSettings) -> f32 {
    (radius * (1.0 - settings.detail_factor)).max(MIN_EDGE_LENGTH)
}

/// Edges shorter than this are collapsed by the reduce brush.
///
/// Higher intensity reduces more aggressively.
pub fn reduce_threshold(radius: f32, intensity: f32, settings: &SubdivisionSettings) -> f32 {
    (settings.reduce_ratio * (1.0 + intensity) * (1.0 - settings.detail_factor) * radius)
        .max(MIN_EDGE_LENGTH)
}

/// Highest face level that may still be split.
///
/// Each depth step halves edge lengths, which takes two bisections of a
/// right triangle, so the level bound is twice the depth.
pub fn max_face_level(max_depth: u8) -> u8 {
    max_depth.saturating_mul(2)
}

/// Check if a triangle is degenerate (area under `min_area`).
pub fn is_degenerate_triangle(a: Vec3, b: Vec3, c: Vec3, min_area: f32) -> bool {
    (b - a).cross(c - a).length() * 0.5 < min_area
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_scale_with_radius() {
        let settings = SubdivisionSettings::default();
        let small = target_edge_length(0.1, &settings);
        let large = target_edge_length(0.4, &settings);
        assert!((large / small - 4.0).abs() < 1e-4);

        let gentle = reduce_threshold(0.2, 0.0, &settings);
        let strong = reduce_threshold(0.2, 1.0, &settings);
        assert!(strong > gentle);
        assert!(gentle >= target_edge_length(0.2, &settings));
    }

    #[test]
    fn test_full_detail_is_clamped() {
        let settings = SubdivisionSettings {
            detail_factor: 1.0,
            ..Default::default()
        };
        assert_eq!(target_edge_length(0.2, &settings), MIN_EDGE_LENGTH);
    }

    #[test]
    fn test_max_face_level() {
        assert_eq!(max_face_level(3), 6);
        assert_eq!(max_face_level(200), u8::MAX);
    }

    #[test]
    fn test_degenerate_triangle() {
        assert!(is_degenerate_triangle(Vec3::ZERO, Vec3::X, Vec3::X * 2.0, 1e-9));
        assert!(!is_degenerate_triangle(Vec3::ZERO, Vec3::X, Vec3::Z, 1e-9));
    }
}
