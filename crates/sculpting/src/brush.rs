//! Brush configuration, presets and stroke spacing.
//!
//! A [`Brush`] is the full description of what one pick event does: the
//! deformation kind, its footprint, its falloff and the constraint flags.
//! [`StrokeSpacing`] decides which pick events of a stroke turn into dabs.

use chisel_config::{Axis, BrushSettings};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::types::{BrushFlags, BrushKind, SculptError};

/// Displacement per event as a fraction of the brush radius at full weight.
pub const DISPLACEMENT_SCALE: f32 = 0.1;

/// Falloff curve for brush influence.
///
/// Determines how brush strength decreases from center to edge. Every curve
/// is 1 at the center, non-increasing, and 0 at and beyond the radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum FalloffCurve {
    /// Linear falloff: strength = 1 - distance/radius
    Linear = 0,
    /// Smooth falloff: hermite interpolation
    #[default]
    Smooth = 1,
    /// Sharp falloff: quadratic decay
    Sharp = 2,
    /// Constant: full strength strictly inside the radius
    Constant = 3,
    /// Sphere: spherical falloff (sqrt-based)
    Sphere = 4,
}

impl FalloffCurve {
    /// Calculate falloff strength at a given normalized distance (0.0 = center, 1.0 = edge).
    pub fn evaluate(&self, normalized_distance: f32) -> f32 {
        if normalized_distance.is_nan() || normalized_distance >= 1.0 {
            return 0.0;
        }
        let d = normalized_distance.max(0.0);
        match self {
            FalloffCurve::Linear => 1.0 - d,
            FalloffCurve::Smooth => {
                // Hermite smoothstep: 3t² - 2t³
                let t = 1.0 - d;
                t * t * (3.0 - 2.0 * t)
            }
            FalloffCurve::Sharp => {
                let t = 1.0 - d;
                t * t
            }
            FalloffCurve::Constant => 1.0,
            FalloffCurve::Sphere => (1.0 - d * d).max(0.0).sqrt(),
        }
    }
}

/// Active brush configuration, attached to every pick event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Brush {
    pub kind: BrushKind,
    /// Footprint radius in world units (> 0)
    pub radius: f32,
    /// Strength multiplier in 0..=1
    pub intensity: f32,
    pub falloff: FalloffCurve,
    pub flags: BrushFlags,
    /// Plane used by `flags.along_primary_plane`, through the origin
    pub primary_plane: Axis,
}

impl Default for Brush {
    fn default() -> Self {
        Self {
            kind: BrushKind::Carve,
            radius: 0.2,
            intensity: 0.5,
            falloff: FalloffCurve::Smooth,
            flags: BrushFlags::default(),
            primary_plane: Axis::Y,
        }
    }
}

impl Brush {
    /// Preset tuned for the given kind.
    pub fn preset(kind: BrushKind) -> Self {
        match kind {
            BrushKind::Carve => Self::carve(),
            BrushKind::Inflate => Self::inflate(),
            BrushKind::Drag => Self::drag(),
            BrushKind::Grab => Self::grab(),
            BrushKind::Smooth => Self::smooth(),
            BrushKind::Flatten => Self::flatten(),
            BrushKind::Pinch => Self::pinch(),
            BrushKind::Crease => Self::crease(),
            BrushKind::Reduce => Self::reduce(),
        }
    }

    /// Preset for `kind` using the configured default radius and intensity.
    pub fn from_settings(kind: BrushKind, settings: &BrushSettings) -> Self {
        Self {
            radius: settings.default_radius,
            intensity: settings.default_intensity,
            ..Self::preset(kind)
        }
    }

    pub fn carve() -> Self {
        Self::default()
    }

    pub fn inflate() -> Self {
        Self {
            kind: BrushKind::Inflate,
            intensity: 0.3,
            falloff: FalloffCurve::Sphere,
            ..Default::default()
        }
    }

    pub fn drag() -> Self {
        Self {
            kind: BrushKind::Drag,
            intensity: 1.0,
            ..Default::default()
        }
    }

    pub fn grab() -> Self {
        Self {
            kind: BrushKind::Grab,
            intensity: 1.0,
            ..Default::default()
        }
    }

    pub fn smooth() -> Self {
        Self {
            kind: BrushKind::Smooth,
            intensity: 0.3,
            ..Default::default()
        }
    }

    pub fn flatten() -> Self {
        Self {
            kind: BrushKind::Flatten,
            intensity: 0.4,
            ..Default::default()
        }
    }

    pub fn pinch() -> Self {
        Self {
            kind: BrushKind::Pinch,
            intensity: 0.4,
            falloff: FalloffCurve::Sharp,
            ..Default::default()
        }
    }

    pub fn crease() -> Self {
        Self {
            kind: BrushKind::Crease,
            intensity: 0.5,
            falloff: FalloffCurve::Sharp,
            ..Default::default()
        }
    }

    pub fn reduce() -> Self {
        Self {
            kind: BrushKind::Reduce,
            intensity: 0.5,
            falloff: FalloffCurve::Constant,
            ..Default::default()
        }
    }

    /// Influence weight `falloff(distance / radius) * intensity`.
    pub fn weight(&self, distance: f32) -> f32 {
        self.falloff.evaluate(distance / self.radius) * self.intensity
    }

    /// Reject radii and intensities outside their documented ranges.
    pub fn validate(&self) -> Result<(), SculptError> {
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(SculptError::InvalidBrush(format!(
                "radius must be positive, got {}",
                self.radius
            )));
        }
        if !(0.0..=1.0).contains(&self.intensity) {
            return Err(SculptError::InvalidBrush(format!(
                "intensity must be within 0..=1, got {}",
                self.intensity
            )));
        }
        Ok(())
    }
}

/// Minimum travel between two dabs of a stroke.
///
/// Grows logarithmically with the radius so large brushes do not stamp
/// on top of themselves while small ones keep up with the pointer.
pub fn step_width(radius: f32, factor: f32) -> f32 {
    factor * (radius + 1.0).ln()
}

/// Tracks the last dab position of a stroke and filters pick events that
/// land too close to it.
#[derive(Debug, Clone, Default)]
pub struct StrokeSpacing {
    last_dab: Option<Vec3>,
}

impl StrokeSpacing {
    /// Whether a dab at `position` should be applied. Records it when so.
    ///
    /// Anchored kinds follow the pointer continuously and always apply.
    pub fn admit(&mut self, brush: &Brush, position: Vec3, factor: f32) -> bool {
        if brush.kind.is_anchored() {
            self.last_dab = Some(position);
            return true;
        }
        let min_distance = step_width(brush.radius, factor);
        match self.last_dab {
            Some(last) if last.distance(position) < min_distance => false,
            _ => {
                self.last_dab = Some(position);
                true
            }
        }
    }

    pub fn last_dab(&self) -> Option<Vec3> {
        self.last_dab
    }

    pub fn reset(&mut self) {
        self.last_dab = None;
    }
}
