//! Tuning constants
//!
//! Every world owns an immutable [`Settings`] value. Two worlds with
//! different tolerances can live side by side in one process.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Maximum number of contact points between two convex shapes
pub const MAX_MANIFOLD_POINTS: usize = 2;

/// Maximum number of vertices on a convex polygon
pub const MAX_POLYGON_VERTICES: usize = 8;

/// Linear slop used when building shapes outside of a world
pub const DEFAULT_LINEAR_SLOP: f32 = 0.005;

/// Skin radius given to polygons, edges and chains until a world assigns its own
pub const DEFAULT_POLYGON_RADIUS: f32 = 2.0 * DEFAULT_LINEAR_SLOP;

/// Collision and solver tolerances. Units are metres, kilograms and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Fattening applied to broad-phase proxies
    pub aabb_extension: f32,
    /// Scale on per-step displacement used to predict proxy movement
    pub aabb_multiplier: f32,
    /// Collision and constraint tolerance
    pub linear_slop: f32,
    /// Angular collision and constraint tolerance
    pub angular_slop: f32,
    /// Relative approach speed below which collisions are inelastic
    pub velocity_threshold: f32,
    /// Largest linear position correction per position iteration
    pub max_linear_correction: f32,
    /// Largest angular position correction per position iteration
    pub max_angular_correction: f32,
    /// Largest translation of a body in one step
    pub max_translation: f32,
    /// Largest rotation of a body in one step
    pub max_rotation: f32,
    /// Fraction of overlap resolved per position iteration
    pub baumgarte: f32,
    /// Time a body must be still before it sleeps
    pub time_to_sleep: f32,
    /// Linear speed below which a body may sleep
    pub linear_sleep_tolerance: f32,
    /// Angular speed below which a body may sleep
    pub angular_sleep_tolerance: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            aabb_extension: 0.1,
            aabb_multiplier: 2.0,
            linear_slop: DEFAULT_LINEAR_SLOP,
            angular_slop: 2.0 / 180.0 * PI,
            velocity_threshold: 1.0,
            max_linear_correction: 0.2,
            max_angular_correction: 8.0 / 180.0 * PI,
            max_translation: 2.0,
            max_rotation: 0.5 * PI,
            baumgarte: 0.2,
            time_to_sleep: 0.5,
            linear_sleep_tolerance: 0.01,
            angular_sleep_tolerance: 2.0 / 180.0 * PI,
        }
    }
}

impl Settings {
    /// Skin radius of polygons, edges and chains
    pub fn polygon_radius(&self) -> f32 {
        2.0 * self.linear_slop
    }

    pub fn max_translation_squared(&self) -> f32 {
        self.max_translation * self.max_translation
    }

    pub fn max_rotation_squared(&self) -> f32 {
        self.max_rotation * self.max_rotation
    }

    /// Set the linear slop
    pub fn with_linear_slop(mut self, slop: f32) -> Self {
        self.linear_slop = slop;
        self
    }

    /// Set the restitution velocity threshold
    pub fn with_velocity_threshold(mut self, threshold: f32) -> Self {
        self.velocity_threshold = threshold;
        self
    }

    /// Set the Baumgarte factor
    pub fn with_baumgarte(mut self, baumgarte: f32) -> Self {
        self.baumgarte = baumgarte;
        self
    }

    /// Set the time a body must rest before sleeping
    pub fn with_time_to_sleep(mut self, seconds: f32) -> Self {
        self.time_to_sleep = seconds;
        self
    }
}

/// Friction mixing law: geometric mean, so a frictionless surface stays frictionless.
pub fn mix_friction(friction1: f32, friction2: f32) -> f32 {
    (friction1 * friction2).sqrt()
}

/// Restitution mixing law: anything bouncy makes the pair bouncy.
pub fn mix_restitution(restitution1: f32, restitution2: f32) -> f32 {
    restitution1.max(restitution2)
}
