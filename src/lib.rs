//! Rigid Collide - 2D rigid-body collision and contact resolution
//!
//! Core modules:
//! - `sim`: Deterministic simulation (bodies, detection, contact forces, impulses, time advance)
//! - `config`: Tolerances and strategy selection
//! - `error`: Error taxonomy surfaced to the caller

pub mod config;
pub mod error;
pub mod sim;

pub use config::{CollisionHandling, ExtraAccel, SimConfig};
pub use error::{SimError, StuckReason};

use glam::DVec2;

/// Engine configuration constants
pub mod consts {
    /// Maximum gap treated as touching
    pub const DISTANCE_TOL: f64 = 0.01;
    /// Maximum relative normal speed treated as resting
    pub const VELOCITY_TOL: f64 = 0.5;
    /// Gap that the distance correction steers contacts toward
    pub const TARGET_GAP: f64 = 0.005;
    /// Fraction of `DISTANCE_TOL` the bisection must reach
    pub const COLLISION_ACCURACY: f64 = 0.6;
    /// Approach speeds below this are considered resolved
    pub const SMALL_VELOCITY: f64 = 1e-5;
    /// Time horizon used by the extra acceleration correction
    pub const EXTRA_ACCEL_TIMESTEP: f64 = 0.025;
    /// Smallest bisection bracket before giving up on locating a collision
    pub const MIN_TIME_STEP: f64 = 1e-12;
    /// Minimum cosine between normals for two collisions to be the same one
    pub const NORMAL_SIMILARITY: f64 = 0.9;
    /// Segments used when polygonizing a full circle for mass properties
    pub const ARC_SEGMENTS: usize = 128;
    /// Below this length a vector has no usable direction
    pub const TINY_LENGTH: f64 = 1e-12;
}

/// 2D cross product (z component of a × b)
#[inline]
pub fn cross(a: DVec2, b: DVec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Rotate a vector counter-clockwise by `angle` radians
#[inline]
pub fn rotate(v: DVec2, angle: f64) -> DVec2 {
    let (sin, cos) = angle.sin_cos();
    DVec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Convert polar (r, theta) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f64, theta: f64) -> DVec2 {
    DVec2::new(r * theta.cos(), r * theta.sin())
}
