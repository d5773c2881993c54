//! Flat state vector shared with the ODE integrator
//!
//! Each body owns six consecutive slots: x, vx, y, vy, angle, angular velocity.

use serde::{Deserialize, Serialize};

/// Slots per body
pub const VARS_PER_BODY: usize = 6;

pub const X: usize = 0;
pub const VX: usize = 1;
pub const Y: usize = 2;
pub const VY: usize = 3;
pub const ANGLE: usize = 4;
pub const OMEGA: usize = 5;

/// Snapshot of every body's kinematic state at a time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarsList {
    pub values: Vec<f64>,
    pub time: f64,
}

impl VarsList {
    pub fn new(num_bodies: usize, time: f64) -> Self {
        Self {
            values: vec![0.0; num_bodies * VARS_PER_BODY],
            time,
        }
    }

    pub fn num_bodies(&self) -> usize {
        self.values.len() / VARS_PER_BODY
    }

    #[inline]
    pub fn get(&self, body: usize, slot: usize) -> f64 {
        self.values[body * VARS_PER_BODY + slot]
    }

    #[inline]
    pub fn set(&mut self, body: usize, slot: usize, value: f64) {
        self.values[body * VARS_PER_BODY + slot] = value;
    }

    /// Whether every value is finite
    pub fn is_finite(&self) -> bool {
        self.time.is_finite() && self.values.iter().all(|v| v.is_finite())
    }
}

/// Display name of a slot, e.g. `ball_vy`
pub fn var_name(body_name: &str, slot: usize) -> String {
    let suffix = match slot % VARS_PER_BODY {
        X => "x",
        VX => "vx",
        Y => "y",
        VY => "vy",
        ANGLE => "angle",
        _ => "omega",
    };
    format!("{body_name}_{suffix}")
}
