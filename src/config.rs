//! Simulation configuration
//!
//! Tolerances and strategy selection for the collision/contact core.
//! Persisted as JSON, separately from any scene description.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::SimError;

/// How simultaneous collisions are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CollisionHandling {
    /// One impulse system over every collision at the instant
    Simultaneous,
    /// Serial focus collisions, grouped with joints and other colliding
    /// collisions on the same bodies
    Hybrid,
    /// Serial focus collisions, grouped with connected joints
    SerialGrouped,
    /// Like `SerialGrouped`, finished by an inelastic simultaneous sweep
    #[default]
    SerialGroupedLastpass,
    /// One collision per pass
    SerialSeparate,
    /// Like `SerialSeparate`, finished by an inelastic simultaneous sweep
    SerialSeparateLastpass,
}

impl CollisionHandling {
    pub const ALL: [CollisionHandling; 6] = [
        CollisionHandling::Simultaneous,
        CollisionHandling::Hybrid,
        CollisionHandling::SerialGrouped,
        CollisionHandling::SerialGroupedLastpass,
        CollisionHandling::SerialSeparate,
        CollisionHandling::SerialSeparateLastpass,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollisionHandling::Simultaneous => "simultaneous",
            CollisionHandling::Hybrid => "hybrid",
            CollisionHandling::SerialGrouped => "serial_grouped",
            CollisionHandling::SerialGroupedLastpass => "serial_grouped_lastpass",
            CollisionHandling::SerialSeparate => "serial_separate",
            CollisionHandling::SerialSeparateLastpass => "serial_separate_lastpass",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "simultaneous" => Some(CollisionHandling::Simultaneous),
            "hybrid" => Some(CollisionHandling::Hybrid),
            "serial_grouped" => Some(CollisionHandling::SerialGrouped),
            "serial_grouped_lastpass" => Some(CollisionHandling::SerialGroupedLastpass),
            "serial_separate" => Some(CollisionHandling::SerialSeparate),
            "serial_separate_lastpass" => Some(CollisionHandling::SerialSeparateLastpass),
            _ => None,
        }
    }

    /// Whether focus collisions pull in their connected joints
    pub fn is_grouped(&self) -> bool {
        matches!(
            self,
            CollisionHandling::Hybrid
                | CollisionHandling::SerialGrouped
                | CollisionHandling::SerialGroupedLastpass
        )
    }

    /// Whether a final inelastic simultaneous sweep runs
    pub fn has_last_pass(&self) -> bool {
        matches!(
            self,
            CollisionHandling::SerialGroupedLastpass | CollisionHandling::SerialSeparateLastpass
        )
    }
}

/// Stabilizing acceleration injected at contacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExtraAccel {
    /// No correction
    None,
    /// Drive contact normal velocity to zero
    Velocity,
    /// Drive velocity to zero and the gap to the target gap
    #[default]
    VelocityAndDistance,
    /// `Velocity`, also applied at joints
    VelocityJoints,
    /// `VelocityAndDistance`, also applied at joints
    VelocityAndDistanceJoints,
}

impl ExtraAccel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtraAccel::None => "none",
            ExtraAccel::Velocity => "velocity",
            ExtraAccel::VelocityAndDistance => "velocity_and_distance",
            ExtraAccel::VelocityJoints => "velocity_joints",
            ExtraAccel::VelocityAndDistanceJoints => "velocity_and_distance_joints",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "none" => Some(ExtraAccel::None),
            "velocity" => Some(ExtraAccel::Velocity),
            "velocity_and_distance" => Some(ExtraAccel::VelocityAndDistance),
            "velocity_joints" => Some(ExtraAccel::VelocityJoints),
            "velocity_and_distance_joints" => Some(ExtraAccel::VelocityAndDistanceJoints),
            _ => None,
        }
    }

    /// Whether joints receive the correction too
    pub fn applies_to_joints(&self) -> bool {
        matches!(
            self,
            ExtraAccel::VelocityJoints | ExtraAccel::VelocityAndDistanceJoints
        )
    }

    /// Whether the gap is corrected in addition to velocity
    pub fn corrects_distance(&self) -> bool {
        matches!(
            self,
            ExtraAccel::VelocityAndDistance | ExtraAccel::VelocityAndDistanceJoints
        )
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Strategy for simultaneous collisions
    pub collision_handling: CollisionHandling,
    /// Contact stabilization mode
    pub extra_accel: ExtraAccel,

    // === Classification ===
    /// Maximum gap treated as touching
    pub distance_tol: f64,
    /// Maximum relative normal speed treated as resting
    pub velocity_tol: f64,
    /// Gap the distance correction aims for (inside the tolerance band)
    pub target_gap: f64,
    /// Bisection precision, fraction of `distance_tol` in (0, 1]
    pub collision_accuracy: f64,

    // === Response ===
    /// Elasticity for bodies that don't set their own
    pub elasticity: f64,
    /// Seed for tie-breaking among equally eligible collisions
    pub random_seed: u64,
    /// Resolve sub-tolerance velocity errors at joints with impulses
    pub joint_small_impacts: bool,
    /// Time horizon of the extra acceleration correction
    pub extra_accel_timestep: f64,

    // === Limits ===
    /// Serial impulse passes before the resolve is declared stuck
    pub max_impulse_passes: usize,
    /// Bisection halvings per located collision
    pub max_bisections: u32,
    /// Consecutive no-progress attempts before the advancer gives up
    pub max_stuck_steps: u32,
    /// LCP sweeps before accepting an unconverged solution
    pub lcp_max_iterations: usize,
    /// LCP residual tolerance (scaled by the right-hand side)
    pub lcp_tolerance: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            collision_handling: CollisionHandling::default(),
            extra_accel: ExtraAccel::default(),

            distance_tol: DISTANCE_TOL,
            velocity_tol: VELOCITY_TOL,
            target_gap: TARGET_GAP,
            collision_accuracy: COLLISION_ACCURACY,

            elasticity: 1.0,
            random_seed: 0,
            joint_small_impacts: false,
            extra_accel_timestep: EXTRA_ACCEL_TIMESTEP,

            max_impulse_passes: 500,
            max_bisections: 60,
            max_stuck_steps: 20,
            lcp_max_iterations: 10_000,
            lcp_tolerance: 1e-12,
        }
    }
}

impl SimConfig {
    /// Default configuration with the given handling mode
    pub fn with_handling(handling: CollisionHandling) -> Self {
        Self {
            collision_handling: handling,
            ..Self::default()
        }
    }

    /// Reject values that would make the solvers misbehave
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.distance_tol > 0.0) || !self.distance_tol.is_finite() {
            return Err(SimError::invalid(format!(
                "distance_tol must be positive, got {}",
                self.distance_tol
            )));
        }
        if !(self.velocity_tol > 0.0) || !self.velocity_tol.is_finite() {
            return Err(SimError::invalid(format!(
                "velocity_tol must be positive, got {}",
                self.velocity_tol
            )));
        }
        if !(self.target_gap >= 0.0 && self.target_gap < self.distance_tol) {
            return Err(SimError::invalid(format!(
                "target_gap must be in [0, distance_tol), got {}",
                self.target_gap
            )));
        }
        if !(self.collision_accuracy > 0.0 && self.collision_accuracy <= 1.0) {
            return Err(SimError::invalid(format!(
                "collision_accuracy must be in (0, 1], got {}",
                self.collision_accuracy
            )));
        }
        if !(0.0..=1.0).contains(&self.elasticity) {
            return Err(SimError::invalid(format!(
                "elasticity must be in [0, 1], got {}",
                self.elasticity
            )));
        }
        if !(self.extra_accel_timestep > 0.0) {
            return Err(SimError::invalid("extra_accel_timestep must be positive"));
        }
        if !(self.lcp_tolerance > 0.0) {
            return Err(SimError::invalid("lcp_tolerance must be positive"));
        }
        if self.max_impulse_passes == 0
            || self.max_bisections == 0
            || self.max_stuck_steps == 0
            || self.lcp_max_iterations == 0
        {
            return Err(SimError::invalid("iteration limits must be > 0"));
        }
        Ok(())
    }

    /// Load a configuration from a JSON file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| SimError::ConfigIo {
            message: format!("{}: {}", path.display(), e),
        })?;
        let config: SimConfig = serde_json::from_str(&json).map_err(|e| SimError::ConfigIo {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|e| SimError::ConfigIo {
            message: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| SimError::ConfigIo {
            message: format!("{}: {}", path.display(), e),
        })?;
        log::info!("Config saved to {}", path.display());
        Ok(())
    }
}
