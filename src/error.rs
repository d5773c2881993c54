//! Engine error types
//!
//! Fatal conditions are returned as `SimError` so callers can pause, report
//! and recover. Recoverable geometric misses are not errors at all; see
//! [`crate::sim::edge::Inapplicable`].

use std::fmt;

/// Why the time advancer gave up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StuckReason {
    /// Repeated bisections made no forward time progress
    NoProgress {
        /// Consecutive attempts without progress
        attempts: u32,
    },
    /// A collision resolve exceeded its pass limit
    ImpulsePassesExceeded {
        /// Passes performed before giving up
        passes: usize,
    },
}

/// Unified error type for engine operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// The simulation can't advance without looping forever
    StuckSimulation {
        /// Simulation time at which progress stopped
        time: f64,
        /// What kind of loop was detected
        reason: StuckReason,
    },
    /// A configuration or construction parameter was rejected
    InvalidConfiguration {
        /// Human-readable description of the problem
        reason: String,
    },
    /// A body id doesn't exist in the world
    UnknownBody {
        /// The id that was looked up
        id: u32,
    },
    /// A collision handed to a solver is deeper than the distance tolerance
    Penetration {
        /// Simulation time of the solve
        time: f64,
        /// Signed gap of the offending collision
        distance: f64,
    },
    /// A collision was not re-derived at the current time before reuse
    StaleCollision {
        /// Current simulation time
        time: f64,
        /// Time the collision was last updated
        updated: f64,
    },
    /// NaN or infinite values appeared in the state
    NumericalFailure {
        /// Where the bad value was produced
        context: &'static str,
    },
    /// Config file I/O or parse failure
    ConfigIo {
        /// Underlying error message
        message: String,
    },
}

impl SimError {
    /// Shorthand for an `InvalidConfiguration` error
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Whether this is the "stuck simulation" condition
    pub fn is_stuck(&self) -> bool {
        matches!(self, Self::StuckSimulation { .. })
    }
}

impl fmt::Display for StuckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProgress { attempts } => {
                write!(f, "no time progress after {attempts} attempts")
            }
            Self::ImpulsePassesExceeded { passes } => {
                write!(f, "collision resolve exceeded {passes} passes")
            }
        }
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StuckSimulation { time, reason } => {
                write!(f, "simulation stuck at t={time}: {reason}")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            Self::UnknownBody { id } => write!(f, "unknown body id {id}"),
            Self::Penetration { time, distance } => {
                write!(f, "penetration {distance} beyond tolerance at t={time}")
            }
            Self::StaleCollision { time, updated } => {
                write!(f, "collision last updated at t={updated}, used at t={time}")
            }
            Self::NumericalFailure { context } => {
                write!(f, "non-finite value produced in {context}")
            }
            Self::ConfigIo { message } => write!(f, "config I/O error: {message}"),
        }
    }
}

impl std::error::Error for SimError {}
