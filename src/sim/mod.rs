//! Deterministic simulation module
//!
//! All collision and contact logic lives here. This module must be pure and deterministic:
//! - Bodies, joints and collisions are processed in insertion order
//! - Seeded RNG owned by the world, used only for tie-breaking
//! - No rendering or platform dependencies

pub mod advance;
pub mod body;
pub mod collision;
pub mod contact;
pub mod detect;
pub mod edge;
pub mod events;
pub mod forces;
pub mod impulse;
pub mod joint;
pub mod lcp;
pub mod ode;
pub mod scenarios;
pub mod vars;
pub mod world;

pub use advance::{AdvancePhase, AdvanceReport, CancelToken, CollisionAdvance};
pub use body::{BodyId, RigidBody, ShapeBuilder, make_walls};
pub use collision::{CollisionKind, NormalFrame, RigidBodyCollision};
pub use edge::{CircularEdge, Edge, EdgePoint, Inapplicable, StraightEdge, Vertex};
pub use events::{EventLog, SimEvent, SimObserver};
pub use forces::{BodyForce, Damping, ForceLaw, Gravity, Spring};
pub use impulse::{CollisionTotals, ResolveOutcome};
pub use joint::{Joint, JointAxis, JointId, NormalType};
pub use ode::{DiffEqSolver, OdeSystem, RungeKutta};
pub use vars::{VARS_PER_BODY, VarsList, var_name};
pub use world::World;
