//! Collision-aware time advance
//!
//! Integrates the world over a step, rejects the step when it ends with
//! bodies overlapping, bisects back to the moment the overlap starts, applies
//! impulses there, and carries on until the requested time is reached.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use super::collision::RigidBodyCollision;
use super::events::SimEvent;
use super::impulse::CollisionTotals;
use super::ode::{DiffEqSolver, OdeSystem, RungeKutta};
use super::vars::VarsList;
use super::world::World;
use crate::consts::MIN_TIME_STEP;
use crate::error::{SimError, StuckReason};

/// Where the advancer is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AdvancePhase {
    #[default]
    Advancing,
    /// A step ended in an overlap; searching for the collision time
    CollisionDetected,
    /// Applying impulses
    Resolving,
    /// Reached the requested time (or was cancelled)
    Done,
}

/// Shared flag for stopping an advance early
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Summary of one `advance` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvanceReport {
    /// Simulation time at return
    pub time: f64,
    /// Work done during the call
    pub totals: CollisionTotals,
    /// Stopped early by the cancel token
    pub cancelled: bool,
}

/// Drives a [`World`] through time, resolving collisions on the way
pub struct CollisionAdvance {
    world: World,
    solver: Box<dyn DiffEqSolver>,
    time_step: f64,
    phase: AdvancePhase,
    totals: CollisionTotals,
    stuck_count: u32,
    cancel: CancelToken,
}

impl CollisionAdvance {
    /// Advancer using Runge-Kutta with the given nominal step
    pub fn new(world: World, time_step: f64) -> Result<Self, SimError> {
        if !(time_step > 0.0) || !time_step.is_finite() {
            return Err(SimError::invalid(format!(
                "time step must be positive, got {time_step}"
            )));
        }
        Ok(Self {
            world,
            solver: Box::new(RungeKutta),
            time_step,
            phase: AdvancePhase::Done,
            totals: CollisionTotals::default(),
            stuck_count: 0,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_solver(mut self, solver: Box<dyn DiffEqSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn into_world(self) -> World {
        self.world
    }

    pub fn phase(&self) -> AdvancePhase {
        self.phase
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Totals accumulated over every advance so far
    pub fn totals(&self) -> CollisionTotals {
        self.totals
    }

    /// Token another thread can use to stop the advance
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Advance by `time_step` nominal steps until `time` is reached
    pub fn run_until(&mut self, time: f64) -> Result<AdvanceReport, SimError> {
        let mut report = AdvanceReport {
            time: self.world.time(),
            ..Default::default()
        };
        while self.world.time() < time - MIN_TIME_STEP {
            let step = self.time_step.min(time - self.world.time());
            let r = self.advance(step)?;
            report.totals.add(&r.totals);
            report.time = r.time;
            if r.cancelled {
                report.cancelled = true;
                break;
            }
        }
        Ok(report)
    }

    /// Advance the world by `dt`, resolving every collision on the way.
    ///
    /// On cancellation the world is left at the last resolved state.
    pub fn advance(&mut self, dt: f64) -> Result<AdvanceReport, SimError> {
        let target = self.world.time() + dt;
        let mut totals = CollisionTotals::default();
        let mut cancelled = false;

        while self.world.time() < target - MIN_TIME_STEP {
            if self.cancel.is_cancelled() {
                log::info!("Advance cancelled at t={:.6}", self.world.time());
                cancelled = true;
                break;
            }
            self.phase = AdvancePhase::Advancing;
            let start = self.world.vars();
            let h = target - start.time;
            self.solver.step(&mut self.world, h)?;

            let collisions = self.world.find_collisions();
            if !collisions.iter().any(RigidBodyCollision::illegal_state) {
                totals.steps += 1;
                self.stuck_count = 0;
                self.resolve(collisions, &mut totals)?;
                continue;
            }

            self.phase = AdvancePhase::CollisionDetected;
            totals.backups += 1;
            totals.searches += 1;
            let targets: Vec<RigidBodyCollision> =
                collisions.into_iter().filter(|c| c.illegal_state()).collect();
            log::debug!(
                "Step to t={:.6} rejected with {} overlaps",
                start.time + h,
                targets.len()
            );
            let (time, targets) = self.bisect(&start, start.time + h, targets)?;

            let mut at_collision = self.world.find_collisions();
            for c in &mut at_collision {
                if targets.iter().any(|t| matches_target(c, t, self.world.config().distance_tol)) {
                    c.must_handle = true;
                }
            }
            let impulses = self.resolve(at_collision, &mut totals)?;
            if time - start.time < MIN_TIME_STEP && impulses == 0 {
                self.stuck_count += 1;
                if self.stuck_count > self.world.config().max_stuck_steps {
                    return Err(self.stuck(StuckReason::NoProgress {
                        attempts: self.stuck_count,
                    }));
                }
            } else {
                if time > start.time {
                    totals.steps += 1;
                }
                self.stuck_count = 0;
            }
        }

        self.phase = AdvancePhase::Done;
        self.totals.add(&totals);
        Ok(AdvanceReport {
            time: self.world.time(),
            totals,
            cancelled,
        })
    }

    /// Binary search between `start` and `t_hi` for the latest legal state.
    ///
    /// Leaves the world at that state and returns its time together with
    /// the overlaps seen at the earliest illegal time.
    fn bisect(
        &mut self,
        start: &VarsList,
        t_hi: f64,
        mut targets: Vec<RigidBodyCollision>,
    ) -> Result<(f64, Vec<RigidBodyCollision>), SimError> {
        let config = self.world.config().clone();
        let close_enough = config.distance_tol * config.collision_accuracy;
        let mut lo = start.clone();
        let mut hi = t_hi;

        for _ in 0..config.max_bisections {
            if hi - lo.time < MIN_TIME_STEP {
                break;
            }
            let mid = (lo.time + hi) / 2.0;
            self.world.set_vars(&lo);
            self.solver.step(&mut self.world, mid - lo.time)?;
            let found = self.world.find_collisions();
            if found.iter().any(RigidBodyCollision::illegal_state) {
                hi = mid;
                targets = found.into_iter().filter(|c| c.illegal_state()).collect();
                continue;
            }
            lo = self.world.vars();
            let located = found.iter().any(|c| {
                !c.is_joint()
                    && c.distance <= close_enough
                    && targets
                        .iter()
                        .any(|t| matches_target(c, t, config.distance_tol))
            });
            if located {
                break;
            }
        }
        self.world.set_vars(&lo);
        log::debug!("Collision located at t={:.9}", lo.time);
        Ok((lo.time, targets))
    }

    /// Impulse-resolve whatever needs it; returns the impulse count
    fn resolve(
        &mut self,
        mut collisions: Vec<RigidBodyCollision>,
        totals: &mut CollisionTotals,
    ) -> Result<usize, SimError> {
        let config = self.world.config();
        let needing = collisions.iter().filter(|c| c.needs_impulse(config)).count();
        if needing == 0 {
            return Ok(0);
        }
        self.phase = AdvancePhase::Resolving;
        totals.collisions += needing;
        match self.world.handle_collisions(&mut collisions) {
            Ok(outcome) => {
                totals.passes += outcome.passes;
                totals.impulses += outcome.impulses;
                Ok(outcome.impulses)
            }
            Err(e) => {
                if e.is_stuck() {
                    let time = self.world.time();
                    self.world.notify(&SimEvent::Stuck { time });
                }
                Err(e)
            }
        }
    }

    fn stuck(&mut self, reason: StuckReason) -> SimError {
        let time = self.world.time();
        log::warn!("Simulation stuck at t={time:.6}: {reason}");
        self.world.notify(&SimEvent::Stuck { time });
        SimError::StuckSimulation { time, reason }
    }
}

/// Same feature pair, or close enough to be the same collision
fn matches_target(c: &RigidBodyCollision, target: &RigidBodyCollision, distance_tol: f64) -> bool {
    (c.kind == target.kind && c.primary == target.primary && c.normal_body == target.normal_body)
        || c.similar_to(target, distance_tol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollisionHandling, ExtraAccel, SimConfig};
    use crate::sim::body::RigidBody;

    fn ball_toward_wall(handling: CollisionHandling) -> CollisionAdvance {
        let config = SimConfig {
            collision_handling: handling,
            extra_accel: ExtraAccel::Velocity,
            ..Default::default()
        };
        let mut world = World::new(config).unwrap();
        world.add_body(RigidBody::ball(0.5).unwrap().with_velocity(2.0, 0.0)).unwrap();
        let wall = RigidBody::block(1.0, 4.0).unwrap().fixed().with_position(1.57, 0.0);
        world.add_body(wall).unwrap();
        CollisionAdvance::new(world, 0.025).unwrap()
    }

    #[test]
    fn test_ball_bounces_off_wall() {
        let mut sim = ball_toward_wall(CollisionHandling::SerialGroupedLastpass);
        // Gap of 0.57 closes between t = 0.275 and t = 0.3
        let report = sim.run_until(0.5).unwrap();
        assert!((report.time - 0.5).abs() < 1e-9);
        assert_eq!(report.totals.collisions, 1);
        assert!(report.totals.backups >= 1);
        let ball = &sim.world().bodies()[0];
        assert!((ball.vel.x + 2.0).abs() < 1e-9);
        assert!(ball.pos.x < 0.55);
        assert_eq!(sim.phase(), AdvancePhase::Done);
    }

    #[test]
    fn test_no_overlap_after_steps() {
        let mut sim = ball_toward_wall(CollisionHandling::Simultaneous);
        for _ in 0..16 {
            sim.advance(0.025).unwrap();
            let tol = sim.world().config().distance_tol;
            assert!(sim.world().find_collisions().iter().all(|c| c.distance >= -tol));
        }
    }

    #[test]
    fn test_cancelled_advance_stops_early() {
        let mut sim = ball_toward_wall(CollisionHandling::Simultaneous);
        sim.cancel_token().cancel();
        let report = sim.advance(0.1).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.time, 0.0);
        sim.cancel_token().reset();
        assert!(!sim.advance(0.1).unwrap().cancelled);
    }

    #[test]
    fn test_rejects_bad_time_step() {
        let world = World::new(SimConfig::default()).unwrap();
        assert!(CollisionAdvance::new(world, 0.0).is_err());
    }
}
