//! Collision impulses
//!
//! Resolves the velocity discontinuity of one or more simultaneous
//! collisions. Every strategy solves small impulse LCPs over a subset of the
//! collisions; they differ in which subsets and in what order:
//!
//! - simultaneous: one system over every collision at the instant
//! - serial separate: the most severe collision alone, repeated
//! - serial grouped: the most severe collision plus joints connected to it
//! - hybrid: grouped, plus other colliding collisions on the same bodies
//!
//! The lastpass variants finish with an inelastic simultaneous sweep.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::body::RigidBody;
use super::collision::RigidBodyCollision;
use super::contact::influence_matrix;
use super::lcp;
use crate::config::{CollisionHandling, SimConfig};
use crate::consts::SMALL_VELOCITY;
use crate::error::{SimError, StuckReason};

/// Retries of the inelastic simultaneous sweep
const SIMULTANEOUS_RETRIES: usize = 3;

/// Running counts of collision handling work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionTotals {
    /// Collisions handed to the impulse solver
    pub collisions: usize,
    /// Non-zero impulses applied
    pub impulses: usize,
    /// Impulse solver passes
    pub passes: usize,
    /// Accepted ODE steps
    pub steps: usize,
    /// Bisection searches for a collision time
    pub searches: usize,
    /// Rejected steps
    pub backups: usize,
}

impl CollisionTotals {
    pub fn add(&mut self, other: &CollisionTotals) {
        self.collisions += other.collisions;
        self.impulses += other.impulses;
        self.passes += other.passes;
        self.steps += other.steps;
        self.searches += other.searches;
        self.backups += other.backups;
    }
}

/// What one resolve did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolveOutcome {
    pub passes: usize,
    pub impulses: usize,
    /// Whether the inelastic simultaneous sweep ran
    pub last_pass: bool,
}

/// How far a collision is from being resolved; negative is unresolved
fn severity(c: &RigidBodyCollision) -> f64 {
    if c.is_joint() {
        -c.normal_velocity.abs()
    } else {
        c.normal_velocity
    }
}

fn is_eligible(c: &RigidBodyCollision) -> bool {
    severity(c) < -SMALL_VELOCITY
}

/// Apply impulses so that no collision is approaching.
///
/// Every collision must be current at `time` and none may be penetrating
/// beyond the distance tolerance.
pub fn handle_collisions<R: Rng>(
    bodies: &mut [RigidBody],
    collisions: &mut [RigidBodyCollision],
    config: &SimConfig,
    rng: &mut R,
    time: f64,
) -> Result<ResolveOutcome, SimError> {
    for c in collisions.iter() {
        if c.update_time != time {
            return Err(SimError::StaleCollision {
                time,
                updated: c.update_time,
            });
        }
        if !c.is_joint() && c.distance < -config.distance_tol {
            return Err(SimError::Penetration {
                time,
                distance: c.distance,
            });
        }
    }
    for c in collisions.iter_mut() {
        c.impulse = 0.0;
    }

    let outcome = match config.collision_handling {
        CollisionHandling::Simultaneous => resolve_simultaneous(bodies, collisions, config, time)?,
        mode => resolve_serial(bodies, collisions, config, mode, rng, time)?,
    };
    log::debug!(
        "Resolved {} collisions at t={:.6} with {}: {} passes, {} impulses",
        collisions.len(),
        time,
        config.collision_handling.as_str(),
        outcome.passes,
        outcome.impulses
    );
    Ok(outcome)
}

fn resolve_simultaneous(
    bodies: &mut [RigidBody],
    collisions: &mut [RigidBodyCollision],
    config: &SimConfig,
    time: f64,
) -> Result<ResolveOutcome, SimError> {
    let all: Vec<usize> = (0..collisions.len()).collect();
    let mut outcome = ResolveOutcome {
        passes: 1,
        impulses: solve_group(bodies, collisions, &all, config, true),
        last_pass: false,
    };
    for _ in 0..SIMULTANEOUS_RETRIES {
        if !collisions.iter().any(is_eligible) {
            return Ok(outcome);
        }
        outcome.passes += 1;
        outcome.impulses += solve_group(bodies, collisions, &all, config, false);
    }
    if collisions.iter().any(is_eligible) {
        return Err(SimError::StuckSimulation {
            time,
            reason: StuckReason::ImpulsePassesExceeded {
                passes: outcome.passes,
            },
        });
    }
    Ok(outcome)
}

fn resolve_serial<R: Rng>(
    bodies: &mut [RigidBody],
    collisions: &mut [RigidBodyCollision],
    config: &SimConfig,
    mode: CollisionHandling,
    rng: &mut R,
    time: f64,
) -> Result<ResolveOutcome, SimError> {
    let mut outcome = ResolveOutcome::default();
    while let Some(focus) = pick_focus(collisions, rng) {
        if outcome.passes >= config.max_impulse_passes {
            if mode.has_last_pass() {
                log::warn!(
                    "Serial resolve hit {} passes at t={:.6}, finishing with last pass",
                    outcome.passes,
                    time
                );
                break;
            }
            return Err(SimError::StuckSimulation {
                time,
                reason: StuckReason::ImpulsePassesExceeded {
                    passes: outcome.passes,
                },
            });
        }
        let group = build_group(bodies, collisions, focus, mode);
        outcome.passes += 1;
        outcome.impulses += solve_group(bodies, collisions, &group, config, true);
    }

    if mode.has_last_pass() && collisions.iter().any(is_eligible) {
        let all: Vec<usize> = (0..collisions.len()).collect();
        outcome.passes += 1;
        outcome.impulses += solve_group(bodies, collisions, &all, config, false);
        outcome.last_pass = true;
    }
    Ok(outcome)
}

/// Most severe unresolved collision; near-ties are broken at random
fn pick_focus<R: Rng>(collisions: &[RigidBodyCollision], rng: &mut R) -> Option<usize> {
    let worst = collisions
        .iter()
        .filter(|c| is_eligible(c))
        .map(severity)
        .fold(f64::INFINITY, f64::min);
    if !worst.is_finite() {
        return None;
    }
    let candidates: Vec<usize> = collisions
        .iter()
        .enumerate()
        .filter(|(_, c)| is_eligible(c) && severity(c) <= worst + SMALL_VELOCITY)
        .map(|(i, _)| i)
        .collect();
    match candidates.len() {
        0 => None,
        1 => Some(candidates[0]),
        n => Some(candidates[rng.random_range(0..n)]),
    }
}

/// Collisions solved together with the focus
fn build_group(
    bodies: &[RigidBody],
    collisions: &[RigidBodyCollision],
    focus: usize,
    mode: CollisionHandling,
) -> Vec<usize> {
    let mut group = vec![focus];
    if !mode.is_grouped() {
        return group;
    }
    let hybrid = mode == CollisionHandling::Hybrid;
    let shares_movable = |a: &RigidBodyCollision, b: &RigidBodyCollision| {
        [Some(a.primary), a.normal_body]
            .into_iter()
            .flatten()
            .any(|i| bodies[i].is_movable() && b.involves(i))
    };
    // Grow to a fixed point so chains of joints come along
    loop {
        let before = group.len();
        for (i, c) in collisions.iter().enumerate() {
            if group.contains(&i) {
                continue;
            }
            let joins = c.is_joint() || (hybrid && is_eligible(c));
            if joins && group.iter().any(|&g| shares_movable(&collisions[g], c)) {
                group.push(i);
            }
        }
        if group.len() == before {
            return group;
        }
    }
}

/// Solve and apply impulses for one group; returns the non-zero impulse count
fn solve_group(
    bodies: &mut [RigidBody],
    collisions: &mut [RigidBodyCollision],
    rows: &[usize],
    config: &SimConfig,
    elastic: bool,
) -> usize {
    let a = influence_matrix(bodies, collisions, rows);
    let b: Vec<f64> = rows
        .iter()
        .map(|&i| {
            let c = &collisions[i];
            let v = c.normal_velocity;
            if c.is_joint() || v >= 0.0 {
                v
            } else {
                let e = if elastic {
                    c.elasticity(bodies, config)
                } else {
                    0.0
                };
                (1.0 + e) * v
            }
        })
        .collect();
    let bilateral: Vec<bool> = rows.iter().map(|&i| collisions[i].is_joint()).collect();
    let solution = lcp::solve(
        &a,
        &b,
        &bilateral,
        config.lcp_max_iterations,
        config.lcp_tolerance,
    );
    if !solution.converged {
        log::warn!(
            "Impulse solve stopped after {} iterations, residual {:.3e}",
            solution.iterations,
            solution.residual
        );
    }

    let mut applied = 0;
    for (&i, &j) in rows.iter().zip(&solution.x) {
        if j == 0.0 {
            continue;
        }
        applied += 1;
        let c = &mut collisions[i];
        c.impulse += j;
        let impulse = c.normal * j;
        bodies[c.primary].apply_impulse(impulse, c.impact1);
        if let Some(nb) = c.normal_body {
            bodies[nb].apply_impulse(-impulse, c.impact2);
        }
    }
    for c in collisions.iter_mut() {
        c.update_velocity(bodies);
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::collision::CollisionKind;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn block_on_wall() -> (Vec<RigidBody>, Vec<RigidBodyCollision>) {
        let bodies = vec![
            RigidBody::block(1.0, 1.0)
                .unwrap()
                .with_position(0.0, 0.5)
                .with_velocity(0.0, -3.0),
            RigidBody::block(4.0, 1.0).unwrap().fixed().with_position(0.0, -0.5),
        ];
        let collisions = (0..2)
            .map(|v| {
                RigidBodyCollision::new(
                    CollisionKind::VertexEdge { vertex: v, edge: 2 },
                    0,
                    Some(1),
                    &bodies,
                    0.0,
                )
                .unwrap()
            })
            .collect();
        (bodies, collisions)
    }

    fn three_balls() -> (Vec<RigidBody>, Vec<RigidBodyCollision>) {
        let bodies = vec![
            RigidBody::ball(0.5).unwrap().with_velocity(3.0, 0.0),
            RigidBody::ball(0.5).unwrap().with_position(1.0, 0.0),
            RigidBody::ball(0.5).unwrap().with_position(2.0, 0.0),
        ];
        let collisions = [(0, 1), (1, 2)]
            .into_iter()
            .map(|(p, n)| {
                RigidBodyCollision::new(
                    CollisionKind::CurvedEdge { edge1: 0, edge2: 0 },
                    p,
                    Some(n),
                    &bodies,
                    0.0,
                )
                .unwrap()
            })
            .collect();
        (bodies, collisions)
    }

    fn resolve(
        mode: CollisionHandling,
        bodies: &mut [RigidBody],
        collisions: &mut [RigidBodyCollision],
    ) -> ResolveOutcome {
        let config = SimConfig::with_handling(mode);
        let mut rng = Pcg32::seed_from_u64(7);
        handle_collisions(bodies, collisions, &config, &mut rng, 0.0).unwrap()
    }

    #[test]
    fn test_block_simultaneous_reflects() {
        for mode in [CollisionHandling::Simultaneous, CollisionHandling::Hybrid] {
            let (mut bodies, mut collisions) = block_on_wall();
            resolve(mode, &mut bodies, &mut collisions);
            assert!((bodies[0].vel.y - 3.0).abs() < 1e-9, "{}", mode.as_str());
            assert!(bodies[0].angular_vel.abs() < 1e-9, "{}", mode.as_str());
        }
    }

    #[test]
    fn test_block_serial_spins() {
        let (mut bodies, mut collisions) = block_on_wall();
        let outcome = resolve(
            CollisionHandling::SerialGroupedLastpass,
            &mut bodies,
            &mut collisions,
        );
        assert_eq!(outcome.passes, 2);
        assert!(!outcome.last_pass);
        assert!((bodies[0].vel.y - 2.76).abs() < 1e-9);
        assert!((bodies[0].angular_vel.abs() - 2.88).abs() < 1e-9);
        // Elastic corner impacts keep kinetic energy
        assert!((bodies[0].kinetic_energy() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_three_balls_simultaneous() {
        let (mut bodies, mut collisions) = three_balls();
        resolve(CollisionHandling::Simultaneous, &mut bodies, &mut collisions);
        let vx: Vec<f64> = bodies.iter().map(|b| b.vel.x).collect();
        assert!((vx[0] + 1.0).abs() < 1e-9);
        assert!((vx[1] - 2.0).abs() < 1e-9);
        assert!((vx[2] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_three_balls_serial_and_hybrid() {
        for mode in [
            CollisionHandling::Hybrid,
            CollisionHandling::SerialGrouped,
            CollisionHandling::SerialGroupedLastpass,
            CollisionHandling::SerialSeparate,
            CollisionHandling::SerialSeparateLastpass,
        ] {
            let (mut bodies, mut collisions) = three_balls();
            resolve(mode, &mut bodies, &mut collisions);
            let vx: Vec<f64> = bodies.iter().map(|b| b.vel.x).collect();
            assert!(vx[0].abs() < 1e-9, "{}", mode.as_str());
            assert!(vx[1].abs() < 1e-9, "{}", mode.as_str());
            assert!((vx[2] - 3.0).abs() < 1e-9, "{}", mode.as_str());
        }
    }

    #[test]
    fn test_pass_limit_is_stuck() {
        let (mut bodies, mut collisions) = three_balls();
        let config = SimConfig {
            max_impulse_passes: 1,
            ..SimConfig::with_handling(CollisionHandling::SerialGrouped)
        };
        let mut rng = Pcg32::seed_from_u64(0);
        let err = handle_collisions(&mut bodies, &mut collisions, &config, &mut rng, 0.0)
            .unwrap_err();
        assert!(err.is_stuck());
    }

    #[test]
    fn test_pass_limit_falls_back_to_last_pass() {
        let (mut bodies, mut collisions) = three_balls();
        let config = SimConfig {
            max_impulse_passes: 1,
            ..SimConfig::with_handling(CollisionHandling::SerialGroupedLastpass)
        };
        let mut rng = Pcg32::seed_from_u64(0);
        let outcome =
            handle_collisions(&mut bodies, &mut collisions, &config, &mut rng, 0.0).unwrap();
        assert!(outcome.last_pass);
        assert!(collisions.iter().all(|c| c.normal_velocity > -1e-9));
    }

    #[test]
    fn test_stale_and_penetrating_rejected() {
        let (mut bodies, mut collisions) = three_balls();
        let config = SimConfig::default();
        let mut rng = Pcg32::seed_from_u64(0);
        let err = handle_collisions(&mut bodies, &mut collisions, &config, &mut rng, 1.0)
            .unwrap_err();
        assert!(matches!(err, SimError::StaleCollision { .. }));

        collisions[0].distance = -0.5;
        let err = handle_collisions(&mut bodies, &mut collisions, &config, &mut rng, 0.0)
            .unwrap_err();
        assert!(matches!(err, SimError::Penetration { .. }));
    }

    #[test]
    fn test_totals_add() {
        let mut totals = CollisionTotals::default();
        totals.add(&CollisionTotals {
            collisions: 2,
            impulses: 3,
            ..Default::default()
        });
        totals.add(&CollisionTotals {
            collisions: 1,
            ..Default::default()
        });
        assert_eq!(totals.collisions, 3);
        assert_eq!(totals.impulses, 3);
    }
}
