//! Reference scenes
//!
//! Small worlds with known outcomes, used by the demo runner and the tests.

use std::f64::consts::TAU;

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::body::{RigidBody, make_walls};
use super::forces::Gravity;
use super::joint::Joint;
use super::world::World;
use crate::config::SimConfig;
use crate::error::SimError;
use crate::rotate;

/// Ball radius in the three-ball scene
pub const BALL_RADIUS: f64 = 0.5;

/// One ball moving at speed 3 toward two resting balls that touch
pub fn three_balls(config: SimConfig) -> Result<World, SimError> {
    let mut world = World::new(config)?;
    world.add_body(
        RigidBody::ball(BALL_RADIUS)?
            .with_name("striker")
            .with_position(0.8, 0.0)
            .with_velocity(3.0, 0.0),
    )?;
    world.add_body(RigidBody::ball(BALL_RADIUS)?.with_name("middle").with_position(2.0, 0.0))?;
    world.add_body(RigidBody::ball(BALL_RADIUS)?.with_name("end").with_position(3.005, 0.0))?;
    Ok(world)
}

/// Ball moving at speed 3 between two resting balls placed symmetrically
/// at +/-35 degrees, both within tolerance, so both impacts tie
pub fn v_strike(config: SimConfig) -> Result<World, SimError> {
    let mut world = World::new(config)?;
    world.add_body(
        RigidBody::ball(BALL_RADIUS)?
            .with_name("striker")
            .with_velocity(3.0, 0.0),
    )?;
    let spread = 35f64.to_radians();
    for (name, angle) in [("upper", spread), ("lower", -spread)] {
        let at = DVec2::from_angle(angle) * 1.004;
        world.add_body(
            RigidBody::ball(BALL_RADIUS)?
                .with_name(name)
                .with_position(at.x, at.y),
        )?;
    }
    Ok(world)
}

/// Unit block falling flat at speed 3 onto an immovable floor
pub fn block_drop(config: SimConfig) -> Result<World, SimError> {
    let mut world = World::new(config)?;
    world.add_body(
        RigidBody::block(1.0, 1.0)?
            .with_name("block")
            .with_position(0.0, 0.6)
            .with_velocity(0.0, -3.0),
    )?;
    world.add_body(
        RigidBody::block(4.0, 1.0)?
            .fixed()
            .with_name("floor")
            .with_position(0.0, -0.5),
    )?;
    Ok(world)
}

/// Rod hanging from a fixed pivot at the origin, released at `angle`
pub fn pendulum(config: SimConfig, angle: f64) -> Result<World, SimError> {
    let mut world = World::new(config)?;
    let top = DVec2::new(0.0, 0.5);
    let rod = world.add_body(
        RigidBody::block(0.1, 1.0)?
            .with_name("rod")
            .with_angle(angle)
            .with_position(0.3, -0.3),
    )?;
    world.add_joint(Joint::fixed_point(rod, top, DVec2::ZERO))?;
    world.align_connectors();
    world.add_force_law(Box::new(Gravity::down(9.8)));
    let placed = world.body(rod).map(|b| b.world_point(top));
    log::debug!("Pendulum pivot at {placed:?}, rod tilted {angle}");
    Ok(world)
}

/// `count` balls on a grid inside a 4x4 box, with seeded random velocities
pub fn balls_in_box(config: SimConfig, count: usize) -> Result<World, SimError> {
    let seed = config.random_seed;
    let mut world = World::new(config)?;
    for wall in make_walls(0.0, 0.0, 4.0, 4.0, 0.5)? {
        world.add_body(wall)?;
    }
    let mut rng = Pcg32::seed_from_u64(seed ^ 0x5eed);
    for i in 0..count.min(9) {
        let (col, row) = ((i % 3) as f64, (i / 3) as f64);
        let direction = rotate(DVec2::X, rng.random_range(0.0..TAU));
        let speed = rng.random_range(1.0..2.0);
        let velocity = direction * speed;
        world.add_body(
            RigidBody::ball(0.3)?
                .with_name(format!("ball{i}"))
                .with_position(0.8 + 1.2 * col, 0.8 + 1.2 * row)
                .with_velocity(velocity.x, velocity.y),
        )?;
    }
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_balls_layout() {
        let world = three_balls(SimConfig::default()).unwrap();
        let found = world.find_collisions();
        // Only the resting pair is within tolerance at the start
        assert_eq!(found.len(), 1);
        assert!((found[0].distance - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_v_strike_impacts_tie() {
        let world = v_strike(SimConfig::default()).unwrap();
        let found = world.find_collisions();
        assert_eq!(found.len(), 2);
        let (a, b) = (found[0].normal_velocity, found[1].normal_velocity);
        assert!(a < -2.0);
        assert!((a - b).abs() < 1e-12, "{a} vs {b}");
    }

    #[test]
    fn test_pendulum_aligned() {
        let world = pendulum(SimConfig::default(), 0.5).unwrap();
        let rod = &world.bodies()[0];
        assert!(rod.world_point(DVec2::new(0.0, 0.5)).length() < 1e-12);
        assert!((rod.angle - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_balls_in_box_seeded() {
        let config = SimConfig {
            random_seed: 9,
            ..Default::default()
        };
        let a = balls_in_box(config.clone(), 6).unwrap();
        let b = balls_in_box(config, 6).unwrap();
        assert_eq!(a.bodies().len(), 10);
        assert_eq!(a.bodies()[4].vel, b.bodies()[4].vel);
        assert!(a.find_collisions().is_empty());
    }
}
