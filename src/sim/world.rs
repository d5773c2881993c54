//! The body set and everything acting on it
//!
//! `World` owns the bodies, joints, force laws, tie-breaking RNG and
//! observers, and is the ODE system the advancer integrates. Evaluating the
//! derivative finds the current contacts and solves their forces.

use glam::DVec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::body::{BodyId, RigidBody};
use super::collision::RigidBodyCollision;
use super::contact;
use super::detect;
use super::events::{SimEvent, SimObserver};
use super::forces::{BodyForce, ForceLaw};
use super::impulse::{self, ResolveOutcome};
use super::joint::{Joint, JointId};
use super::ode::OdeSystem;
use super::vars::{self, VARS_PER_BODY, VarsList};
use crate::config::{CollisionHandling, ExtraAccel, SimConfig};
use crate::error::SimError;

/// A deterministic 2D rigid-body world
pub struct World {
    bodies: Vec<RigidBody>,
    joints: Vec<Joint>,
    force_laws: Vec<Box<dyn ForceLaw>>,
    config: SimConfig,
    rng: Pcg32,
    time: f64,
    next_body_id: u32,
    next_joint_id: u32,
    /// Contacts found by the last derivative evaluation
    contacts: Vec<RigidBodyCollision>,
    observers: Vec<Box<dyn SimObserver>>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("time", &self.time)
            .field("bodies", &self.bodies.len())
            .field("joints", &self.joints.len())
            .field("force_laws", &self.force_laws)
            .field("config", &self.config)
            .finish()
    }
}

impl World {
    /// Empty world; the configuration is validated first
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        log::info!(
            "World created: {} handling, {} extra accel, seed {}",
            config.collision_handling.as_str(),
            config.extra_accel.as_str(),
            config.random_seed
        );
        Ok(Self {
            bodies: Vec::new(),
            joints: Vec::new(),
            force_laws: Vec::new(),
            rng: Pcg32::seed_from_u64(config.random_seed),
            config,
            time: 0.0,
            next_body_id: 1,
            next_joint_id: 1,
            contacts: Vec::new(),
            observers: Vec::new(),
        })
    }

    // === Bodies ===

    /// Add a body after checking its parameters, returning its id
    pub fn add_body(&mut self, mut body: RigidBody) -> Result<BodyId, SimError> {
        body.validate()?;
        let id = BodyId(self.next_body_id);
        self.next_body_id += 1;
        body.id = id;
        log::info!("Added body {} '{}' (mass {})", id.0, body.name, body.mass());
        let event = SimEvent::BodyAdded {
            id,
            name: body.name.clone(),
        };
        self.bodies.push(body);
        self.notify(&event);
        Ok(id)
    }

    /// Remove a body along with its joints and non-collide entries
    pub fn remove_body(&mut self, id: BodyId) -> Result<RigidBody, SimError> {
        let index = self.body_index(id)?;
        let body = self.bodies.remove(index);
        self.joints.retain(|j| j.body1 != id && j.body2 != Some(id));
        for other in &mut self.bodies {
            other.remove_non_collide(id);
        }
        self.contacts.clear();
        log::info!("Removed body {} '{}'", id.0, body.name);
        self.notify(&SimEvent::BodyRemoved { id });
        Ok(body)
    }

    pub fn bodies(&self) -> &[RigidBody] {
        &self.bodies
    }

    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.iter().find(|b| b.id() == id)
    }

    /// Mutable access for setting up state between steps
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.iter_mut().find(|b| b.id() == id)
    }

    pub fn body_index(&self, id: BodyId) -> Result<usize, SimError> {
        self.bodies
            .iter()
            .position(|b| b.id() == id)
            .ok_or(SimError::UnknownBody { id: id.0 })
    }

    /// Stop two bodies from colliding with each other
    pub fn add_non_collide(&mut self, a: BodyId, b: BodyId) -> Result<(), SimError> {
        let (ia, ib) = (self.body_index(a)?, self.body_index(b)?);
        self.bodies[ia].add_non_collide(b);
        self.bodies[ib].add_non_collide(a);
        Ok(())
    }

    pub fn remove_non_collide(&mut self, a: BodyId, b: BodyId) -> Result<(), SimError> {
        let (ia, ib) = (self.body_index(a)?, self.body_index(b)?);
        self.bodies[ia].remove_non_collide(b);
        self.bodies[ib].remove_non_collide(a);
        Ok(())
    }

    // === Joints and forces ===

    /// Add a joint after checking it can act
    pub fn add_joint(&mut self, mut joint: Joint) -> Result<JointId, SimError> {
        let unknown =
            |id: BodyId| SimError::invalid(format!("joint refers to unknown body {}", id.0));
        let i1 = self.body_index(joint.body1).map_err(|_| unknown(joint.body1))?;
        let i2 = match joint.body2 {
            Some(id) => Some(self.body_index(id).map_err(|_| unknown(id))?),
            None => None,
        };
        joint.validate(&self.bodies[i1], i2.map(|i| &self.bodies[i]))?;
        let id = JointId(self.next_joint_id);
        self.next_joint_id += 1;
        joint.id = id;
        log::info!(
            "Added joint {} on body {} ({} normal)",
            id.0,
            joint.body1.0,
            joint.normal_type.as_str()
        );
        self.joints.push(joint);
        Ok(id)
    }

    pub fn remove_joint(&mut self, id: JointId) -> Option<Joint> {
        let index = self.joints.iter().position(|j| j.id() == id)?;
        Some(self.joints.remove(index))
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn add_force_law(&mut self, law: Box<dyn ForceLaw>) {
        log::info!("Added force law {}", law.name());
        self.force_laws.push(law);
    }

    /// Move bodies so every joint's attachment points coincide
    pub fn align_connectors(&mut self) {
        for k in 0..self.joints.len() {
            let joint = &self.joints[k];
            let (Some(i1), i2) = (
                self.bodies.iter().position(|b| b.id() == joint.body1),
                joint
                    .body2
                    .and_then(|id| self.bodies.iter().position(|b| b.id() == id)),
            ) else {
                continue;
            };
            let (move1, offset) = joint.alignment(&self.bodies[i1], i2.map(|i| &self.bodies[i]));
            match (move1, i2) {
                (true, _) => self.bodies[i1].pos += offset,
                (false, Some(i2)) => self.bodies[i2].pos += offset,
                (false, None) => {}
            }
        }
        self.contacts.clear();
    }

    pub fn add_observer(&mut self, observer: Box<dyn SimObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn notify(&mut self, event: &SimEvent) {
        for observer in &mut self.observers {
            observer.notify(event);
        }
    }

    // === Configuration ===

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Replace the configuration; the RNG is reseeded if the seed changed
    pub fn set_config(&mut self, config: SimConfig) -> Result<(), SimError> {
        config.validate()?;
        if config.random_seed != self.config.random_seed {
            self.rng = Pcg32::seed_from_u64(config.random_seed);
        }
        self.config = config;
        Ok(())
    }

    fn update_config(&mut self, f: impl FnOnce(&mut SimConfig)) -> Result<(), SimError> {
        let mut config = self.config.clone();
        f(&mut config);
        self.set_config(config)
    }

    pub fn set_collision_handling(&mut self, mode: CollisionHandling) -> Result<(), SimError> {
        self.update_config(|c| c.collision_handling = mode)
    }

    pub fn set_extra_accel(&mut self, mode: ExtraAccel) -> Result<(), SimError> {
        self.update_config(|c| c.extra_accel = mode)
    }

    pub fn set_distance_tol(&mut self, tol: f64) -> Result<(), SimError> {
        self.update_config(|c| c.distance_tol = tol)
    }

    pub fn set_velocity_tol(&mut self, tol: f64) -> Result<(), SimError> {
        self.update_config(|c| c.velocity_tol = tol)
    }

    pub fn set_collision_accuracy(&mut self, accuracy: f64) -> Result<(), SimError> {
        self.update_config(|c| c.collision_accuracy = accuracy)
    }

    pub fn set_elasticity(&mut self, elasticity: f64) -> Result<(), SimError> {
        self.update_config(|c| c.elasticity = elasticity)
    }

    /// Restart the tie-breaking sequence from `seed`
    pub fn set_random_seed(&mut self, seed: u64) {
        self.config.random_seed = seed;
        self.rng = Pcg32::seed_from_u64(seed);
    }

    // === Queries ===

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Every collision and contact at the current state
    pub fn find_collisions(&self) -> Vec<RigidBodyCollision> {
        detect::find_collisions(
            &self.bodies,
            &self.joints,
            self.config.distance_tol,
            self.time,
        )
    }

    /// Contacts used by the most recent force evaluation
    pub fn contacts(&self) -> &[RigidBodyCollision] {
        &self.contacts
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(RigidBody::kinetic_energy).sum()
    }

    pub fn potential_energy(&self) -> f64 {
        self.force_laws
            .iter()
            .map(|law| law.potential_energy(&self.bodies))
            .sum()
    }

    pub fn momentum(&self) -> DVec2 {
        self.bodies.iter().map(RigidBody::momentum).sum()
    }

    // === Collision response ===

    /// Apply impulses to the given collisions with the configured strategy
    pub fn handle_collisions(
        &mut self,
        collisions: &mut [RigidBodyCollision],
    ) -> Result<ResolveOutcome, SimError> {
        let outcome = impulse::handle_collisions(
            &mut self.bodies,
            collisions,
            &self.config,
            &mut self.rng,
            self.time,
        )?;
        if !self.observers.is_empty() {
            let events: Vec<SimEvent> = collisions
                .iter()
                .filter(|c| c.impulse != 0.0)
                .map(|c| SimEvent::Collision {
                    time: self.time,
                    primary: self.bodies[c.primary].id(),
                    normal_body: c.normal_body.map(|i| self.bodies[i].id()),
                    impulse: c.impulse,
                    point: c.impact1,
                })
                .collect();
            for event in &events {
                self.notify(event);
            }
            self.notify(&SimEvent::CollisionsResolved {
                time: self.time,
                count: events.len(),
                passes: outcome.passes,
            });
        }
        Ok(outcome)
    }

    fn load_vars(&mut self, vars: &VarsList) {
        for (i, body) in self.bodies.iter_mut().enumerate() {
            body.pos = DVec2::new(vars.get(i, vars::X), vars.get(i, vars::Y));
            body.vel = DVec2::new(vars.get(i, vars::VX), vars.get(i, vars::VY));
            body.angle = vars.get(i, vars::ANGLE);
            body.angular_vel = vars.get(i, vars::OMEGA);
        }
        self.time = vars.time;
    }
}

impl OdeSystem for World {
    fn vars(&self) -> VarsList {
        let mut vars = VarsList::new(self.bodies.len(), self.time);
        for (i, body) in self.bodies.iter().enumerate() {
            vars.set(i, vars::X, body.pos.x);
            vars.set(i, vars::VX, body.vel.x);
            vars.set(i, vars::Y, body.pos.y);
            vars.set(i, vars::VY, body.vel.y);
            vars.set(i, vars::ANGLE, body.angle);
            vars.set(i, vars::OMEGA, body.angular_vel);
        }
        vars
    }

    fn set_vars(&mut self, vars: &VarsList) {
        self.load_vars(vars);
    }

    fn evaluate(&mut self, vars: &VarsList, change: &mut [f64]) -> Result<(), SimError> {
        if !vars.is_finite() {
            return Err(SimError::NumericalFailure { context: "evaluate" });
        }
        self.load_vars(vars);

        let mut forces = vec![BodyForce::default(); self.bodies.len()];
        for law in &self.force_laws {
            law.apply(&self.bodies, &mut forces);
        }
        let mut contacts: Vec<RigidBodyCollision> = self
            .find_collisions()
            .into_iter()
            .filter(|c| c.is_contact(&self.config))
            .collect();
        if !contacts.is_empty() {
            contact::apply_contact_forces(&self.bodies, &mut contacts, &mut forces, &self.config);
        }
        self.contacts = contacts;

        for (i, (body, f)) in self.bodies.iter().zip(&forces).enumerate() {
            let slot = &mut change[i * VARS_PER_BODY..(i + 1) * VARS_PER_BODY];
            slot[vars::X] = body.vel.x;
            slot[vars::Y] = body.vel.y;
            slot[vars::ANGLE] = body.angular_vel;
            let accel = f.force * body.inv_mass();
            slot[vars::VX] = accel.x;
            slot[vars::VY] = accel.y;
            slot[vars::OMEGA] = f.torque * body.inv_inertia();
        }
        if change.iter().any(|v| !v.is_finite()) {
            return Err(SimError::NumericalFailure { context: "evaluate" });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::events::EventLog;
    use crate::sim::forces::Gravity;
    use crate::sim::joint::NormalType;

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimConfig {
            velocity_tol: -1.0,
            ..Default::default()
        };
        assert!(World::new(config).is_err());
    }

    #[test]
    fn test_add_and_remove_body_events() {
        let mut world = World::new(SimConfig::default()).unwrap();
        let log = EventLog::new();
        world.add_observer(Box::new(log.clone()));
        let a = world.add_body(RigidBody::ball(0.5).unwrap().with_name("a")).unwrap();
        let b = world.add_body(RigidBody::ball(0.5).unwrap().with_position(3.0, 0.0)).unwrap();
        world.add_joint(Joint::between(a, DVec2::ZERO, b, DVec2::ZERO)).unwrap();
        world.remove_body(a).unwrap();
        assert!(world.joints().is_empty());
        assert_eq!(world.bodies().len(), 1);
        assert!(matches!(world.remove_body(a), Err(SimError::UnknownBody { .. })));
        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], SimEvent::BodyRemoved { id: a });
    }

    #[test]
    fn test_bad_body_rejected_on_add() {
        let mut world = World::new(SimConfig::default()).unwrap();
        let log = EventLog::new();
        world.add_observer(Box::new(log.clone()));
        let bouncy = RigidBody::ball(0.5).unwrap().with_elasticity(1.8);
        let weightless = RigidBody::ball(0.5).unwrap().with_mass(0.0);
        for body in [bouncy, weightless] {
            assert!(matches!(
                world.add_body(body),
                Err(SimError::InvalidConfiguration { .. })
            ));
        }
        assert!(world.bodies().is_empty());
        assert!(log.is_empty());
    }

    #[test]
    fn test_joint_validation() {
        let mut world = World::new(SimConfig::default()).unwrap();
        let wall = world.add_body(RigidBody::block(1.0, 1.0).unwrap().fixed()).unwrap();
        let floor = world.add_body(RigidBody::block(1.0, 1.0).unwrap().fixed()).unwrap();
        let err = world
            .add_joint(Joint::between(wall, DVec2::ZERO, floor, DVec2::ZERO))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfiguration { .. }));
        let err = world
            .add_joint(Joint::fixed_point(BodyId(99), DVec2::ZERO, DVec2::ZERO))
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_align_connectors() {
        let mut world = World::new(SimConfig::default()).unwrap();
        let ball = world.add_body(RigidBody::ball(0.5).unwrap().with_position(0.3, -2.1)).unwrap();
        world
            .add_joint(
                Joint::fixed_point(ball, DVec2::new(0.0, 0.5), DVec2::new(0.0, 0.0))
                    .with_normal_type(NormalType::World),
            )
            .unwrap();
        world.align_connectors();
        let pos = world.body(ball).unwrap().pos;
        assert!((pos - DVec2::new(0.0, -0.5)).length() < 1e-12);
        assert!(world.find_collisions().iter().all(|c| c.distance.abs() < 1e-12));
    }

    #[test]
    fn test_vars_round_trip() {
        let mut world = World::new(SimConfig::default()).unwrap();
        let body = RigidBody::block(1.0, 2.0)
            .unwrap()
            .with_position(1.0, 2.0)
            .with_velocity(3.0, 4.0)
            .with_angle(0.5)
            .with_angular_velocity(-1.0);
        world.add_body(body).unwrap();
        let vars = world.vars();
        assert_eq!(vars.values, vec![1.0, 3.0, 2.0, 4.0, 0.5, -1.0]);
        let mut moved = vars.clone();
        moved.set(0, vars::X, 7.0);
        moved.time = 2.5;
        world.set_vars(&moved);
        assert_eq!(world.bodies()[0].pos.x, 7.0);
        assert_eq!(world.time(), 2.5);
    }

    #[test]
    fn test_evaluate_with_resting_contact() {
        let config = SimConfig {
            extra_accel: ExtraAccel::None,
            ..Default::default()
        };
        let mut world = World::new(config).unwrap();
        let block = RigidBody::block(1.0, 1.0).unwrap().with_position(0.0, 0.5);
        let floor = RigidBody::block(4.0, 1.0).unwrap().fixed().with_position(0.0, -0.5);
        world.add_body(block).unwrap();
        world.add_body(floor).unwrap();
        world.add_force_law(Box::new(Gravity::down(10.0)));
        let vars = world.vars();
        let mut change = vec![0.0; vars.values.len()];
        world.evaluate(&vars, &mut change).unwrap();
        assert_eq!(world.contacts().len(), 2);
        assert!(change[vars::VY].abs() < 1e-6);
        assert!(change[vars::OMEGA].abs() < 1e-6);
    }

    #[test]
    fn test_energy_and_momentum() {
        let mut world = World::new(SimConfig::default()).unwrap();
        let heavy = RigidBody::ball(0.5).unwrap().with_mass(2.0).with_velocity(1.0, 0.0);
        let anchored = RigidBody::ball(0.5).unwrap().fixed().with_velocity(5.0, 0.0);
        world.add_body(heavy).unwrap();
        world.add_body(anchored).unwrap();
        world.add_force_law(Box::new(Gravity::down(10.0)));
        assert!((world.kinetic_energy() - 1.0).abs() < 1e-12);
        assert_eq!(world.momentum(), DVec2::new(2.0, 0.0));
        assert_eq!(world.potential_energy(), 0.0);
    }
}
