//! Force laws
//!
//! External forces applied during each ODE evaluation, before contact forces.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::body::{BodyId, RigidBody};
use crate::cross;

/// Accumulated force and torque on one body
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyForce {
    pub force: DVec2,
    pub torque: f64,
}

impl BodyForce {
    /// Add a force acting at world point `p` of `body`
    pub fn add_at(&mut self, body: &RigidBody, force: DVec2, p: DVec2) {
        self.force += force;
        self.torque += cross(p - body.pos, force);
    }
}

/// Something that pushes bodies around
pub trait ForceLaw: std::fmt::Debug {
    /// Add this law's forces into `forces` (indexed like `bodies`)
    fn apply(&self, bodies: &[RigidBody], forces: &mut [BodyForce]);

    /// Potential energy stored by this law
    fn potential_energy(&self, _bodies: &[RigidBody]) -> f64 {
        0.0
    }

    fn name(&self) -> &'static str;
}

/// Uniform gravitational field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gravity {
    pub accel: DVec2,
}

impl Gravity {
    /// Downward gravity of the given magnitude
    pub fn down(g: f64) -> Self {
        Self {
            accel: DVec2::new(0.0, -g),
        }
    }
}

impl ForceLaw for Gravity {
    fn apply(&self, bodies: &[RigidBody], forces: &mut [BodyForce]) {
        for (body, f) in bodies.iter().zip(forces.iter_mut()) {
            if body.is_movable() {
                f.force += self.accel * body.mass();
            }
        }
    }

    fn potential_energy(&self, bodies: &[RigidBody]) -> f64 {
        bodies
            .iter()
            .filter(|b| b.is_movable())
            .map(|b| -b.mass() * self.accel.dot(b.pos))
            .sum()
    }

    fn name(&self) -> &'static str {
        "gravity"
    }
}

/// Linear and angular velocity damping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Damping {
    pub linear: f64,
    pub angular: f64,
}

impl ForceLaw for Damping {
    fn apply(&self, bodies: &[RigidBody], forces: &mut [BodyForce]) {
        for (body, f) in bodies.iter().zip(forces.iter_mut()) {
            if body.is_movable() {
                f.force -= body.vel * self.linear;
                f.torque -= body.angular_vel * self.angular;
            }
        }
    }

    fn name(&self) -> &'static str {
        "damping"
    }
}

/// Hooke spring between two body points, or a body point and a world point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spring {
    pub body1: BodyId,
    pub attach1: DVec2,
    /// `None` anchors `attach2` in world coordinates
    pub body2: Option<BodyId>,
    pub attach2: DVec2,
    pub rest_length: f64,
    pub stiffness: f64,
}

impl Spring {
    fn endpoints(&self, bodies: &[RigidBody]) -> Option<(usize, Option<usize>, DVec2, DVec2)> {
        let i1 = bodies.iter().position(|b| b.id() == self.body1)?;
        let p1 = bodies[i1].world_point(self.attach1);
        match self.body2 {
            Some(id) => {
                let i2 = bodies.iter().position(|b| b.id() == id)?;
                Some((i1, Some(i2), p1, bodies[i2].world_point(self.attach2)))
            }
            None => Some((i1, None, p1, self.attach2)),
        }
    }
}

impl ForceLaw for Spring {
    fn apply(&self, bodies: &[RigidBody], forces: &mut [BodyForce]) {
        let Some((i1, i2, p1, p2)) = self.endpoints(bodies) else {
            return;
        };
        let d = p2 - p1;
        let len = d.length();
        if len < crate::consts::TINY_LENGTH {
            return;
        }
        // Pulls p1 toward p2 when stretched
        let f = d / len * (self.stiffness * (len - self.rest_length));
        forces[i1].add_at(&bodies[i1], f, p1);
        if let Some(i2) = i2 {
            forces[i2].add_at(&bodies[i2], -f, p2);
        }
    }

    fn potential_energy(&self, bodies: &[RigidBody]) -> f64 {
        match self.endpoints(bodies) {
            Some((_, _, p1, p2)) => {
                let stretch = (p2 - p1).length() - self.rest_length;
                0.5 * self.stiffness * stretch * stretch
            }
            None => 0.0,
        }
    }

    fn name(&self) -> &'static str {
        "spring"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gravity_skips_fixed_bodies() {
        let bodies = vec![
            RigidBody::ball(0.5).unwrap().with_mass(2.0).with_position(0.0, 3.0),
            RigidBody::ball(0.5).unwrap().fixed(),
        ];
        let mut forces = vec![BodyForce::default(); 2];
        let g = Gravity::down(9.8);
        g.apply(&bodies, &mut forces);
        assert!((forces[0].force.y + 19.6).abs() < 1e-12);
        assert_eq!(forces[1].force, DVec2::ZERO);
        assert!((g.potential_energy(&bodies) - 2.0 * 9.8 * 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_spring_pulls_and_twists() {
        let mut body = RigidBody::block(1.0, 1.0).unwrap();
        body.id = BodyId(1);
        let spring = Spring {
            body1: BodyId(1),
            attach1: DVec2::new(0.5, 0.0),
            body2: None,
            attach2: DVec2::new(0.5, 2.0),
            rest_length: 1.0,
            stiffness: 3.0,
        };
        let bodies = vec![body];
        let mut forces = vec![BodyForce::default()];
        spring.apply(&bodies, &mut forces);
        assert!((forces[0].force - DVec2::new(0.0, 3.0)).length() < 1e-12);
        assert!((forces[0].torque - 1.5).abs() < 1e-12);
        assert!((spring.potential_energy(&bodies) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_damping_opposes_motion() {
        let bodies = vec![
            RigidBody::ball(0.5)
                .unwrap()
                .with_velocity(2.0, 0.0)
                .with_angular_velocity(1.0),
        ];
        let mut forces = vec![BodyForce::default()];
        Damping { linear: 0.5, angular: 0.25 }.apply(&bodies, &mut forces);
        assert!((forces[0].force.x + 1.0).abs() < 1e-12);
        assert!((forces[0].torque + 0.25).abs() < 1e-12);
    }
}
