//! Resting contact forces
//!
//! Builds the influence matrix shared with the impulse solver and solves for
//! contact and joint forces that keep every contact from accelerating into
//! its normal body. Joint rows are bilateral.

use glam::DVec2;

use super::body::RigidBody;
use super::collision::{NormalFrame, RigidBodyCollision};
use super::forces::BodyForce;
use super::lcp::{self, LcpSolution};
use crate::config::{ExtraAccel, SimConfig};
use crate::cross;

/// Influence of a unit normal impulse at collision `k` on the relative normal
/// velocity at collision `i`, for every pair of `rows`.
///
/// The same matrix maps contact forces to relative normal accelerations.
pub fn influence_matrix(
    bodies: &[RigidBody],
    collisions: &[RigidBodyCollision],
    rows: &[usize],
) -> Vec<Vec<f64>> {
    let n = rows.len();
    let mut a = vec![vec![0.0; n]; n];
    for (i, &ci) in rows.iter().enumerate() {
        for (k, &ck) in rows.iter().enumerate() {
            a[i][k] = influence(bodies, &collisions[ci], &collisions[ck]);
        }
    }
    a
}

fn influence(bodies: &[RigidBody], ci: &RigidBodyCollision, ck: &RigidBodyCollision) -> f64 {
    let mut sum = 0.0;
    for (bi, side_i, pi) in sides(ci) {
        for (bk, side_k, pk) in sides(ck) {
            if bi != bk {
                continue;
            }
            let body = &bodies[bi];
            if !body.is_movable() {
                continue;
            }
            let ri = cross(pi - body.pos, ci.normal);
            let rk = cross(pk - body.pos, ck.normal);
            sum += side_i
                * side_k
                * (ci.normal.dot(ck.normal) * body.inv_mass() + ri * rk * body.inv_inertia());
        }
    }
    sum
}

/// Bodies of a collision with their impulse sign and application point
fn sides(c: &RigidBodyCollision) -> impl Iterator<Item = (usize, f64, DVec2)> {
    std::iter::once((c.primary, 1.0, c.impact1))
        .chain(c.normal_body.map(|nb| (nb, -1.0, c.impact2)))
}

/// Target acceleration added at a contact to bleed off drift
pub fn extra_accel(c: &RigidBodyCollision, config: &SimConfig) -> f64 {
    let mode = config.extra_accel;
    if mode == ExtraAccel::None || (c.is_joint() && !mode.applies_to_joints()) {
        return 0.0;
    }
    let h = config.extra_accel_timestep;
    if mode.corrects_distance() {
        let target = if c.is_joint() { 0.0 } else { config.target_gap };
        let x0 = c.distance - target;
        -2.0 * (x0 + c.normal_velocity * h) / (h * h)
    } else {
        -c.normal_velocity / h
    }
}

/// Acceleration of the material point at world `p` given force and torque
fn point_accel(body: &RigidBody, f: &BodyForce, p: DVec2) -> DVec2 {
    if !body.is_movable() {
        return DVec2::ZERO;
    }
    let r = p - body.pos;
    let alpha = f.torque * body.inv_inertia();
    f.force * body.inv_mass() + r.perp() * alpha - r * (body.angular_vel * body.angular_vel)
}

/// Relative normal acceleration at a contact with no contact forces acting
fn free_normal_accel(bodies: &[RigidBody], forces: &[BodyForce], c: &RigidBodyCollision) -> f64 {
    let b1 = &bodies[c.primary];
    let f1 = &forces[c.primary];
    let b2 = c.normal_body.map(|i| (&bodies[i], &forces[i]));
    let accel2 = |p: DVec2| b2.map(|(b, f)| point_accel(b, f, p)).unwrap_or(DVec2::ZERO);
    let vel2 = |p: DVec2| b2.map(|(b, _)| b.velocity_at(p)).unwrap_or(DVec2::ZERO);
    let n = c.normal;

    match c.frame {
        NormalFrame::World => n.dot(point_accel(b1, f1, c.impact1) - accel2(c.impact2)),
        NormalFrame::Body { center1, anchor } => {
            let omega = b2.map(|(b, _)| b.angular_vel).unwrap_or(0.0);
            let n_dot = n.perp() * omega;
            n.dot(point_accel(b1, f1, center1) - accel2(anchor))
                + 2.0 * n_dot.dot(b1.velocity_at(center1) - vel2(anchor))
                - omega * omega * n.dot(center1 - anchor)
        }
        NormalFrame::Curved { center1, center2 } => {
            let len = (center1 - center2).length();
            let d_dot = b1.velocity_at(center1) - vel2(center2);
            let n_dot = if len > crate::consts::TINY_LENGTH {
                (d_dot - n * n.dot(d_dot)) / len
            } else {
                DVec2::ZERO
            };
            n.dot(point_accel(b1, f1, center1) - accel2(center2)) + n_dot.dot(d_dot)
        }
    }
}

/// Solve for contact forces and add them into `forces`.
///
/// `contacts` must be current; each record's `force` is overwritten.
pub fn apply_contact_forces(
    bodies: &[RigidBody],
    contacts: &mut [RigidBodyCollision],
    forces: &mut [BodyForce],
    config: &SimConfig,
) -> LcpSolution {
    let rows: Vec<usize> = (0..contacts.len()).collect();
    let a = influence_matrix(bodies, contacts, &rows);
    let b: Vec<f64> = contacts
        .iter()
        .map(|c| free_normal_accel(bodies, forces, c) - extra_accel(c, config))
        .collect();
    let bilateral: Vec<bool> = contacts.iter().map(RigidBodyCollision::is_joint).collect();

    let solution = lcp::solve(
        &a,
        &b,
        &bilateral,
        config.lcp_max_iterations,
        config.lcp_tolerance,
    );
    if !solution.converged {
        log::warn!(
            "Contact force solve stopped after {} iterations, residual {:.3e}",
            solution.iterations,
            solution.residual
        );
    }

    for (c, &f) in contacts.iter_mut().zip(&solution.x) {
        c.force = f;
        let force = c.normal * f;
        forces[c.primary].add_at(&bodies[c.primary], force, c.impact1);
        if let Some(nb) = c.normal_body {
            forces[nb].add_at(&bodies[nb], -force, c.impact2);
        }
    }
    solution
}
