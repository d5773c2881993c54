//! Collision detection
//!
//! Scans every body pair for touching or penetrating feature pairs, adds the
//! two axes of each joint, and merges candidates that describe the same
//! physical collision. Output order depends only on body and joint order.

use super::body::RigidBody;
use super::collision::{CollisionKind, RigidBodyCollision};
use super::joint::{Joint, JointAxis};

/// All collision and contact candidates at the current body state
pub fn find_collisions(
    bodies: &[RigidBody],
    joints: &[Joint],
    distance_tol: f64,
    time: f64,
) -> Vec<RigidBodyCollision> {
    let mut candidates = Vec::new();
    for i in 0..bodies.len() {
        for j in (i + 1)..bodies.len() {
            if !may_collide(&bodies[i], &bodies[j], distance_tol) {
                continue;
            }
            let inside_ij = vertices_against(bodies, i, j, distance_tol, time, &mut candidates);
            let inside_ji = vertices_against(bodies, j, i, distance_tol, time, &mut candidates);
            curved_edges_against(bodies, i, j, distance_tol, time, &mut candidates);
            curved_edges_against(bodies, j, i, distance_tol, time, &mut candidates);
            if !inside_ij && !inside_ji {
                crossing_edges(bodies, i, j, time, &mut candidates);
            }
        }
    }
    for joint in joints {
        add_joint(bodies, joint, time, &mut candidates);
    }
    merge(candidates, distance_tol)
}

fn may_collide(a: &RigidBody, b: &RigidBody, distance_tol: f64) -> bool {
    if !a.is_movable() && !b.is_movable() {
        return false;
    }
    if a.does_not_collide(b.id()) || b.does_not_collide(a.id()) {
        return false;
    }
    (a.pos - b.pos).length() <= a.bounding_radius() + b.bounding_radius() + distance_tol
}

/// Corners of body `pi` against the nearest edge of body `ni`.
///
/// Returns whether any corner was inside the other body.
fn vertices_against(
    bodies: &[RigidBody],
    pi: usize,
    ni: usize,
    distance_tol: f64,
    time: f64,
    out: &mut Vec<RigidBodyCollision>,
) -> bool {
    let (primary, normal) = (&bodies[pi], &bodies[ni]);
    let mut any_inside = false;
    for (vi, vertex) in primary.vertices().iter().enumerate() {
        if !vertex.corner {
            continue;
        }
        let q = normal.body_point(primary.world_point(vertex.point));
        let Some((edge, dist)) = normal.nearest_edge(q) else {
            continue;
        };
        let inside = normal.contains_point(q);
        let signed = if inside { -dist } else { dist };
        if signed > distance_tol {
            continue;
        }
        any_inside |= inside && signed < 0.0;

        let kind = CollisionKind::VertexEdge { vertex: vi, edge };
        match RigidBodyCollision::new(kind, pi, Some(ni), bodies, time) {
            Ok(c) if c.distance <= distance_tol => out.push(c),
            Ok(_) => {}
            Err(_) if !inside => {
                // Nearest point is an end of the edge; corner against corner
                let e = &normal.edges()[edge];
                let count = normal.vertices().len();
                let vertex2 = if (q - e.start_point()).length_squared()
                    <= (q - e.end_point()).length_squared()
                {
                    edge
                } else {
                    (edge + 1) % count
                };
                if !normal.vertices().get(vertex2).is_some_and(|v| v.corner) {
                    continue;
                }
                let kind = CollisionKind::VertexVertex {
                    vertex1: vi,
                    vertex2,
                };
                if let Ok(c) = RigidBodyCollision::new(kind, pi, Some(ni), bodies, time)
                    && c.distance <= distance_tol
                {
                    out.push(c);
                }
            }
            Err(_) => {}
        }
    }
    any_inside
}

/// Curved edges of body `pi` against every edge of body `ni`
fn curved_edges_against(
    bodies: &[RigidBody],
    pi: usize,
    ni: usize,
    distance_tol: f64,
    time: f64,
    out: &mut Vec<RigidBodyCollision>,
) {
    let (primary, normal) = (&bodies[pi], &bodies[ni]);
    for (e1, edge1) in primary.edges().iter().enumerate() {
        let super::edge::Edge::Circular(arc) = edge1 else {
            continue;
        };
        let center = normal.body_point(primary.world_point(arc.center));
        for (e2, edge2) in normal.edges().iter().enumerate() {
            // Curved pairs are found once, from the lower index
            if !edge2.is_straight() && pi > ni {
                continue;
            }
            let kind = CollisionKind::CurvedEdge { edge1: e1, edge2: e2 };
            let Ok(c) = RigidBodyCollision::new(kind, pi, Some(ni), bodies, time) else {
                continue;
            };
            if c.distance > distance_tol {
                continue;
            }
            if edge2.is_straight() && c.distance + c.radius1 < 0.0 {
                // Arc center behind this edge: only the nearest edge applies
                let nearest = normal.nearest_edge(center).map(|(k, _)| k);
                if !normal.contains_point(center) || nearest != Some(e2) {
                    continue;
                }
            }
            out.push(c);
        }
    }
}

/// Straight edges crossing with no corner inside, e.g. two thin bars in a cross
fn crossing_edges(
    bodies: &[RigidBody],
    pi: usize,
    ni: usize,
    time: f64,
    out: &mut Vec<RigidBodyCollision>,
) {
    let (primary, normal) = (&bodies[pi], &bodies[ni]);
    for (e1, edge1) in primary.edges().iter().enumerate() {
        if !edge1.is_straight() {
            continue;
        }
        for (e2, edge2) in normal.edges().iter().enumerate() {
            if !edge2.is_straight() {
                continue;
            }
            let kind = CollisionKind::StraightEdges { edge1: e1, edge2: e2 };
            if let Ok(c) = RigidBodyCollision::new(kind, pi, Some(ni), bodies, time)
                && c.distance < 0.0
            {
                out.push(c);
                return;
            }
        }
    }
}

fn add_joint(bodies: &[RigidBody], joint: &Joint, time: f64, out: &mut Vec<RigidBodyCollision>) {
    let Some(i1) = bodies.iter().position(|b| b.id() == joint.body1) else {
        return;
    };
    let i2 = match joint.body2 {
        Some(id) => match bodies.iter().position(|b| b.id() == id) {
            Some(i) => Some(i),
            None => return,
        },
        None => None,
    };
    for axis in JointAxis::BOTH {
        let kind = CollisionKind::Joint {
            joint: joint.id(),
            axis,
            attach1: joint.attach1,
            attach2: joint.attach2,
            normal_type: joint.normal_type,
        };
        if let Ok(c) = RigidBodyCollision::new(kind, i1, i2, bodies, time) {
            out.push(c);
        }
    }
}

/// Collapse candidates describing the same collision, keeping the deepest
fn merge(candidates: Vec<RigidBodyCollision>, distance_tol: f64) -> Vec<RigidBodyCollision> {
    let mut merged: Vec<RigidBodyCollision> = Vec::with_capacity(candidates.len());
    for c in candidates {
        match merged.iter().position(|m| m.similar_to(&c, distance_tol)) {
            Some(k) => {
                if c.distance < merged[k].distance {
                    merged[k] = c;
                }
            }
            None => merged.push(c),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::body::BodyId;
    use glam::DVec2;

    fn with_ids(mut bodies: Vec<RigidBody>) -> Vec<RigidBody> {
        for (i, b) in bodies.iter_mut().enumerate() {
            b.id = BodyId(i as u32 + 1);
        }
        bodies
    }

    #[test]
    fn test_block_on_wall_two_corners() {
        let bodies = with_ids(vec![
            RigidBody::block(1.0, 1.0).unwrap().with_position(0.0, 0.505),
            RigidBody::block(4.0, 1.0).unwrap().fixed().with_position(0.0, -0.5),
        ]);
        let found = find_collisions(&bodies, &[], 0.01, 0.0);
        assert_eq!(found.len(), 2);
        for c in &found {
            assert!(matches!(c.kind, CollisionKind::VertexEdge { .. }));
            assert_eq!(c.primary, 0);
            assert!((c.distance - 0.005).abs() < 1e-12);
            assert!((c.normal - DVec2::Y).length() < 1e-12);
        }
    }

    #[test]
    fn test_far_bodies_have_no_candidates() {
        let bodies = with_ids(vec![
            RigidBody::ball(0.5).unwrap(),
            RigidBody::ball(0.5).unwrap().with_position(1.02, 0.0),
        ]);
        assert!(find_collisions(&bodies, &[], 0.01, 0.0).is_empty());
    }

    #[test]
    fn test_ball_pair_found_once() {
        let bodies = with_ids(vec![
            RigidBody::ball(0.5).unwrap(),
            RigidBody::ball(0.5).unwrap().with_position(1.005, 0.0),
        ]);
        let found = find_collisions(&bodies, &[], 0.01, 0.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].primary, 0);
        assert!((found[0].normal + DVec2::X).length() < 1e-12);
    }

    #[test]
    fn test_ball_meets_arc_and_straight_edge() {
        let bodies = with_ids(vec![
            RigidBody::ball(0.5).unwrap().with_position(0.0, 0.505),
            RigidBody::ball(0.5).unwrap().with_position(1.005, 0.505),
            RigidBody::block(4.0, 1.0).unwrap().fixed().with_position(0.0, -0.5),
        ]);
        let found = find_collisions(&bodies, &[], 0.01, 0.0);
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|c| (c.distance - 0.005).abs() < 1e-9));

        let pair = &found[0];
        assert_eq!((pair.primary, pair.normal_body), (0, Some(1)));
        assert_eq!(pair.kind, CollisionKind::CurvedEdge { edge1: 0, edge2: 0 });

        // Both balls rest on the top edge of the floor
        for (c, ball) in found[1..].iter().zip([0, 1]) {
            assert_eq!((c.primary, c.normal_body), (ball, Some(2)));
            assert_eq!(c.kind, CollisionKind::CurvedEdge { edge1: 0, edge2: 2 });
            assert!((c.normal - DVec2::Y).length() < 1e-12);
        }
    }

    #[test]
    fn test_non_collide_pair_skipped() {
        let mut bodies = with_ids(vec![
            RigidBody::ball(0.5).unwrap(),
            RigidBody::ball(0.5).unwrap().with_position(0.9, 0.0),
        ]);
        bodies[0].add_non_collide(BodyId(2));
        assert!(find_collisions(&bodies, &[], 0.01, 0.0).is_empty());
    }

    #[test]
    fn test_penetration_reported_negative() {
        let bodies = with_ids(vec![
            RigidBody::ball(0.5).unwrap(),
            RigidBody::block(4.0, 1.0).unwrap().fixed().with_position(0.0, -0.95),
        ]);
        let found = find_collisions(&bodies, &[], 0.01, 0.0);
        assert_eq!(found.len(), 1);
        assert!((found[0].distance + 0.05).abs() < 1e-9);
        assert!(found[0].illegal_state());
    }

    #[test]
    fn test_crossed_bars() {
        let bodies = with_ids(vec![
            RigidBody::block(4.0, 0.2).unwrap(),
            RigidBody::block(0.2, 4.0).unwrap(),
        ]);
        let found = find_collisions(&bodies, &[], 0.01, 0.0);
        assert!(!found.is_empty());
        assert!(found.iter().any(|c| c.illegal_state()));
    }

    #[test]
    fn test_joint_adds_two_axes() {
        let bodies = with_ids(vec![RigidBody::ball(0.5).unwrap()]);
        let joint = Joint::fixed_point(BodyId(1), DVec2::new(0.0, 0.5), DVec2::new(0.0, 0.5));
        let found = find_collisions(&bodies, &[joint], 0.01, 0.0);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.is_joint() && c.distance.abs() < 1e-12));
    }
}
