//! Collision records
//!
//! A collision pairs a feature of the primary body (a corner, an edge, or a
//! joint attachment) with a feature of the normal body. The normal is a unit
//! vector pointing out of the normal body toward the primary body; a negative
//! distance is penetration and a negative normal velocity is approach.
//!
//! Records carry only feature indices. Everything derived from body state
//! (points, normal, distance, velocity) is recomputed by [`RigidBodyCollision::update`],
//! which also stamps the time it was derived at.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::body::RigidBody;
use super::edge::{Edge, Inapplicable};
use super::joint::{JointAxis, JointId, NormalType, attachment_point, axis_direction};
use crate::config::SimConfig;
use crate::consts::{NORMAL_SIMILARITY, SMALL_VELOCITY, TINY_LENGTH};

/// Which pair of features collide
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CollisionKind {
    /// Corner of the primary body against an edge of the normal body
    VertexEdge { vertex: usize, edge: usize },
    /// Corner against corner
    VertexVertex { vertex1: usize, vertex2: usize },
    /// Curved edge of the primary body against any edge of the normal body
    CurvedEdge { edge1: usize, edge2: usize },
    /// Crossing straight edges with no vertex inside; only ever illegal
    StraightEdges { edge1: usize, edge2: usize },
    /// One axis of a joint
    Joint {
        joint: JointId,
        axis: JointAxis,
        attach1: DVec2,
        attach2: DVec2,
        normal_type: NormalType,
    },
}

/// How the normal moves with the bodies, needed for contact accelerations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NormalFrame {
    /// Fixed in world coordinates
    World,
    /// Fixed in the normal body.
    ///
    /// `center1` is the primary feature's curvature center (the corner itself
    /// for a vertex) and `anchor` the matching point on the normal body.
    Body { center1: DVec2, anchor: DVec2 },
    /// Along the line between the two curvature centers
    Curved { center1: DVec2, center2: DVec2 },
}

/// Derived geometry of a feature pair at one instant
#[derive(Debug, Clone, Copy)]
struct Geometry {
    impact1: DVec2,
    impact2: DVec2,
    normal: DVec2,
    distance: f64,
    frame: NormalFrame,
    radius1: f64,
    radius2: f64,
}

/// A collision or contact between two bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigidBodyCollision {
    pub kind: CollisionKind,
    /// Index of the primary body in the world body list
    pub primary: usize,
    /// Index of the normal body; `None` for joints pinned to a world point
    pub normal_body: Option<usize>,
    /// Contact point on the primary body (world)
    pub impact1: DVec2,
    /// Contact point on the normal body (world)
    pub impact2: DVec2,
    /// Unit normal, out of the normal body
    pub normal: DVec2,
    pub frame: NormalFrame,
    /// Signed gap; negative is penetration
    pub distance: f64,
    /// Relative normal velocity; negative is approach
    pub normal_velocity: f64,
    /// Curvature radius of the primary feature (infinite for corners and lines)
    pub radius1: f64,
    /// Curvature radius of the normal feature
    pub radius2: f64,
    /// Impulse applied by the last resolve
    pub impulse: f64,
    /// Contact force from the last force solve
    pub force: f64,
    /// Located by bisection; resolve even a slow approach
    pub must_handle: bool,
    /// Time of the last `update`
    pub update_time: f64,
    pub detected_time: f64,
}

impl RigidBodyCollision {
    /// Build a record and derive its geometry at `time`
    pub fn new(
        kind: CollisionKind,
        primary: usize,
        normal_body: Option<usize>,
        bodies: &[RigidBody],
        time: f64,
    ) -> Result<Self, Inapplicable> {
        let mut c = Self {
            kind,
            primary,
            normal_body,
            impact1: DVec2::ZERO,
            impact2: DVec2::ZERO,
            normal: DVec2::X,
            frame: NormalFrame::World,
            distance: 0.0,
            normal_velocity: 0.0,
            radius1: f64::INFINITY,
            radius2: f64::INFINITY,
            impulse: 0.0,
            force: 0.0,
            must_handle: false,
            update_time: time,
            detected_time: time,
        };
        c.update(bodies, time)?;
        Ok(c)
    }

    #[inline]
    pub fn is_joint(&self) -> bool {
        matches!(self.kind, CollisionKind::Joint { .. })
    }

    /// Re-derive geometry and velocity from the current body state
    pub fn update(&mut self, bodies: &[RigidBody], time: f64) -> Result<(), Inapplicable> {
        let body1 = bodies.get(self.primary).ok_or(Inapplicable)?;
        let body2 = match self.normal_body {
            Some(i) => Some(bodies.get(i).ok_or(Inapplicable)?),
            None => None,
        };
        let g = geometry(&self.kind, body1, body2)?;
        self.impact1 = g.impact1;
        self.impact2 = g.impact2;
        self.normal = g.normal;
        self.distance = g.distance;
        self.frame = g.frame;
        self.radius1 = g.radius1;
        self.radius2 = g.radius2;
        self.update_time = time;
        self.update_velocity(bodies);
        Ok(())
    }

    /// Recompute only the relative normal velocity
    pub fn update_velocity(&mut self, bodies: &[RigidBody]) {
        let v1 = bodies[self.primary].velocity_at(self.impact1);
        let v2 = self
            .normal_body
            .map(|i| bodies[i].velocity_at(self.impact2))
            .unwrap_or(DVec2::ZERO);
        self.normal_velocity = self.normal.dot(v1 - v2);
    }

    /// Penetrating; the state must not be accepted
    #[inline]
    pub fn illegal_state(&self) -> bool {
        !self.is_joint() && self.distance < 0.0
    }

    /// Resting contact handled by continuous force
    pub fn is_contact(&self, config: &SimConfig) -> bool {
        self.is_joint()
            || (self.normal_velocity.abs() <= config.velocity_tol
                && self.distance > -config.distance_tol
                && self.distance <= config.distance_tol)
    }

    /// Whether the impulse solver must act on this collision
    pub fn needs_impulse(&self, config: &SimConfig) -> bool {
        if self.is_joint() {
            let limit = if config.joint_small_impacts {
                SMALL_VELOCITY
            } else {
                config.velocity_tol
            };
            return self.normal_velocity.abs() > limit;
        }
        (self.distance <= config.distance_tol && self.normal_velocity < -config.velocity_tol)
            || (self.must_handle && self.normal_velocity < -SMALL_VELOCITY)
    }

    /// Coefficient of restitution for this collision
    pub fn elasticity(&self, bodies: &[RigidBody], config: &SimConfig) -> f64 {
        if self.is_joint() || self.normal_velocity > -config.velocity_tol {
            return 0.0;
        }
        let e1 = bodies[self.primary].elasticity_or(config.elasticity);
        match self.normal_body {
            Some(i) => e1.min(bodies[i].elasticity_or(config.elasticity)),
            None => e1,
        }
    }

    /// Whether the two records involve the same unordered body pair
    pub fn same_bodies(&self, other: &RigidBodyCollision) -> bool {
        (self.primary == other.primary && self.normal_body == other.normal_body)
            || (Some(self.primary) == other.normal_body && self.normal_body == Some(other.primary))
    }

    /// Whether the record involves body `index`
    #[inline]
    pub fn involves(&self, index: usize) -> bool {
        self.primary == index || self.normal_body == Some(index)
    }

    /// Distance within which two impacts are the same contact
    pub fn nearness(&self, distance_tol: f64) -> f64 {
        let r = self.radius1.min(self.radius2);
        if r.is_finite() {
            (2.0 * r * distance_tol).sqrt().max(distance_tol)
        } else {
            distance_tol
        }
    }

    /// Whether `other` describes the same physical collision
    pub fn similar_to(&self, other: &RigidBodyCollision, distance_tol: f64) -> bool {
        if self.is_joint() || other.is_joint() || !self.same_bodies(other) {
            return false;
        }
        let near = self.nearness(distance_tol).max(other.nearness(distance_tol));
        if (self.impact1 - other.impact1).length() > near {
            return false;
        }
        let other_normal = if self.primary == other.primary {
            other.normal
        } else {
            -other.normal
        };
        self.normal.dot(other_normal) >= NORMAL_SIMILARITY
    }
}

fn geometry(
    kind: &CollisionKind,
    body1: &RigidBody,
    body2: Option<&RigidBody>,
) -> Result<Geometry, Inapplicable> {
    match *kind {
        CollisionKind::Joint {
            axis,
            attach1,
            attach2,
            normal_type,
            ..
        } => {
            let p1 = body1.world_point(attach1);
            let p2 = attachment_point(body2, attach2);
            let normal = axis_direction(axis, normal_type, body2);
            let frame = match (normal_type, body2) {
                (NormalType::Body, Some(_)) => NormalFrame::Body {
                    center1: p1,
                    anchor: p2,
                },
                _ => NormalFrame::World,
            };
            Ok(Geometry {
                impact1: p1,
                impact2: p2,
                normal,
                distance: normal.dot(p1 - p2),
                frame,
                radius1: f64::INFINITY,
                radius2: f64::INFINITY,
            })
        }
        CollisionKind::VertexEdge { vertex, edge } => {
            let body2 = body2.ok_or(Inapplicable)?;
            let p = body1.world_point(vertex_point(body1, vertex)?);
            let edge = body2.edges().get(edge).ok_or(Inapplicable)?;
            let ep = edge.project(body2.body_point(p))?;
            let impact2 = body2.world_point(ep.point);
            let frame = match edge {
                Edge::Straight(_) => NormalFrame::Body {
                    center1: p,
                    anchor: impact2,
                },
                Edge::Circular(arc) => NormalFrame::Curved {
                    center1: p,
                    center2: body2.world_point(arc.center),
                },
            };
            Ok(Geometry {
                impact1: p,
                impact2,
                normal: body2.world_vector(ep.normal),
                distance: ep.distance,
                frame,
                radius1: f64::INFINITY,
                radius2: edge.radius(),
            })
        }
        CollisionKind::VertexVertex { vertex1, vertex2 } => {
            let body2 = body2.ok_or(Inapplicable)?;
            let p1 = body1.world_point(vertex_point(body1, vertex1)?);
            let p2 = body2.world_point(vertex_point(body2, vertex2)?);
            let d = p1 - p2;
            let len = d.length();
            if len < TINY_LENGTH {
                return Err(Inapplicable);
            }
            let inside = body2.contains_point(body2.body_point(p1));
            let (normal, distance) = if inside { (-d / len, -len) } else { (d / len, len) };
            Ok(Geometry {
                impact1: p1,
                impact2: p2,
                normal,
                distance,
                frame: if inside {
                    NormalFrame::World
                } else {
                    NormalFrame::Curved {
                        center1: p1,
                        center2: p2,
                    }
                },
                radius1: f64::INFINITY,
                radius2: f64::INFINITY,
            })
        }
        CollisionKind::CurvedEdge { edge1, edge2 } => {
            let body2 = body2.ok_or(Inapplicable)?;
            let Some(Edge::Circular(arc1)) = body1.edges().get(edge1) else {
                return Err(Inapplicable);
            };
            let c1 = body1.world_point(arc1.center);
            let r1 = arc1.radius;
            match body2.edges().get(edge2).ok_or(Inapplicable)? {
                Edge::Straight(line) => {
                    let ep = line.project(body2.body_point(c1))?;
                    let normal = body2.world_vector(ep.normal);
                    let impact1 = c1 - normal * r1;
                    arc_faces(body1, arc1, impact1)?;
                    let impact2 = body2.world_point(ep.point);
                    Ok(Geometry {
                        impact1,
                        impact2,
                        normal,
                        distance: ep.distance - r1,
                        frame: NormalFrame::Body {
                            center1: c1,
                            anchor: impact2,
                        },
                        radius1: r1,
                        radius2: f64::INFINITY,
                    })
                }
                Edge::Circular(arc2) => {
                    let c2 = body2.world_point(arc2.center);
                    let d = c1 - c2;
                    let len = d.length();
                    if len < TINY_LENGTH {
                        return Err(Inapplicable);
                    }
                    let normal = d / len;
                    let impact1 = c1 - normal * r1;
                    let impact2 = c2 + normal * arc2.radius;
                    arc_faces(body1, arc1, impact1)?;
                    arc_faces(body2, arc2, impact2)?;
                    Ok(Geometry {
                        impact1,
                        impact2,
                        normal,
                        distance: len - r1 - arc2.radius,
                        frame: NormalFrame::Curved {
                            center1: c1,
                            center2: c2,
                        },
                        radius1: r1,
                        radius2: arc2.radius,
                    })
                }
            }
        }
        CollisionKind::StraightEdges { edge1, edge2 } => {
            let body2 = body2.ok_or(Inapplicable)?;
            let (Some(Edge::Straight(e1)), Some(Edge::Straight(e2))) =
                (body1.edges().get(edge1), body2.edges().get(edge2))
            else {
                return Err(Inapplicable);
            };
            // Edge 1 in the normal body's coordinates
            let a = body2.body_point(body1.world_point(e1.start));
            let b = body2.body_point(body1.world_point(e1.end));
            let crossing = super::edge::StraightEdge::new(a, b);
            crossing.intersection(e2).ok_or(Inapplicable)?;
            let n = e2.outward_normal();
            let (da, db) = ((a - e2.start).dot(n), (b - e2.start).dot(n));
            let deep = if da <= db { a } else { b };
            let distance = da.min(db);
            Ok(Geometry {
                impact1: body2.world_point(deep),
                impact2: body2.world_point(deep - n * distance),
                normal: body2.world_vector(n),
                distance,
                frame: NormalFrame::Body {
                    center1: body2.world_point(deep),
                    anchor: body2.world_point(deep - n * distance),
                },
                radius1: f64::INFINITY,
                radius2: f64::INFINITY,
            })
        }
    }
}

fn vertex_point(body: &RigidBody, index: usize) -> Result<DVec2, Inapplicable> {
    body.vertices()
        .get(index)
        .map(|v| v.point)
        .ok_or(Inapplicable)
}

/// Fails when a world point is outside the arc's angular range
fn arc_faces(
    body: &RigidBody,
    arc: &super::edge::CircularEdge,
    world_point: DVec2,
) -> Result<(), Inapplicable> {
    let r = body.body_point(world_point) - arc.center;
    if arc.contains_angle(r.y.atan2(r.x)) {
        Ok(())
    } else {
        Err(Inapplicable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_balls(gap: f64) -> Vec<RigidBody> {
        vec![
            RigidBody::ball(0.5).unwrap().with_velocity(1.0, 0.0),
            RigidBody::ball(0.5).unwrap().with_position(1.0 + gap, 0.0),
        ]
    }

    #[test]
    fn test_ball_ball_geometry() {
        let bodies = two_balls(0.004);
        // Primary is the right ball so the normal points +x
        let c = RigidBodyCollision::new(
            CollisionKind::CurvedEdge { edge1: 0, edge2: 0 },
            1,
            Some(0),
            &bodies,
            0.0,
        )
        .unwrap();
        assert!((c.normal - DVec2::X).length() < 1e-12);
        assert!((c.distance - 0.004).abs() < 1e-12);
        assert!((c.normal_velocity + 1.0).abs() < 1e-12);
        assert!(matches!(c.frame, NormalFrame::Curved { .. }));
    }

    #[test]
    fn test_classification() {
        let config = SimConfig::default();
        let bodies = two_balls(0.004);
        let mut c = RigidBodyCollision::new(
            CollisionKind::CurvedEdge { edge1: 0, edge2: 0 },
            1,
            Some(0),
            &bodies,
            0.0,
        )
        .unwrap();
        assert!(c.needs_impulse(&config));
        assert!(!c.is_contact(&config));
        assert!(!c.illegal_state());
        assert_eq!(c.elasticity(&bodies, &config), 1.0);

        c.normal_velocity = -0.1;
        assert!(c.is_contact(&config));
        assert!(!c.needs_impulse(&config));
        assert_eq!(c.elasticity(&bodies, &config), 0.0);
        c.must_handle = true;
        assert!(c.needs_impulse(&config));

        c.distance = -0.001;
        assert!(c.illegal_state());
    }

    #[test]
    fn test_vertex_off_edge_is_inapplicable() {
        let block = RigidBody::block(1.0, 1.0).unwrap();
        let wall = RigidBody::block(1.0, 1.0).unwrap().fixed().with_position(5.0, -1.0);
        let bodies = vec![block, wall];
        let r = RigidBodyCollision::new(
            CollisionKind::VertexEdge { vertex: 0, edge: 2 },
            0,
            Some(1),
            &bodies,
            0.0,
        );
        assert!(r.is_err());
    }

    #[test]
    fn test_corner_on_wall() {
        let block = RigidBody::block(1.0, 1.0)
            .unwrap()
            .with_position(0.0, 0.503)
            .with_velocity(0.0, -3.0);
        let wall = RigidBody::block(4.0, 1.0).unwrap().fixed().with_position(0.0, -0.5);
        let bodies = vec![block, wall];
        // Vertex 0 is the lower-left corner, edge 2 the top of the wall
        let c = RigidBodyCollision::new(
            CollisionKind::VertexEdge { vertex: 0, edge: 2 },
            0,
            Some(1),
            &bodies,
            0.0,
        )
        .unwrap();
        assert!((c.normal - DVec2::Y).length() < 1e-12);
        assert!((c.distance - 0.003).abs() < 1e-12);
        assert!((c.normal_velocity + 3.0).abs() < 1e-12);
        assert!((c.impact1 - DVec2::new(-0.5, 0.003)).length() < 1e-12);
    }

    #[test]
    fn test_similar_to_ignores_orientation() {
        let bodies = two_balls(0.0);
        let a = RigidBodyCollision::new(
            CollisionKind::CurvedEdge { edge1: 0, edge2: 0 },
            1,
            Some(0),
            &bodies,
            0.0,
        )
        .unwrap();
        let b = RigidBodyCollision::new(
            CollisionKind::CurvedEdge { edge1: 0, edge2: 0 },
            0,
            Some(1),
            &bodies,
            0.0,
        )
        .unwrap();
        assert!(a.similar_to(&b, 0.01));
        // Curved contacts widen the merge radius
        assert!((a.nearness(0.01) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_joint_axis_distance() {
        let bodies = vec![RigidBody::ball(0.5).unwrap().with_position(0.3, 0.0)];
        let c = RigidBodyCollision::new(
            CollisionKind::Joint {
                joint: JointId(1),
                axis: JointAxis::Normal,
                attach1: DVec2::ZERO,
                attach2: DVec2::ZERO,
                normal_type: NormalType::World,
            },
            0,
            None,
            &bodies,
            0.0,
        )
        .unwrap();
        assert!(c.is_joint());
        assert!((c.distance - 0.3).abs() < 1e-12);
        assert!(!c.illegal_state());
        assert!(!c.similar_to(&c.clone(), 0.01));
    }

    #[test]
    fn test_joint_axis_follows_body_frame() {
        let bodies = vec![
            RigidBody::ball(0.5).unwrap().with_position(0.3, 0.0),
            RigidBody::block(1.0, 1.0)
                .unwrap()
                .with_angle(std::f64::consts::FRAC_PI_2),
        ];
        let c = RigidBodyCollision::new(
            CollisionKind::Joint {
                joint: JointId(1),
                axis: JointAxis::Tangent,
                attach1: DVec2::ZERO,
                attach2: DVec2::ZERO,
                normal_type: NormalType::Body,
            },
            0,
            Some(1),
            &bodies,
            0.0,
        )
        .unwrap();
        // The tangent axis turned a quarter turn now points along -X
        assert!((c.normal + DVec2::X).length() < 1e-12);
        assert!((c.distance + 0.3).abs() < 1e-12);
        assert!(matches!(c.frame, NormalFrame::Body { .. }));
    }
}
