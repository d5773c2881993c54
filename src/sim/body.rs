//! Rigid body model
//!
//! A body is a convex outline of straight and circular edges, described in
//! body coordinates with the center of mass at the origin, plus the mutable
//! kinematic state the integrator and solvers work on.

use std::collections::BTreeSet;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::edge::{CircularEdge, Edge, StraightEdge, Vertex};
use crate::consts::{ARC_SEGMENTS, TINY_LENGTH};
use crate::error::SimError;
use crate::{cross, rotate};

/// Stable identifier of a body within a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyId(pub u32);

/// A rigid body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigidBody {
    pub(crate) id: BodyId,
    pub name: String,
    /// World position of the center of mass
    pub pos: DVec2,
    pub vel: DVec2,
    /// Orientation (radians, counter-clockwise)
    pub angle: f64,
    pub angular_vel: f64,
    /// Own elasticity; `None` uses the world default
    pub elasticity: Option<f64>,
    mass: f64,
    /// Moment of inertia about the center of mass
    inertia: f64,
    edges: Vec<Edge>,
    vertices: Vec<Vertex>,
    bounding_radius: f64,
    non_collide: BTreeSet<BodyId>,
}

impl RigidBody {
    /// Rectangle of the given size, centered on its center of mass
    pub fn block(width: f64, height: f64) -> Result<Self, SimError> {
        if !(width > 0.0 && height > 0.0) || !width.is_finite() || !height.is_finite() {
            return Err(SimError::invalid(format!(
                "block size must be positive, got {width} x {height}"
            )));
        }
        let (hw, hh) = (width / 2.0, height / 2.0);
        ShapeBuilder::new(DVec2::new(-hw, -hh))
            .line_to(DVec2::new(hw, -hh))
            .line_to(DVec2::new(hw, hh))
            .line_to(DVec2::new(-hw, hh))
            .line_to(DVec2::new(-hw, -hh))
            .build("block")
    }

    /// Disk of the given radius
    pub fn ball(radius: f64) -> Result<Self, SimError> {
        if !(radius > 0.0) || !radius.is_finite() {
            return Err(SimError::invalid(format!(
                "ball radius must be positive, got {radius}"
            )));
        }
        let start = DVec2::new(radius, 0.0);
        let mut body = ShapeBuilder::new(start).arc_to(start, DVec2::ZERO).build("ball")?;
        // Exact value rather than the polygonized estimate
        body.inertia = body.mass * radius * radius / 2.0;
        Ok(body)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.pos = DVec2::new(x, y);
        self
    }

    pub fn with_velocity(mut self, vx: f64, vy: f64) -> Self {
        self.vel = DVec2::new(vx, vy);
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_angular_velocity(mut self, omega: f64) -> Self {
        self.angular_vel = omega;
        self
    }

    pub fn with_elasticity(mut self, elasticity: f64) -> Self {
        self.elasticity = Some(elasticity);
        self
    }

    /// Set the mass, scaling the moment of inertia to match.
    ///
    /// An infinite mass makes the body immovable.
    pub fn with_mass(mut self, mass: f64) -> Self {
        if mass.is_infinite() {
            self.inertia = f64::INFINITY;
        } else if self.mass.is_finite() && self.mass > 0.0 {
            self.inertia *= mass / self.mass;
        }
        self.mass = mass;
        self
    }

    /// Immovable body (infinite mass)
    pub fn fixed(self) -> Self {
        self.with_mass(f64::INFINITY)
    }

    /// Reject mass, elasticity or state the solvers can't work with
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.mass > 0.0) {
            return Err(SimError::invalid(format!(
                "body '{}' mass must be positive or infinite, got {}",
                self.name, self.mass
            )));
        }
        if let Some(e) = self.elasticity
            && !(0.0..=1.0).contains(&e)
        {
            return Err(SimError::invalid(format!(
                "body '{}' elasticity must be in [0, 1], got {e}",
                self.name
            )));
        }
        let finite = self.pos.is_finite()
            && self.vel.is_finite()
            && self.angle.is_finite()
            && self.angular_vel.is_finite();
        if !finite {
            return Err(SimError::invalid(format!(
                "body '{}' has a non-finite position or velocity",
                self.name
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn id(&self) -> BodyId {
        self.id
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    #[inline]
    pub fn inertia(&self) -> f64 {
        self.inertia
    }

    #[inline]
    pub fn inv_mass(&self) -> f64 {
        if self.mass.is_finite() { 1.0 / self.mass } else { 0.0 }
    }

    #[inline]
    pub fn inv_inertia(&self) -> f64 {
        if self.inertia.is_finite() && self.inertia > 0.0 {
            1.0 / self.inertia
        } else {
            0.0
        }
    }

    /// Whether impulses and forces can move this body
    #[inline]
    pub fn is_movable(&self) -> bool {
        self.mass.is_finite()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Radius of a circle around the center of mass containing the outline
    pub fn bounding_radius(&self) -> f64 {
        self.bounding_radius
    }

    /// Effective elasticity given the world default
    pub fn elasticity_or(&self, default: f64) -> f64 {
        self.elasticity.unwrap_or(default)
    }

    pub fn non_collide(&self) -> &BTreeSet<BodyId> {
        &self.non_collide
    }

    pub fn does_not_collide(&self, other: BodyId) -> bool {
        self.non_collide.contains(&other)
    }

    pub(crate) fn add_non_collide(&mut self, other: BodyId) {
        self.non_collide.insert(other);
    }

    pub(crate) fn remove_non_collide(&mut self, other: BodyId) {
        self.non_collide.remove(&other);
    }

    /// Body coordinates to world coordinates
    #[inline]
    pub fn world_point(&self, p: DVec2) -> DVec2 {
        self.pos + rotate(p, self.angle)
    }

    /// World coordinates to body coordinates
    #[inline]
    pub fn body_point(&self, p: DVec2) -> DVec2 {
        rotate(p - self.pos, -self.angle)
    }

    #[inline]
    pub fn world_vector(&self, v: DVec2) -> DVec2 {
        rotate(v, self.angle)
    }

    #[inline]
    pub fn body_vector(&self, v: DVec2) -> DVec2 {
        rotate(v, -self.angle)
    }

    /// Velocity of the material point currently at world location `p`
    #[inline]
    pub fn velocity_at(&self, p: DVec2) -> DVec2 {
        self.vel + (p - self.pos).perp() * self.angular_vel
    }

    /// Apply an instantaneous impulse at world location `p`
    pub fn apply_impulse(&mut self, impulse: DVec2, p: DVec2) {
        if !self.is_movable() {
            return;
        }
        self.vel += impulse * self.inv_mass();
        self.angular_vel += cross(p - self.pos, impulse) * self.inv_inertia();
    }

    pub fn kinetic_energy(&self) -> f64 {
        if !self.is_movable() {
            return 0.0;
        }
        0.5 * self.mass * self.vel.length_squared()
            + 0.5 * self.inertia * self.angular_vel * self.angular_vel
    }

    pub fn momentum(&self) -> DVec2 {
        if self.is_movable() {
            self.vel * self.mass
        } else {
            DVec2::ZERO
        }
    }

    /// Point-in-body test (body coordinates), boundary counts as inside
    pub fn contains_point(&self, p: DVec2) -> bool {
        if self.vertices.len() >= 3 {
            let inside_chords = self.vertices.iter().enumerate().all(|(i, v)| {
                let next = &self.vertices[(i + 1) % self.vertices.len()];
                cross(next.point - v.point, p - v.point) >= -TINY_LENGTH
            });
            if inside_chords {
                return true;
            }
        }
        self.edges.iter().any(|edge| match edge {
            Edge::Straight(_) => false,
            Edge::Circular(arc) => {
                if (p - arc.center).length() > arc.radius {
                    return false;
                }
                if arc.is_full_circle() {
                    return true;
                }
                // Circular segment on the bulge side of the chord
                let (a, b) = (arc.start_point(), arc.end_point());
                cross(b - a, p - a) <= TINY_LENGTH
            }
        })
    }

    /// Index and distance of the edge nearest to `p` (body coordinates)
    pub fn nearest_edge(&self, p: DVec2) -> Option<(usize, f64)> {
        self.edges
            .iter()
            .enumerate()
            .map(|(i, e)| (i, (p - e.closest_point(p)).length()))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }
}

/// Builds a convex outline edge by edge, counter-clockwise
#[derive(Debug, Clone)]
pub struct ShapeBuilder {
    start: DVec2,
    cursor: DVec2,
    edges: Vec<Edge>,
}

impl ShapeBuilder {
    pub fn new(start: DVec2) -> Self {
        Self {
            start,
            cursor: start,
            edges: Vec::new(),
        }
    }

    /// Straight edge to `p`
    pub fn line_to(mut self, p: DVec2) -> Self {
        self.edges.push(Edge::Straight(StraightEdge::new(self.cursor, p)));
        self.cursor = p;
        self
    }

    /// Convex arc to `p` around `center`, counter-clockwise
    pub fn arc_to(mut self, p: DVec2, center: DVec2) -> Self {
        self.edges
            .push(Edge::Circular(CircularEdge::new(self.cursor, p, center)));
        self.cursor = p;
        self
    }

    /// Finish the outline, recentering it on its center of mass (unit mass)
    pub fn build(self, name: &str) -> Result<RigidBody, SimError> {
        if self.edges.is_empty() {
            return Err(SimError::invalid("shape has no edges"));
        }
        if (self.cursor - self.start).length() > 1e-9 {
            return Err(SimError::invalid("shape outline is not closed"));
        }
        for edge in &self.edges {
            match edge {
                Edge::Straight(s) if s.length() < TINY_LENGTH => {
                    return Err(SimError::invalid("shape has a zero-length edge"));
                }
                Edge::Circular(arc) if arc.radius < TINY_LENGTH => {
                    return Err(SimError::invalid("shape has a zero-radius arc"));
                }
                _ => {}
            }
        }

        let outline = polygonize(&self.edges);
        let (area, centroid, polar) = polygon_mass_properties(&outline);
        if !(area > TINY_LENGTH) {
            return Err(SimError::invalid(
                "shape outline must enclose positive area counter-clockwise",
            ));
        }

        let edges: Vec<Edge> = self.edges.iter().map(|e| e.translated(-centroid)).collect();
        let n = edges.len();
        let vertices = (0..n)
            .map(|i| {
                let edge_in = (i + n - 1) % n;
                let turn = edges[edge_in].end_tangent().angle_to(edges[i].start_tangent());
                Vertex {
                    point: edges[i].start_point(),
                    corner: turn.abs() > 1e-6,
                    edge_in,
                    edge_out: i,
                }
            })
            .collect();
        let bounding_radius = edges.iter().map(Edge::max_extent).fold(0.0, f64::max);

        Ok(RigidBody {
            id: BodyId(0),
            name: name.to_string(),
            pos: DVec2::ZERO,
            vel: DVec2::ZERO,
            angle: 0.0,
            angular_vel: 0.0,
            elasticity: None,
            mass: 1.0,
            inertia: polar / area,
            edges,
            vertices,
            bounding_radius,
            non_collide: BTreeSet::new(),
        })
    }
}

/// Outline as a polygon, arcs replaced by chords
fn polygonize(edges: &[Edge]) -> Vec<DVec2> {
    let mut points = Vec::new();
    for edge in edges {
        match edge {
            Edge::Straight(s) => points.push(s.start),
            Edge::Circular(arc) => {
                let segments = ((arc.sweep / std::f64::consts::TAU) * ARC_SEGMENTS as f64)
                    .ceil()
                    .max(2.0) as usize;
                let samples = arc.sample(segments + 1);
                points.extend_from_slice(&samples[..segments]);
            }
        }
    }
    points
}

/// Area, centroid and polar second moment about the centroid
fn polygon_mass_properties(points: &[DVec2]) -> (f64, DVec2, f64) {
    let mut area = 0.0;
    let mut first = DVec2::ZERO;
    let mut second = 0.0;
    for (i, &a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        let c = cross(a, b);
        area += c / 2.0;
        first += (a + b) * c / 6.0;
        second += c * (a.dot(a) + a.dot(b) + b.dot(b)) / 12.0;
    }
    if area.abs() < TINY_LENGTH {
        return (area, DVec2::ZERO, 0.0);
    }
    let centroid = first / area;
    (area, centroid, second - area * centroid.length_squared())
}

/// Four immovable walls enclosing the rectangle `[left, right] x [bottom, top]`
pub fn make_walls(
    left: f64,
    bottom: f64,
    right: f64,
    top: f64,
    thickness: f64,
) -> Result<Vec<RigidBody>, SimError> {
    let width = right - left;
    let height = top - bottom;
    if !(width > 0.0 && height > 0.0) {
        return Err(SimError::invalid(format!(
            "wall enclosure must have positive size, got {width} x {height}"
        )));
    }
    if !(thickness > 0.0) {
        return Err(SimError::invalid(format!(
            "wall thickness must be positive, got {thickness}"
        )));
    }
    let (cx, cy) = ((left + right) / 2.0, (bottom + top) / 2.0);
    let half = thickness / 2.0;
    let span_x = width + 2.0 * thickness;
    Ok(vec![
        RigidBody::block(span_x, thickness)?
            .fixed()
            .with_name("wall_bottom")
            .with_position(cx, bottom - half),
        RigidBody::block(thickness, height)?
            .fixed()
            .with_name("wall_right")
            .with_position(right + half, cy),
        RigidBody::block(span_x, thickness)?
            .fixed()
            .with_name("wall_top")
            .with_position(cx, top + half),
        RigidBody::block(thickness, height)?
            .fixed()
            .with_name("wall_left")
            .with_position(left - half, cy),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_block_mass_properties() {
        let block = RigidBody::block(2.0, 1.0).unwrap().with_mass(3.0);
        assert_eq!(block.vertices().len(), 4);
        assert!(block.vertices().iter().all(|v| v.corner));
        // m (w² + h²) / 12
        assert!((block.inertia() - 3.0 * 5.0 / 12.0).abs() < 1e-9);
        assert!((block.bounding_radius() - 1.25f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_ball_has_no_corners() {
        let ball = RigidBody::ball(0.5).unwrap().with_mass(2.0);
        assert_eq!(ball.edges().len(), 1);
        assert!(!ball.vertices()[0].corner);
        assert!((ball.inertia() - 2.0 * 0.25 / 2.0).abs() < 1e-12);
        assert!(ball.contains_point(DVec2::new(0.3, 0.3)));
        assert!(!ball.contains_point(DVec2::new(0.4, 0.4)));
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        assert!(RigidBody::block(0.0, 1.0).is_err());
        assert!(RigidBody::block(1.0, -2.0).is_err());
        assert!(RigidBody::ball(0.0).is_err());
        let open = ShapeBuilder::new(DVec2::ZERO)
            .line_to(DVec2::X)
            .line_to(DVec2::Y)
            .build("open");
        assert!(open.is_err());
    }

    #[test]
    fn test_half_disk_recentered() {
        // Flat side on the x axis, dome above
        let body = ShapeBuilder::new(DVec2::new(-1.0, 0.0))
            .line_to(DVec2::new(1.0, 0.0))
            .arc_to(DVec2::new(-1.0, 0.0), DVec2::ZERO)
            .build("half_disk")
            .unwrap();
        // Centroid of a half disk sits 4r/3π above the flat side
        let offset = 4.0 / (3.0 * PI);
        let flat = body.edges()[0].start_point();
        assert!((flat.y + offset).abs() < 1e-3);
        assert!(body.vertices().iter().all(|v| v.corner));
        assert!(body.contains_point(DVec2::new(0.0, 0.5)));
        assert!(!body.contains_point(DVec2::new(0.0, -offset - 0.1)));
    }

    #[test]
    fn test_world_body_round_trip() {
        let body = RigidBody::block(1.0, 1.0)
            .unwrap()
            .with_position(2.0, 3.0)
            .with_angle(0.7);
        let p = DVec2::new(0.3, -0.2);
        let back = body.body_point(body.world_point(p));
        assert!((back - p).length() < 1e-12);
    }

    #[test]
    fn test_apply_impulse_spins_off_center() {
        let mut body = RigidBody::block(1.0, 1.0).unwrap();
        body.apply_impulse(DVec2::new(0.0, 1.0), DVec2::new(0.5, 0.0));
        assert!((body.vel.y - 1.0).abs() < 1e-12);
        assert!((body.angular_vel - 0.5 * 6.0).abs() < 1e-9);

        let mut wall = RigidBody::block(1.0, 1.0).unwrap().fixed();
        wall.apply_impulse(DVec2::new(5.0, 0.0), DVec2::ZERO);
        assert_eq!(wall.vel, DVec2::ZERO);
    }

    #[test]
    fn test_make_walls_validation() {
        assert!(make_walls(0.0, 0.0, -1.0, 1.0, 0.5).is_err());
        assert!(make_walls(0.0, 0.0, 1.0, 1.0, 0.0).is_err());
        let walls = make_walls(-2.0, -1.0, 2.0, 1.0, 0.5).unwrap();
        assert_eq!(walls.len(), 4);
        assert!(walls.iter().all(|w| !w.is_movable()));
        // Inner face of the floor sits on y = -1
        let floor = &walls[0];
        assert!((floor.pos.y + 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_body_parameters_validated() {
        let ball = || RigidBody::ball(0.5).unwrap();
        assert!(ball().validate().is_ok());
        assert!(ball().fixed().validate().is_ok());
        assert!(ball().with_elasticity(0.0).validate().is_ok());
        for mass in [0.0, -1.0, f64::NAN, f64::NEG_INFINITY] {
            assert!(ball().with_mass(mass).validate().is_err(), "mass {mass}");
        }
        for e in [1.8, -0.1, f64::NAN] {
            assert!(ball().with_elasticity(e).validate().is_err(), "elasticity {e}");
        }
        assert!(ball().with_velocity(f64::NAN, 0.0).validate().is_err());
    }
}
