//! Edge and vertex geometry for body outlines
//!
//! All coordinates here are body coordinates. Outlines run counter-clockwise,
//! so the outward normal of a straight edge is to the right of its direction,
//! and convex arcs sweep counter-clockwise around their center.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::consts::TINY_LENGTH;
use crate::polar_to_cartesian;

/// A feature query fell outside the edge's domain.
///
/// Not an error: the caller drops the candidate for this detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inapplicable;

/// Closest point on an edge to a query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePoint {
    /// Point on the edge
    pub point: DVec2,
    /// Outward unit normal at that point
    pub normal: DVec2,
    /// Signed distance from the edge to the query point (negative = inside)
    pub distance: f64,
}

/// A straight edge segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StraightEdge {
    pub start: DVec2,
    pub end: DVec2,
}

impl StraightEdge {
    pub fn new(start: DVec2, end: DVec2) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn length(&self) -> f64 {
        (self.end - self.start).length()
    }

    /// Unit direction from start to end
    #[inline]
    pub fn direction(&self) -> DVec2 {
        (self.end - self.start).normalize_or_zero()
    }

    /// Outward unit normal (right of the direction for a CCW outline)
    #[inline]
    pub fn outward_normal(&self) -> DVec2 {
        let d = self.direction();
        DVec2::new(d.y, -d.x)
    }

    /// Perpendicular projection of `p` onto the segment.
    ///
    /// Fails when the foot of the perpendicular lies beyond either end.
    pub fn project(&self, p: DVec2) -> Result<EdgePoint, Inapplicable> {
        let dir = self.direction();
        let along = (p - self.start).dot(dir);
        if along < 0.0 || along > self.length() {
            return Err(Inapplicable);
        }
        let normal = self.outward_normal();
        Ok(EdgePoint {
            point: self.start + dir * along,
            normal,
            distance: (p - self.start).dot(normal),
        })
    }

    /// Closest point on the segment, clamped to the endpoints
    pub fn closest_point(&self, p: DVec2) -> DVec2 {
        let line = self.end - self.start;
        let len_sq = line.length_squared();
        if len_sq < TINY_LENGTH {
            return self.start;
        }
        let t = ((p - self.start).dot(line) / len_sq).clamp(0.0, 1.0);
        self.start + line * t
    }

    /// Intersection point of two segments, if they cross
    pub fn intersection(&self, other: &StraightEdge) -> Option<DVec2> {
        let r = self.end - self.start;
        let s = other.end - other.start;
        let denom = crate::cross(r, s);
        if denom.abs() < TINY_LENGTH {
            return None;
        }
        let qp = other.start - self.start;
        let t = crate::cross(qp, s) / denom;
        let u = crate::cross(qp, r) / denom;
        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
            Some(self.start + r * t)
        } else {
            None
        }
    }
}

/// A convex circular arc, swept counter-clockwise from `start_angle`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircularEdge {
    pub center: DVec2,
    pub radius: f64,
    /// Angle of the start point as seen from the center
    pub start_angle: f64,
    /// Counter-clockwise sweep in (0, 2π]
    pub sweep: f64,
}

impl CircularEdge {
    /// Arc from `start` to `end` around `center`; equal endpoints make a full circle
    pub fn new(start: DVec2, end: DVec2, center: DVec2) -> Self {
        let radius = (start - center).length();
        let start_angle = (start - center).y.atan2((start - center).x);
        let end_angle = (end - center).y.atan2((end - center).x);
        let mut sweep = end_angle - start_angle;
        while sweep <= 1e-9 {
            sweep += std::f64::consts::TAU;
        }
        Self {
            center,
            radius,
            start_angle,
            sweep,
        }
    }

    /// Whether the arc is a complete circle
    #[inline]
    pub fn is_full_circle(&self) -> bool {
        self.sweep >= std::f64::consts::TAU - 1e-9
    }

    /// Check if a direction angle (from the center) is within the arc's sweep
    pub fn contains_angle(&self, theta: f64) -> bool {
        if self.is_full_circle() {
            return true;
        }
        let mut offset = (theta - self.start_angle).rem_euclid(std::f64::consts::TAU);
        // Points just before the start wrap to ~2π
        if offset > std::f64::consts::TAU - 1e-12 {
            offset = 0.0;
        }
        offset <= self.sweep + 1e-12
    }

    pub fn start_point(&self) -> DVec2 {
        self.center + polar_to_cartesian(self.radius, self.start_angle)
    }

    pub fn end_point(&self) -> DVec2 {
        self.center + polar_to_cartesian(self.radius, self.start_angle + self.sweep)
    }

    /// Radial projection of `p` onto the arc.
    ///
    /// Fails when `p` is at the center or its direction is outside the sweep.
    pub fn project(&self, p: DVec2) -> Result<EdgePoint, Inapplicable> {
        let r = p - self.center;
        let len = r.length();
        if len < TINY_LENGTH {
            return Err(Inapplicable);
        }
        if !self.contains_angle(r.y.atan2(r.x)) {
            return Err(Inapplicable);
        }
        let normal = r / len;
        Ok(EdgePoint {
            point: self.center + normal * self.radius,
            normal,
            distance: len - self.radius,
        })
    }

    /// Closest point on the arc, falling back to the nearer endpoint
    pub fn closest_point(&self, p: DVec2) -> DVec2 {
        if let Ok(ep) = self.project(p) {
            return ep.point;
        }
        let (a, b) = (self.start_point(), self.end_point());
        if (p - a).length_squared() <= (p - b).length_squared() {
            a
        } else {
            b
        }
    }

    /// Sample points along the arc, both endpoints included
    pub fn sample(&self, num_points: usize) -> Vec<DVec2> {
        (0..num_points)
            .map(|i| {
                let t = i as f64 / (num_points - 1).max(1) as f64;
                self.center + polar_to_cartesian(self.radius, self.start_angle + t * self.sweep)
            })
            .collect()
    }
}

/// One edge of a body outline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Edge {
    Straight(StraightEdge),
    Circular(CircularEdge),
}

impl Edge {
    #[inline]
    pub fn is_straight(&self) -> bool {
        matches!(self, Edge::Straight(_))
    }

    /// Radius of curvature (infinite for straight edges)
    pub fn radius(&self) -> f64 {
        match self {
            Edge::Straight(_) => f64::INFINITY,
            Edge::Circular(arc) => arc.radius,
        }
    }

    pub fn start_point(&self) -> DVec2 {
        match self {
            Edge::Straight(s) => s.start,
            Edge::Circular(arc) => arc.start_point(),
        }
    }

    pub fn end_point(&self) -> DVec2 {
        match self {
            Edge::Straight(s) => s.end,
            Edge::Circular(arc) => arc.end_point(),
        }
    }

    /// Unit tangent (direction of travel) at the start point
    pub fn start_tangent(&self) -> DVec2 {
        match self {
            Edge::Straight(s) => s.direction(),
            Edge::Circular(arc) => {
                let a = arc.start_angle;
                DVec2::new(-a.sin(), a.cos())
            }
        }
    }

    /// Unit tangent (direction of travel) at the end point
    pub fn end_tangent(&self) -> DVec2 {
        match self {
            Edge::Straight(s) => s.direction(),
            Edge::Circular(arc) => {
                let a = arc.start_angle + arc.sweep;
                DVec2::new(-a.sin(), a.cos())
            }
        }
    }

    pub fn project(&self, p: DVec2) -> Result<EdgePoint, Inapplicable> {
        match self {
            Edge::Straight(s) => s.project(p),
            Edge::Circular(arc) => arc.project(p),
        }
    }

    pub fn closest_point(&self, p: DVec2) -> DVec2 {
        match self {
            Edge::Straight(s) => s.closest_point(p),
            Edge::Circular(arc) => arc.closest_point(p),
        }
    }

    /// Farthest distance of any point of the edge from the body origin
    pub fn max_extent(&self) -> f64 {
        match self {
            Edge::Straight(s) => s.start.length().max(s.end.length()),
            Edge::Circular(arc) => arc.center.length() + arc.radius,
        }
    }

    /// Copy of the edge moved by `offset`
    pub fn translated(&self, offset: DVec2) -> Edge {
        match self {
            Edge::Straight(s) => {
                Edge::Straight(StraightEdge::new(s.start + offset, s.end + offset))
            }
            Edge::Circular(arc) => Edge::Circular(CircularEdge {
                center: arc.center + offset,
                ..arc.clone()
            }),
        }
    }
}

/// A point where two edges meet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertex {
    /// Location in body coordinates
    pub point: DVec2,
    /// Sharp corner (tangent discontinuity); smooth joins never collide on their own
    pub corner: bool,
    /// Edge ending at this vertex
    pub edge_in: usize,
    /// Edge starting at this vertex
    pub edge_out: usize,
}

impl Vertex {
    /// Radius of curvature at the vertex; sharp corners are infinite
    pub fn radius(&self) -> f64 {
        f64::INFINITY
    }
}
