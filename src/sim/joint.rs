//! Bilateral joints
//!
//! A joint pins an attachment point of one body to an attachment point of
//! another body, or to a fixed world point when there is no second body.
//! Each joint is enforced along two perpendicular axes, each axis acting as
//! an always-active two-sided contact.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::body::{BodyId, RigidBody};
use crate::error::SimError;
use crate::rotate;

/// Stable identifier of a joint within a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JointId(pub u32);

/// Reference frame of the joint axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NormalType {
    /// Axes fixed in world coordinates
    #[default]
    World,
    /// Axes rotate with the second body
    Body,
}

impl NormalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalType::World => "world",
            NormalType::Body => "body",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "world" => Some(NormalType::World),
            "body" => Some(NormalType::Body),
            _ => None,
        }
    }
}

/// One of the two constrained directions of a joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointAxis {
    Normal,
    Tangent,
}

impl JointAxis {
    pub const BOTH: [JointAxis; 2] = [JointAxis::Normal, JointAxis::Tangent];

    /// Axis direction before any frame rotation
    fn base(&self) -> DVec2 {
        match self {
            JointAxis::Normal => DVec2::X,
            JointAxis::Tangent => DVec2::Y,
        }
    }
}

/// Bilateral constraint between two attachment points
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Joint {
    pub(crate) id: JointId,
    pub body1: BodyId,
    /// Attachment on `body1`, body coordinates
    pub attach1: DVec2,
    /// `None` pins `attach2` in world coordinates
    pub body2: Option<BodyId>,
    /// Attachment on `body2` (body coordinates), or a world point
    pub attach2: DVec2,
    pub normal_type: NormalType,
}

impl Joint {
    /// Joint between two bodies
    pub fn between(body1: BodyId, attach1: DVec2, body2: BodyId, attach2: DVec2) -> Self {
        Self {
            id: JointId(0),
            body1,
            attach1,
            body2: Some(body2),
            attach2,
            normal_type: NormalType::World,
        }
    }

    /// Joint pinning a body point to a fixed world point
    pub fn fixed_point(body1: BodyId, attach1: DVec2, world_point: DVec2) -> Self {
        Self {
            id: JointId(0),
            body1,
            attach1,
            body2: None,
            attach2: world_point,
            normal_type: NormalType::World,
        }
    }

    pub fn with_normal_type(mut self, normal_type: NormalType) -> Self {
        self.normal_type = normal_type;
        self
    }

    #[inline]
    pub fn id(&self) -> JointId {
        self.id
    }

    /// Reject joints that can never act
    pub fn validate(&self, body1: &RigidBody, body2: Option<&RigidBody>) -> Result<(), SimError> {
        if self.body2 == Some(self.body1) {
            return Err(SimError::invalid(format!(
                "joint connects body {} to itself",
                self.body1.0
            )));
        }
        let movable2 = body2.is_some_and(RigidBody::is_movable);
        if !body1.is_movable() && !movable2 {
            return Err(SimError::invalid(format!(
                "joint on body {} has no movable body",
                self.body1.0
            )));
        }
        Ok(())
    }

    /// Translation that moves the movable side so both attachments coincide.
    ///
    /// Returns `(move_body1, offset)`.
    pub fn alignment(&self, body1: &RigidBody, body2: Option<&RigidBody>) -> (bool, DVec2) {
        let p1 = body1.world_point(self.attach1);
        let p2 = attachment_point(body2, self.attach2);
        if body1.is_movable() {
            (true, p2 - p1)
        } else {
            (false, p1 - p2)
        }
    }
}

/// World location of an attachment; with no body it is already a world point
pub(crate) fn attachment_point(body: Option<&RigidBody>, attach: DVec2) -> DVec2 {
    match body {
        Some(b) => b.world_point(attach),
        None => attach,
    }
}

/// Unit axis direction in world coordinates
pub(crate) fn axis_direction(
    axis: JointAxis,
    normal_type: NormalType,
    body2: Option<&RigidBody>,
) -> DVec2 {
    match (normal_type, body2) {
        (NormalType::Body, Some(b)) => rotate(axis.base(), b.angle),
        _ => axis.base(),
    }
}
