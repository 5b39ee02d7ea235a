//! Joints constrain the relative motion of two bodies
//!
//! Each joint kind implements the same three solver passes as contacts:
//! velocity setup with warm starting, velocity iterations and position
//! correction.

mod distance;
mod revolute;
mod weld;

pub use distance::{DistanceJoint, DistanceJointDef};
pub use revolute::{RevoluteJoint, RevoluteJointDef};
pub use weld::{WeldJoint, WeldJointDef};

use pegbox_core::math::Vec2;

use super::BodyHandle;
use super::time_step::{SolverBody, SolverData};
use crate::error::{PhysicsError, PhysicsResult};

/// Solver passes shared by every joint kind
pub(crate) trait JointSolver {
    fn init_velocity_constraints(&mut self, body_a: SolverBody, body_b: SolverBody, data: &mut SolverData<'_>);

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>);

    /// Returns true when the position error is within tolerance
    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool;

    fn reaction_force(&self, inv_dt: f32) -> Vec2;

    fn reaction_torque(&self, inv_dt: f32) -> f32;
}

/// Construction parameters for any joint
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointDef {
    Distance(DistanceJointDef),
    Revolute(RevoluteJointDef),
    Weld(WeldJointDef),
}

impl JointDef {
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        match self {
            JointDef::Distance(def) => (def.body_a, def.body_b),
            JointDef::Revolute(def) => (def.body_a, def.body_b),
            JointDef::Weld(def) => (def.body_a, def.body_b),
        }
    }

    pub fn collide_connected(&self) -> bool {
        match self {
            JointDef::Distance(def) => def.collide_connected,
            JointDef::Revolute(def) => def.collide_connected,
            JointDef::Weld(def) => def.collide_connected,
        }
    }

    pub(crate) fn validate(&self) -> PhysicsResult<()> {
        match self {
            JointDef::Distance(def) => {
                if !def.length.is_finite() || def.length < 0.0 {
                    return Err(PhysicsError::InvalidJoint("distance length must be finite and non-negative"));
                }
                validate_spring(def.frequency_hz, def.damping_ratio)
            }
            JointDef::Revolute(def) => {
                if def.enable_limit && def.lower_angle > def.upper_angle {
                    return Err(PhysicsError::InvalidJoint("revolute lower limit exceeds upper limit"));
                }
                if !def.max_motor_torque.is_finite() || def.max_motor_torque < 0.0 {
                    return Err(PhysicsError::InvalidJoint("motor torque must be finite and non-negative"));
                }
                Ok(())
            }
            JointDef::Weld(def) => validate_spring(def.frequency_hz, def.damping_ratio),
        }
    }
}

fn validate_spring(frequency_hz: f32, damping_ratio: f32) -> PhysicsResult<()> {
    if !frequency_hz.is_finite() || frequency_hz < 0.0 {
        return Err(PhysicsError::InvalidJoint("frequency must be finite and non-negative"));
    }
    if !damping_ratio.is_finite() || damping_ratio < 0.0 {
        return Err(PhysicsError::InvalidJoint("damping ratio must be finite and non-negative"));
    }
    Ok(())
}

impl From<DistanceJointDef> for JointDef {
    fn from(def: DistanceJointDef) -> Self {
        JointDef::Distance(def)
    }
}

impl From<RevoluteJointDef> for JointDef {
    fn from(def: RevoluteJointDef) -> Self {
        JointDef::Revolute(def)
    }
}

impl From<WeldJointDef> for JointDef {
    fn from(def: WeldJointDef) -> Self {
        JointDef::Weld(def)
    }
}

/// Joint-specific state
#[derive(Debug, Clone)]
pub enum JointKind {
    Distance(DistanceJoint),
    Revolute(RevoluteJoint),
    Weld(WeldJoint),
}

/// A joint between two bodies
#[derive(Debug, Clone)]
pub struct Joint {
    pub(crate) body_a: BodyHandle,
    pub(crate) body_b: BodyHandle,
    pub(crate) collide_connected: bool,
    pub(crate) island_flag: bool,
    pub(crate) user_data: u64,
    pub(crate) kind: JointKind,
}

impl Joint {
    pub(crate) fn new(def: &JointDef) -> Self {
        let (body_a, body_b) = def.bodies();
        let kind = match def {
            JointDef::Distance(def) => JointKind::Distance(DistanceJoint::new(def)),
            JointDef::Revolute(def) => JointKind::Revolute(RevoluteJoint::new(def)),
            JointDef::Weld(def) => JointKind::Weld(WeldJoint::new(def)),
        };
        Self {
            body_a,
            body_b,
            collide_connected: def.collide_connected(),
            island_flag: false,
            user_data: 0,
            kind,
        }
    }

    pub fn body_a(&self) -> BodyHandle {
        self.body_a
    }

    pub fn body_b(&self) -> BodyHandle {
        self.body_b
    }

    pub fn collide_connected(&self) -> bool {
        self.collide_connected
    }

    pub fn user_data(&self) -> u64 {
        self.user_data
    }

    pub fn set_user_data(&mut self, user_data: u64) {
        self.user_data = user_data;
    }

    pub fn kind(&self) -> &JointKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut JointKind {
        &mut self.kind
    }

    /// Reaction force on body B at the anchor, in newtons
    pub fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        self.solver().reaction_force(inv_dt)
    }

    /// Reaction torque on body B, in newton-metres
    pub fn reaction_torque(&self, inv_dt: f32) -> f32 {
        self.solver().reaction_torque(inv_dt)
    }

    fn solver(&self) -> &dyn JointSolver {
        match &self.kind {
            JointKind::Distance(joint) => joint,
            JointKind::Revolute(joint) => joint,
            JointKind::Weld(joint) => joint,
        }
    }

    pub(crate) fn solver_mut(&mut self) -> &mut dyn JointSolver {
        match &mut self.kind {
            JointKind::Distance(joint) => joint,
            JointKind::Revolute(joint) => joint,
            JointKind::Weld(joint) => joint,
        }
    }
}
