//! Distance joint
//!
//! Keeps two anchor points a fixed distance apart. A positive frequency
//! turns the rod into a damped spring.

use std::f32::consts::TAU;

use pegbox_core::math::{Rot, Vec2, cross, cross_sv, inv_or_zero};

use super::JointSolver;
use crate::dynamics::BodyHandle;
use crate::dynamics::time_step::{SolverBody, SolverData};

/// Construction parameters for a [`DistanceJoint`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Rest length
    pub length: f32,
    /// Spring frequency in hertz; zero makes the joint rigid
    pub frequency_hz: f32,
    /// 0 is undamped, 1 is critically damped
    pub damping_ratio: f32,
    pub collide_connected: bool,
}

impl DistanceJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, local_anchor_a: Vec2, local_anchor_b: Vec2, length: f32) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            length,
            frequency_hz: 0.0,
            damping_ratio: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_spring(mut self, frequency_hz: f32, damping_ratio: f32) -> Self {
        self.frequency_hz = frequency_hz;
        self.damping_ratio = damping_ratio;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DistanceJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    length: f32,
    frequency_hz: f32,
    damping_ratio: f32,

    impulse: f32,
    gamma: f32,
    bias: f32,

    // Solver temporaries
    body_a: SolverBody,
    body_b: SolverBody,
    u: Vec2,
    r_a: Vec2,
    r_b: Vec2,
    mass: f32,
}

impl DistanceJoint {
    pub(crate) fn new(def: &DistanceJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            length: def.length,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: 0.0,
            gamma: 0.0,
            bias: 0.0,
            body_a: SolverBody::default(),
            body_b: SolverBody::default(),
            u: Vec2::ZERO,
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: 0.0,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn set_length(&mut self, length: f32) {
        self.length = length.max(0.0);
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    pub fn set_spring(&mut self, frequency_hz: f32, damping_ratio: f32) {
        self.frequency_hz = frequency_hz.max(0.0);
        self.damping_ratio = damping_ratio.max(0.0);
    }
}

impl JointSolver for DistanceJoint {
    fn init_velocity_constraints(&mut self, body_a: SolverBody, body_b: SolverBody, data: &mut SolverData<'_>) {
        self.body_a = body_a;
        self.body_b = body_b;
        let (m_a, m_b) = (body_a.inv_mass, body_b.inv_mass);
        let (i_a, i_b) = (body_a.inv_inertia, body_b.inv_inertia);

        let pos_a = data.positions[body_a.index];
        let pos_b = data.positions[body_b.index];
        let mut vel_a = data.velocities[body_a.index];
        let mut vel_b = data.velocities[body_b.index];

        let q_a = Rot::from_angle(pos_a.a);
        let q_b = Rot::from_angle(pos_b.a);

        self.r_a = q_a.apply(self.local_anchor_a - body_a.local_center);
        self.r_b = q_b.apply(self.local_anchor_b - body_b.local_center);
        self.u = pos_b.c + self.r_b - pos_a.c - self.r_a;

        // Handle singularity.
        let length = self.u.length();
        if length > data.step.settings.linear_slop {
            self.u *= 1.0 / length;
        } else {
            self.u = Vec2::ZERO;
        }

        let cr_au = cross(self.r_a, self.u);
        let cr_bu = cross(self.r_b, self.u);
        let mut inv_mass = m_a + i_a * cr_au * cr_au + m_b + i_b * cr_bu * cr_bu;
        self.mass = inv_or_zero(inv_mass);

        if self.frequency_hz > 0.0 {
            let c = length - self.length;
            let omega = TAU * self.frequency_hz;
            let d = 2.0 * self.mass * self.damping_ratio * omega;
            let k = self.mass * omega * omega;

            let h = data.step.dt;
            self.gamma = inv_or_zero(h * (d + h * k));
            self.bias = c * h * k * self.gamma;

            inv_mass += self.gamma;
            self.mass = inv_or_zero(inv_mass);
        } else {
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = self.impulse * self.u;
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * cross(self.r_a, p);
            vel_b.v += m_b * p;
            vel_b.w += i_b * cross(self.r_b, p);
        } else {
            self.impulse = 0.0;
        }

        data.velocities[body_a.index] = vel_a;
        data.velocities[body_b.index] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (a, b) = (self.body_a, self.body_b);
        let mut vel_a = data.velocities[a.index];
        let mut vel_b = data.velocities[b.index];

        let vp_a = vel_a.v + cross_sv(vel_a.w, self.r_a);
        let vp_b = vel_b.v + cross_sv(vel_b.w, self.r_b);
        let cdot = self.u.dot(vp_b - vp_a);

        let impulse = -self.mass * (cdot + self.bias + self.gamma * self.impulse);
        self.impulse += impulse;

        let p = impulse * self.u;
        vel_a.v -= a.inv_mass * p;
        vel_a.w -= a.inv_inertia * cross(self.r_a, p);
        vel_b.v += b.inv_mass * p;
        vel_b.w += b.inv_inertia * cross(self.r_b, p);

        data.velocities[a.index] = vel_a;
        data.velocities[b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        // Springs do not correct position.
        if self.frequency_hz > 0.0 {
            return true;
        }

        let (a, b) = (self.body_a, self.body_b);
        let settings = &data.step.settings;
        let mut pos_a = data.positions[a.index];
        let mut pos_b = data.positions[b.index];

        let q_a = Rot::from_angle(pos_a.a);
        let q_b = Rot::from_angle(pos_b.a);
        let r_a = q_a.apply(self.local_anchor_a - a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - b.local_center);
        let d = pos_b.c + r_b - pos_a.c - r_a;

        let length = d.length();
        let u = d.normalize_or_zero();
        let c = (length - self.length).clamp(-settings.max_linear_correction, settings.max_linear_correction);

        let impulse = -self.mass * c;
        let p = impulse * u;

        pos_a.c -= a.inv_mass * p;
        pos_a.a -= a.inv_inertia * cross(r_a, p);
        pos_b.c += b.inv_mass * p;
        pos_b.a += b.inv_inertia * cross(r_b, p);

        data.positions[a.index] = pos_a;
        data.positions[b.index] = pos_b;

        c.abs() < settings.linear_slop
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.impulse * self.u
    }

    fn reaction_torque(&self, _inv_dt: f32) -> f32 {
        0.0
    }
}
