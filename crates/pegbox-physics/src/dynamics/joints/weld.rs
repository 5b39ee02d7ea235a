//! Weld joint
//!
//! Glues two bodies together. The angular part can be softened into a
//! spring; the point constraint is always rigid.

use std::f32::consts::TAU;

use pegbox_core::math::{
    Mat2, Mat3, Rot, Vec2, Vec3, cross, cross_sv, inv_or_zero, inverse22, solve33, solve33_as_22, sym_inverse33,
};

use super::JointSolver;
use crate::dynamics::BodyHandle;
use crate::dynamics::time_step::{SolverBody, SolverData};

/// Construction parameters for a [`WeldJoint`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeldJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Angle of B minus angle of A in the welded pose
    pub reference_angle: f32,
    /// Angular spring frequency in hertz; zero makes the weld rigid
    pub frequency_hz: f32,
    pub damping_ratio: f32,
    pub collide_connected: bool,
}

impl WeldJointDef {
    pub fn new(
        body_a: BodyHandle,
        body_b: BodyHandle,
        local_anchor_a: Vec2,
        local_anchor_b: Vec2,
        reference_angle: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            reference_angle,
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
pub struct WeldJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    reference_angle: f32,
    frequency_hz: f32,
    damping_ratio: f32,

    impulse: Vec3,
    gamma: f32,
    bias: f32,

    // Solver temporaries
    body_a: SolverBody,
    body_b: SolverBody,
    r_a: Vec2,
    r_b: Vec2,
    mass: Mat3,
}

/// Effective mass of the point and angle constraints
fn effective_mass(a: &SolverBody, b: &SolverBody, r_a: Vec2, r_b: Vec2) -> Mat3 {
    let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);
    let ex = Vec3::new(
        m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b,
        -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b,
        -r_a.y * i_a - r_b.y * i_b,
    );
    let ey = Vec3::new(ex.y, m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b, r_a.x * i_a + r_b.x * i_b);
    let ez = Vec3::new(ex.z, ey.z, i_a + i_b);
    Mat3::from_cols(ex, ey, ez)
}

/// Inverse of the upper-left 2x2 block embedded in a 3x3 matrix
fn inverse22_of(k: Mat3) -> Mat3 {
    let m = inverse22(Mat2::from_cols(k.x_axis.truncate(), k.y_axis.truncate()));
    Mat3::from_cols(m.x_axis.extend(0.0), m.y_axis.extend(0.0), Vec3::ZERO)
}

/// Upper-left 2x2 block of `m` applied to `v`
fn mul22(m: Mat3, v: Vec2) -> Vec2 {
    Vec2::new(m.x_axis.x * v.x + m.y_axis.x * v.y, m.x_axis.y * v.x + m.y_axis.y * v.y)
}

impl WeldJoint {
    pub(crate) fn new(def: &WeldJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            frequency_hz: def.frequency_hz,
            damping_ratio: def.damping_ratio,
            impulse: Vec3::ZERO,
            gamma: 0.0,
            bias: 0.0,
            body_a: SolverBody::default(),
            body_b: SolverBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            mass: Mat3::ZERO,
        }
    }

    pub fn local_anchor_a(&self) -> Vec2 {
        self.local_anchor_a
    }

    pub fn local_anchor_b(&self) -> Vec2 {
        self.local_anchor_b
    }

    pub fn reference_angle(&self) -> f32 {
        self.reference_angle
    }

    pub fn set_spring(&mut self, frequency_hz: f32, damping_ratio: f32) {
        self.frequency_hz = frequency_hz.max(0.0);
        self.damping_ratio = damping_ratio.max(0.0);
    }
}

impl JointSolver for WeldJoint {
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

        let k = effective_mass(&body_a, &body_b, self.r_a, self.r_b);

        if self.frequency_hz > 0.0 {
            self.mass = inverse22_of(k);

            let mut inv_m = i_a + i_b;
            let m = inv_or_zero(inv_m);

            let c = pos_b.a - pos_a.a - self.reference_angle;
            let omega = TAU * self.frequency_hz;
            let d = 2.0 * m * self.damping_ratio * omega;
            let spring = m * omega * omega;

            let h = data.step.dt;
            self.gamma = inv_or_zero(h * (d + h * spring));
            self.bias = c * h * spring * self.gamma;

            inv_m += self.gamma;
            self.mass.z_axis.z = inv_or_zero(inv_m);
        } else if k.z_axis.z == 0.0 {
            self.mass = inverse22_of(k);
            self.gamma = 0.0;
            self.bias = 0.0;
        } else {
            self.mass = sym_inverse33(k);
            self.gamma = 0.0;
            self.bias = 0.0;
        }

        if data.step.warm_starting {
            self.impulse *= data.step.dt_ratio;

            let p = self.impulse.truncate();
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * (cross(self.r_a, p) + self.impulse.z);
            vel_b.v += m_b * p;
            vel_b.w += i_b * (cross(self.r_b, p) + self.impulse.z);
        } else {
            self.impulse = Vec3::ZERO;
        }

        data.velocities[body_a.index] = vel_a;
        data.velocities[body_b.index] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (a, b) = (self.body_a, self.body_b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);
        let mut vel_a = data.velocities[a.index];
        let mut vel_b = data.velocities[b.index];

        if self.frequency_hz > 0.0 {
            let cdot2 = vel_b.w - vel_a.w;
            let impulse2 = -self.mass.z_axis.z * (cdot2 + self.bias + self.gamma * self.impulse.z);
            self.impulse.z += impulse2;

            vel_a.w -= i_a * impulse2;
            vel_b.w += i_b * impulse2;

            let cdot1 = vel_b.v + cross_sv(vel_b.w, self.r_b) - vel_a.v - cross_sv(vel_a.w, self.r_a);
            let impulse1 = -mul22(self.mass, cdot1);
            self.impulse.x += impulse1.x;
            self.impulse.y += impulse1.y;

            vel_a.v -= m_a * impulse1;
            vel_a.w -= i_a * cross(self.r_a, impulse1);
            vel_b.v += m_b * impulse1;
            vel_b.w += i_b * cross(self.r_b, impulse1);
        } else {
            let cdot1 = vel_b.v + cross_sv(vel_b.w, self.r_b) - vel_a.v - cross_sv(vel_a.w, self.r_a);
            let cdot2 = vel_b.w - vel_a.w;
            let cdot = cdot1.extend(cdot2);

            let impulse = -(self.mass * cdot);
            self.impulse += impulse;

            let p = impulse.truncate();
            vel_a.v -= m_a * p;
            vel_a.w -= i_a * (cross(self.r_a, p) + impulse.z);
            vel_b.v += m_b * p;
            vel_b.w += i_b * (cross(self.r_b, p) + impulse.z);
        }

        data.velocities[a.index] = vel_a;
        data.velocities[b.index] = vel_b;
    }

    fn solve_position_constraints(&mut self, data: &mut SolverData<'_>) -> bool {
        let (a, b) = (self.body_a, self.body_b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);
        let settings = &data.step.settings;
        let mut pos_a = data.positions[a.index];
        let mut pos_b = data.positions[b.index];

        let q_a = Rot::from_angle(pos_a.a);
        let q_b = Rot::from_angle(pos_b.a);
        let r_a = q_a.apply(self.local_anchor_a - a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - b.local_center);

        let k = effective_mass(&a, &b, r_a, r_b);
        let c1 = pos_b.c + r_b - pos_a.c - r_a;

        let position_error;
        let angular_error;

        if self.frequency_hz > 0.0 {
            position_error = c1.length();
            angular_error = 0.0;

            let p = -solve33_as_22(k, c1);

            pos_a.c -= m_a * p;
            pos_a.a -= i_a * cross(r_a, p);
            pos_b.c += m_b * p;
            pos_b.a += i_b * cross(r_b, p);
        } else {
            let c2 = pos_b.a - pos_a.a - self.reference_angle;
            position_error = c1.length();
            angular_error = c2.abs();

            let impulse = if k.z_axis.z > 0.0 {
                -solve33(k, c1.extend(c2))
            } else {
                (-solve33_as_22(k, c1)).extend(0.0)
            };

            let p = impulse.truncate();
            pos_a.c -= m_a * p;
            pos_a.a -= i_a * (cross(r_a, p) + impulse.z);
            pos_b.c += m_b * p;
            pos_b.a += i_b * (cross(r_b, p) + impulse.z);
        }

        data.positions[a.index] = pos_a;
        data.positions[b.index] = pos_b;

        position_error <= settings.linear_slop && angular_error <= settings.angular_slop
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.impulse.truncate()
    }

    fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.impulse.z
    }
}
