//! Revolute joint
//!
//! Pins two bodies together at a shared anchor, leaving relative rotation
//! free. An optional motor drives the relative angular speed and optional
//! limits clamp the relative angle.

use pegbox_core::math::{Mat2, Rot, Vec2, cross, cross_sv, inv_or_zero, solve22};

use super::JointSolver;
use crate::dynamics::BodyHandle;
use crate::dynamics::time_step::{SolverBody, SolverData};

/// Construction parameters for a [`RevoluteJoint`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevoluteJointDef {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub local_anchor_a: Vec2,
    pub local_anchor_b: Vec2,
    /// Angle of B minus angle of A in the reference pose
    pub reference_angle: f32,
    pub enable_limit: bool,
    pub lower_angle: f32,
    pub upper_angle: f32,
    pub enable_motor: bool,
    /// Target relative angular speed in radians per second
    pub motor_speed: f32,
    pub max_motor_torque: f32,
    pub collide_connected: bool,
}

impl RevoluteJointDef {
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, local_anchor_a: Vec2, local_anchor_b: Vec2) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a,
            local_anchor_b,
            reference_angle: 0.0,
            enable_limit: false,
            lower_angle: 0.0,
            upper_angle: 0.0,
            enable_motor: false,
            motor_speed: 0.0,
            max_motor_torque: 0.0,
            collide_connected: false,
        }
    }

    pub fn with_reference_angle(mut self, angle: f32) -> Self {
        self.reference_angle = angle;
        self
    }

    pub fn with_limits(mut self, lower: f32, upper: f32) -> Self {
        self.enable_limit = true;
        self.lower_angle = lower;
        self.upper_angle = upper;
        self
    }

    pub fn with_motor(mut self, speed: f32, max_torque: f32) -> Self {
        self.enable_motor = true;
        self.motor_speed = speed;
        self.max_motor_torque = max_torque;
        self
    }

    pub fn with_collide_connected(mut self, collide: bool) -> Self {
        self.collide_connected = collide;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RevoluteJoint {
    local_anchor_a: Vec2,
    local_anchor_b: Vec2,
    reference_angle: f32,

    enable_limit: bool,
    lower_angle: f32,
    upper_angle: f32,
    enable_motor: bool,
    motor_speed: f32,
    max_motor_torque: f32,

    impulse: Vec2,
    motor_impulse: f32,
    lower_impulse: f32,
    upper_impulse: f32,

    // Solver temporaries
    body_a: SolverBody,
    body_b: SolverBody,
    r_a: Vec2,
    r_b: Vec2,
    k: Mat2,
    angle: f32,
    axial_mass: f32,
}

impl RevoluteJoint {
    pub(crate) fn new(def: &RevoluteJointDef) -> Self {
        Self {
            local_anchor_a: def.local_anchor_a,
            local_anchor_b: def.local_anchor_b,
            reference_angle: def.reference_angle,
            enable_limit: def.enable_limit,
            lower_angle: def.lower_angle,
            upper_angle: def.upper_angle,
            enable_motor: def.enable_motor,
            motor_speed: def.motor_speed,
            max_motor_torque: def.max_motor_torque,
            impulse: Vec2::ZERO,
            motor_impulse: 0.0,
            lower_impulse: 0.0,
            upper_impulse: 0.0,
            body_a: SolverBody::default(),
            body_b: SolverBody::default(),
            r_a: Vec2::ZERO,
            r_b: Vec2::ZERO,
            k: Mat2::ZERO,
            angle: 0.0,
            axial_mass: 0.0,
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

    pub fn is_limit_enabled(&self) -> bool {
        self.enable_limit
    }

    pub fn enable_limit(&mut self, enable: bool) {
        if enable != self.enable_limit {
            self.enable_limit = enable;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    pub fn limits(&self) -> (f32, f32) {
        (self.lower_angle, self.upper_angle)
    }

    /// Ignored unless `lower <= upper`
    pub fn set_limits(&mut self, lower: f32, upper: f32) {
        if lower <= upper {
            self.lower_angle = lower;
            self.upper_angle = upper;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
    }

    pub fn is_motor_enabled(&self) -> bool {
        self.enable_motor
    }

    pub fn enable_motor(&mut self, enable: bool) {
        self.enable_motor = enable;
    }

    pub fn motor_speed(&self) -> f32 {
        self.motor_speed
    }

    pub fn set_motor_speed(&mut self, speed: f32) {
        self.motor_speed = speed;
    }

    pub fn set_max_motor_torque(&mut self, torque: f32) {
        self.max_motor_torque = torque.max(0.0);
    }

    /// Motor torque applied during the last step
    pub fn motor_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * self.motor_impulse
    }
}

impl JointSolver for RevoluteJoint {
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

        let (r_a, r_b) = (self.r_a, self.r_b);
        let k11 = m_a + m_b + r_a.y * r_a.y * i_a + r_b.y * r_b.y * i_b;
        let k12 = -r_a.y * r_a.x * i_a - r_b.y * r_b.x * i_b;
        let k22 = m_a + m_b + r_a.x * r_a.x * i_a + r_b.x * r_b.x * i_b;
        self.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));

        self.axial_mass = inv_or_zero(i_a + i_b);
        let fixed_rotation = i_a + i_b == 0.0;

        self.angle = pos_b.a - pos_a.a - self.reference_angle;
        if !self.enable_limit || fixed_rotation {
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }
        if !self.enable_motor || fixed_rotation {
            self.motor_impulse = 0.0;
        }

        if data.step.warm_starting {
            let ratio = data.step.dt_ratio;
            self.impulse *= ratio;
            self.motor_impulse *= ratio;
            self.lower_impulse *= ratio;
            self.upper_impulse *= ratio;

            let axial_impulse = self.motor_impulse + self.lower_impulse - self.upper_impulse;
            let p = self.impulse;

            vel_a.v -= m_a * p;
            vel_a.w -= i_a * (cross(r_a, p) + axial_impulse);
            vel_b.v += m_b * p;
            vel_b.w += i_b * (cross(r_b, p) + axial_impulse);
        } else {
            self.impulse = Vec2::ZERO;
            self.motor_impulse = 0.0;
            self.lower_impulse = 0.0;
            self.upper_impulse = 0.0;
        }

        data.velocities[body_a.index] = vel_a;
        data.velocities[body_b.index] = vel_b;
    }

    fn solve_velocity_constraints(&mut self, data: &mut SolverData<'_>) {
        let (a, b) = (self.body_a, self.body_b);
        let (m_a, m_b, i_a, i_b) = (a.inv_mass, b.inv_mass, a.inv_inertia, b.inv_inertia);
        let mut vel_a = data.velocities[a.index];
        let mut vel_b = data.velocities[b.index];
        let fixed_rotation = i_a + i_b == 0.0;

        if self.enable_motor && !fixed_rotation {
            let cdot = vel_b.w - vel_a.w - self.motor_speed;
            let impulse = -self.axial_mass * cdot;
            let old_impulse = self.motor_impulse;
            let max_impulse = data.step.dt * self.max_motor_torque;
            self.motor_impulse = (old_impulse + impulse).clamp(-max_impulse, max_impulse);
            let impulse = self.motor_impulse - old_impulse;

            vel_a.w -= i_a * impulse;
            vel_b.w += i_b * impulse;
        }

        if self.enable_limit && !fixed_rotation {
            // Lower limit
            {
                let c = self.angle - self.lower_angle;
                let cdot = vel_b.w - vel_a.w;
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.lower_impulse;
                self.lower_impulse = (old_impulse + impulse).max(0.0);
                let impulse = self.lower_impulse - old_impulse;

                vel_a.w -= i_a * impulse;
                vel_b.w += i_b * impulse;
            }

            // Upper limit. The sign flips so the impulse stays positive.
            {
                let c = self.upper_angle - self.angle;
                let cdot = vel_a.w - vel_b.w;
                let impulse = -self.axial_mass * (cdot + c.max(0.0) * data.step.inv_dt);
                let old_impulse = self.upper_impulse;
                self.upper_impulse = (old_impulse + impulse).max(0.0);
                let impulse = self.upper_impulse - old_impulse;

                vel_a.w += i_a * impulse;
                vel_b.w -= i_b * impulse;
            }
        }

        // Point to point
        {
            let cdot = vel_b.v + cross_sv(vel_b.w, self.r_b) - vel_a.v - cross_sv(vel_a.w, self.r_a);
            let impulse = solve22(self.k, -cdot);
            self.impulse += impulse;

            vel_a.v -= m_a * impulse;
            vel_a.w -= i_a * cross(self.r_a, impulse);
            vel_b.v += m_b * impulse;
            vel_b.w += i_b * cross(self.r_b, impulse);
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

        let mut angular_error = 0.0;
        let fixed_rotation = i_a + i_b == 0.0;

        if self.enable_limit && !fixed_rotation {
            let angle = pos_b.a - pos_a.a - self.reference_angle;
            let max_correction = settings.max_angular_correction;
            let c = if (self.upper_angle - self.lower_angle).abs() < 2.0 * settings.angular_slop {
                // Prevent large angular corrections
                (angle - self.lower_angle).clamp(-max_correction, max_correction)
            } else if angle <= self.lower_angle {
                (angle - self.lower_angle + settings.angular_slop).clamp(-max_correction, 0.0)
            } else if angle >= self.upper_angle {
                (angle - self.upper_angle - settings.angular_slop).clamp(0.0, max_correction)
            } else {
                0.0
            };

            let limit_impulse = -self.axial_mass * c;
            pos_a.a -= i_a * limit_impulse;
            pos_b.a += i_b * limit_impulse;
            angular_error = c.abs();
        }

        // Solve point to point constraint.
        let q_a = Rot::from_angle(pos_a.a);
        let q_b = Rot::from_angle(pos_b.a);
        let r_a = q_a.apply(self.local_anchor_a - a.local_center);
        let r_b = q_b.apply(self.local_anchor_b - b.local_center);

        let c = pos_b.c + r_b - pos_a.c - r_a;
        let position_error = c.length();

        let k11 = m_a + m_b + i_a * r_a.y * r_a.y + i_b * r_b.y * r_b.y;
        let k12 = -i_a * r_a.x * r_a.y - i_b * r_b.x * r_b.y;
        let k22 = m_a + m_b + i_a * r_a.x * r_a.x + i_b * r_b.x * r_b.x;
        let k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));

        let impulse = -solve22(k, c);

        pos_a.c -= m_a * impulse;
        pos_a.a -= i_a * cross(r_a, impulse);
        pos_b.c += m_b * impulse;
        pos_b.a += i_b * cross(r_b, impulse);

        data.positions[a.index] = pos_a;
        data.positions[b.index] = pos_b;

        position_error <= settings.linear_slop && angular_error <= settings.angular_slop
    }

    fn reaction_force(&self, inv_dt: f32) -> Vec2 {
        inv_dt * self.impulse
    }

    fn reaction_torque(&self, inv_dt: f32) -> f32 {
        inv_dt * (self.motor_impulse + self.lower_impulse - self.upper_impulse)
    }
}
