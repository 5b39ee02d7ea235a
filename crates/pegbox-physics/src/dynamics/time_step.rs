use pegbox_core::math::Vec2;

use crate::settings::Settings;

/// Parameters of one solver step
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimeStep {
    pub dt: f32,
    pub inv_dt: f32,
    /// `dt` of this step times `inv_dt` of the previous one
    pub dt_ratio: f32,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
    pub block_solve: bool,
    pub settings: Settings,
}

/// Centre of mass and angle of an island body
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Position {
    pub c: Vec2,
    pub a: f32,
}

/// Linear and angular velocity of an island body
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Velocity {
    pub v: Vec2,
    pub w: f32,
}

/// Island state handed to joint solvers
pub(crate) struct SolverData<'a> {
    pub step: &'a TimeStep,
    pub positions: &'a mut [Position],
    pub velocities: &'a mut [Velocity],
}

/// Mass properties of one joint body, captured when the island is built
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SolverBody {
    pub index: usize,
    pub local_center: Vec2,
    pub inv_mass: f32,
    pub inv_inertia: f32,
}
