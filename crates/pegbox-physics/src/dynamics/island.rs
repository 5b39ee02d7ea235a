//! Island solver
//!
//! An island is a set of bodies connected through touching contacts and
//! joints. Each island is integrated, solved and put to sleep on its own.

use pegbox_core::math::Vec2;
use pegbox_core::pool::Pool;

use super::body::{Body, BodyType};
use super::contact::Contact;
use super::contact_manager::contact_ref;
use super::contact_solver::ContactSolver;
use super::fixture::Fixture;
use super::joints::Joint;
use super::listener::ListenerSlot;
use super::time_step::{Position, SolverBody, SolverData, TimeStep, Velocity};
use super::{BodyHandle, ContactHandle, JointHandle};

/// Reusable buffers for solving one island at a time
#[derive(Debug, Default)]
pub(crate) struct Island {
    pub bodies: Vec<BodyHandle>,
    pub contacts: Vec<ContactHandle>,
    pub joints: Vec<JointHandle>,
    positions: Vec<Position>,
    velocities: Vec<Velocity>,
    joint_bodies: Vec<(SolverBody, SolverBody)>,
    contact_solver: ContactSolver,
}

fn solver_body(body: &Body) -> SolverBody {
    SolverBody {
        index: body.island_index,
        local_center: body.sweep.local_center,
        inv_mass: body.inv_mass,
        inv_inertia: body.inv_inertia,
    }
}

impl Island {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.contacts.clear();
        self.joints.clear();
    }

    pub fn add_body(&mut self, handle: BodyHandle, body: &mut Body) {
        body.island_index = self.bodies.len();
        self.bodies.push(handle);
    }

    pub fn add_contact(&mut self, handle: ContactHandle) {
        self.contacts.push(handle);
    }

    pub fn add_joint(&mut self, handle: JointHandle) {
        self.joints.push(handle);
    }

    /// Integrate, solve constraints and update sleep timers. Returns true
    /// when the whole island went to sleep.
    #[allow(clippy::too_many_arguments)]
    pub fn solve(
        &mut self,
        step: &TimeStep,
        gravity: Vec2,
        allow_sleep: bool,
        bodies: &mut Pool<Body>,
        contacts: &mut Pool<Contact>,
        fixtures: &Pool<Fixture>,
        joints: &mut Pool<Joint>,
        listener: &mut ListenerSlot,
    ) -> bool {
        let h = step.dt;
        let settings = &step.settings;

        self.positions.clear();
        self.velocities.clear();

        // Integrate velocities.
        for &handle in &self.bodies {
            let body = &mut bodies[handle.0];
            let c = body.sweep.c;
            let a = body.sweep.a;
            let mut v = body.linear_velocity;
            let mut w = body.angular_velocity;

            body.sweep.c0 = c;
            body.sweep.a0 = a;

            if body.body_type == BodyType::Dynamic {
                v += h * (body.gravity_scale * gravity + body.inv_mass * body.force);
                w += h * body.inv_inertia * body.torque;

                // Pade approximation of exponential decay, stable for large damping.
                v *= 1.0 / (1.0 + h * body.linear_damping);
                w *= 1.0 / (1.0 + h * body.angular_damping);
            }

            self.positions.push(Position { c, a });
            self.velocities.push(Velocity { v, w });
        }

        self.contact_solver.prepare(
            step,
            &self.contacts,
            contacts,
            fixtures,
            bodies,
            &self.positions,
            &self.velocities,
        );
        if step.warm_starting {
            self.contact_solver.warm_start(&mut self.velocities);
        }

        self.joint_bodies.clear();
        for &handle in &self.joints {
            let joint = &joints[handle.0];
            let pair = (solver_body(&bodies[joint.body_a.0]), solver_body(&bodies[joint.body_b.0]));
            self.joint_bodies.push(pair);
        }

        {
            let mut data = SolverData {
                step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            for (&handle, &(body_a, body_b)) in self.joints.iter().zip(&self.joint_bodies) {
                joints[handle.0]
                    .solver_mut()
                    .init_velocity_constraints(body_a, body_b, &mut data);
            }

            for _ in 0..step.velocity_iterations {
                for &handle in &self.joints {
                    joints[handle.0].solver_mut().solve_velocity_constraints(&mut data);
                }
                self.contact_solver
                    .solve_velocity_constraints(&mut *data.velocities, step.block_solve);
            }
        }

        self.contact_solver.store_impulses(contacts);

        // Integrate positions, clamping large motions.
        for (position, velocity) in self.positions.iter_mut().zip(self.velocities.iter_mut()) {
            let mut v = velocity.v;
            let mut w = velocity.w;

            let translation = h * v;
            if translation.length_squared() > settings.max_translation_squared() {
                v *= settings.max_translation / translation.length();
            }

            let rotation = h * w;
            if rotation * rotation > settings.max_rotation_squared() {
                w *= settings.max_rotation / rotation.abs();
            }

            position.c += h * v;
            position.a += h * w;
            *velocity = Velocity { v, w };
        }

        let mut position_solved = false;
        for _ in 0..step.position_iterations {
            let contacts_okay = self
                .contact_solver
                .solve_position_constraints(&mut self.positions, settings);

            let mut data = SolverData {
                step,
                positions: &mut self.positions,
                velocities: &mut self.velocities,
            };
            let mut joints_okay = true;
            for &handle in &self.joints {
                joints_okay &= joints[handle.0].solver_mut().solve_position_constraints(&mut data);
            }

            if contacts_okay && joints_okay {
                position_solved = true;
                break;
            }
        }

        for (i, &handle) in self.bodies.iter().enumerate() {
            let body = &mut bodies[handle.0];
            body.sweep.c = self.positions[i].c;
            body.sweep.a = self.positions[i].a;
            body.linear_velocity = self.velocities[i].v;
            body.angular_velocity = self.velocities[i].w;
            body.synchronize_transform();
        }

        if let Some(listener) = listener.as_mut() {
            for (handle, impulse) in self.contact_solver.impulses() {
                if let Some(view) = contact_ref(handle, contacts, fixtures, bodies) {
                    listener.post_solve(view, &impulse);
                }
            }
        }

        if !allow_sleep {
            return false;
        }

        let lin_tol_sq = settings.linear_sleep_tolerance * settings.linear_sleep_tolerance;
        let ang_tol_sq = settings.angular_sleep_tolerance * settings.angular_sleep_tolerance;

        let mut min_sleep_time = f32::MAX;
        for &handle in &self.bodies {
            let body = &mut bodies[handle.0];
            if body.body_type == BodyType::Static {
                continue;
            }

            if !body.is_sleeping_allowed()
                || body.angular_velocity * body.angular_velocity > ang_tol_sq
                || body.linear_velocity.length_squared() > lin_tol_sq
            {
                body.sleep_time = 0.0;
                min_sleep_time = 0.0;
            } else {
                body.sleep_time += h;
                min_sleep_time = min_sleep_time.min(body.sleep_time);
            }
        }

        if min_sleep_time >= settings.time_to_sleep && position_solved {
            for &handle in &self.bodies {
                bodies[handle.0].set_awake(false);
            }
            log::debug!("island of {} bodies fell asleep", self.bodies.len());
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamics::body::BodyDef;
    use crate::settings::Settings;

    fn step(dt: f32) -> TimeStep {
        TimeStep {
            dt,
            inv_dt: 1.0 / dt,
            dt_ratio: 1.0,
            velocity_iterations: 8,
            position_iterations: 3,
            warm_starting: true,
            block_solve: true,
            settings: Settings::default(),
        }
    }

    struct Pools {
        bodies: Pool<Body>,
        contacts: Pool<Contact>,
        fixtures: Pool<Fixture>,
        joints: Pool<Joint>,
        listener: ListenerSlot,
    }

    fn empty() -> Pools {
        Pools {
            bodies: Pool::new(),
            contacts: Pool::new(),
            fixtures: Pool::new(),
            joints: Pool::new(),
            listener: None,
        }
    }

    #[test]
    fn test_free_fall_integrates_gravity_first() {
        let mut world = empty();
        let handle = BodyHandle(world.bodies.insert(Body::new(&BodyDef::dynamic())));

        let mut island = Island::new();
        island.add_body(handle, &mut world.bodies[handle.0]);
        let dt = 1.0 / 60.0;
        island.solve(
            &step(dt),
            Vec2::new(0.0, -10.0),
            true,
            &mut world.bodies,
            &mut world.contacts,
            &world.fixtures,
            &mut world.joints,
            &mut world.listener,
        );

        let body = &world.bodies[handle.0];
        assert!((body.linear_velocity().y + 10.0 * dt).abs() < 1e-6);
        // Symplectic Euler: the new velocity moves the body.
        assert!((body.position().y + 10.0 * dt * dt).abs() < 1e-6);
        assert!(body.is_awake());
    }

    #[test]
    fn test_translation_is_clamped() {
        let mut world = empty();
        let def = BodyDef::dynamic().with_linear_velocity(Vec2::new(1000.0, 0.0));
        let handle = BodyHandle(world.bodies.insert(Body::new(&def)));

        let mut island = Island::new();
        island.add_body(handle, &mut world.bodies[handle.0]);
        island.solve(
            &step(1.0 / 60.0),
            Vec2::ZERO,
            true,
            &mut world.bodies,
            &mut world.contacts,
            &world.fixtures,
            &mut world.joints,
            &mut world.listener,
        );

        let body = &world.bodies[handle.0];
        assert!((body.position().x - Settings::default().max_translation).abs() < 1e-4);
    }

    #[test]
    fn test_still_island_sleeps_after_time_to_sleep() {
        let mut world = empty();
        let handle = BodyHandle(world.bodies.insert(Body::new(&BodyDef::dynamic())));
        let mut island = Island::new();

        let dt = 0.1;
        let mut slept = false;
        for _ in 0..10 {
            island.clear();
            island.add_body(handle, &mut world.bodies[handle.0]);
            slept = island.solve(
                &step(dt),
                Vec2::ZERO,
                true,
                &mut world.bodies,
                &mut world.contacts,
                &world.fixtures,
                &mut world.joints,
                &mut world.listener,
            );
            if slept {
                break;
            }
        }

        assert!(slept);
        assert!(!world.bodies[handle.0].is_awake());
    }
}
