//! Sequential impulse contact solver
//!
//! Velocity constraints are solved with accumulated impulses clamped to the
//! Coulomb cone; two-point manifolds use a 2x2 block solve when the effective
//! mass is well conditioned. Position drift is removed with capped
//! Baumgarte steps.

use pegbox_core::math::{Mat2, Rot, Transform, Vec2, cross, cross_sv, cross_vs, inv_or_zero, inverse22};
use pegbox_core::pool::Pool;

use super::contact::Contact;
use super::fixture::Fixture;
use super::listener::ContactImpulse;
use super::time_step::{Position, TimeStep, Velocity};
use super::{Body, ContactHandle};
use crate::collision::{ManifoldType, WorldManifold};
use crate::settings::{MAX_MANIFOLD_POINTS, Settings};

/// Largest condition number estimate accepted by the block solver
const MAX_CONDITION_NUMBER: f32 = 1000.0;

#[derive(Debug, Clone, Copy, Default)]
struct VelocityConstraintPoint {
    r_a: Vec2,
    r_b: Vec2,
    normal_impulse: f32,
    tangent_impulse: f32,
    normal_mass: f32,
    tangent_mass: f32,
    velocity_bias: f32,
}

#[derive(Debug, Clone, Copy)]
struct ContactVelocityConstraint {
    points: [VelocityConstraintPoint; MAX_MANIFOLD_POINTS],
    normal: Vec2,
    normal_mass: Mat2,
    k: Mat2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    inv_i_a: f32,
    inv_i_b: f32,
    friction: f32,
    restitution: f32,
    tangent_speed: f32,
    point_count: usize,
    contact: ContactHandle,
}

#[derive(Debug, Clone, Copy)]
struct ContactPositionConstraint {
    local_points: [Vec2; MAX_MANIFOLD_POINTS],
    local_normal: Vec2,
    local_point: Vec2,
    index_a: usize,
    index_b: usize,
    inv_mass_a: f32,
    inv_mass_b: f32,
    local_center_a: Vec2,
    local_center_b: Vec2,
    inv_i_a: f32,
    inv_i_b: f32,
    kind: ManifoldType,
    radius_a: f32,
    radius_b: f32,
    point_count: usize,
}

/// Solver buffers for one island, cleared between islands
#[derive(Debug, Default)]
pub(crate) struct ContactSolver {
    velocity_constraints: Vec<ContactVelocityConstraint>,
    position_constraints: Vec<ContactPositionConstraint>,
}

fn transform_at(position: &Position, local_center: Vec2) -> Transform {
    let q = Rot::from_angle(position.a);
    Transform {
        p: position.c - q.apply(local_center),
        q,
    }
}

impl ContactSolver {
    /// Build constraints for the island's contacts and compute their
    /// effective masses and restitution bias.
    pub fn prepare(
        &mut self,
        step: &TimeStep,
        island_contacts: &[ContactHandle],
        contacts: &Pool<Contact>,
        fixtures: &Pool<Fixture>,
        bodies: &Pool<Body>,
        positions: &[Position],
        velocities: &[Velocity],
    ) {
        self.velocity_constraints.clear();
        self.position_constraints.clear();

        for &handle in island_contacts {
            let contact = &contacts[handle.0];
            let fixture_a = &fixtures[contact.fixture_a.0];
            let fixture_b = &fixtures[contact.fixture_b.0];
            let body_a = &bodies[contact.body_a.0];
            let body_b = &bodies[contact.body_b.0];
            let manifold = &contact.manifold;

            let mut vc = ContactVelocityConstraint {
                points: [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS],
                normal: Vec2::ZERO,
                normal_mass: Mat2::ZERO,
                k: Mat2::ZERO,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                friction: contact.friction,
                restitution: contact.restitution,
                tangent_speed: contact.tangent_speed,
                point_count: manifold.point_count(),
                contact: handle,
            };
            let mut pc = ContactPositionConstraint {
                local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
                local_normal: manifold.local_normal,
                local_point: manifold.local_point,
                index_a: body_a.island_index,
                index_b: body_b.island_index,
                inv_mass_a: body_a.inv_mass,
                inv_mass_b: body_b.inv_mass,
                local_center_a: body_a.sweep.local_center,
                local_center_b: body_b.sweep.local_center,
                inv_i_a: body_a.inv_inertia,
                inv_i_b: body_b.inv_inertia,
                kind: manifold.kind,
                radius_a: fixture_a.shape.radius(),
                radius_b: fixture_b.shape.radius(),
                point_count: manifold.point_count(),
            };

            for (j, mp) in manifold.points().iter().enumerate() {
                let vcp = &mut vc.points[j];
                if step.warm_starting {
                    vcp.normal_impulse = step.dt_ratio * mp.normal_impulse;
                    vcp.tangent_impulse = step.dt_ratio * mp.tangent_impulse;
                }
                pc.local_points[j] = mp.local_point;
            }

            let world_manifold = manifold_world(contact, &pc, positions);
            let centers = (positions[pc.index_a].c, positions[pc.index_b].c);
            initialize_velocity_constraint(&mut vc, step, &world_manifold, centers, velocities);
            self.velocity_constraints.push(vc);
            self.position_constraints.push(pc);
        }
    }

    /// Apply the carried-over impulses
    pub fn warm_start(&self, velocities: &mut [Velocity]) {
        for vc in &self.velocity_constraints {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let mut va = velocities[vc.index_a];
            let mut vb = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);

            for vcp in &vc.points[..vc.point_count] {
                let p = vcp.normal_impulse * normal + vcp.tangent_impulse * tangent;
                va.w -= i_a * cross(vcp.r_a, p);
                va.v -= m_a * p;
                vb.w += i_b * cross(vcp.r_b, p);
                vb.v += m_b * p;
            }

            velocities[vc.index_a] = va;
            velocities[vc.index_b] = vb;
        }
    }

    pub fn solve_velocity_constraints(&mut self, velocities: &mut [Velocity], block_solve: bool) {
        for vc in &mut self.velocity_constraints {
            let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
            let Velocity { v: mut v_a, w: mut w_a } = velocities[vc.index_a];
            let Velocity { v: mut v_b, w: mut w_b } = velocities[vc.index_b];

            let normal = vc.normal;
            let tangent = cross_vs(normal, 1.0);
            let friction = vc.friction;

            // Friction first; normal impulses matter more.
            for vcp in &mut vc.points[..vc.point_count] {
                let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);

                let vt = dv.dot(tangent) - vc.tangent_speed;
                let lambda = vcp.tangent_mass * -vt;

                let max_friction = friction * vcp.normal_impulse;
                let new_impulse = (vcp.tangent_impulse + lambda).max(-max_friction).min(max_friction);
                let lambda = new_impulse - vcp.tangent_impulse;
                vcp.tangent_impulse = new_impulse;

                let p = lambda * tangent;
                v_a -= m_a * p;
                w_a -= i_a * cross(vcp.r_a, p);
                v_b += m_b * p;
                w_b += i_b * cross(vcp.r_b, p);
            }

            if vc.point_count == 1 || !block_solve {
                for vcp in &mut vc.points[..vc.point_count] {
                    let dv = v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a);

                    let vn = dv.dot(normal);
                    let lambda = -vcp.normal_mass * (vn - vcp.velocity_bias);

                    let new_impulse = (vcp.normal_impulse + lambda).max(0.0);
                    let lambda = new_impulse - vcp.normal_impulse;
                    vcp.normal_impulse = new_impulse;

                    let p = lambda * normal;
                    v_a -= m_a * p;
                    w_a -= i_a * cross(vcp.r_a, p);
                    v_b += m_b * p;
                    w_b += i_b * cross(vcp.r_b, p);
                }
            } else {
                // Block solver: find x with vn = A x + b, vn >= 0, x >= 0 and
                // vn_i x_i = 0 by enumerating the four complementary cases.
                let (cp1, cp2) = (vc.points[0], vc.points[1]);
                let a = Vec2::new(cp1.normal_impulse, cp2.normal_impulse);

                let dv1 = v_b + cross_sv(w_b, cp1.r_b) - v_a - cross_sv(w_a, cp1.r_a);
                let dv2 = v_b + cross_sv(w_b, cp2.r_b) - v_a - cross_sv(w_a, cp2.r_a);
                let vn1 = dv1.dot(normal);
                let vn2 = dv2.dot(normal);

                let b = Vec2::new(vn1 - cp1.velocity_bias, vn2 - cp2.velocity_bias) - vc.k * a;

                let solution = block_solve_cases(vc, b);
                if let Some(x) = solution {
                    let d = x - a;
                    let p1 = d.x * normal;
                    let p2 = d.y * normal;
                    v_a -= m_a * (p1 + p2);
                    w_a -= i_a * (cross(cp1.r_a, p1) + cross(cp2.r_a, p2));
                    v_b += m_b * (p1 + p2);
                    w_b += i_b * (cross(cp1.r_b, p1) + cross(cp2.r_b, p2));
                    vc.points[0].normal_impulse = x.x;
                    vc.points[1].normal_impulse = x.y;
                }
            }

            velocities[vc.index_a] = Velocity { v: v_a, w: w_a };
            velocities[vc.index_b] = Velocity { v: v_b, w: w_b };
        }
    }

    /// Write accumulated impulses back to the contact manifolds
    pub fn store_impulses(&self, contacts: &mut Pool<Contact>) {
        for vc in &self.velocity_constraints {
            let Some(contact) = contacts.get_mut(vc.contact.0) else {
                continue;
            };
            for (j, point) in contact.manifold.points_mut().iter_mut().enumerate().take(vc.point_count) {
                point.normal_impulse = vc.points[j].normal_impulse;
                point.tangent_impulse = vc.points[j].tangent_impulse;
            }
        }
    }

    /// Impulses per contact for post-solve reporting
    pub fn impulses(&self) -> impl Iterator<Item = (ContactHandle, ContactImpulse)> + '_ {
        self.velocity_constraints.iter().map(|vc| {
            let mut impulse = ContactImpulse {
                count: vc.point_count,
                ..Default::default()
            };
            for (j, vcp) in vc.points[..vc.point_count].iter().enumerate() {
                impulse.normal_impulses[j] = vcp.normal_impulse;
                impulse.tangent_impulses[j] = vcp.tangent_impulse;
            }
            (vc.contact, impulse)
        })
    }

    /// One Baumgarte pass over every contact. Returns true once the deepest
    /// penetration is within three times the linear slop.
    pub fn solve_position_constraints(&self, positions: &mut [Position], settings: &Settings) -> bool {
        let mut min_separation = 0.0_f32;

        for pc in &self.position_constraints {
            let (m_a, i_a, m_b, i_b) = (pc.inv_mass_a, pc.inv_i_a, pc.inv_mass_b, pc.inv_i_b);
            let mut pos_a = positions[pc.index_a];
            let mut pos_b = positions[pc.index_b];

            for j in 0..pc.point_count {
                let xf_a = transform_at(&pos_a, pc.local_center_a);
                let xf_b = transform_at(&pos_b, pc.local_center_b);

                let (normal, point, separation) = position_manifold(pc, &xf_a, &xf_b, j);

                let r_a = point - pos_a.c;
                let r_b = point - pos_b.c;

                min_separation = min_separation.min(separation);

                // Prevent large corrections and allow slop.
                let c = (settings.baumgarte * (separation + settings.linear_slop))
                    .clamp(-settings.max_linear_correction, 0.0);

                let rn_a = cross(r_a, normal);
                let rn_b = cross(r_b, normal);
                let k = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;

                let impulse = if k > 0.0 { -c / k } else { 0.0 };
                let p = impulse * normal;

                pos_a.c -= m_a * p;
                pos_a.a -= i_a * cross(r_a, p);
                pos_b.c += m_b * p;
                pos_b.a += i_b * cross(r_b, p);
            }

            positions[pc.index_a] = pos_a;
            positions[pc.index_b] = pos_b;
        }

        min_separation >= -3.0 * settings.linear_slop
    }
}

fn manifold_world(contact: &Contact, pc: &ContactPositionConstraint, positions: &[Position]) -> WorldManifold {
    let xf_a = transform_at(&positions[pc.index_a], pc.local_center_a);
    let xf_b = transform_at(&positions[pc.index_b], pc.local_center_b);
    WorldManifold::new(&contact.manifold, &xf_a, pc.radius_a, &xf_b, pc.radius_b)
}

/// Effective masses and restitution bias of one constraint
fn initialize_velocity_constraint(
    vc: &mut ContactVelocityConstraint,
    step: &TimeStep,
    world_manifold: &WorldManifold,
    (c_a, c_b): (Vec2, Vec2),
    velocities: &[Velocity],
) {
    let (m_a, m_b, i_a, i_b) = (vc.inv_mass_a, vc.inv_mass_b, vc.inv_i_a, vc.inv_i_b);
    let Velocity { v: v_a, w: w_a } = velocities[vc.index_a];
    let Velocity { v: v_b, w: w_b } = velocities[vc.index_b];

    vc.normal = world_manifold.normal;
    let tangent = cross_vs(vc.normal, 1.0);

    for j in 0..vc.point_count {
        let vcp = &mut vc.points[j];
        vcp.r_a = world_manifold.points[j] - c_a;
        vcp.r_b = world_manifold.points[j] - c_b;

        let rn_a = cross(vcp.r_a, vc.normal);
        let rn_b = cross(vcp.r_b, vc.normal);
        let k_normal = m_a + m_b + i_a * rn_a * rn_a + i_b * rn_b * rn_b;
        vcp.normal_mass = inv_or_zero(k_normal);

        let rt_a = cross(vcp.r_a, tangent);
        let rt_b = cross(vcp.r_b, tangent);
        let k_tangent = m_a + m_b + i_a * rt_a * rt_a + i_b * rt_b * rt_b;
        vcp.tangent_mass = inv_or_zero(k_tangent);

        // Restitution only above the threshold speed.
        vcp.velocity_bias = 0.0;
        let v_rel = vc
            .normal
            .dot(v_b + cross_sv(w_b, vcp.r_b) - v_a - cross_sv(w_a, vcp.r_a));
        if v_rel < -step.settings.velocity_threshold {
            vcp.velocity_bias = -vc.restitution * v_rel;
        }
    }

    if vc.point_count == 2 && step.block_solve {
        let vcp1 = vc.points[0];
        let vcp2 = vc.points[1];

        let rn1_a = cross(vcp1.r_a, vc.normal);
        let rn1_b = cross(vcp1.r_b, vc.normal);
        let rn2_a = cross(vcp2.r_a, vc.normal);
        let rn2_b = cross(vcp2.r_b, vc.normal);

        let k11 = m_a + m_b + i_a * rn1_a * rn1_a + i_b * rn1_b * rn1_b;
        let k22 = m_a + m_b + i_a * rn2_a * rn2_a + i_b * rn2_b * rn2_b;
        let k12 = m_a + m_b + i_a * rn1_a * rn2_a + i_b * rn1_b * rn2_b;

        if k11 * k11 < MAX_CONDITION_NUMBER * (k11 * k22 - k12 * k12) {
            vc.k = Mat2::from_cols(Vec2::new(k11, k12), Vec2::new(k12, k22));
            vc.normal_mass = inverse22(vc.k);
        } else {
            // Redundant points; solve the first only.
            vc.point_count = 1;
        }
    }
}

/// Total enumeration of the 2x2 linear complementarity problem
fn block_solve_cases(vc: &ContactVelocityConstraint, b: Vec2) -> Option<Vec2> {
    // Case 1: both points active.
    let x = -(vc.normal_mass * b);
    if x.x >= 0.0 && x.y >= 0.0 {
        return Some(x);
    }

    // Case 2: only the first point active.
    let x1 = -vc.points[0].normal_mass * b.x;
    let vn2 = vc.k.x_axis.y * x1 + b.y;
    if x1 >= 0.0 && vn2 >= 0.0 {
        return Some(Vec2::new(x1, 0.0));
    }

    // Case 3: only the second point active.
    let x2 = -vc.points[1].normal_mass * b.y;
    let vn1 = vc.k.y_axis.x * x2 + b.x;
    if x2 >= 0.0 && vn1 >= 0.0 {
        return Some(Vec2::new(0.0, x2));
    }

    // Case 4: both separating.
    if b.x >= 0.0 && b.y >= 0.0 {
        return Some(Vec2::ZERO);
    }

    // No solution; leave the impulses unchanged.
    None
}

/// Normal, contact point and separation of point `index` at the current positions
fn position_manifold(pc: &ContactPositionConstraint, xf_a: &Transform, xf_b: &Transform, index: usize) -> (Vec2, Vec2, f32) {
    match pc.kind {
        ManifoldType::Circles => {
            let point_a = xf_a.apply(pc.local_point);
            let point_b = xf_b.apply(pc.local_points[0]);
            let normal = (point_b - point_a).normalize_or_zero();
            let point = 0.5 * (point_a + point_b);
            let separation = (point_b - point_a).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, point, separation)
        }
        ManifoldType::FaceA => {
            let normal = xf_a.q.apply(pc.local_normal);
            let plane_point = xf_a.apply(pc.local_point);
            let clip_point = xf_b.apply(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            (normal, clip_point, separation)
        }
        ManifoldType::FaceB => {
            let normal = xf_b.q.apply(pc.local_normal);
            let plane_point = xf_b.apply(pc.local_point);
            let clip_point = xf_a.apply(pc.local_points[index]);
            let separation = (clip_point - plane_point).dot(normal) - pc.radius_a - pc.radius_b;
            // Ensure normal points from A to B.
            (-normal, clip_point, separation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(k: Mat2) -> ContactVelocityConstraint {
        let mut pool: Pool<()> = Pool::new();
        let mut points = [VelocityConstraintPoint::default(); MAX_MANIFOLD_POINTS];
        points[0].normal_mass = 1.0 / k.x_axis.x;
        points[1].normal_mass = 1.0 / k.y_axis.y;
        ContactVelocityConstraint {
            points,
            normal: Vec2::Y,
            normal_mass: inverse22(k),
            k,
            index_a: 0,
            index_b: 1,
            inv_mass_a: 0.0,
            inv_mass_b: 1.0,
            inv_i_a: 0.0,
            inv_i_b: 1.0,
            friction: 0.5,
            restitution: 0.0,
            tangent_speed: 0.0,
            point_count: 2,
            contact: ContactHandle(pool.insert(())),
        }
    }

    #[test]
    fn test_block_solve_both_points_push() {
        let vc = constraint(Mat2::from_cols(Vec2::new(2.0, 0.5), Vec2::new(0.5, 2.0)));
        // Both points approaching at the same speed.
        let x = block_solve_cases(&vc, Vec2::new(-1.0, -1.0)).unwrap();
        assert!(x.x > 0.0 && x.y > 0.0);
        assert!((x.x - x.y).abs() < 1e-6);
        let vn = vc.k * x + Vec2::new(-1.0, -1.0);
        assert!(vn.length() < 1e-5);
    }

    #[test]
    fn test_block_solve_one_point_separating() {
        let vc = constraint(Mat2::from_cols(Vec2::new(2.0, 0.5), Vec2::new(0.5, 2.0)));
        let x = block_solve_cases(&vc, Vec2::new(-1.0, 3.0)).unwrap();
        assert!(x.x > 0.0);
        assert_eq!(x.y, 0.0);
    }

    #[test]
    fn test_block_solve_both_separating() {
        let vc = constraint(Mat2::from_cols(Vec2::new(2.0, 0.5), Vec2::new(0.5, 2.0)));
        assert_eq!(block_solve_cases(&vc, Vec2::new(1.0, 2.0)), Some(Vec2::ZERO));
    }

    #[test]
    fn test_position_manifold_face_b_points_from_a_to_b() {
        let pc = ContactPositionConstraint {
            local_points: [Vec2::new(0.0, -0.5), Vec2::ZERO],
            local_normal: Vec2::Y,
            local_point: Vec2::new(0.0, 0.5),
            index_a: 0,
            index_b: 1,
            inv_mass_a: 1.0,
            inv_mass_b: 0.0,
            local_center_a: Vec2::ZERO,
            local_center_b: Vec2::ZERO,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            kind: ManifoldType::FaceB,
            radius_a: 0.0,
            radius_b: 0.0,
            point_count: 1,
        };
        // A sits above B, overlapping by 0.1.
        let xf_a = Transform::new(Vec2::new(0.0, 0.9), 0.0);
        let (normal, point, separation) = position_manifold(&pc, &xf_a, &Transform::IDENTITY, 0);
        assert_eq!(normal, Vec2::new(0.0, -1.0));
        assert!((point - Vec2::new(0.0, 0.4)).length() < 1e-6);
        assert!((separation + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_position_pass_reports_solved_within_slop() {
        let settings = Settings::default();
        let mut solver = ContactSolver::default();
        solver.position_constraints.push(ContactPositionConstraint {
            local_points: [Vec2::ZERO; MAX_MANIFOLD_POINTS],
            local_normal: Vec2::ZERO,
            local_point: Vec2::ZERO,
            index_a: 0,
            index_b: 1,
            inv_mass_a: 0.0,
            inv_mass_b: 1.0,
            local_center_a: Vec2::ZERO,
            local_center_b: Vec2::ZERO,
            inv_i_a: 0.0,
            inv_i_b: 0.0,
            kind: ManifoldType::Circles,
            radius_a: 0.5,
            radius_b: 0.5,
            point_count: 1,
        });

        let mut positions = [
            Position::default(),
            Position {
                c: Vec2::new(0.0, 0.9),
                a: 0.0,
            },
        ];
        assert!(!solver.solve_position_constraints(&mut positions, &settings));
        // Pushed apart along +y, never further than the correction cap.
        let moved = positions[1].c.y - 0.9;
        assert!(moved > 0.0 && moved <= settings.max_linear_correction + 1e-6);

        for _ in 0..50 {
            solver.solve_position_constraints(&mut positions, &settings);
        }
        assert!(solver.solve_position_constraints(&mut positions, &settings));
    }
}
