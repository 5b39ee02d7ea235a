//! Contact manifolds
//!
//! A manifold stores contact points in the local frame of one shape so it
//! survives small motions; [`WorldManifold`] projects it into world space
//! for the solver and for host queries.

use pegbox_core::math::{EPSILON, Transform, Vec2};

use crate::settings::MAX_MANIFOLD_POINTS;

/// Which kind of feature a contact point came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeatureType {
    #[default]
    Vertex,
    Face,
}

/// Feature pair that produced a contact point. Points in successive
/// manifolds with the same id are the same physical contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContactId {
    pub index_a: u8,
    pub index_b: u8,
    pub type_a: FeatureType,
    pub type_b: FeatureType,
}

impl ContactId {
    /// Id with both features swapped, for routines that collide B against A
    pub fn flipped(&self) -> Self {
        Self {
            index_a: self.index_b,
            index_b: self.index_a,
            type_a: self.type_b,
            type_b: self.type_a,
        }
    }

    /// Packed form of the id, unique per feature pair
    pub fn key(&self) -> u32 {
        u32::from(self.index_a)
            | u32::from(self.index_b) << 8
            | (self.type_a as u32) << 16
            | (self.type_b as u32) << 24
    }
}

/// Contact point stored in the manifold's reference frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ManifoldPoint {
    /// Meaning depends on the manifold kind:
    /// circles: centre of circle B; face A: clip point of B; face B: clip point of A
    pub local_point: Vec2,
    /// Accumulated non-penetration impulse
    pub normal_impulse: f32,
    /// Accumulated friction impulse
    pub tangent_impulse: f32,
    pub id: ContactId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifoldType {
    #[default]
    Circles,
    FaceA,
    FaceB,
}

/// Up to two contact points between a pair of convex shapes
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Manifold {
    pub kind: ManifoldType,
    /// Unused for circles; otherwise the reference face normal
    pub local_normal: Vec2,
    /// Circles: centre of circle A; face A/B: centre of the reference face
    pub local_point: Vec2,
    pub(crate) points: [ManifoldPoint; MAX_MANIFOLD_POINTS],
    pub(crate) point_count: usize,
}

impl Manifold {
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points[..self.point_count]
    }

    pub fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points[..self.point_count]
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub(crate) fn push(&mut self, point: ManifoldPoint) {
        if self.point_count < MAX_MANIFOLD_POINTS {
            self.points[self.point_count] = point;
            self.point_count += 1;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.point_count = 0;
    }

    /// Copy accumulated impulses from `old` onto points with matching feature ids.
    /// Points without a match start from zero.
    pub fn carry_impulses_from(&mut self, old: &Manifold) {
        for point in self.points_mut() {
            point.normal_impulse = 0.0;
            point.tangent_impulse = 0.0;

            if let Some(previous) = old.points().iter().find(|p| p.id == point.id) {
                point.normal_impulse = previous.normal_impulse;
                point.tangent_impulse = previous.tangent_impulse;
            }
        }
    }
}

/// Manifold expressed in world coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldManifold {
    /// Unit normal pointing from A to B
    pub normal: Vec2,
    /// Contact points, midway between the two surfaces
    pub points: [Vec2; MAX_MANIFOLD_POINTS],
    /// Negative when overlapping
    pub separations: [f32; MAX_MANIFOLD_POINTS],
    pub point_count: usize,
}

impl WorldManifold {
    pub fn new(manifold: &Manifold, xf_a: &Transform, radius_a: f32, xf_b: &Transform, radius_b: f32) -> Self {
        let mut world = WorldManifold {
            point_count: manifold.point_count,
            ..Default::default()
        };
        if manifold.point_count == 0 {
            return world;
        }

        match manifold.kind {
            ManifoldType::Circles => {
                let point_a = xf_a.apply(manifold.local_point);
                let point_b = xf_b.apply(manifold.points[0].local_point);
                let mut normal = Vec2::X;
                if point_a.distance_squared(point_b) > EPSILON * EPSILON {
                    normal = (point_b - point_a).normalize();
                }
                let c_a = point_a + radius_a * normal;
                let c_b = point_b - radius_b * normal;
                world.normal = normal;
                world.points[0] = 0.5 * (c_a + c_b);
                world.separations[0] = (c_b - c_a).dot(normal);
            }
            ManifoldType::FaceA => {
                let normal = xf_a.q.apply(manifold.local_normal);
                let plane_point = xf_a.apply(manifold.local_point);
                for (i, point) in manifold.points().iter().enumerate() {
                    let clip_point = xf_b.apply(point.local_point);
                    let c_a = clip_point + (radius_a - (clip_point - plane_point).dot(normal)) * normal;
                    let c_b = clip_point - radius_b * normal;
                    world.points[i] = 0.5 * (c_a + c_b);
                    world.separations[i] = (c_b - c_a).dot(normal);
                }
                world.normal = normal;
            }
            ManifoldType::FaceB => {
                let normal = xf_b.q.apply(manifold.local_normal);
                let plane_point = xf_b.apply(manifold.local_point);
                for (i, point) in manifold.points().iter().enumerate() {
                    let clip_point = xf_a.apply(point.local_point);
                    let c_b = clip_point + (radius_b - (clip_point - plane_point).dot(normal)) * normal;
                    let c_a = clip_point - radius_a * normal;
                    world.points[i] = 0.5 * (c_a + c_b);
                    world.separations[i] = (c_a - c_b).dot(normal);
                }
                // Point from A to B.
                world.normal = -normal;
            }
        }
        world
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points[..self.point_count]
    }
}

/// Candidate contact point during clipping
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ClipVertex {
    pub v: Vec2,
    pub id: ContactId,
}

/// Sutherland-Hodgman clipping of a segment against the half-plane
/// `dot(normal, x) <= offset`. Returns the surviving points and their count.
pub(crate) fn clip_segment_to_line(
    v_in: &[ClipVertex; 2],
    normal: Vec2,
    offset: f32,
    vertex_index_a: usize,
) -> ([ClipVertex; 2], usize) {
    let mut v_out = [ClipVertex::default(); 2];
    let mut count = 0;

    let distance0 = normal.dot(v_in[0].v) - offset;
    let distance1 = normal.dot(v_in[1].v) - offset;

    if distance0 <= 0.0 {
        v_out[count] = v_in[0];
        count += 1;
    }
    if distance1 <= 0.0 {
        v_out[count] = v_in[1];
        count += 1;
    }

    // The points straddle the plane.
    if distance0 * distance1 < 0.0 {
        let interp = distance0 / (distance0 - distance1);
        v_out[count] = ClipVertex {
            v: v_in[0].v + interp * (v_in[1].v - v_in[0].v),
            // vertex A hitting edge B
            id: ContactId {
                index_a: vertex_index_a as u8,
                index_b: v_in[0].id.index_b,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Face,
            },
        };
        count += 1;
    }

    (v_out, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(a: u8, b: u8) -> ContactId {
        ContactId {
            index_a: a,
            index_b: b,
            type_a: FeatureType::Face,
            type_b: FeatureType::Vertex,
        }
    }

    fn manifold_with(points: &[(ContactId, f32, f32)]) -> Manifold {
        let mut manifold = Manifold {
            kind: ManifoldType::FaceA,
            ..Default::default()
        };
        for &(id, normal_impulse, tangent_impulse) in points {
            manifold.push(ManifoldPoint {
                id,
                normal_impulse,
                tangent_impulse,
                ..Default::default()
            });
        }
        manifold
    }

    #[test]
    fn test_impulses_follow_feature_ids() {
        let old = manifold_with(&[(id(0, 1), 1.0, 0.1), (id(0, 2), 2.0, 0.2)]);
        // Same features reported in reverse order plus one new feature.
        let mut new = manifold_with(&[(id(0, 2), 0.0, 0.0), (id(0, 1), 0.0, 0.0)]);
        new.carry_impulses_from(&old);
        assert_eq!(new.points()[0].normal_impulse, 2.0);
        assert_eq!(new.points()[0].tangent_impulse, 0.2);
        assert_eq!(new.points()[1].normal_impulse, 1.0);

        let mut fresh = manifold_with(&[(id(3, 3), 9.0, 9.0)]);
        fresh.carry_impulses_from(&old);
        assert_eq!(fresh.points()[0].normal_impulse, 0.0);
        assert_eq!(fresh.points()[0].tangent_impulse, 0.0);
    }

    #[test]
    fn test_contact_id_key_and_flip() {
        let a = id(1, 2);
        assert_ne!(a.key(), a.flipped().key());
        assert_eq!(a.flipped().flipped(), a);
        assert_eq!(a.flipped().type_a, FeatureType::Vertex);
    }

    #[test]
    fn test_manifold_capacity() {
        let mut manifold = Manifold::default();
        for _ in 0..4 {
            manifold.push(ManifoldPoint::default());
        }
        assert_eq!(manifold.point_count(), MAX_MANIFOLD_POINTS);
        manifold.clear();
        assert!(manifold.points().is_empty());
    }

    #[test]
    fn test_clip_segment() {
        let segment = [
            ClipVertex {
                v: Vec2::new(-1.0, 0.0),
                id: id(0, 4),
            },
            ClipVertex {
                v: Vec2::new(1.0, 0.0),
                id: id(0, 5),
            },
        ];
        let (out, count) = clip_segment_to_line(&segment, Vec2::X, 0.5, 7);
        assert_eq!(count, 2);
        assert_eq!(out[0].v, Vec2::new(-1.0, 0.0));
        assert_eq!(out[1].v, Vec2::new(0.5, 0.0));
        assert_eq!(out[1].id.index_a, 7);
        assert_eq!(out[1].id.type_b, FeatureType::Face);

        let (_, none) = clip_segment_to_line(&segment, Vec2::X, -2.0, 0);
        assert_eq!(none, 0);
    }

    #[test]
    fn test_world_manifold_circles() {
        let mut manifold = Manifold::default();
        manifold.push(ManifoldPoint::default());
        let xf_a = Transform::new(Vec2::ZERO, 0.0);
        let xf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);
        let world = WorldManifold::new(&manifold, &xf_a, 1.0, &xf_b, 1.0);
        assert_eq!(world.normal, Vec2::X);
        assert!((world.separations[0] + 0.5).abs() < 1e-6);
        assert!((world.points[0] - Vec2::new(0.75, 0.0)).length() < 1e-6);

        // Coincident centres fall back to a fixed normal.
        let world = WorldManifold::new(&manifold, &xf_a, 1.0, &xf_a, 1.0);
        assert_eq!(world.normal, Vec2::X);
        assert!(world.separations[0].is_finite());
    }
}
