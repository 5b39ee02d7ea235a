//! Edge collisions.
//!
//! One-sided edges use their ghost neighbours to suppress contacts that
//! would catch on the interior vertices of a chain.

use pegbox_core::math::{Transform, Vec2, cross};
use smallvec::SmallVec;

use super::manifold::{ClipVertex, ContactId, FeatureType, Manifold, ManifoldPoint, ManifoldType, clip_segment_to_line};
use crate::settings::{MAX_MANIFOLD_POINTS, MAX_POLYGON_VERTICES};
use crate::shapes::{CircleShape, EdgeShape, PolygonShape};

/// Edge A against circle B.
pub fn collide_edge_and_circle(edge_a: &EdgeShape, xf_a: &Transform, circle_b: &CircleShape, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle centre in the edge's frame.
    let q = xf_a.apply_inv(xf_b.apply(circle_b.center));

    let a = edge_a.vertex1;
    let b = edge_a.vertex2;
    let e = b - a;

    // Normal points to the right for travel from A to B.
    let mut n = Vec2::new(e.y, -e.x);
    let offset = n.dot(q - a);
    if edge_a.one_sided && offset < 0.0 {
        return manifold;
    }

    // Barycentric coordinates.
    let u = e.dot(b - q);
    let v = e.dot(q - a);

    let radius = edge_a.radius + circle_b.radius;
    let vertex_contact = |manifold: &mut Manifold, p: Vec2, index_a: u8| {
        manifold.kind = ManifoldType::Circles;
        manifold.local_normal = Vec2::ZERO;
        manifold.local_point = p;
        manifold.push(ManifoldPoint {
            local_point: circle_b.center,
            id: ContactId {
                index_a,
                index_b: 0,
                type_a: FeatureType::Vertex,
                type_b: FeatureType::Vertex,
            },
            ..Default::default()
        });
    };

    // Region A
    if v <= 0.0 {
        if q.distance_squared(a) > radius * radius {
            return manifold;
        }
        // Leave it to the previous edge when the circle sits in its face region.
        if edge_a.one_sided {
            let e1 = a - edge_a.vertex0;
            if e1.dot(a - q) > 0.0 {
                return manifold;
            }
        }
        vertex_contact(&mut manifold, a, 0);
        return manifold;
    }

    // Region B
    if u <= 0.0 {
        if q.distance_squared(b) > radius * radius {
            return manifold;
        }
        if edge_a.one_sided {
            let e2 = edge_a.vertex3 - b;
            if e2.dot(q - b) > 0.0 {
                return manifold;
            }
        }
        vertex_contact(&mut manifold, b, 1);
        return manifold;
    }

    // Region AB
    let den = e.dot(e);
    let p = (u * a + v * b) / den;
    if q.distance_squared(p) > radius * radius {
        return manifold;
    }

    if offset < 0.0 {
        n = -n;
    }

    manifold.kind = ManifoldType::FaceA;
    manifold.local_normal = n.normalize_or_zero();
    manifold.local_point = a;
    manifold.push(ManifoldPoint {
        local_point: circle_b.center,
        id: ContactId {
            index_a: 0,
            index_b: 0,
            type_a: FeatureType::Face,
            type_b: FeatureType::Vertex,
        },
        ..Default::default()
    });
    manifold
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AxisKind {
    Unknown,
    EdgeA,
    EdgeB,
}

#[derive(Debug, Clone, Copy)]
struct SeparationAxis {
    kind: AxisKind,
    normal: Vec2,
    index: usize,
    separation: f32,
}

impl SeparationAxis {
    fn none() -> Self {
        Self {
            kind: AxisKind::Unknown,
            normal: Vec2::ZERO,
            index: 0,
            separation: f32::MIN,
        }
    }
}

/// Polygon B in the edge's frame
struct TempPolygon {
    vertices: SmallVec<[Vec2; MAX_POLYGON_VERTICES]>,
    normals: SmallVec<[Vec2; MAX_POLYGON_VERTICES]>,
}

fn compute_edge_separation(polygon_b: &TempPolygon, v1: Vec2, normal1: Vec2) -> SeparationAxis {
    let mut axis = SeparationAxis {
        kind: AxisKind::EdgeA,
        ..SeparationAxis::none()
    };

    // Least overlap over both sides of the edge.
    for (j, &candidate) in [normal1, -normal1].iter().enumerate() {
        let sj = polygon_b
            .vertices
            .iter()
            .map(|&v| candidate.dot(v - v1))
            .fold(f32::MAX, f32::min);

        if sj > axis.separation {
            axis.index = j;
            axis.separation = sj;
            axis.normal = candidate;
        }
    }
    axis
}

fn compute_polygon_separation(polygon_b: &TempPolygon, v1: Vec2, v2: Vec2) -> SeparationAxis {
    let mut axis = SeparationAxis::none();

    for (i, (&vertex, &normal)) in polygon_b.vertices.iter().zip(&polygon_b.normals).enumerate() {
        let n = -normal;
        let s = n.dot(vertex - v1).min(n.dot(vertex - v2));
        if s > axis.separation {
            axis.kind = AxisKind::EdgeB;
            axis.index = i;
            axis.separation = s;
            axis.normal = n;
        }
    }
    axis
}

/// Reference face used to clip the incident feature
struct ReferenceFace {
    i1: usize,
    i2: usize,
    v1: Vec2,
    v2: Vec2,
    normal: Vec2,
    side_normal1: Vec2,
    side_offset1: f32,
    side_normal2: Vec2,
    side_offset2: f32,
}

/// Edge A against polygon B.
pub fn collide_edge_and_polygon(
    edge_a: &EdgeShape,
    xf_a: &Transform,
    polygon_b: &PolygonShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    let xf = xf_a.mul_t(xf_b);
    let centroid_b = xf.apply(polygon_b.centroid());

    let v1 = edge_a.vertex1;
    let v2 = edge_a.vertex2;
    let edge1 = (v2 - v1).normalize_or_zero();

    // Normal points to the right for travel from v1 to v2.
    let normal1 = Vec2::new(edge1.y, -edge1.x);
    let offset1 = normal1.dot(centroid_b - v1);

    if edge_a.one_sided && offset1 < 0.0 {
        return manifold;
    }

    let temp = TempPolygon {
        vertices: polygon_b.vertices().iter().map(|&v| xf.apply(v)).collect(),
        normals: polygon_b.normals().iter().map(|&n| xf.q.apply(n)).collect(),
    };
    let count = temp.vertices.len();

    let radius = polygon_b.radius + edge_a.radius;

    let edge_axis = compute_edge_separation(&temp, v1, normal1);
    if edge_axis.separation > radius {
        return manifold;
    }

    let polygon_axis = compute_polygon_separation(&temp, v1, v2);
    if polygon_axis.separation > radius {
        return manifold;
    }

    // Hysteresis favours the edge axis to reduce jitter.
    let relative_tolerance = 0.98;
    let absolute_tolerance = 0.001;
    let mut primary_axis = if polygon_axis.separation - radius
        > relative_tolerance * (edge_axis.separation - radius) + absolute_tolerance
    {
        polygon_axis
    } else {
        edge_axis
    };

    if edge_a.one_sided {
        // Smooth collision across chain joints.
        let edge0 = (v1 - edge_a.vertex0).normalize_or_zero();
        let normal0 = Vec2::new(edge0.y, -edge0.x);
        let convex1 = cross(edge0, edge1) >= 0.0;

        let edge2 = (edge_a.vertex3 - v2).normalize_or_zero();
        let normal2 = Vec2::new(edge2.y, -edge2.x);
        let convex2 = cross(edge1, edge2) >= 0.0;

        let sin_tolerance = 0.1;
        let side1 = primary_axis.normal.dot(edge1) <= 0.0;

        // Gauss map regions: skip, admit, or snap to the edge normal.
        if side1 {
            if convex1 {
                if cross(primary_axis.normal, normal0) > sin_tolerance {
                    return manifold;
                }
            } else {
                primary_axis = edge_axis;
            }
        } else if convex2 {
            if cross(normal2, primary_axis.normal) > sin_tolerance {
                return manifold;
            }
        } else {
            primary_axis = edge_axis;
        }
    }

    let clip_points: [ClipVertex; 2];
    let reference: ReferenceFace;

    if primary_axis.kind == AxisKind::EdgeA {
        manifold.kind = ManifoldType::FaceA;

        // Polygon face most anti-parallel to the edge normal.
        let mut best_index = 0;
        let mut best_value = primary_axis.normal.dot(temp.normals[0]);
        for i in 1..count {
            let value = primary_axis.normal.dot(temp.normals[i]);
            if value < best_value {
                best_value = value;
                best_index = i;
            }
        }

        let i1 = best_index;
        let i2 = (i1 + 1) % count;
        let feature = |i: usize| ContactId {
            index_a: 0,
            index_b: i as u8,
            type_a: FeatureType::Face,
            type_b: FeatureType::Vertex,
        };
        clip_points = [
            ClipVertex {
                v: temp.vertices[i1],
                id: feature(i1),
            },
            ClipVertex {
                v: temp.vertices[i2],
                id: feature(i2),
            },
        ];

        reference = ReferenceFace {
            i1: 0,
            i2: 1,
            v1,
            v2,
            normal: primary_axis.normal,
            side_normal1: -edge1,
            side_offset1: 0.0,
            side_normal2: edge1,
            side_offset2: 0.0,
        };
    } else {
        manifold.kind = ManifoldType::FaceB;

        let feature = |index_a: u8| ContactId {
            index_a,
            index_b: primary_axis.index as u8,
            type_a: FeatureType::Vertex,
            type_b: FeatureType::Face,
        };
        clip_points = [
            ClipVertex { v: v2, id: feature(1) },
            ClipVertex { v: v1, id: feature(0) },
        ];

        let i1 = primary_axis.index;
        let i2 = (i1 + 1) % count;
        let normal = temp.normals[i1];
        let side_normal1 = Vec2::new(normal.y, -normal.x);
        reference = ReferenceFace {
            i1,
            i2,
            v1: temp.vertices[i1],
            v2: temp.vertices[i2],
            normal,
            side_normal1,
            side_offset1: 0.0,
            side_normal2: -side_normal1,
            side_offset2: 0.0,
        };
    }

    let reference = ReferenceFace {
        side_offset1: reference.side_normal1.dot(reference.v1),
        side_offset2: reference.side_normal2.dot(reference.v2),
        ..reference
    };

    // Clip the incident feature against the reference face side planes.
    let (clip_points1, np) = clip_segment_to_line(&clip_points, reference.side_normal1, reference.side_offset1, reference.i1);
    if np < MAX_MANIFOLD_POINTS {
        return manifold;
    }
    let (clip_points2, np) = clip_segment_to_line(&clip_points1, reference.side_normal2, reference.side_offset2, reference.i2);
    if np < MAX_MANIFOLD_POINTS {
        return manifold;
    }

    if primary_axis.kind == AxisKind::EdgeA {
        manifold.local_normal = reference.normal;
        manifold.local_point = reference.v1;
    } else {
        manifold.local_normal = polygon_b.normals()[reference.i1];
        manifold.local_point = polygon_b.vertices()[reference.i1];
    }

    for clip in &clip_points2 {
        let separation = reference.normal.dot(clip.v - reference.v1);
        if separation <= radius {
            let point = if primary_axis.kind == AxisKind::EdgeA {
                ManifoldPoint {
                    local_point: xf.apply_inv(clip.v),
                    id: clip.id,
                    ..Default::default()
                }
            } else {
                ManifoldPoint {
                    local_point: clip.v,
                    id: clip.id.flipped(),
                    ..Default::default()
                }
            };
            manifold.push(point);
        }
    }
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::WorldManifold;

    fn ground() -> EdgeShape {
        EdgeShape::new(Vec2::new(-10.0, 0.0), Vec2::new(10.0, 0.0)).unwrap()
    }

    #[test]
    fn test_circle_on_edge_face() {
        let edge = ground();
        let ball = CircleShape::new(Vec2::ZERO, 1.0).unwrap();
        let xf_b = Transform::new(Vec2::new(2.0, 0.95), 0.0);

        let manifold = collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &xf_b);
        assert_eq!(manifold.point_count(), 1);
        assert_eq!(manifold.kind, ManifoldType::FaceA);

        let world = WorldManifold::new(&manifold, &Transform::IDENTITY, edge.radius, &xf_b, 1.0);
        assert!((world.normal - Vec2::Y).length() < 1e-6);
        assert!((world.separations[0] - (0.95 - 1.0 - edge.radius)).abs() < 1e-5);
    }

    #[test]
    fn test_circle_beyond_edge_end() {
        let edge = ground();
        let ball = CircleShape::new(Vec2::ZERO, 1.0).unwrap();

        let corner = Transform::new(Vec2::new(10.5, 0.5), 0.0);
        let manifold = collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &corner);
        assert_eq!(manifold.kind, ManifoldType::Circles);
        assert_eq!(manifold.local_point, Vec2::new(10.0, 0.0));
        assert_eq!(manifold.points()[0].id.index_a, 1);

        let away = Transform::new(Vec2::new(12.0, 0.0), 0.0);
        assert_eq!(collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &away).point_count(), 0);
    }

    #[test]
    fn test_zero_length_edge_circle() {
        let point = EdgeShape::new(Vec2::ONE, Vec2::ONE).unwrap();
        let ball = CircleShape::new(Vec2::ZERO, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(1.2, 1.0), 0.0);
        let manifold = collide_edge_and_circle(&point, &Transform::IDENTITY, &ball, &xf_b);
        assert_eq!(manifold.point_count(), 1);
        assert_eq!(manifold.kind, ManifoldType::Circles);
        assert!(manifold.local_point.is_finite());
    }

    #[test]
    fn test_one_sided_edge_ignores_back() {
        let edge = EdgeShape::new_one_sided(
            Vec2::new(11.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(-10.0, 0.0),
            Vec2::new(-11.0, 0.0),
        )
        .unwrap();
        let ball = CircleShape::new(Vec2::ZERO, 1.0).unwrap();

        let above = Transform::new(Vec2::new(0.0, 0.9), 0.0);
        assert_eq!(collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &above).point_count(), 1);

        let below = Transform::new(Vec2::new(0.0, -0.9), 0.0);
        assert_eq!(collide_edge_and_circle(&edge, &Transform::IDENTITY, &ball, &below).point_count(), 0);
    }

    #[test]
    fn test_box_resting_on_edge() {
        let edge = ground();
        let crate_box = PolygonShape::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(1.0, 0.51), 0.0);

        let manifold = collide_edge_and_polygon(&edge, &Transform::IDENTITY, &crate_box, &xf_b);
        assert_eq!(manifold.point_count(), 2);

        let world = WorldManifold::new(&manifold, &Transform::IDENTITY, edge.radius, &xf_b, crate_box.radius);
        assert!((world.normal - Vec2::Y).length() < 1e-5);
        for &s in &world.separations[..2] {
            assert!((s - (0.01 - 0.02)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_box_clear_of_edge() {
        let edge = ground();
        let crate_box = PolygonShape::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(1.0, 0.6), 0.0);
        assert_eq!(collide_edge_and_polygon(&edge, &Transform::IDENTITY, &crate_box, &xf_b).point_count(), 0);
    }

    #[test]
    fn test_box_on_chain_joint_has_no_ghost_contact() {
        // Two collinear one-sided segments; solid side is up for right-to-left travel.
        let left = EdgeShape::new_one_sided(
            Vec2::new(2.0, 0.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(-2.0, 0.0),
            Vec2::new(-4.0, 0.0),
        )
        .unwrap();
        let crate_box = PolygonShape::new_box(0.5, 0.5).unwrap();
        // Box straddles the shared vertex at the origin, sliding right.
        let xf_b = Transform::new(Vec2::new(-0.2, 0.505), 0.0);
        let manifold = collide_edge_and_polygon(&left, &Transform::IDENTITY, &crate_box, &xf_b);
        let world = WorldManifold::new(&manifold, &Transform::IDENTITY, left.radius, &xf_b, crate_box.radius);
        assert!(manifold.point_count() > 0);
        assert!((world.normal - Vec2::Y).length() < 1e-4);
    }
}
