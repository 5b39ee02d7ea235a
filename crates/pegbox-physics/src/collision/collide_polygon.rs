use pegbox_core::math::{Transform, cross_vs};

use super::manifold::{ClipVertex, ContactId, FeatureType, Manifold, ManifoldPoint, ManifoldType, clip_segment_to_line};
use crate::settings::{DEFAULT_LINEAR_SLOP, MAX_MANIFOLD_POINTS};
use crate::shapes::PolygonShape;

/// Face of `poly1` with the largest separation from `poly2`, and that separation.
fn find_max_separation(poly1: &PolygonShape, xf1: &Transform, poly2: &PolygonShape, xf2: &Transform) -> (usize, f32) {
    let xf = xf2.mul_t(xf1);

    let mut best_index = 0;
    let mut max_separation = f32::MIN;
    for (i, (&n1, &v1)) in poly1.normals().iter().zip(poly1.vertices()).enumerate() {
        // Face of poly1 expressed in poly2's frame.
        let n = xf.q.apply(n1);
        let v1 = xf.apply(v1);

        let si = poly2
            .vertices()
            .iter()
            .map(|&v2| n.dot(v2 - v1))
            .fold(f32::MAX, f32::min);

        if si > max_separation {
            max_separation = si;
            best_index = i;
        }
    }
    (best_index, max_separation)
}

/// Edge of `poly2` most anti-parallel to reference face `edge1` of `poly1`.
fn find_incident_edge(
    poly1: &PolygonShape,
    xf1: &Transform,
    edge1: usize,
    poly2: &PolygonShape,
    xf2: &Transform,
) -> [ClipVertex; 2] {
    // Reference normal in poly2's frame.
    let normal1 = xf2.q.apply_inv(xf1.q.apply(poly1.normals()[edge1]));

    let mut index = 0;
    let mut min_dot = f32::MAX;
    for (i, &n2) in poly2.normals().iter().enumerate() {
        let dot = normal1.dot(n2);
        if dot < min_dot {
            min_dot = dot;
            index = i;
        }
    }

    let count2 = poly2.count();
    let i1 = index;
    let i2 = (i1 + 1) % count2;
    let feature = |i: usize| ContactId {
        index_a: edge1 as u8,
        index_b: i as u8,
        type_a: FeatureType::Face,
        type_b: FeatureType::Vertex,
    };

    [
        ClipVertex {
            v: xf2.apply(poly2.vertices()[i1]),
            id: feature(i1),
        },
        ClipVertex {
            v: xf2.apply(poly2.vertices()[i2]),
            id: feature(i2),
        },
    ]
}

/// Polygon against polygon by separating axes and reference-face clipping.
///
/// The reference face is chosen on A unless B's best face separates clearly
/// more, which keeps the choice stable frame to frame.
pub fn collide_polygons(poly_a: &PolygonShape, xf_a: &Transform, poly_b: &PolygonShape, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::default();
    let total_radius = poly_a.radius + poly_b.radius;

    let (edge_a, separation_a) = find_max_separation(poly_a, xf_a, poly_b, xf_b);
    if separation_a > total_radius {
        return manifold;
    }

    let (edge_b, separation_b) = find_max_separation(poly_b, xf_b, poly_a, xf_a);
    if separation_b > total_radius {
        return manifold;
    }

    let tolerance = 0.1 * DEFAULT_LINEAR_SLOP;
    let (poly1, xf1, poly2, xf2, edge1, flip) = if separation_b > separation_a + tolerance {
        manifold.kind = ManifoldType::FaceB;
        (poly_b, xf_b, poly_a, xf_a, edge_b, true)
    } else {
        manifold.kind = ManifoldType::FaceA;
        (poly_a, xf_a, poly_b, xf_b, edge_a, false)
    };

    let incident_edge = find_incident_edge(poly1, xf1, edge1, poly2, xf2);

    let count1 = poly1.count();
    let iv1 = edge1;
    let iv2 = (edge1 + 1) % count1;

    let mut v11 = poly1.vertices()[iv1];
    let mut v12 = poly1.vertices()[iv2];

    let local_tangent = (v12 - v11).normalize_or_zero();
    let local_normal = cross_vs(local_tangent, 1.0);
    let plane_point = 0.5 * (v11 + v12);

    let tangent = xf1.q.apply(local_tangent);
    let normal = cross_vs(tangent, 1.0);

    v11 = xf1.apply(v11);
    v12 = xf1.apply(v12);

    let front_offset = normal.dot(v11);

    // Side planes, pushed out by the skin thickness.
    let side_offset1 = -tangent.dot(v11) + total_radius;
    let side_offset2 = tangent.dot(v12) + total_radius;

    let (clip_points1, np) = clip_segment_to_line(&incident_edge, -tangent, side_offset1, iv1);
    if np < 2 {
        return manifold;
    }
    let (clip_points2, np) = clip_segment_to_line(&clip_points1, tangent, side_offset2, iv2);
    if np < 2 {
        return manifold;
    }

    manifold.local_normal = local_normal;
    manifold.local_point = plane_point;

    for clip in clip_points2.iter().take(MAX_MANIFOLD_POINTS) {
        let separation = normal.dot(clip.v) - front_offset;
        if separation <= total_radius {
            manifold.push(ManifoldPoint {
                local_point: xf2.apply_inv(clip.v),
                id: if flip { clip.id.flipped() } else { clip.id },
                ..Default::default()
            });
        }
    }
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::WorldManifold;
    use pegbox_core::math::Vec2;

    #[test]
    fn test_stacked_boxes_two_points() {
        let ground = PolygonShape::new_box(5.0, 0.5).unwrap();
        let crate_box = PolygonShape::new_box(0.5, 0.5).unwrap();
        let xf_a = Transform::IDENTITY;
        let xf_b = Transform::new(Vec2::new(0.0, 0.99), 0.0);

        let manifold = collide_polygons(&ground, &xf_a, &crate_box, &xf_b);
        assert_eq!(manifold.point_count(), 2);

        let world = WorldManifold::new(&manifold, &xf_a, ground.radius, &xf_b, crate_box.radius);
        assert!((world.normal - Vec2::Y).length() < 1e-5);
        for &s in &world.separations[..2] {
            assert!((s - (-0.01 - 0.02)).abs() < 1e-4);
        }

        let ids: Vec<_> = manifold.points().iter().map(|p| p.id).collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_separated_boxes() {
        let a = PolygonShape::new_box(0.5, 0.5).unwrap();
        let xf_b = Transform::new(Vec2::new(1.2, 0.0), 0.0);
        assert_eq!(collide_polygons(&a, &Transform::IDENTITY, &a, &xf_b).point_count(), 0);
    }

    #[test]
    fn test_flip_keeps_normal_from_a_to_b() {
        let small = PolygonShape::new_box(0.5, 0.5).unwrap();
        let large = PolygonShape::new_box(5.0, 0.5).unwrap();
        // Small box rotated so its corner digs into the large box's top face.
        let xf_a = Transform::new(Vec2::new(0.0, 1.2), std::f32::consts::FRAC_PI_4);
        let xf_b = Transform::IDENTITY;

        let manifold = collide_polygons(&small, &xf_a, &large, &xf_b);
        assert!(manifold.point_count() >= 1);
        assert_eq!(manifold.kind, ManifoldType::FaceB);

        let world = WorldManifold::new(&manifold, &xf_a, small.radius, &xf_b, large.radius);
        assert!((world.normal - Vec2::new(0.0, -1.0)).length() < 1e-4);
    }

    #[test]
    fn test_ids_stable_under_small_motion() {
        let ground = PolygonShape::new_box(5.0, 0.5).unwrap();
        let crate_box = PolygonShape::new_box(0.5, 0.5).unwrap();
        let first = collide_polygons(&ground, &Transform::IDENTITY, &crate_box, &Transform::new(Vec2::new(0.0, 0.99), 0.0));
        let second = collide_polygons(&ground, &Transform::IDENTITY, &crate_box, &Transform::new(Vec2::new(0.05, 0.995), 0.01));
        let a: Vec<_> = first.points().iter().map(|p| p.id).collect();
        let b: Vec<_> = second.points().iter().map(|p| p.id).collect();
        assert_eq!(a, b);
    }
}
