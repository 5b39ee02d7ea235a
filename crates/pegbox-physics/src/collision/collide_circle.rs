use pegbox_core::math::{EPSILON, Transform};

use super::manifold::{Manifold, ManifoldPoint, ManifoldType};
use crate::shapes::{CircleShape, PolygonShape};

/// Circle against circle. At most one point.
pub fn collide_circles(circle_a: &CircleShape, xf_a: &Transform, circle_b: &CircleShape, xf_b: &Transform) -> Manifold {
    let mut manifold = Manifold::default();

    let p_a = xf_a.apply(circle_a.center);
    let p_b = xf_b.apply(circle_b.center);
    let radius = circle_a.radius + circle_b.radius;
    if p_a.distance_squared(p_b) > radius * radius {
        return manifold;
    }

    manifold.kind = ManifoldType::Circles;
    manifold.local_point = circle_a.center;
    manifold.push(ManifoldPoint {
        local_point: circle_b.center,
        ..Default::default()
    });
    manifold
}

/// Polygon A against circle B. At most one point.
pub fn collide_polygon_and_circle(
    polygon_a: &PolygonShape,
    xf_a: &Transform,
    circle_b: &CircleShape,
    xf_b: &Transform,
) -> Manifold {
    let mut manifold = Manifold::default();

    // Circle centre in the polygon's frame.
    let c = xf_b.apply(circle_b.center);
    let c_local = xf_a.apply_inv(c);

    // Find the face of least penetration.
    let radius = polygon_a.radius + circle_b.radius;
    let vertices = polygon_a.vertices();
    let normals = polygon_a.normals();
    let count = vertices.len();

    let mut normal_index = 0;
    let mut separation = f32::MIN;
    for i in 0..count {
        let s = normals[i].dot(c_local - vertices[i]);
        if s > radius {
            return manifold;
        }
        if s > separation {
            separation = s;
            normal_index = i;
        }
    }

    let v1 = vertices[normal_index];
    let v2 = vertices[(normal_index + 1) % count];

    manifold.kind = ManifoldType::FaceA;
    let point = ManifoldPoint {
        local_point: circle_b.center,
        ..Default::default()
    };

    // Centre inside the polygon.
    if separation < EPSILON {
        manifold.local_normal = normals[normal_index];
        manifold.local_point = 0.5 * (v1 + v2);
        manifold.push(point);
        return manifold;
    }

    // Voronoi region of the face or one of its vertices.
    let u1 = (c_local - v1).dot(v2 - v1);
    let u2 = (c_local - v2).dot(v1 - v2);
    if u1 <= 0.0 {
        if c_local.distance_squared(v1) > radius * radius {
            return manifold;
        }
        manifold.local_normal = (c_local - v1).normalize_or_zero();
        manifold.local_point = v1;
    } else if u2 <= 0.0 {
        if c_local.distance_squared(v2) > radius * radius {
            return manifold;
        }
        manifold.local_normal = (c_local - v2).normalize_or_zero();
        manifold.local_point = v2;
    } else {
        let face_center = 0.5 * (v1 + v2);
        if (c_local - face_center).dot(normals[normal_index]) > radius {
            return manifold;
        }
        manifold.local_normal = normals[normal_index];
        manifold.local_point = face_center;
    }
    manifold.push(point);
    manifold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::WorldManifold;
    use pegbox_core::math::Vec2;

    fn circle(radius: f32) -> CircleShape {
        CircleShape::new(Vec2::ZERO, radius).unwrap()
    }

    #[test]
    fn test_circles_touching_and_apart() {
        let a = circle(1.0);
        let b = circle(0.5);
        let xf_a = Transform::IDENTITY;

        let near = Transform::new(Vec2::new(1.4, 0.0), 0.0);
        let manifold = collide_circles(&a, &xf_a, &b, &near);
        assert_eq!(manifold.point_count(), 1);
        assert_eq!(manifold.kind, ManifoldType::Circles);

        let far = Transform::new(Vec2::new(1.6, 0.0), 0.0);
        assert_eq!(collide_circles(&a, &xf_a, &b, &far).point_count(), 0);
    }

    #[test]
    fn test_concentric_circles_stay_finite() {
        let a = circle(1.0);
        let manifold = collide_circles(&a, &Transform::IDENTITY, &a, &Transform::IDENTITY);
        assert_eq!(manifold.point_count(), 1);
        let world = WorldManifold::new(&manifold, &Transform::IDENTITY, 1.0, &Transform::IDENTITY, 1.0);
        assert!(world.normal.is_finite());
        assert!((world.separations[0] + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_polygon_circle_face_region() {
        let square = PolygonShape::new_box(1.0, 1.0).unwrap();
        let ball = circle(0.5);
        let xf_b = Transform::new(Vec2::new(0.2, 1.4), 0.0);

        let manifold = collide_polygon_and_circle(&square, &Transform::IDENTITY, &ball, &xf_b);
        assert_eq!(manifold.point_count(), 1);
        assert_eq!(manifold.kind, ManifoldType::FaceA);
        assert_eq!(manifold.local_normal, Vec2::Y);

        let world = WorldManifold::new(&manifold, &Transform::IDENTITY, square.radius, &xf_b, 0.5);
        assert!((world.separations[0] - (0.4 - 0.5 - square.radius)).abs() < 1e-5);
    }

    #[test]
    fn test_polygon_circle_vertex_region() {
        let square = PolygonShape::new_box(1.0, 1.0).unwrap();
        let ball = circle(0.5);

        let diagonal = Transform::new(Vec2::new(1.3, 1.3), 0.0);
        let manifold = collide_polygon_and_circle(&square, &Transform::IDENTITY, &ball, &diagonal);
        assert_eq!(manifold.point_count(), 1);
        assert_eq!(manifold.local_point, Vec2::new(1.0, 1.0));
        assert!((manifold.local_normal - Vec2::splat(0.5_f32.sqrt())).length() < 1e-5);

        let clear = Transform::new(Vec2::new(1.5, 1.5), 0.0);
        assert_eq!(collide_polygon_and_circle(&square, &Transform::IDENTITY, &ball, &clear).point_count(), 0);
    }

    #[test]
    fn test_polygon_circle_deep_inside() {
        let square = PolygonShape::new_box(1.0, 1.0).unwrap();
        let ball = circle(0.1);
        let manifold = collide_polygon_and_circle(&square, &Transform::IDENTITY, &ball, &Transform::IDENTITY);
        assert_eq!(manifold.point_count(), 1);
        assert!((manifold.local_normal.length() - 1.0).abs() < 1e-6);
    }
}
