//! Small geometric predicates shared by the mesher and the plane segmenter

use crate::point::{Point3d, Vector3d};
use itertools::Itertools;
use std::f64::consts::TAU;

/// Cross product magnitudes below this are treated as collinear
pub const COLLINEAR_EPSILON: f64 = 1e-9;

/// Unit normal of the triangle `(p1, p2, p3)`, or `None` if the vertices are
/// (nearly) collinear and the normal is undefined.
pub fn triangle_normal(p1: &Point3d, p2: &Point3d, p3: &Point3d) -> Option<Vector3d> {
    let v21 = p2 - p1;
    let v31 = p3 - p1;
    let scale = v21.norm() * v31.norm();
    if scale <= 0.0 || !scale.is_finite() {
        return None;
    }

    let cross = v21.cross(&v31);
    // Relative test so that tiny but well shaped triangles still get a normal
    if cross.norm() / scale < COLLINEAR_EPSILON {
        return None;
    }
    Some(cross.normalize())
}

/// Edge lengths `[d12, d23, d31]`
pub fn side_lengths(p1: &Point3d, p2: &Point3d, p3: &Point3d) -> [f64; 3] {
    [(p1 - p2).norm(), (p2 - p3).norm(), (p3 - p1).norm()]
}

/// Smallest and largest edge length
pub fn min_max_side(p1: &Point3d, p2: &Point3d, p3: &Point3d) -> (f64, f64) {
    side_lengths(p1, p2, p3)
        .iter()
        .copied()
        .minmax()
        .into_option()
        .unwrap_or((0.0, 0.0))
}

/// Centroid of three points
pub fn centroid(p1: &Point3d, p2: &Point3d, p3: &Point3d) -> Point3d {
    Point3d::from((p1.coords + p2.coords + p3.coords) / 3.0)
}

/// Whether `normal` is within `tolerance` of being parallel (or antiparallel)
/// to `axis`: `|n . a| > 1 - tolerance`.
pub fn is_normal_around_axis(axis: &Vector3d, normal: &Vector3d, tolerance: f64) -> bool {
    normal.dot(axis).abs() > 1.0 - tolerance
}

/// Whether `normal` is within `tolerance` of being perpendicular to `axis`:
/// `|n . a| < tolerance`.
pub fn is_normal_perpendicular_to_axis(axis: &Vector3d, normal: &Vector3d, tolerance: f64) -> bool {
    normal.dot(axis).abs() < tolerance
}

/// Orthonormal basis `(e1, e2)` spanning the plane perpendicular to `vertical`.
///
/// For `vertical = +z` this is `(+x, +y)`.
pub fn horizontal_basis(vertical: &Vector3d) -> (Vector3d, Vector3d) {
    let v = vertical.normalize();
    let reference = if v.x.abs() < 0.9 { Vector3d::x() } else { Vector3d::y() };
    let e1 = (reference - v * reference.dot(&v)).normalize();
    let e2 = v.cross(&e1);
    (e1, e2)
}

/// Azimuth of `normal` around `vertical`, in `[0, 2π)`.
pub fn longitude(normal: &Vector3d, vertical: &Vector3d) -> f64 {
    let (e1, e2) = horizontal_basis(vertical);
    let angle = normal.dot(&e2).atan2(normal.dot(&e1));
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Unit vector perpendicular to `vertical` with the given azimuth
pub fn direction_from_longitude(theta: f64, vertical: &Vector3d) -> Vector3d {
    let (e1, e2) = horizontal_basis(vertical);
    (e1 * theta.cos() + e2 * theta.sin()).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_triangle_normal() {
        let n = triangle_normal(
            &Point3d::new(0.0, 0.0, 0.0),
            &Point3d::new(1.0, 0.0, 0.0),
            &Point3d::new(0.0, 1.0, 0.0),
        )
        .unwrap();
        assert_relative_eq!(n, Vector3d::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_triangle_normal_collinear() {
        let n = triangle_normal(
            &Point3d::new(0.0, 0.0, 0.0),
            &Point3d::new(1.0, 1.0, 1.0),
            &Point3d::new(2.0, 2.0, 2.0),
        );
        assert!(n.is_none(), "Collinear points have no normal");

        let repeated = triangle_normal(&Point3d::origin(), &Point3d::origin(), &Point3d::new(1.0, 0.0, 0.0));
        assert!(repeated.is_none());
    }

    #[test]
    fn test_axis_predicates() {
        let z = Vector3d::z();
        assert!(is_normal_around_axis(&z, &Vector3d::new(0.0, 0.0, -1.0), 0.01));
        assert!(!is_normal_around_axis(&z, &Vector3d::new(0.0, 0.6, 0.8), 0.01));
        assert!(is_normal_perpendicular_to_axis(&z, &Vector3d::x(), 0.01));
        assert!(!is_normal_perpendicular_to_axis(&z, &Vector3d::new(0.0, 0.6, 0.8), 0.01));
    }

    #[test]
    fn test_longitude_range() {
        let z = Vector3d::z();
        assert_relative_eq!(longitude(&Vector3d::x(), &z), 0.0, epsilon = 1e-12);
        assert_relative_eq!(longitude(&Vector3d::y(), &z), PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(longitude(&-Vector3d::x(), &z), PI, epsilon = 1e-12);
        assert_relative_eq!(longitude(&-Vector3d::y(), &z), 1.5 * PI, epsilon = 1e-12);

        let dir = direction_from_longitude(PI / 2.0, &z);
        assert_relative_eq!(dir, Vector3d::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_min_max_side() {
        let (min, max) = min_max_side(
            &Point3d::new(0.0, 0.0, 0.0),
            &Point3d::new(3.0, 0.0, 0.0),
            &Point3d::new(0.0, 4.0, 0.0),
        );
        assert_relative_eq!(min, 3.0);
        assert_relative_eq!(max, 5.0);
    }
}
