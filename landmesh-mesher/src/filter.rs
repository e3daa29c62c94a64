//! Rejection of degenerate and unreliable 3D triangles

use crate::params::TriangleFilterParams;
use landmesh_core::{centroid, min_max_side, triangle_normal, Point3d, Pose3};
use std::fmt;

/// Below this radial span a triangle faces the camera head on
const RADIAL_EPSILON: f64 = 1e-12;

/// Why a lifted triangle was not added to the 3D mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriangleRejection {
    /// Vertices are (nearly) collinear, there is no normal
    Degenerate,
    /// Shortest over longest side below the minimum ratio
    Elongated,
    /// Longest side above the maximum length
    TooLarge,
    /// Seen nearly edge-on from the camera
    EdgeOn,
}

impl fmt::Display for TriangleRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Degenerate => "degenerate",
            Self::Elongated => "elongated",
            Self::TooLarge => "too large",
            Self::EdgeOn => "edge-on",
        };
        f.write_str(reason)
    }
}

/// Geometric triangle filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleFilter {
    params: TriangleFilterParams,
}

impl TriangleFilter {
    pub fn new(params: TriangleFilterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &TriangleFilterParams {
        &self.params
    }

    /// Accept or reject `triangle`, with vertices in the world frame, as seen
    /// from the left camera at `w_pose_cam`.
    ///
    /// Tests run in a fixed order and the first failing one is reported.
    pub fn check(&self, triangle: &[Point3d; 3], w_pose_cam: &Pose3) -> Result<(), TriangleRejection> {
        let [p1, p2, p3] = triangle;

        if triangle_normal(p1, p2, p3).is_none() {
            return Err(TriangleRejection::Degenerate);
        }

        let (min_side, max_side) = min_max_side(p1, p2, p3);
        if max_side <= 0.0 || min_side / max_side < self.params.min_ratio_smallest_largest_side {
            return Err(TriangleRejection::Elongated);
        }
        if max_side > self.params.max_triangle_side {
            return Err(TriangleRejection::TooLarge);
        }

        match tangential_radial_ratio(triangle, w_pose_cam) {
            Some(ratio) if ratio >= self.params.min_elongation_ratio => Ok(()),
            _ => Err(TriangleRejection::EdgeOn),
        }
    }

    pub fn is_bad_triangle(&self, triangle: &[Point3d; 3], w_pose_cam: &Pose3) -> bool {
        self.check(triangle, w_pose_cam).is_err()
    }
}

/// Ratio between the extent of `triangle` across the viewing ray through its
/// centroid and its extent along that ray.
///
/// Returns `f64::INFINITY` for a triangle with no depth extent and `None` if
/// the camera center coincides with the centroid.
pub fn tangential_radial_ratio(triangle: &[Point3d; 3], w_pose_cam: &Pose3) -> Option<f64> {
    let camera = Point3d::from(w_pose_cam.translation.vector);
    let ray = centroid(&triangle[0], &triangle[1], &triangle[2]) - camera;
    let ray_norm = ray.norm();
    if !(ray_norm > 0.0) || !ray_norm.is_finite() {
        return None;
    }
    let ray = ray / ray_norm;

    let mut radial_min = f64::INFINITY;
    let mut radial_max = f64::NEG_INFINITY;
    let mut tangential = [ray; 3];
    for (slot, p) in tangential.iter_mut().zip(triangle) {
        let offset = p - camera;
        let along = offset.dot(&ray);
        radial_min = radial_min.min(along);
        radial_max = radial_max.max(along);
        *slot = offset - ray * along;
    }

    let radial = radial_max - radial_min;
    if radial < RADIAL_EPSILON {
        return Some(f64::INFINITY);
    }

    let tangential_span = [(0, 1), (1, 2), (2, 0)]
        .iter()
        .map(|&(i, j)| (tangential[i] - tangential[j]).norm())
        .fold(0.0, f64::max);
    Some(tangential_span / radial)
}
