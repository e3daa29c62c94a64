//! Rigid body transformation utilities

use crate::point::Point3d;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};

/// A rigid body pose. `W_T_B` maps body coordinates into the world frame.
pub type Pose3 = Isometry3<f64>;

/// Create a pose from a translation and a rotation
pub fn pose_from_translation_rotation(
    translation: Vector3<f64>,
    rotation: UnitQuaternion<f64>,
) -> Pose3 {
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

/// Pose of the rectified left camera in the world frame, `W_T_B * B_T_C`
pub fn left_camera_pose(w_pose_b: &Pose3, b_pose_cam: &Pose3) -> Pose3 {
    w_pose_b * b_pose_cam
}

/// Express a world point in the frame of `pose` (inverse transform)
pub fn transform_to(pose: &Pose3, point_w: &Point3d) -> Point3d {
    pose.inverse_transform_point(point_w)
}

/// Express a point given in the frame of `pose` in the world frame
pub fn transform_from(pose: &Pose3, point: &Point3d) -> Point3d {
    pose.transform_point(point)
}
