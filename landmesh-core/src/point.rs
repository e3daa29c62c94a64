//! Point, keypoint and landmark types

use bytemuck::{Pod, Zeroable};
use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Timestamp of a processed frame, in nanoseconds
pub type Timestamp = i64;

/// Stable identity of a tracked 3D point across frames
pub type LandmarkId = i64;

/// A 2D point in pixel coordinates
pub type Pixel = Point2<f64>;

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// Optimized landmark positions (world frame) keyed by landmark id.
///
/// Only landmarks inside the estimator's time horizon are present; any id
/// missing from the map is unresolved.
pub type PointsWithIdMap = HashMap<LandmarkId, Point3d>;

/// Tracking status of a keypoint in the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeypointStatus {
    /// Tracked and matched stereoscopically
    Valid,
    /// Lost, outlier, or without a usable stereo match
    Invalid,
    /// Newly initialized this frame
    New,
}

/// A 2D keypoint as reported by the front end
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeypointObservation {
    /// Pixel position in the rectified left image
    pub pixel: Pixel,
    pub status: KeypointStatus,
    /// Owning landmark, if the keypoint is associated to one
    pub lmk_id: Option<LandmarkId>,
    /// Stereo 3D estimate in the rectified left camera frame
    pub point_cam: Option<Point3d>,
}

impl KeypointObservation {
    /// Create a valid keypoint bound to a landmark without a stereo estimate
    pub fn new(pixel: Pixel, lmk_id: LandmarkId) -> Self {
        Self {
            pixel,
            status: KeypointStatus::Valid,
            lmk_id: Some(lmk_id),
            point_cam: None,
        }
    }

    /// Attach a stereo estimate expressed in the left camera frame
    pub fn with_point_cam(mut self, point_cam: Point3d) -> Self {
        self.point_cam = Some(point_cam);
        self
    }

    /// Override the tracking status
    pub fn with_status(mut self, status: KeypointStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the keypoint is valid and owned by a landmark
    pub fn is_valid_landmark(&self) -> bool {
        self.status == KeypointStatus::Valid && self.lmk_id.is_some()
    }
}

/// Image dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether a pixel lies inside `[0, width) x [0, height)`
    pub fn contains(&self, pixel: &Pixel) -> bool {
        pixel.x.is_finite()
            && pixel.y.is_finite()
            && pixel.x >= 0.0
            && pixel.y >= 0.0
            && pixel.x < self.width as f64
            && pixel.y < self.height as f64
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::new(752, 480)
    }
}

/// GPU friendly vertex record for indexed mesh buffers
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[repr(C)]
pub struct GpuVertex {
    pub position: [f32; 3],
}

unsafe impl Pod for GpuVertex {}
unsafe impl Zeroable for GpuVertex {}

impl From<&Point3d> for GpuVertex {
    fn from(p: &Point3d) -> Self {
        Self {
            position: [p.x as f32, p.y as f32, p.z as f32],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_size_contains() {
        let size = ImageSize::new(100, 50);
        assert!(size.contains(&Pixel::new(0.0, 0.0)));
        assert!(size.contains(&Pixel::new(99.5, 49.9)));
        assert!(!size.contains(&Pixel::new(100.0, 10.0)));
        assert!(!size.contains(&Pixel::new(-0.1, 10.0)));
        assert!(!size.contains(&Pixel::new(f64::NAN, 10.0)));
    }

    #[test]
    fn test_keypoint_builders() {
        let kp = KeypointObservation::new(Pixel::new(1.0, 2.0), 7)
            .with_point_cam(Point3d::new(0.0, 0.0, 3.0));
        assert!(kp.is_valid_landmark());
        assert_eq!(kp.point_cam, Some(Point3d::new(0.0, 0.0, 3.0)));

        let lost = kp.with_status(KeypointStatus::Invalid);
        assert!(!lost.is_valid_landmark());
    }
}
