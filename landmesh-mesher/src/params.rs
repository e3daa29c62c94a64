//! Mesher configuration
//!
//! Defaults follow the values the mesher has been tuned with on indoor
//! stereo-inertial datasets.

use landmesh_core::{Error, HistogramAxis, ImageSize, PeakParams, Pose3, Result, Vector3d};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Thresholds used to reject degenerate or unreliable triangles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangleFilterParams {
    /// Minimum ratio between the smallest and the largest side
    pub min_ratio_smallest_largest_side: f64,
    /// Minimum ratio between tangential and radial displacement
    pub min_elongation_ratio: f64,
    /// Maximum length of any side, in meters
    pub max_triangle_side: f64,
}

impl Default for TriangleFilterParams {
    fn default() -> Self {
        Self {
            min_ratio_smallest_largest_side: 0.5,
            min_elongation_ratio: 0.5,
            max_triangle_side: 0.5,
        }
    }
}

impl TriangleFilterParams {
    pub fn with_min_side_ratio(mut self, ratio: f64) -> Self {
        self.min_ratio_smallest_largest_side = ratio;
        self
    }

    pub fn with_min_elongation_ratio(mut self, ratio: f64) -> Self {
        self.min_elongation_ratio = ratio;
        self
    }

    pub fn with_max_triangle_side(mut self, side: f64) -> Self {
        self.max_triangle_side = side;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_ratio_smallest_largest_side) {
            return Err(Error::InvalidConfig(format!(
                "min_ratio_smallest_largest_side must be in [0, 1], got {}",
                self.min_ratio_smallest_largest_side
            )));
        }
        if !(self.min_elongation_ratio >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "min_elongation_ratio must be non-negative, got {}",
                self.min_elongation_ratio
            )));
        }
        if !(self.max_triangle_side > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "max_triangle_side must be positive, got {}",
                self.max_triangle_side
            )));
        }
        Ok(())
    }
}

/// Histogram of polygon heights used to seed horizontal planes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightHistogramParams {
    pub axis: HistogramAxis,
    pub peaks: PeakParams,
}

impl Default for HeightHistogramParams {
    fn default() -> Self {
        Self {
            axis: HistogramAxis::new(512, -6.0, 6.0),
            peaks: PeakParams {
                min_count: 50.0,
                min_separation: 4,
                max_peaks: Some(3),
                smoothing_window: 3,
            },
        }
    }
}

/// Histogram of wall azimuth and offset used to seed vertical planes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WallHistogramParams {
    /// Azimuth axis, normally circular over `[0, 2π)`
    pub theta_axis: HistogramAxis,
    /// Distance to the origin, in meters. Walls are voted with a normal
    /// oriented so that this is never negative.
    pub distance_axis: HistogramAxis,
    pub peaks: PeakParams,
}

impl Default for WallHistogramParams {
    fn default() -> Self {
        Self {
            theta_axis: HistogramAxis::circular(80, 0.0, TAU),
            distance_axis: HistogramAxis::new(20, 0.0, 6.0),
            peaks: PeakParams {
                min_count: 20.0,
                min_separation: 5,
                max_peaks: Some(2),
                smoothing_window: 3,
            },
        }
    }
}

/// What to do with tracked planes that nothing associated with this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnmatchedPlanePolicy {
    /// Never drop a tracked plane
    KeepForever,
    /// Drop a plane after this many consecutive cycles without association
    EvictAfter(usize),
}

impl Default for UnmatchedPlanePolicy {
    fn default() -> Self {
        Self::KeepForever
    }
}

/// Plane segmentation and data association parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneSegmentationParams {
    /// Gravity aligned "up" direction in the world frame
    pub vertical: Vector3d,
    pub normal_tolerance_horizontal_surface: f64,
    pub normal_tolerance_walls: f64,
    pub normal_tolerance_polygon_plane_association: f64,
    pub distance_tolerance_polygon_plane_association: f64,
    pub normal_tolerance_plane_plane_association: f64,
    pub distance_tolerance_plane_plane_association: f64,
    /// Associate each polygon with at most one plane, the closest match
    pub only_associate_a_polygon_to_a_single_plane: bool,
    /// Blend matched segmentation candidates into the tracked plane
    pub refine_matched_planes: bool,
    /// Blend weight used when `refine_matched_planes` is set
    pub refinement_weight: f64,
    pub unmatched_plane_policy: UnmatchedPlanePolicy,
    pub height_histogram: HeightHistogramParams,
    pub wall_histogram: WallHistogramParams,
}

impl Default for PlaneSegmentationParams {
    fn default() -> Self {
        Self {
            vertical: Vector3d::z(),
            normal_tolerance_horizontal_surface: 0.011,
            normal_tolerance_walls: 0.0165,
            normal_tolerance_polygon_plane_association: 0.011,
            distance_tolerance_polygon_plane_association: 0.10,
            normal_tolerance_plane_plane_association: 0.011,
            distance_tolerance_plane_plane_association: 0.20,
            only_associate_a_polygon_to_a_single_plane: true,
            refine_matched_planes: false,
            refinement_weight: 0.1,
            unmatched_plane_policy: UnmatchedPlanePolicy::KeepForever,
            height_histogram: HeightHistogramParams::default(),
            wall_histogram: WallHistogramParams::default(),
        }
    }
}

impl PlaneSegmentationParams {
    pub fn with_vertical(mut self, vertical: Vector3d) -> Self {
        self.vertical = vertical;
        self
    }

    pub fn with_unmatched_plane_policy(mut self, policy: UnmatchedPlanePolicy) -> Self {
        self.unmatched_plane_policy = policy;
        self
    }

    pub fn with_single_plane_association(mut self, single: bool) -> Self {
        self.only_associate_a_polygon_to_a_single_plane = single;
        self
    }

    pub fn with_refinement(mut self, weight: f64) -> Self {
        self.refine_matched_planes = true;
        self.refinement_weight = weight;
        self
    }

    pub fn with_height_peaks(mut self, peaks: PeakParams) -> Self {
        self.height_histogram.peaks = peaks;
        self
    }

    pub fn with_wall_peaks(mut self, peaks: PeakParams) -> Self {
        self.wall_histogram.peaks = peaks;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.vertical.norm() > f64::EPSILON) || !self.vertical.iter().all(|c| c.is_finite()) {
            return Err(Error::InvalidConfig("vertical direction must be a finite non-zero vector".to_string()));
        }
        let tolerances = [
            ("normal_tolerance_horizontal_surface", self.normal_tolerance_horizontal_surface),
            ("normal_tolerance_walls", self.normal_tolerance_walls),
            ("normal_tolerance_polygon_plane_association", self.normal_tolerance_polygon_plane_association),
            ("normal_tolerance_plane_plane_association", self.normal_tolerance_plane_plane_association),
        ];
        for (name, value) in tolerances {
            if !(value > 0.0 && value <= 1.0) {
                return Err(Error::InvalidConfig(format!("{} must be in (0, 1], got {}", name, value)));
            }
        }
        let distances = [
            ("distance_tolerance_polygon_plane_association", self.distance_tolerance_polygon_plane_association),
            ("distance_tolerance_plane_plane_association", self.distance_tolerance_plane_plane_association),
        ];
        for (name, value) in distances {
            if !(value > 0.0) {
                return Err(Error::InvalidConfig(format!("{} must be positive, got {}", name, value)));
            }
        }
        if !(0.0..=1.0).contains(&self.refinement_weight) {
            return Err(Error::InvalidConfig(format!(
                "refinement_weight must be in [0, 1], got {}",
                self.refinement_weight
            )));
        }
        Ok(())
    }
}

/// Configuration of a [`crate::Mesher`], fixed for the process lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MesherParams {
    /// Pose of the rectified left camera in the body frame
    pub b_pose_cam: Pose3,
    /// Size of the images used for 2D triangulation
    pub img_size: ImageSize,
    pub triangle_filter: TriangleFilterParams,
    /// Densify with stereo points that the estimator has not absorbed yet
    pub add_extra_lmks_from_stereo: bool,
    /// Segment and track planes every cycle when set
    pub plane_segmentation: Option<PlaneSegmentationParams>,
}

impl Default for MesherParams {
    fn default() -> Self {
        Self {
            b_pose_cam: Pose3::identity(),
            img_size: ImageSize::default(),
            triangle_filter: TriangleFilterParams::default(),
            add_extra_lmks_from_stereo: true,
            plane_segmentation: None,
        }
    }
}

impl MesherParams {
    pub fn new(b_pose_cam: Pose3, img_size: ImageSize) -> Self {
        Self {
            b_pose_cam,
            img_size,
            ..Default::default()
        }
    }

    pub fn with_triangle_filter(mut self, triangle_filter: TriangleFilterParams) -> Self {
        self.triangle_filter = triangle_filter;
        self
    }

    pub fn with_extra_stereo_landmarks(mut self, enabled: bool) -> Self {
        self.add_extra_lmks_from_stereo = enabled;
        self
    }

    pub fn with_plane_segmentation(mut self, params: PlaneSegmentationParams) -> Self {
        self.plane_segmentation = Some(params);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.img_size.width == 0 || self.img_size.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "image size must be non-empty, got {}x{}",
                self.img_size.width, self.img_size.height
            )));
        }
        self.triangle_filter.validate()?;
        if let Some(planes) = &self.plane_segmentation {
            planes.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MesherParams::default().validate().is_ok());
        assert!(MesherParams::default()
            .with_plane_segmentation(PlaneSegmentationParams::default())
            .validate()
            .is_ok());
    }

    #[test]
    fn test_invalid_triangle_filter() {
        let params = MesherParams::default()
            .with_triangle_filter(TriangleFilterParams::default().with_max_triangle_side(0.0));
        assert!(matches!(params.validate(), Err(Error::InvalidConfig(_))));

        let params = MesherParams::default()
            .with_triangle_filter(TriangleFilterParams::default().with_min_side_ratio(1.5));
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_invalid_plane_params() {
        let params = MesherParams::default()
            .with_plane_segmentation(PlaneSegmentationParams::default().with_vertical(Vector3d::zeros()));
        assert!(params.validate().is_err());

        let mut planes = PlaneSegmentationParams::default();
        planes.distance_tolerance_polygon_plane_association = -1.0;
        assert!(planes.validate().is_err());
    }

    #[test]
    fn test_empty_image_rejected() {
        let params = MesherParams::new(Pose3::identity(), ImageSize::new(0, 480));
        assert!(params.validate().is_err());
    }
}
