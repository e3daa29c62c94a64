//! Packets consumed by the mesher
//!
//! The synchronized input shares ownership of the frontend and backend
//! packets it was built from, so it can outlive the queues they came from.

use landmesh_core::{Error, KeypointObservation, PointsWithIdMap, Pose3, Result, Timestamp};
use ndarray::Array2;
use std::sync::Arc;

/// Per-frame output of the feature tracker
#[derive(Debug, Clone)]
pub struct FrontendOutput {
    pub timestamp: Timestamp,
    pub keypoints: Vec<KeypointObservation>,
    /// Rectified left image, row major
    pub left_image: Option<Arc<Array2<u8>>>,
}

impl FrontendOutput {
    pub fn new(timestamp: Timestamp, keypoints: Vec<KeypointObservation>) -> Self {
        Self {
            timestamp,
            keypoints,
            left_image: None,
        }
    }

    pub fn with_left_image(mut self, image: Arc<Array2<u8>>) -> Self {
        self.left_image = Some(image);
        self
    }
}

/// Per-keyframe output of the estimator
#[derive(Debug, Clone)]
pub struct BackendOutput {
    pub timestamp: Timestamp,
    /// Pose of the body in the world frame
    pub w_pose_b: Pose3,
    /// Landmarks currently in the optimization time horizon
    pub points_with_id: PointsWithIdMap,
}

impl BackendOutput {
    pub fn new(timestamp: Timestamp, w_pose_b: Pose3, points_with_id: PointsWithIdMap) -> Self {
        Self {
            timestamp,
            w_pose_b,
            points_with_id,
        }
    }
}

/// Frontend and backend data paired on the same timestamp
#[derive(Debug, Clone)]
pub struct MesherInput {
    timestamp: Timestamp,
    frontend: Arc<FrontendOutput>,
    backend: Arc<BackendOutput>,
}

impl MesherInput {
    /// Pair two packets. Both must carry `timestamp`.
    pub fn new(timestamp: Timestamp, frontend: Arc<FrontendOutput>, backend: Arc<BackendOutput>) -> Result<Self> {
        if frontend.timestamp != timestamp || backend.timestamp != timestamp {
            return Err(Error::InvalidData(format!(
                "Cannot pair frontend packet at {} with backend packet at {} for timestamp {}",
                frontend.timestamp, backend.timestamp, timestamp
            )));
        }
        Ok(Self {
            timestamp,
            frontend,
            backend,
        })
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn frontend(&self) -> &FrontendOutput {
        &self.frontend
    }

    pub fn backend(&self) -> &BackendOutput {
        &self.backend
    }

    pub fn keypoints(&self) -> &[KeypointObservation] {
        &self.frontend.keypoints
    }

    pub fn points_with_id(&self) -> &PointsWithIdMap {
        &self.backend.points_with_id
    }

    pub fn w_pose_b(&self) -> &Pose3 {
        &self.backend.w_pose_b
    }

    pub fn left_image(&self) -> Option<&Array2<u8>> {
        self.frontend.left_image.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_requires_matching_timestamps() {
        let frontend = Arc::new(FrontendOutput::new(5, Vec::new()));
        let backend = Arc::new(BackendOutput::new(5, Pose3::identity(), PointsWithIdMap::new()));
        let input = MesherInput::new(5, frontend.clone(), backend.clone()).unwrap();
        assert_eq!(input.timestamp(), 5);
        assert!(input.keypoints().is_empty());
        assert!(input.left_image().is_none());
        assert_eq!(Arc::strong_count(&frontend), 2);

        let stale = Arc::new(FrontendOutput::new(4, Vec::new()));
        assert!(matches!(MesherInput::new(5, stale, backend), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_input_outlives_producer_handles() {
        let image = Arc::new(Array2::<u8>::zeros((4, 6)));
        let input = {
            let frontend = Arc::new(FrontendOutput::new(7, Vec::new()).with_left_image(image));
            let backend = Arc::new(BackendOutput::new(7, Pose3::identity(), PointsWithIdMap::new()));
            MesherInput::new(7, frontend, backend).unwrap()
        };
        assert_eq!(input.left_image().map(|i| i.dim()), Some((4, 6)));
    }
}
