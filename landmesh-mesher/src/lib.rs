//! Landmark mesher for landmesh
//!
//! Builds a 3D triangle mesh over the landmarks of a sliding-window
//! visual-inertial estimator and segments it into tracked planes:
//! - 2D Delaunay triangulation of tracked keypoints
//! - lifting to 3D landmarks and geometric triangle filtering
//! - time-horizon mesh maintenance
//! - histogram based floor and wall segmentation

pub mod factory;
pub mod filter;
pub mod input;
pub mod mesher;
pub mod params;
pub mod segmentation;
pub mod triangulation;
pub mod viz;

pub use factory::*;
pub use filter::*;
pub use input::*;
pub use mesher::*;
pub use params::*;
pub use segmentation::*;
pub use triangulation::*;
pub use viz::*;
