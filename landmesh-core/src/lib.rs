//! Core data structures for landmesh
//!
//! This crate provides the fundamental types shared by the mesher and the
//! pipeline stage: landmark ids and keypoint observations, the indexed
//! landmark mesh, planes, histograms and a few geometric helpers.

pub mod error;
pub mod geometry;
pub mod histogram;
pub mod mesh;
pub mod plane;
pub mod point;
pub mod transform;

pub use error::*;
pub use geometry::*;
pub use histogram::*;
pub use mesh::*;
pub use plane::*;
pub use point::*;
pub use transform::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Isometry3, Point2, Point3, Unit, UnitQuaternion, Vector3};
