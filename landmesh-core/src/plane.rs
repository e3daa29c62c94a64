//! Tracked plane hypotheses and triangle clusters

use crate::point::{LandmarkId, Point3d, Vector3d};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a tracked plane
pub type PlaneId = usize;

/// Orientation class of a plane relative to gravity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaneOrientation {
    /// Normal parallel to the vertical: floors, tables, ceilings
    Horizontal,
    /// Normal perpendicular to the vertical: walls
    Vertical,
}

/// A set of mesh polygons whose normals pass a tolerance test against `axis`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleCluster {
    pub axis: Vector3d,
    pub tolerance: f64,
    /// Polygon indices into the Mesh3D of the cycle that built the cluster
    pub triangle_ids: Vec<usize>,
}

impl TriangleCluster {
    pub fn new(axis: Vector3d, tolerance: f64) -> Self {
        Self {
            axis,
            tolerance,
            triangle_ids: Vec::new(),
        }
    }
}

/// A planar hypothesis `n . x = d` tracked across cycles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    pub id: PlaneId,
    pub orientation: PlaneOrientation,
    /// Unit normal
    pub normal: Vector3d,
    /// Signed distance from the origin along `normal`
    pub distance: f64,
    /// Landmarks accumulated on this plane
    pub lmk_ids: BTreeSet<LandmarkId>,
    /// Polygons of the latest mesh associated with this plane
    pub triangle_cluster: TriangleCluster,
    /// Consecutive cycles without any association
    pub missed_cycles: usize,
}

impl Plane {
    /// Create a plane with an empty landmark set. `normal` is normalized.
    pub fn new(id: PlaneId, orientation: PlaneOrientation, normal: Vector3d, distance: f64, tolerance: f64) -> Self {
        let normal = normal.normalize();
        Self {
            id,
            orientation,
            normal,
            distance,
            lmk_ids: BTreeSet::new(),
            triangle_cluster: TriangleCluster::new(normal, tolerance),
            missed_cycles: 0,
        }
    }

    /// Signed distance of `point` to the plane
    pub fn signed_distance(&self, point: &Point3d) -> f64 {
        self.normal.dot(&point.coords) - self.distance
    }

    /// Unsigned distance of `point` to the plane
    pub fn point_distance(&self, point: &Point3d) -> f64 {
        self.signed_distance(point).abs()
    }

    /// Whether `(normal, distance)` describes the same plane as `self` within
    /// the given tolerances. `(n, d)` and `(-n, -d)` are the same plane.
    pub fn geometric_equal_to(&self, normal: &Vector3d, distance: f64, normal_tolerance: f64, distance_tolerance: f64) -> bool {
        let dot = self.normal.dot(normal);
        if dot > 1.0 - normal_tolerance {
            (self.distance - distance).abs() < distance_tolerance
        } else if dot < -1.0 + normal_tolerance {
            (self.distance + distance).abs() < distance_tolerance
        } else {
            false
        }
    }

    /// Plane-to-plane version of [`Plane::geometric_equal_to`]
    pub fn geometric_equal(&self, other: &Plane, normal_tolerance: f64, distance_tolerance: f64) -> bool {
        self.geometric_equal_to(&other.normal, other.distance, normal_tolerance, distance_tolerance)
    }

    /// Running-average refinement towards `(normal, distance)`, sign aligned
    pub fn refine(&mut self, normal: &Vector3d, distance: f64, weight: f64) {
        let (normal, distance) = if self.normal.dot(normal) < 0.0 {
            (-normal, -distance)
        } else {
            (*normal, distance)
        };
        let w = weight.clamp(0.0, 1.0);
        let blended = self.normal * (1.0 - w) + normal * w;
        if blended.norm() > f64::EPSILON {
            self.normal = blended.normalize();
            self.triangle_cluster.axis = self.normal;
        }
        self.distance = self.distance * (1.0 - w) + distance * w;
    }
}
