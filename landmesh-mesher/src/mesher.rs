//! Incremental 3D mesh over the landmarks of the optimization window
//!
//! Each cycle the tracked keypoints of the left frame are triangulated in the
//! image, the triangles are lifted to their 3D landmarks, filtered, and
//! merged with the polygons of the previous cycle that are still alive.

use crate::filter::{TriangleFilter, TriangleRejection};
use crate::input::MesherInput;
use crate::params::MesherParams;
use crate::segmentation::{extract_lmk_ids_from_triangle_clusters, PlaneSegmenter, SegmentationStats};
use crate::triangulation::{create_mesh_2d, LandmarkTriangle2D};
use crate::viz::{Mesh3DVizProperties, MeshVizPropertiesProvider};
use landmesh_core::{
    left_camera_pose, transform_from, KeypointObservation, KeypointStatus, LandmarkId, Mesh2D, Mesh3D, Plane, Point3d,
    PointsWithIdMap, Pose3, Result, Timestamp, Triangle2D, TriangleCluster, TriangleMesh, Vertex,
};
use std::borrow::Cow;
use std::fmt;
use tracing::debug;

/// Rejected triangles, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RejectionCounts {
    pub degenerate: usize,
    pub elongated: usize,
    pub too_large: usize,
    pub edge_on: usize,
}

impl RejectionCounts {
    pub fn record(&mut self, rejection: TriangleRejection) {
        match rejection {
            TriangleRejection::Degenerate => self.degenerate += 1,
            TriangleRejection::Elongated => self.elongated += 1,
            TriangleRejection::TooLarge => self.too_large += 1,
            TriangleRejection::EdgeOn => self.edge_on += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.degenerate + self.elongated + self.too_large + self.edge_on
    }
}

/// Counters of a single mesh update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshUpdateStats {
    pub keypoints: usize,
    pub stereo_points_added: usize,
    pub raw_triangles: usize,
    /// Triangles with a landmark missing from the working points map
    pub unresolved_triangles: usize,
    pub rejected: RejectionCounts,
    /// Polygons carried over from the previous cycle
    pub polygons_kept: usize,
    /// Previous polygons dropped for a landmark out of the window or a failed filter
    pub polygons_dropped: usize,
    pub polygons_added: usize,
}

/// Result of [`Mesher::update_mesh_3d`]
#[derive(Debug, Clone, Default)]
pub struct MeshUpdate {
    /// Image-space mesh over the lifted triangles of this frame
    pub mesh_2d: Mesh2D,
    /// All 2D triangles, before lifting
    pub mesh_2d_for_viz: Vec<Triangle2D>,
    /// 2D triangles whose 3D polygon passed the filter
    pub mesh_2d_filtered_for_viz: Vec<Triangle2D>,
    pub stats: MeshUpdateStats,
}

/// Everything produced by one mesher cycle
#[derive(Debug, Clone)]
pub struct MesherOutput {
    pub timestamp: Timestamp,
    pub mesh_2d: Mesh2D,
    pub mesh_3d: Mesh3D,
    pub mesh_2d_for_viz: Vec<Triangle2D>,
    pub mesh_2d_filtered_for_viz: Vec<Triangle2D>,
    /// Flat vertex and index buffers of `mesh_3d`, colored when viz
    /// properties are available
    pub indexed: TriangleMesh,
    /// Tracked planes, when plane segmentation is configured
    pub planes: Option<Vec<Plane>>,
    /// Per-vertex properties, when a provider is installed
    pub viz_properties: Option<Mesh3DVizProperties>,
}

/// Builds and maintains the 3D mesh
pub struct Mesher {
    params: MesherParams,
    filter: TriangleFilter,
    mesh_3d: Mesh3D,
    segmenter: PlaneSegmenter,
    planes: Vec<Plane>,
    viz_provider: Option<Box<dyn MeshVizPropertiesProvider>>,
}

impl fmt::Debug for Mesher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mesher")
            .field("params", &self.params)
            .field("polygons", &self.mesh_3d.polygon_count())
            .field("planes", &self.planes.len())
            .field("viz_provider", &self.viz_provider.is_some())
            .finish()
    }
}

impl Mesher {
    pub fn new(params: MesherParams) -> Result<Self> {
        params.validate()?;
        let segmenter = PlaneSegmenter::new(params.plane_segmentation.clone().unwrap_or_default())?;
        Ok(Self {
            filter: TriangleFilter::new(params.triangle_filter),
            params,
            mesh_3d: Mesh3D::new(),
            segmenter,
            planes: Vec::new(),
            viz_provider: None,
        })
    }

    pub fn params(&self) -> &MesherParams {
        &self.params
    }

    /// The mesh as of the last update
    pub fn mesh_3d(&self) -> &Mesh3D {
        &self.mesh_3d
    }

    /// Planes tracked by [`Mesher::spin_once`]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn set_viz_properties_provider(&mut self, provider: Box<dyn MeshVizPropertiesProvider>) {
        self.viz_provider = Some(provider);
    }

    /// Run one full cycle on a synchronized input
    pub fn spin_once(&mut self, input: &MesherInput) -> MesherOutput {
        let update = self.update_mesh_3d(input.points_with_id(), input.keypoints(), input.w_pose_b());

        let planes = if self.params.plane_segmentation.is_some() {
            let mut planes = std::mem::take(&mut self.planes);
            self.cluster_planes_from_mesh(&mut planes, input.points_with_id());
            self.planes = planes;
            Some(self.planes.clone())
        } else {
            None
        };

        let viz_properties = self.viz_provider.as_ref().map(|provider| {
            provider.viz_properties(input.timestamp(), input.left_image(), &update.mesh_2d, &self.mesh_3d)
        });

        let mut indexed = self.mesh_3d.to_triangle_mesh();
        if let Some(properties) = &viz_properties {
            if properties.colors.len() == indexed.vertex_count() {
                indexed.set_colors(properties.colors.clone());
            }
        }

        debug!(
            timestamp = input.timestamp(),
            vertices = self.mesh_3d.vertex_count(),
            polygons = self.mesh_3d.polygon_count(),
            planes = planes.as_ref().map_or(0, Vec::len),
            "Mesher cycle done"
        );

        MesherOutput {
            timestamp: input.timestamp(),
            mesh_2d: update.mesh_2d,
            mesh_3d: self.mesh_3d.clone(),
            mesh_2d_for_viz: update.mesh_2d_for_viz,
            mesh_2d_filtered_for_viz: update.mesh_2d_filtered_for_viz,
            indexed,
            planes,
            viz_properties,
        }
    }

    /// Update the 3D mesh from the current optimization window, the keypoints
    /// of the left frame, and the body pose.
    pub fn update_mesh_3d(
        &mut self,
        points_with_id: &PointsWithIdMap,
        keypoints: &[KeypointObservation],
        w_pose_b: &Pose3,
    ) -> MeshUpdate {
        let w_pose_cam = left_camera_pose(w_pose_b, &self.params.b_pose_cam);
        let mut stats = MeshUpdateStats {
            keypoints: keypoints.len(),
            ..Default::default()
        };

        let mut working = Cow::Borrowed(points_with_id);
        if self.params.add_extra_lmks_from_stereo {
            stats.stereo_points_added = append_non_vio_stereo_points(keypoints, &w_pose_cam, working.to_mut());
        }

        let triangles = create_mesh_2d(keypoints, &self.params.img_size, &working);
        stats.raw_triangles = triangles.len();

        let mut mesh_2d = Mesh2D::new();
        let mut mesh_2d_filtered_for_viz = Vec::new();
        let mut accepted = Vec::new();
        for triangle in &triangles {
            let Some(lifted) = lift(triangle, &working) else {
                stats.unresolved_triangles += 1;
                continue;
            };
            mesh_2d.add_polygon([0, 1, 2].map(|k| Vertex::new(triangle.lmk_ids[k], triangle.pixels[k])));

            let positions = lifted.map(|v| v.position);
            match self.filter.check(&positions, &w_pose_cam) {
                Ok(()) => {
                    mesh_2d_filtered_for_viz.push(triangle.pixels);
                    accepted.push(lifted);
                }
                Err(rejection) => stats.rejected.record(rejection),
            }
        }

        self.update_polygon_mesh_to_time_horizon(&working, &w_pose_cam, accepted, &mut stats);

        debug!(
            keypoints = stats.keypoints,
            stereo_points = stats.stereo_points_added,
            triangles = stats.raw_triangles,
            unresolved = stats.unresolved_triangles,
            rejected = stats.rejected.total(),
            degenerate = stats.rejected.degenerate,
            elongated = stats.rejected.elongated,
            too_large = stats.rejected.too_large,
            edge_on = stats.rejected.edge_on,
            kept = stats.polygons_kept,
            dropped = stats.polygons_dropped,
            added = stats.polygons_added,
            "Updated 3D mesh"
        );

        MeshUpdate {
            mesh_2d,
            mesh_2d_for_viz: triangles.iter().map(|t| t.pixels).collect(),
            mesh_2d_filtered_for_viz,
            stats,
        }
    }

    /// Rebuild the mesh from the previous polygons whose landmarks are all
    /// still in `points_with_id`, then add `new_polygons`.
    fn update_polygon_mesh_to_time_horizon(
        &mut self,
        points_with_id: &PointsWithIdMap,
        w_pose_cam: &Pose3,
        new_polygons: Vec<[Vertex<Point3d>; 3]>,
        stats: &mut MeshUpdateStats,
    ) {
        let mut mesh = Mesh3D::new();
        for polygon in self.mesh_3d.iter_polygons() {
            let refreshed = polygon.map(|v| points_with_id.get(&v.lmk_id).map(|p| Vertex::new(v.lmk_id, *p)));
            let [Some(a), Some(b), Some(c)] = refreshed else {
                stats.polygons_dropped += 1;
                continue;
            };
            if self.filter.is_bad_triangle(&[a.position, b.position, c.position], w_pose_cam) {
                stats.polygons_dropped += 1;
                continue;
            }
            if mesh.add_polygon([a, b, c]) {
                stats.polygons_kept += 1;
            }
        }

        for polygon in new_polygons {
            if mesh.add_polygon(polygon) {
                stats.polygons_added += 1;
            }
        }
        self.mesh_3d = mesh;
    }

    /// Associate the polygons of the current mesh with `planes` and seed new
    /// ones. Uses the plane segmentation parameters, or their defaults when
    /// none are configured.
    pub fn cluster_planes_from_mesh(&mut self, planes: &mut Vec<Plane>, points_with_id: &PointsWithIdMap) -> SegmentationStats {
        let stats = self.segmenter.cluster_planes(&self.mesh_3d, planes, points_with_id);
        debug!(
            associated = stats.associated_polygons,
            horizontal_seeds = stats.horizontal_seeds,
            wall_seeds = stats.wall_seeds,
            new_planes = stats.new_planes,
            evicted = stats.evicted_planes,
            "Clustered planes"
        );
        stats
    }

    /// Landmarks of the current mesh referenced by `clusters`
    pub fn extract_lmk_ids_from_triangle_clusters(
        &self,
        clusters: &[TriangleCluster],
        points_with_id: &PointsWithIdMap,
    ) -> Vec<LandmarkId> {
        extract_lmk_ids_from_triangle_clusters(&self.mesh_3d, clusters, points_with_id)
    }
}

fn lift(triangle: &LandmarkTriangle2D, points_with_id: &PointsWithIdMap) -> Option<[Vertex<Point3d>; 3]> {
    let [a, b, c] = triangle.lmk_ids.map(|id| points_with_id.get(&id).map(|p| Vertex::new(id, *p)));
    Some([a?, b?, c?])
}

/// Add the stereo estimate of every valid keypoint whose landmark is not in
/// `points_with_id`, transformed to the world frame. Returns how many points
/// were added.
pub fn append_non_vio_stereo_points(
    keypoints: &[KeypointObservation],
    w_pose_cam: &Pose3,
    points_with_id: &mut PointsWithIdMap,
) -> usize {
    let mut added = 0;
    for keypoint in keypoints {
        if keypoint.status != KeypointStatus::Valid {
            continue;
        }
        let (Some(lmk_id), Some(point_cam)) = (keypoint.lmk_id, keypoint.point_cam) else {
            continue;
        };
        if points_with_id.contains_key(&lmk_id) {
            continue;
        }
        points_with_id.insert(lmk_id, transform_from(w_pose_cam, &point_cam));
        added += 1;
    }
    added
}
