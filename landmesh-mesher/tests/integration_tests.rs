//! Integration tests for landmesh-mesher
//!
//! These tests run full mesher cycles on synthetic scenes observed by a
//! pinhole camera and check the mesh and plane outputs.

use landmesh_core::{
    min_max_side, transform_to, KeypointObservation, LandmarkId, Pixel, Point3d, PointsWithIdMap, Pose3, Vector3d,
};
use landmesh_mesher::*;
use rand::prelude::*;
use std::sync::Arc;

const FOCAL: f64 = 400.0;

/// Project a point given in the camera frame
fn project(point_cam: &Point3d) -> Pixel {
    Pixel::new(
        FOCAL * point_cam.x / point_cam.z + 376.0,
        FOCAL * point_cam.y / point_cam.z + 240.0,
    )
}

/// Observe every landmark of `points` from `w_pose_cam`
fn observe(points: &PointsWithIdMap, w_pose_cam: &Pose3) -> Vec<KeypointObservation> {
    let mut ids: Vec<_> = points.keys().copied().collect();
    ids.sort_unstable();
    ids.into_iter()
        .filter_map(|id| {
            let point_cam = transform_to(w_pose_cam, &points[&id]);
            (point_cam.z > 0.1).then(|| KeypointObservation::new(project(&point_cam), id))
        })
        .collect()
}

fn make_input(timestamp: i64, points: PointsWithIdMap, keypoints: Vec<KeypointObservation>) -> MesherInput {
    let frontend = Arc::new(FrontendOutput::new(timestamp, keypoints));
    let backend = Arc::new(BackendOutput::new(timestamp, Pose3::identity(), points));
    MesherInput::new(timestamp, frontend, backend).unwrap()
}

/// Fronto-parallel grid of `(n + 1)^2` landmarks at depth `z`
fn create_test_grid(n: usize, z: f64) -> PointsWithIdMap {
    let half = n as f64 * 0.1;
    let mut points = PointsWithIdMap::new();
    for i in 0..=n {
        for j in 0..=n {
            let id = (i * (n + 1) + j) as LandmarkId;
            points.insert(id, Point3d::new(i as f64 * 0.2 - half, j as f64 * 0.2 - half, z));
        }
    }
    points
}

#[test]
fn test_three_landmarks_give_one_polygon() {
    let points = PointsWithIdMap::from([
        (10, Point3d::new(-0.1, -0.05, 2.0)),
        (20, Point3d::new(0.1, -0.05, 2.0)),
        (30, Point3d::new(0.0, 0.12, 2.0)),
    ]);
    let keypoints = observe(&points, &Pose3::identity());
    let mut mesher = MesherFactory::create_mesher(MesherType::Projective, MesherParams::default()).unwrap();

    let output = mesher.spin_once(&make_input(1, points, keypoints));

    assert_eq!(output.mesh_3d.polygon_count(), 1);
    assert_eq!(output.mesh_3d.vertex_count(), 3);
    assert!(output.mesh_3d.contains_polygon([10, 20, 30]));
    let polygon = output.mesh_3d.polygon(0).unwrap();
    let mut ids = polygon.map(|v| v.lmk_id);
    ids.sort_unstable();
    assert_eq!(ids, [10, 20, 30]);
    assert_eq!(output.indexed.index_buffer().len(), 3);
}

#[test]
fn test_grid_is_fully_meshed() {
    let points = create_test_grid(4, 3.0);
    let keypoints = observe(&points, &Pose3::identity());
    let mut mesher = Mesher::new(MesherParams::default()).unwrap();

    let output = mesher.spin_once(&make_input(1, points, keypoints));

    assert_eq!(output.mesh_2d_for_viz.len(), 32);
    assert_eq!(output.mesh_2d_filtered_for_viz.len(), 32);
    assert_eq!(output.mesh_3d.polygon_count(), 32);
    assert_eq!(output.mesh_3d.vertex_count(), 25);
}

#[test]
fn test_landmark_leaving_window_is_dropped() {
    let points = create_test_grid(4, 3.0);
    let keypoints = observe(&points, &Pose3::identity());
    let mut mesher = Mesher::new(MesherParams::default()).unwrap();
    mesher.spin_once(&make_input(1, points.clone(), keypoints));
    let center: LandmarkId = 12;
    assert!(mesher.mesh_3d().vertex_by_landmark(center).is_some());

    // The landmark leaves the optimization window but is still tracked
    let mut next = points.clone();
    next.remove(&center);
    let keypoints = observe(&points, &Pose3::identity());
    let output = mesher.spin_once(&make_input(2, next, keypoints));

    assert!(output.mesh_3d.vertex_by_landmark(center).is_none());
    assert!(output
        .mesh_3d
        .iter_polygons()
        .all(|polygon| polygon.iter().all(|v| v.lmk_id != center)));
    assert!(output.mesh_3d.polygon_count() > 0);
}

#[test]
fn test_polygons_persist_within_window() {
    let points = create_test_grid(4, 3.0);
    let mut mesher = Mesher::new(MesherParams::default()).unwrap();
    mesher.spin_once(&make_input(1, points.clone(), observe(&points, &Pose3::identity())));

    // No keypoints this frame: the mesh is carried over from the window
    let update = mesher.update_mesh_3d(&points, &[], &Pose3::identity());
    assert_eq!(update.stats.polygons_kept, 32);
    assert_eq!(update.stats.polygons_added, 0);
    assert_eq!(mesher.mesh_3d().polygon_count(), 32);

    // An empty window empties the mesh
    let update = mesher.update_mesh_3d(&PointsWithIdMap::new(), &[], &Pose3::identity());
    assert_eq!(update.stats.polygons_dropped, 32);
    assert!(mesher.mesh_3d().is_empty());
}

#[test]
fn test_retained_triangles_pass_every_test() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut points = PointsWithIdMap::new();
    for id in 0..200 {
        points.insert(
            id,
            Point3d::new(rng.gen_range(-1.5..1.5), rng.gen_range(-1.0..1.0), rng.gen_range(2.0..4.0)),
        );
    }
    let keypoints = observe(&points, &Pose3::identity());
    let params = TriangleFilterParams::default();
    let mut mesher = Mesher::new(MesherParams::default()).unwrap();

    let update = mesher.update_mesh_3d(&points, &keypoints, &Pose3::identity());

    assert!(update.stats.raw_triangles > 0);
    assert_eq!(
        update.stats.raw_triangles,
        update.stats.polygons_added + update.stats.rejected.total() + update.stats.unresolved_triangles
    );
    let filter = TriangleFilter::new(params);
    for polygon in mesher.mesh_3d().iter_polygons() {
        let [a, b, c] = polygon.map(|v| v.position);
        let (min_side, max_side) = min_max_side(&a, &b, &c);
        assert!(min_side / max_side >= params.min_ratio_smallest_largest_side);
        assert!(max_side <= params.max_triangle_side);
        let ratio = tangential_radial_ratio(&[a, b, c], &Pose3::identity()).unwrap();
        assert!(ratio >= params.min_elongation_ratio);
        assert!(!filter.is_bad_triangle(&[a, b, c], &Pose3::identity()));
    }
}

#[test]
fn test_segments_ceiling_plane() {
    let points = create_test_grid(8, 3.0);
    let keypoints = observe(&points, &Pose3::identity());
    let params = MesherParams::default().with_plane_segmentation(PlaneSegmentationParams::default());
    let mut mesher = Mesher::new(params).unwrap();

    let output = mesher.spin_once(&make_input(1, points.clone(), keypoints.clone()));

    assert_eq!(output.mesh_3d.polygon_count(), 128);
    let planes = output.planes.unwrap();
    assert_eq!(planes.len(), 1);
    assert_eq!(planes[0].orientation, landmesh_core::PlaneOrientation::Horizontal);
    assert!((planes[0].distance - 3.0).abs() < 0.05);
    assert_eq!(planes[0].lmk_ids.len(), 81);
    assert_eq!(planes[0].triangle_cluster.triangle_ids.len(), 128);

    let clusters: Vec<_> = planes.iter().map(|p| p.triangle_cluster.clone()).collect();
    let lmk_ids = mesher.extract_lmk_ids_from_triangle_clusters(&clusters, &points);
    assert_eq!(lmk_ids, (0..81).collect::<Vec<LandmarkId>>());

    // Same input again: same plane, same landmarks
    let again = mesher.spin_once(&make_input(2, points, keypoints)).planes.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].id, planes[0].id);
    assert_eq!(again[0].lmk_ids, planes[0].lmk_ids);
}

#[test]
fn test_viz_properties_follow_vertices() {
    let points = create_test_grid(4, 3.0);
    let keypoints = observe(&points, &Pose3::identity());
    let mut mesher = MesherFactory::create_mesher_by_name("projective", MesherParams::default()).unwrap();
    mesher.set_viz_properties_provider(Box::new(HeightColorizer::new(Vector3d::y())));

    let output = mesher.spin_once(&make_input(1, points, keypoints));

    let properties = output.viz_properties.unwrap();
    assert_eq!(properties.colors.len(), output.mesh_3d.vertex_count());
    assert_eq!(output.indexed.colors.as_ref().map(Vec::len), Some(25));
    assert_eq!(output.indexed.vertex_bytes().len(), 25 * 12);
}
