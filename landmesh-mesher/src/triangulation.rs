//! 2D Delaunay triangulation of tracked keypoints
//!
//! Keypoints are triangulated in the image plane with `spade`. Each inserted
//! vertex carries its landmark id, so triangles map back to landmarks without
//! any position matching.

use landmesh_core::{ImageSize, KeypointObservation, KeypointStatus, LandmarkId, Pixel, PointsWithIdMap, Triangle2D};
use spade::{DelaunayTriangulation, HasPosition, Point2, Triangulation};
use std::collections::HashSet;
use tracing::warn;

/// A keypoint inserted into the triangulation
#[derive(Debug, Clone, Copy, PartialEq)]
struct KeypointVertex {
    pixel: Pixel,
    lmk_id: LandmarkId,
}

impl HasPosition for KeypointVertex {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        Point2::new(self.pixel.x, self.pixel.y)
    }
}

/// A triangle over three keypoints, each bound to a landmark
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkTriangle2D {
    pub pixels: Triangle2D,
    pub lmk_ids: [LandmarkId; 3],
}

/// Triangulate `pixels` bound to landmark ids.
///
/// Points outside `img_size` are ignored, and a pixel already taken keeps its
/// first landmark. Fewer than three usable points yield no triangles.
pub fn delaunay_triangulation_2d(
    pixels: impl IntoIterator<Item = (Pixel, LandmarkId)>,
    img_size: &ImageSize,
) -> Vec<LandmarkTriangle2D> {
    let mut triangulation: DelaunayTriangulation<KeypointVertex> = DelaunayTriangulation::new();
    let mut seen: HashSet<(u64, u64)> = HashSet::new();

    for (pixel, lmk_id) in pixels {
        if !img_size.contains(&pixel) {
            continue;
        }
        if !seen.insert((pixel.x.to_bits(), pixel.y.to_bits())) {
            continue;
        }
        if let Err(e) = triangulation.insert(KeypointVertex { pixel, lmk_id }) {
            warn!(lmk_id, ?e, "Skipping keypoint rejected by the triangulation");
        }
    }

    if triangulation.num_vertices() < 3 {
        return Vec::new();
    }

    triangulation
        .inner_faces()
        .map(|face| {
            let [a, b, c] = face.vertices().map(|v| *v.data());
            LandmarkTriangle2D {
                pixels: [a.pixel, b.pixel, c.pixel],
                lmk_ids: [a.lmk_id, b.lmk_id, c.lmk_id],
            }
        })
        .collect()
}

/// Triangulate the keypoints of a frame whose landmarks can be resolved.
///
/// A keypoint is used if it is valid, owned by a landmark present in
/// `points_with_id` and inside the image.
pub fn create_mesh_2d(
    keypoints: &[KeypointObservation],
    img_size: &ImageSize,
    points_with_id: &PointsWithIdMap,
) -> Vec<LandmarkTriangle2D> {
    let usable = keypoints.iter().filter_map(|kp| {
        if kp.status != KeypointStatus::Valid {
            return None;
        }
        let lmk_id = kp.lmk_id?;
        points_with_id.contains_key(&lmk_id).then_some((kp.pixel, lmk_id))
    });
    delaunay_triangulation_2d(usable, img_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use landmesh_core::Point3d;

    fn keypoint(x: f64, y: f64, id: LandmarkId) -> KeypointObservation {
        KeypointObservation::new(Pixel::new(x, y), id)
    }

    #[test]
    fn test_single_triangle() {
        let triangles = delaunay_triangulation_2d(
            vec![
                (Pixel::new(10.0, 10.0), 1),
                (Pixel::new(50.0, 10.0), 2),
                (Pixel::new(30.0, 40.0), 3),
            ],
            &ImageSize::new(100, 100),
        );

        assert_eq!(triangles.len(), 1);
        let mut ids = triangles[0].lmk_ids;
        ids.sort_unstable();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn test_square_with_center() {
        let triangles = delaunay_triangulation_2d(
            vec![
                (Pixel::new(0.0, 0.0), 1),
                (Pixel::new(20.0, 0.0), 2),
                (Pixel::new(20.0, 20.0), 3),
                (Pixel::new(0.0, 20.0), 4),
                (Pixel::new(10.0, 10.0), 5),
            ],
            &ImageSize::new(100, 100),
        );

        assert_eq!(triangles.len(), 4);
        assert!(triangles.iter().all(|t| t.lmk_ids.contains(&5)));
    }

    #[test]
    fn test_too_few_points() {
        let triangles = delaunay_triangulation_2d(
            vec![(Pixel::new(0.0, 0.0), 1), (Pixel::new(20.0, 0.0), 2)],
            &ImageSize::new(100, 100),
        );
        assert!(triangles.is_empty());
        assert!(delaunay_triangulation_2d(Vec::new(), &ImageSize::new(10, 10)).is_empty());
    }

    #[test]
    fn test_points_outside_image_and_duplicates_ignored() {
        let triangles = delaunay_triangulation_2d(
            vec![
                (Pixel::new(10.0, 10.0), 1),
                (Pixel::new(50.0, 10.0), 2),
                (Pixel::new(30.0, 40.0), 3),
                (Pixel::new(30.0, 40.0), 4),
                (Pixel::new(150.0, 40.0), 5),
            ],
            &ImageSize::new(100, 100),
        );

        assert_eq!(triangles.len(), 1);
        assert!(triangles[0].lmk_ids.contains(&3), "First landmark wins");
        assert!(!triangles[0].lmk_ids.contains(&4));
    }

    #[test]
    fn test_create_mesh_2d_filters_keypoints() {
        let mut points = PointsWithIdMap::new();
        for id in 1..=4 {
            points.insert(id, Point3d::new(id as f64, 0.0, 5.0));
        }

        let keypoints = vec![
            keypoint(10.0, 10.0, 1),
            keypoint(50.0, 10.0, 2),
            keypoint(30.0, 40.0, 3),
            // Not valid
            keypoint(60.0, 60.0, 4).with_status(KeypointStatus::Invalid),
            // Unknown landmark
            keypoint(5.0, 60.0, 99),
            // No landmark at all
            KeypointObservation {
                pixel: Pixel::new(80.0, 80.0),
                status: KeypointStatus::Valid,
                lmk_id: None,
                point_cam: None,
            },
        ];

        let triangles = create_mesh_2d(&keypoints, &ImageSize::new(100, 100), &points);
        assert_eq!(triangles.len(), 1);
        let mut ids = triangles[0].lmk_ids;
        ids.sort_unstable();
        assert_eq!(ids, [1, 2, 3]);
    }
}
