//! Plane segmentation and plane/landmark association
//!
//! Every cycle the polygons of the 3D mesh are first associated with the
//! planes already tracked. The remaining horizontal and vertical polygons
//! vote in histograms whose peaks seed candidate planes; candidates that do
//! not match a tracked plane become new planes.

use crate::params::{PlaneSegmentationParams, UnmatchedPlanePolicy};
use landmesh_core::{
    centroid, direction_from_longitude, is_normal_around_axis, is_normal_perpendicular_to_axis, longitude,
    triangle_normal, Histogram, LandmarkId, Mesh3D, Plane, PlaneOrientation, Point3d, PointsWithIdMap,
    Result, TriangleCluster, Vector3d, Vertex,
};
use std::collections::BTreeSet;
use tracing::debug;

type Polygon3D = [Vertex<Point3d>; 3];

/// Counters of a single segmentation cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentationStats {
    /// Polygons associated with a tracked plane
    pub associated_polygons: usize,
    pub horizontal_seeds: usize,
    pub wall_seeds: usize,
    pub new_planes: usize,
    /// Polygons associated with planes created this cycle
    pub associated_to_new_planes: usize,
    pub evicted_planes: usize,
}

/// A plane hypothesis read off a histogram peak
#[derive(Debug, Clone, Copy, PartialEq)]
struct PlaneCandidate {
    orientation: PlaneOrientation,
    normal: Vector3d,
    distance: f64,
}

/// Segments planes out of a 3D mesh and keeps a set of tracked planes
/// up to date
#[derive(Debug, Clone)]
pub struct PlaneSegmenter {
    params: PlaneSegmentationParams,
    vertical: Vector3d,
    height_histogram: Histogram,
    wall_histogram: Histogram,
}

impl PlaneSegmenter {
    pub fn new(params: PlaneSegmentationParams) -> Result<Self> {
        params.validate()?;
        let height_histogram = Histogram::new(vec![params.height_histogram.axis])?;
        let wall_histogram = Histogram::new(vec![
            params.wall_histogram.theta_axis,
            params.wall_histogram.distance_axis,
        ])?;
        Ok(Self {
            vertical: params.vertical.normalize(),
            params,
            height_histogram,
            wall_histogram,
        })
    }

    pub fn params(&self) -> &PlaneSegmentationParams {
        &self.params
    }

    /// Associate the polygons of `mesh` with `planes`, seed new planes from
    /// the polygons left over, and apply the unmatched plane policy.
    ///
    /// Only landmarks present in `points_with_id` are added to a plane.
    /// Triangle clusters are rebuilt from scratch and index into `mesh`.
    pub fn cluster_planes(
        &mut self,
        mesh: &Mesh3D,
        planes: &mut Vec<Plane>,
        points_with_id: &PointsWithIdMap,
    ) -> SegmentationStats {
        let mut stats = SegmentationStats::default();

        for plane in planes.iter_mut() {
            plane.triangle_cluster.triangle_ids.clear();
        }
        let tracked = planes.len();
        let mut matched = vec![false; tracked];

        self.height_histogram.clear();
        self.wall_histogram.clear();

        let mut leftovers: Vec<(usize, Polygon3D, Vector3d)> = Vec::new();
        for (index, polygon) in mesh.iter_polygons().enumerate() {
            let [a, b, c] = polygon;
            let Some(normal) = triangle_normal(&a.position, &b.position, &c.position) else {
                continue;
            };

            if self.update_planes_lmk_ids_from_polygon(index, &polygon, &normal, planes, &mut matched, points_with_id) {
                stats.associated_polygons += 1;
                continue;
            }

            let center = centroid(&a.position, &b.position, &c.position);
            if is_normal_around_axis(&self.vertical, &normal, self.params.normal_tolerance_horizontal_surface) {
                if self.height_histogram.add(&[center.coords.dot(&self.vertical)]) {
                    stats.horizontal_seeds += 1;
                }
            } else if is_normal_perpendicular_to_axis(&self.vertical, &normal, self.params.normal_tolerance_walls) {
                let (theta, distance) = canonical_wall(&normal, normal.dot(&center.coords), &self.vertical);
                if self.wall_histogram.add(&[theta, distance]) {
                    stats.wall_seeds += 1;
                }
            }
            leftovers.push((index, polygon, normal));
        }

        for candidate in self.candidates() {
            let existing = planes.iter().position(|plane| {
                plane.geometric_equal_to(
                    &candidate.normal,
                    candidate.distance,
                    self.params.normal_tolerance_plane_plane_association,
                    self.params.distance_tolerance_plane_plane_association,
                )
            });
            match existing {
                Some(j) => {
                    if j < tracked {
                        matched[j] = true;
                    }
                    if self.params.refine_matched_planes {
                        planes[j].refine(&candidate.normal, candidate.distance, self.params.refinement_weight);
                    }
                }
                None => {
                    let id = planes.iter().map(|p| p.id + 1).max().unwrap_or(0);
                    debug!(
                        plane_id = id,
                        orientation = ?candidate.orientation,
                        distance = candidate.distance,
                        "New plane from segmentation"
                    );
                    planes.push(Plane::new(
                        id,
                        candidate.orientation,
                        candidate.normal,
                        candidate.distance,
                        self.params.normal_tolerance_polygon_plane_association,
                    ));
                    matched.push(true);
                    stats.new_planes += 1;
                }
            }
        }

        if planes.len() > tracked {
            let (_, new_planes) = planes.split_at_mut(tracked);
            let (_, new_matched) = matched.split_at_mut(tracked);
            for (index, polygon, normal) in &leftovers {
                if self.update_planes_lmk_ids_from_polygon(*index, polygon, normal, new_planes, new_matched, points_with_id) {
                    stats.associated_to_new_planes += 1;
                }
            }
        }

        stats.evicted_planes = self.apply_unmatched_plane_policy(planes, &matched);
        stats
    }

    /// Associate one polygon with the matching planes. Returns whether any
    /// plane took it.
    fn update_planes_lmk_ids_from_polygon(
        &self,
        index: usize,
        polygon: &Polygon3D,
        normal: &Vector3d,
        planes: &mut [Plane],
        matched: &mut [bool],
        points_with_id: &PointsWithIdMap,
    ) -> bool {
        let fits = |plane: &Plane| -> Option<f64> {
            if !is_normal_around_axis(&plane.normal, normal, self.params.normal_tolerance_polygon_plane_association) {
                return None;
            }
            let mut total = 0.0;
            for vertex in polygon {
                let distance = plane.point_distance(&vertex.position);
                if distance >= self.params.distance_tolerance_polygon_plane_association {
                    return None;
                }
                total += distance;
            }
            Some(total / 3.0)
        };

        let selected: Vec<usize> = if self.params.only_associate_a_polygon_to_a_single_plane {
            planes
                .iter()
                .enumerate()
                .filter_map(|(j, plane)| fits(plane).map(|d| (j, d)))
                .fold(None, |best: Option<(usize, f64)>, (j, d)| match best {
                    Some((_, best_d)) if best_d <= d => best,
                    _ => Some((j, d)),
                })
                .map(|(j, _)| j)
                .into_iter()
                .collect()
        } else {
            planes
                .iter()
                .enumerate()
                .filter(|(_, plane)| fits(plane).is_some())
                .map(|(j, _)| j)
                .collect()
        };

        for &j in &selected {
            let plane = &mut planes[j];
            plane.triangle_cluster.triangle_ids.push(index);
            plane.lmk_ids.extend(
                polygon
                    .iter()
                    .map(|v| v.lmk_id)
                    .filter(|id| points_with_id.contains_key(id)),
            );
            matched[j] = true;
        }
        !selected.is_empty()
    }

    fn candidates(&self) -> Vec<PlaneCandidate> {
        let horizontal = self
            .height_histogram
            .peaks(&self.params.height_histogram.peaks)
            .into_iter()
            .map(|peak| PlaneCandidate {
                orientation: PlaneOrientation::Horizontal,
                normal: self.vertical,
                distance: peak.position[0],
            });
        let walls = self
            .wall_histogram
            .peaks(&self.params.wall_histogram.peaks)
            .into_iter()
            .map(|peak| PlaneCandidate {
                orientation: PlaneOrientation::Vertical,
                normal: direction_from_longitude(peak.position[0], &self.vertical),
                distance: peak.position[1],
            });
        horizontal.chain(walls).collect()
    }

    fn apply_unmatched_plane_policy(&self, planes: &mut Vec<Plane>, matched: &[bool]) -> usize {
        for (plane, &hit) in planes.iter_mut().zip(matched) {
            if hit {
                plane.missed_cycles = 0;
            } else {
                plane.missed_cycles += 1;
            }
        }
        match self.params.unmatched_plane_policy {
            UnmatchedPlanePolicy::KeepForever => 0,
            UnmatchedPlanePolicy::EvictAfter(limit) => {
                let before = planes.len();
                planes.retain(|plane| {
                    let keep = plane.missed_cycles < limit.max(1);
                    if !keep {
                        debug!(plane_id = plane.id, missed = plane.missed_cycles, "Evicting plane");
                    }
                    keep
                });
                before - planes.len()
            }
        }
    }
}

/// Wall as `(azimuth, distance)` with the normal flipped so that the
/// distance is never negative. The azimuth covers the full circle.
fn canonical_wall(normal: &Vector3d, distance: f64, vertical: &Vector3d) -> (f64, f64) {
    let (normal, distance) = if distance < 0.0 {
        (-normal, -distance)
    } else {
        (*normal, distance)
    };
    (longitude(&normal, vertical), distance)
}

/// Landmark ids of all polygons in `clusters`, sorted and unique.
///
/// Triangle ids index into `mesh`; ids out of range are skipped, as are
/// landmarks absent from `points_with_id`.
pub fn extract_lmk_ids_from_triangle_clusters(
    mesh: &Mesh3D,
    clusters: &[TriangleCluster],
    points_with_id: &PointsWithIdMap,
) -> Vec<LandmarkId> {
    clusters
        .iter()
        .flat_map(|cluster| cluster.triangle_ids.iter())
        .filter_map(|&index| mesh.polygon(index))
        .flat_map(|polygon| polygon.map(|v| v.lmk_id))
        .filter(|id| points_with_id.contains_key(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
