//! Per-vertex visualization properties for the 3D mesh

use landmesh_core::{Mesh2D, Mesh3D, Timestamp, Vector3d};
use ndarray::Array2;

/// Colors and optional texture coordinates, one entry per Mesh3D vertex
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh3DVizProperties {
    pub colors: Vec<[u8; 3]>,
    pub texture_coords: Option<Vec<[f32; 2]>>,
}

/// Strategy computing visualization properties for a freshly updated mesh
pub trait MeshVizPropertiesProvider: Send {
    /// Compute properties for every vertex of `mesh_3d`, in vertex order
    fn viz_properties(
        &self,
        timestamp: Timestamp,
        image: Option<&Array2<u8>>,
        mesh_2d: &Mesh2D,
        mesh_3d: &Mesh3D,
    ) -> Mesh3DVizProperties;
}

/// Colors vertices with a blue to red ramp over their height
#[derive(Debug, Clone, PartialEq)]
pub struct HeightColorizer {
    vertical: Vector3d,
    range: Option<(f64, f64)>,
}

impl HeightColorizer {
    /// Ramp between the lowest and highest vertex of each mesh
    pub fn new(vertical: Vector3d) -> Self {
        Self {
            vertical: vertical.normalize(),
            range: None,
        }
    }

    /// Ramp over a fixed height interval, clamping outside of it
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    fn ramp(t: f64) -> [u8; 3] {
        let t = t.clamp(0.0, 1.0);
        let r = (255.0 * t).round() as u8;
        let g = (255.0 * (1.0 - (2.0 * t - 1.0).abs())).round() as u8;
        let b = (255.0 * (1.0 - t)).round() as u8;
        [r, g, b]
    }
}

impl Default for HeightColorizer {
    fn default() -> Self {
        Self::new(Vector3d::z())
    }
}

impl MeshVizPropertiesProvider for HeightColorizer {
    fn viz_properties(
        &self,
        _timestamp: Timestamp,
        _image: Option<&Array2<u8>>,
        _mesh_2d: &Mesh2D,
        mesh_3d: &Mesh3D,
    ) -> Mesh3DVizProperties {
        let heights: Vec<f64> = mesh_3d
            .vertices()
            .iter()
            .map(|v| v.position.coords.dot(&self.vertical))
            .collect();

        let (min, max) = self.range.unwrap_or_else(|| {
            heights
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &h| (lo.min(h), hi.max(h)))
        });
        let span = max - min;

        let colors = heights
            .iter()
            .map(|&h| {
                let t = if span > f64::EPSILON { (h - min) / span } else { 0.5 };
                Self::ramp(t)
            })
            .collect();

        Mesh3DVizProperties {
            colors,
            texture_coords: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landmesh_core::{Point3d, Vertex};

    fn mesh() -> Mesh3D {
        let mut mesh = Mesh3D::new();
        mesh.add_polygon([
            Vertex::new(1, Point3d::new(0.0, 0.0, 0.0)),
            Vertex::new(2, Point3d::new(1.0, 0.0, 1.0)),
            Vertex::new(3, Point3d::new(0.0, 1.0, 2.0)),
        ]);
        mesh
    }

    #[test]
    fn test_height_ramp() {
        let props = HeightColorizer::default().viz_properties(0, None, &Mesh2D::new(), &mesh());
        assert_eq!(props.colors.len(), 3);
        assert_eq!(props.colors[0], [0, 0, 255]);
        assert_eq!(props.colors[1], [128, 255, 128]);
        assert_eq!(props.colors[2], [255, 0, 0]);
        assert!(props.texture_coords.is_none());
    }

    #[test]
    fn test_fixed_range_clamps() {
        let colorizer = HeightColorizer::default().with_range(0.5, 1.0);
        let props = colorizer.viz_properties(0, None, &Mesh2D::new(), &mesh());
        assert_eq!(props.colors[0], [0, 0, 255]);
        assert_eq!(props.colors[2], [255, 0, 0]);
    }

    #[test]
    fn test_empty_mesh() {
        let props = HeightColorizer::default().viz_properties(0, None, &Mesh2D::new(), &Mesh3D::new());
        assert!(props.colors.is_empty());
    }
}
