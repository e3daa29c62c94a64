//! Mesh data structures and functionality
//!
//! [`Mesh`] is an arena of landmark-tagged vertices plus triangles that refer
//! to vertices by index. Identity across cycles is carried by the landmark id,
//! so indices are only stable until the mesh is rebuilt.
//! [`TriangleMesh`] is the flat indexed buffer handed to renderers.

use crate::point::*;
use nalgebra::{Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A triangle in pixel coordinates, used for 2D visualization
pub type Triangle2D = [Pixel; 3];

/// A mesh vertex tagged with the landmark it was built from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex<P> {
    pub lmk_id: LandmarkId,
    pub position: P,
}

impl<P> Vertex<P> {
    pub fn new(lmk_id: LandmarkId, position: P) -> Self {
        Self { lmk_id, position }
    }
}

/// An indexed triangle mesh whose vertices are landmarks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh<P> {
    vertices: Vec<Vertex<P>>,
    polygons: Vec<[usize; 3]>,
    lmk_id_to_vertex: HashMap<LandmarkId, usize>,
    polygon_keys: HashSet<[LandmarkId; 3]>,
}

/// Triangles over image keypoints
pub type Mesh2D = Mesh<Point2<f64>>;

/// Triangles over world-frame landmark positions
pub type Mesh3D = Mesh<Point3<f64>>;

fn polygon_key(ids: [LandmarkId; 3]) -> [LandmarkId; 3] {
    let mut key = ids;
    key.sort_unstable();
    key
}

impl<P: Copy> Mesh<P> {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            polygons: Vec::new(),
            lmk_id_to_vertex: HashMap::new(),
            polygon_keys: HashSet::new(),
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of polygons
    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    /// Check if the mesh has no polygons
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn vertices(&self) -> &[Vertex<P>] {
        &self.vertices
    }

    pub fn polygons(&self) -> &[[usize; 3]] {
        &self.polygons
    }

    /// Add a triangle, reusing existing vertices with the same landmark id.
    ///
    /// Returns `false` (and leaves the mesh untouched) if two corners share a
    /// landmark or the same landmark triple is already present. The position
    /// of a reused vertex is overwritten with the incoming one.
    pub fn add_polygon(&mut self, polygon: [Vertex<P>; 3]) -> bool {
        let ids = [polygon[0].lmk_id, polygon[1].lmk_id, polygon[2].lmk_id];
        if ids[0] == ids[1] || ids[1] == ids[2] || ids[0] == ids[2] {
            return false;
        }
        if !self.polygon_keys.insert(polygon_key(ids)) {
            return false;
        }

        let mut indices = [0usize; 3];
        for (slot, vertex) in indices.iter_mut().zip(polygon.iter()) {
            *slot = match self.lmk_id_to_vertex.get(&vertex.lmk_id) {
                Some(&index) => {
                    self.vertices[index].position = vertex.position;
                    index
                }
                None => {
                    let index = self.vertices.len();
                    self.vertices.push(*vertex);
                    self.lmk_id_to_vertex.insert(vertex.lmk_id, index);
                    index
                }
            };
        }
        self.polygons.push(indices);
        true
    }

    /// The three vertices of polygon `index`
    pub fn polygon(&self, index: usize) -> Option<[Vertex<P>; 3]> {
        self.polygons.get(index).map(|face| {
            [
                self.vertices[face[0]],
                self.vertices[face[1]],
                self.vertices[face[2]],
            ]
        })
    }

    /// Iterate over all polygons as vertex triples
    pub fn iter_polygons(&self) -> impl Iterator<Item = [Vertex<P>; 3]> + '_ {
        self.polygons.iter().map(move |face| {
            [
                self.vertices[face[0]],
                self.vertices[face[1]],
                self.vertices[face[2]],
            ]
        })
    }

    /// Look up a vertex by landmark id
    pub fn vertex_by_landmark(&self, lmk_id: LandmarkId) -> Option<&Vertex<P>> {
        self.lmk_id_to_vertex
            .get(&lmk_id)
            .map(|&index| &self.vertices[index])
    }

    /// Whether any polygon contains the landmark triple, in any order
    pub fn contains_polygon(&self, ids: [LandmarkId; 3]) -> bool {
        self.polygon_keys.contains(&polygon_key(ids))
    }

    /// Landmark ids of all vertices, in vertex order
    pub fn landmark_ids(&self) -> Vec<LandmarkId> {
        self.vertices.iter().map(|v| v.lmk_id).collect()
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.polygons.clear();
        self.lmk_id_to_vertex.clear();
        self.polygon_keys.clear();
    }
}

impl<P: Copy> Default for Mesh<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesh3D {
    /// Convert into the flat indexed representation used by renderers
    pub fn to_triangle_mesh(&self) -> TriangleMesh {
        let vertices = self
            .vertices
            .iter()
            .map(|v| Point3::new(v.position.x as f32, v.position.y as f32, v.position.z as f32))
            .collect();
        let mut mesh = TriangleMesh::from_vertices_and_faces(vertices, self.polygons.clone());
        mesh.set_normals(mesh.calculate_vertex_normals());
        mesh
    }
}

impl Mesh2D {
    /// Triangles as pixel triples, for drawing
    pub fn to_triangles(&self) -> Vec<Triangle2D> {
        self.iter_polygons()
            .map(|[a, b, c]| [a.position, b.position, c.position])
            .collect()
    }
}

/// A triangle mesh with vertices and faces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f32>>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3<f32>>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3<f32>>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            colors: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Area weighted vertex normals. Vertices without a non-degenerate face
    /// get a zero normal.
    pub fn calculate_vertex_normals(&self) -> Vec<Vector3<f32>> {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for face in &self.faces {
            let [Some(v0), Some(v1), Some(v2)] = (*face).map(|i| self.vertices.get(i)) else {
                continue;
            };
            let edge1 = v1 - v0;
            let edge2 = v2 - v0;
            // Cross product length is twice the face area
            let weighted = edge1.cross(&edge2);
            for &i in face {
                normals[i] += weighted;
            }
        }
        for normal in &mut normals {
            let norm = normal.norm();
            if norm > f32::EPSILON {
                *normal /= norm;
            }
        }
        normals
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3<f32>>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Vertex positions packed for upload
    pub fn vertex_buffer(&self) -> Vec<GpuVertex> {
        self.vertices
            .iter()
            .map(|p| GpuVertex {
                position: [p.x, p.y, p.z],
            })
            .collect()
    }

    /// Flattened `u32` triangle indices
    pub fn index_buffer(&self) -> Vec<u32> {
        self.faces
            .iter()
            .flat_map(|face| face.iter().map(|&i| i as u32))
            .collect()
    }

    /// Raw bytes of the vertex buffer
    pub fn vertex_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.vertex_buffer()).to_vec()
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}
