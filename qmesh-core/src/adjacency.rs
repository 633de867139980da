//! Face adjacency and boundary queries
//!
//! Boundary information over an indexed triangle list: a boundary edge is an
//! undirected edge bordering exactly one triangle, and a boundary vertex is
//! an endpoint of a boundary edge. The same queries work for geometry faces
//! and for independently-indexed UV faces.

use std::collections::{BTreeSet, HashMap};

/// Edge-to-face adjacency over an indexed triangle list.
pub struct FaceAdjacency {
    edge_faces: HashMap<(usize, usize), Vec<usize>>,
}

impl FaceAdjacency {
    /// Build the adjacency for `faces`, whose indices must all be below
    /// `vertex_count`.
    pub fn new(vertex_count: usize, faces: &[[usize; 3]]) -> Self {
        debug_assert!(faces.iter().all(|f| f.iter().all(|&v| v < vertex_count)));

        let mut edge_faces: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (fi, face) in faces.iter().enumerate() {
            let edges = [
                (face[0].min(face[1]), face[0].max(face[1])),
                (face[1].min(face[2]), face[1].max(face[2])),
                (face[2].min(face[0]), face[2].max(face[0])),
            ];
            for &e in &edges {
                edge_faces.entry(e).or_default().push(fi);
            }
        }

        Self { edge_faces }
    }

    /// Undirected boundary edges and the vertex ids they touch.
    pub fn boundary_edges(&self) -> (BTreeSet<(usize, usize)>, BTreeSet<usize>) {
        let mut edges = BTreeSet::new();
        let mut vertices = BTreeSet::new();
        for (&(v0, v1), faces) in &self.edge_faces {
            if faces.len() == 1 {
                edges.insert((v0, v1));
                vertices.insert(v0);
                vertices.insert(v1);
            }
        }
        (edges, vertices)
    }
}

/// Map each vertex id to the ids of the faces referencing it.
pub fn vertex_to_face_map(faces: &[[usize; 3]], vertex_count: usize) -> Vec<Vec<usize>> {
    let mut map = vec![Vec::new(); vertex_count];
    for (fi, face) in faces.iter().enumerate() {
        for &vi in face {
            map[vi].push(fi);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Point3f, TriangleMesh};

    fn make_single_triangle() -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        mesh.add_vertex(Point3f::new(0.0, 0.0, 0.0));
        mesh.add_vertex(Point3f::new(1.0, 0.0, 0.0));
        mesh.add_vertex(Point3f::new(0.5, 1.0, 0.0));
        mesh.add_face([0, 1, 2]);
        mesh
    }

    fn make_tetrahedron() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(0.5, 0.5, 1.0),
            ],
            vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
        )
    }

    #[test]
    fn test_single_triangle_boundary() {
        let mesh = make_single_triangle();
        let adjacency = FaceAdjacency::new(mesh.vertex_count(), &mesh.faces);
        let (edges, vertices) = adjacency.boundary_edges();
        assert_eq!(edges.len(), 3);
        assert_eq!(vertices.len(), 3);
        assert!(edges.contains(&(0, 1)));
        assert!(edges.contains(&(1, 2)));
        assert!(edges.contains(&(0, 2)));
    }

    #[test]
    fn test_closed_mesh_has_no_boundary() {
        let mesh = make_tetrahedron();
        let adjacency = FaceAdjacency::new(mesh.vertex_count(), &mesh.faces);
        let (edges, vertices) = adjacency.boundary_edges();
        assert!(edges.is_empty());
        assert!(vertices.is_empty());
    }

    #[test]
    fn test_shared_edge_is_interior() {
        // Two triangles sharing the edge (1, 2)
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(2.0, 0.5, 0.0),
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        );
        let adjacency = FaceAdjacency::new(mesh.vertex_count(), &mesh.faces);
        let (edges, vertices) = adjacency.boundary_edges();
        assert!(!edges.contains(&(1, 2)));
        assert_eq!(edges.len(), 4);
        assert_eq!(vertices.len(), 4);
    }

    #[test]
    fn test_vertex_to_face_map() {
        let mesh = make_tetrahedron();
        let map = vertex_to_face_map(&mesh.faces, mesh.vertex_count());
        assert_eq!(map.len(), 4);
        // Every tetrahedron vertex touches exactly 3 faces
        for faces in &map {
            assert_eq!(faces.len(), 3);
        }
        assert_eq!(map[0], vec![0, 1, 2]);
    }
}
