//! Valid contraction pair enumeration
//!
//! A valid pair is a mesh edge, or optionally a spatially close non-edge
//! pair, whose endpoints are not boundary-protected. Pairs are canonical
//! `(min, max)` index tuples so each unordered pair appears once.

use std::collections::{BTreeSet, HashSet};

use qmesh_core::{vertex_to_face_map, FaceAdjacency, NearestNeighborSearch, TriangleMesh};

/// Canonical unordered vertex pair, always `(min, max)`.
pub type VertexPair = (usize, usize);

/// Canonicalize an unordered pair.
pub fn canonical(a: usize, b: usize) -> VertexPair {
    (a.min(b), a.max(b))
}

/// Vertices excluded from contraction by the boundary flags.
///
/// Geometric boundary vertices come straight from the face adjacency. UV
/// boundary vertices live in the UV index space; each is mapped back to the
/// geometry vertex occupying the same corner of the same face.
pub fn protected_vertices(
    mesh: &TriangleMesh,
    keep_geom_boundary: bool,
    keep_uv_boundary: bool,
) -> HashSet<usize> {
    let mut protected = HashSet::new();

    if keep_geom_boundary {
        let adjacency = FaceAdjacency::new(mesh.vertices.len(), &mesh.faces);
        let (_, boundary_vids) = adjacency.boundary_edges();
        protected.extend(boundary_vids);
    }

    if keep_uv_boundary {
        if let (Some(uvs), Some(uv_faces)) = (&mesh.uvs, &mesh.uv_faces) {
            debug_assert_eq!(uv_faces.len(), mesh.faces.len());
            let uv_adjacency = FaceAdjacency::new(uvs.len(), uv_faces);
            let (_, uv_boundary_vids) = uv_adjacency.boundary_edges();
            let uv_v2f = vertex_to_face_map(uv_faces, uvs.len());

            for uv_vid in uv_boundary_vids {
                if let Some(&fid) = uv_v2f[uv_vid].first() {
                    let uv_face = uv_faces[fid];
                    for i in 0..3 {
                        if uv_face[i] == uv_vid {
                            protected.insert(mesh.faces[fid][i]);
                            break;
                        }
                    }
                }
            }
        }
    }

    protected
}

/// One canonical pair per mesh edge whose endpoints both pass the filter.
pub fn prepare_valid_pairs(
    mesh: &TriangleMesh,
    protected: &HashSet<usize>,
) -> BTreeSet<VertexPair> {
    let mut pairs = BTreeSet::new();
    for f in &mesh.faces {
        for (a, b) in [(f[0], f[1]), (f[1], f[2]), (f[2], f[0])] {
            if a != b && !protected.contains(&a) && !protected.contains(&b) {
                pairs.insert(canonical(a, b));
            }
        }
    }
    pairs
}

/// Close-but-non-adjacent pairs within `dist` of each other, excluding
/// protected vertices and existing mesh edges.
pub fn non_edge_pairs(
    mesh: &TriangleMesh,
    protected: &HashSet<usize>,
    dist: f32,
    search: &dyn NearestNeighborSearch,
) -> BTreeSet<VertexPair> {
    let mut edges: HashSet<VertexPair> = HashSet::new();
    for f in &mesh.faces {
        edges.insert(canonical(f[0], f[1]));
        edges.insert(canonical(f[1], f[2]));
        edges.insert(canonical(f[2], f[0]));
    }

    let mut pairs = BTreeSet::new();
    for (vi, v) in mesh.vertices.iter().enumerate() {
        if protected.contains(&vi) {
            continue;
        }
        for (ni, _) in search.find_radius_neighbors(v, dist) {
            if ni <= vi || protected.contains(&ni) {
                continue;
            }
            let pair = canonical(vi, ni);
            if !edges.contains(&pair) {
                pairs.insert(pair);
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::BruteForceSearch;
    use qmesh_core::{Point2f, Point3f};

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

    fn make_two_triangle_strip() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(2.0, 0.5, 0.0),
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        )
    }

    #[test]
    fn test_tetrahedron_pairs_are_its_edges() {
        let mesh = make_tetrahedron();
        let pairs = prepare_valid_pairs(&mesh, &HashSet::new());
        assert_eq!(pairs.len(), 6);
        for &(a, b) in &pairs {
            assert!(a < b);
        }
    }

    #[test]
    fn test_protected_endpoints_are_filtered() {
        let mesh = make_tetrahedron();
        let protected: HashSet<usize> = [3].into_iter().collect();
        let pairs = prepare_valid_pairs(&mesh, &protected);
        // Only the base triangle's edges survive
        assert_eq!(pairs.len(), 3);
        assert!(pairs.iter().all(|&(a, b)| a != 3 && b != 3));
    }

    #[test]
    fn test_geom_boundary_protection() {
        let mesh = make_two_triangle_strip();
        let protected = protected_vertices(&mesh, true, false);
        // Every vertex of an open strip touches a boundary edge
        assert_eq!(protected.len(), 4);
        assert!(prepare_valid_pairs(&mesh, &protected).is_empty());
    }

    #[test]
    fn test_uv_boundary_maps_to_geometry_vertices() {
        let mut mesh = make_two_triangle_strip();
        // Two disjoint UV charts: every UV vertex is on a UV boundary even
        // though the geometry edge (1, 2) is interior
        let uvs = vec![
            Point2f::new(0.0, 0.0),
            Point2f::new(0.1, 0.0),
            Point2f::new(0.1, 0.1),
            Point2f::new(0.5, 0.0),
            Point2f::new(0.6, 0.0),
            Point2f::new(0.5, 0.1),
        ];
        mesh.set_uvs(uvs, vec![[0, 1, 2], [3, 4, 5]]);

        let protected = protected_vertices(&mesh, false, true);
        assert_eq!(protected.len(), 4);

        let none = protected_vertices(&mesh, false, false);
        assert!(none.is_empty());
    }

    #[test]
    fn test_non_edge_pairs_exclude_existing_edges() {
        // Two coplanar triangles, far apart except through the radius query
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.5, 1.0, 0.0),
                Point3f::new(3.0, 0.0, 0.0),
                Point3f::new(4.0, 0.0, 0.0),
                Point3f::new(3.5, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 4, 5]],
        );
        let search = BruteForceSearch::new(&mesh.vertices);
        let pairs = non_edge_pairs(&mesh, &HashSet::new(), 100.0, &search);
        // All 9 cross pairs, none of the 6 triangle edges
        assert_eq!(pairs.len(), 9);
        for &(a, b) in &pairs {
            assert!(a < 3 && b >= 3);
        }

        let tight = non_edge_pairs(&mesh, &HashSet::new(), 0.5, &search);
        assert!(tight.is_empty());
    }
}
