//! Error quadrics and optimal contraction solving
//!
//! Implements the quadric error metric of Garland & Heckbert: each vertex
//! carries a symmetric `(k+1)x(k+1)` matrix accumulating the squared
//! distance to the supporting planes of its incident triangles, expressed
//! over homogeneous attribute vectors `[x, y, z, .., 1]`. Quadrics are
//! additive, so the error of a merged vertex is evaluated against the sum
//! of its endpoints' quadrics.

use nalgebra::{DMatrix, DVector};
use qmesh_core::Point3f;
use rayon::prelude::*;

/// Determinant magnitude below which the attribute block of a merged
/// quadric is treated as singular and the closed-form solve is skipped.
pub const SINGULAR_TOLERANCE: f64 = 1e-5;

/// Accumulated squared-distance-to-plane error for one vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Quadric {
    m: DMatrix<f64>,
}

impl Quadric {
    /// Zero quadric over a k-dimensional attribute vector.
    pub fn zeros(attr_dim: usize) -> Self {
        Self {
            m: DMatrix::zeros(attr_dim + 1, attr_dim + 1),
        }
    }

    /// Fundamental quadric of the plane `n . x + d = 0` with unit normal
    /// `n`, given as the homogeneous plane vector `p = [n, d]`.
    ///
    /// `Q = p p^T`, so `v^T Q v` is the squared distance of the homogeneous
    /// point `v` to the plane.
    pub fn from_plane(plane: &DVector<f64>) -> Self {
        Self {
            m: plane * plane.transpose(),
        }
    }

    /// Attribute dimension k; the matrix is `(k+1)x(k+1)`.
    pub fn attr_dim(&self) -> usize {
        self.m.nrows() - 1
    }

    /// Evaluate `v^T Q v` for a homogeneous attribute vector.
    pub fn evaluate(&self, v: &DVector<f64>) -> f64 {
        (v.transpose() * &self.m * v)[(0, 0)]
    }
}

impl std::ops::AddAssign<&Quadric> for Quadric {
    fn add_assign(&mut self, rhs: &Quadric) {
        self.m += &rhs.m;
    }
}

impl std::ops::Add for &Quadric {
    type Output = Quadric;

    fn add(self, rhs: &Quadric) -> Quadric {
        Quadric {
            m: &self.m + &rhs.m,
        }
    }
}

/// Homogeneous attribute vector `[x, y, z, 1]` for a mesh vertex.
pub fn vertex_attr(p: &Point3f) -> DVector<f64> {
    DVector::from_vec(vec![p.x as f64, p.y as f64, p.z as f64, 1.0])
}

/// Supporting plane `[n, d]` of a triangle, or `None` when the triangle
/// has (near) zero area.
fn triangle_plane(v0: &Point3f, v1: &Point3f, v2: &Point3f) -> Option<DVector<f64>> {
    let p0 = v0.coords.cast::<f64>();
    let e1 = v1.coords.cast::<f64>() - p0;
    let e2 = v2.coords.cast::<f64>() - p0;
    let n = e1.cross(&e2);
    let len = n.norm();
    if len < 1e-12 {
        return None;
    }
    let n = n / len;
    let d = -n.dot(&p0);
    Some(DVector::from_vec(vec![n.x, n.y, n.z, d]))
}

/// Per-vertex quadrics accumulated from the supporting planes of all
/// non-degenerate triangles.
///
/// Plane quadrics are computed per face in parallel; the per-vertex sums
/// are then merged serially. Degenerate triangles contribute nothing.
pub fn accumulate_quadrics(vertices: &[Point3f], faces: &[[usize; 3]]) -> Vec<Quadric> {
    let face_quadrics: Vec<Option<Quadric>> = faces
        .par_iter()
        .map(|f| {
            triangle_plane(&vertices[f[0]], &vertices[f[1]], &vertices[f[2]])
                .map(|p| Quadric::from_plane(&p))
        })
        .collect();

    let mut quadrics = vec![Quadric::zeros(3); vertices.len()];
    for (face, fq) in faces.iter().zip(&face_quadrics) {
        match fq {
            Some(q) => {
                for &vi in face {
                    quadrics[vi] += q;
                }
            }
            None => log::debug!("skipping degenerate triangle {:?}", face),
        }
    }
    quadrics
}

/// Result of solving one candidate contraction.
#[derive(Debug, Clone)]
pub struct Contraction {
    /// Error-minimizing homogeneous attribute vector for the merged vertex
    pub attr: DVector<f64>,
    /// Quadric-form error at `attr`
    pub error: f64,
    /// False when the merged quadric was (near-)singular and the
    /// three-candidate fallback picked the position
    pub solved: bool,
}

/// Compute the error-minimizing merged vertex for a pair.
///
/// With `q = q1 + q2`, the minimizer solves the gradient system on the
/// leading attribute block of `q`. If that block is singular within
/// [`SINGULAR_TOLERANCE`] the best of `v1`, `v2` and their midpoint is
/// used instead; the `solved` flag reports which path was taken.
pub fn optimal_contraction(
    v1: &DVector<f64>,
    q1: &Quadric,
    v2: &DVector<f64>,
    q2: &Quadric,
) -> Contraction {
    let q = q1 + q2;
    let k = q.attr_dim();

    let block = q.m.view((0, 0), (k, k)).clone_owned();
    if block.determinant().abs() > SINGULAR_TOLERANCE {
        if let Some(inv) = block.try_inverse() {
            let b = q.m.view((0, k), (k, 1)).clone_owned();
            let x = inv * -b;
            let mut attr = DVector::zeros(k + 1);
            attr.rows_mut(0, k).copy_from(&x);
            attr[k] = 1.0;
            let error = q.evaluate(&attr).max(0.0);
            return Contraction {
                attr,
                error,
                solved: true,
            };
        }
    }

    log::debug!("near-singular merged quadric, falling back to endpoint/midpoint placement");

    let mid = (v1 + v2) * 0.5;
    let mut best = v1.clone();
    let mut best_error = q.evaluate(v1);
    for candidate in [v2.clone(), mid] {
        let error = q.evaluate(&candidate);
        if error < best_error {
            best_error = error;
            best = candidate;
        }
    }
    Contraction {
        attr: best,
        error: best_error.max(0.0),
        solved: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane(n: [f64; 3], d: f64) -> DVector<f64> {
        DVector::from_vec(vec![n[0], n[1], n[2], d])
    }

    #[test]
    fn test_plane_quadric_measures_squared_distance() {
        // z = 0 plane
        let q = Quadric::from_plane(&plane([0.0, 0.0, 1.0], 0.0));
        let v = DVector::from_vec(vec![3.0, -1.0, 2.0, 1.0]);
        assert_relative_eq!(q.evaluate(&v), 4.0, epsilon = 1e-12);

        // offset plane z = 1
        let q = Quadric::from_plane(&plane([0.0, 0.0, 1.0], -1.0));
        assert_relative_eq!(q.evaluate(&v), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quadrics_are_additive() {
        let q1 = Quadric::from_plane(&plane([1.0, 0.0, 0.0], 0.0));
        let q2 = Quadric::from_plane(&plane([0.0, 1.0, 0.0], 0.0));
        let sum = &q1 + &q2;
        let v = DVector::from_vec(vec![2.0, 3.0, 0.0, 1.0]);
        assert_relative_eq!(sum.evaluate(&v), 4.0 + 9.0, epsilon = 1e-12);
        assert_eq!(sum.attr_dim(), 3);
    }

    #[test]
    fn test_accumulate_quadrics_single_triangle() {
        let vertices = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        ];
        let faces = vec![[0, 1, 2]];
        let quadrics = accumulate_quadrics(&vertices, &faces);
        assert_eq!(quadrics.len(), 3);

        // All three vertices accumulated the z = 0 plane
        let above = DVector::from_vec(vec![0.3, 0.2, 2.0, 1.0]);
        for q in &quadrics {
            assert_relative_eq!(q.evaluate(&above), 4.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_accumulate_quadrics_skips_degenerate_faces() {
        let vertices = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(2.0, 0.0, 0.0),
        ];
        // Collinear vertices span no plane
        let faces = vec![[0, 1, 2]];
        let quadrics = accumulate_quadrics(&vertices, &faces);
        let v = DVector::from_vec(vec![5.0, 5.0, 5.0, 1.0]);
        for q in &quadrics {
            assert_relative_eq!(q.evaluate(&v), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_optimal_contraction_solves_corner() {
        // Three orthogonal planes meeting at the origin pin the minimizer
        let mut q1 = Quadric::from_plane(&plane([1.0, 0.0, 0.0], 0.0));
        q1 += &Quadric::from_plane(&plane([0.0, 1.0, 0.0], 0.0));
        let q2 = Quadric::from_plane(&plane([0.0, 0.0, 1.0], 0.0));

        let v1 = DVector::from_vec(vec![1.0, 0.0, 0.0, 1.0]);
        let v2 = DVector::from_vec(vec![0.0, 0.0, 1.0, 1.0]);
        let result = optimal_contraction(&v1, &q1, &v2, &q2);
        assert!(result.solved);
        assert_relative_eq!(result.attr[0], 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.attr[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.attr[2], 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.attr[3], 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.error, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_optimal_contraction_fallback_on_singular_quadric() {
        // Two copies of the same plane leave the in-plane directions free
        let q1 = Quadric::from_plane(&plane([0.0, 0.0, 1.0], 0.0));
        let q2 = Quadric::from_plane(&plane([0.0, 0.0, 1.0], 0.0));

        let v1 = DVector::from_vec(vec![0.0, 0.0, 1.0, 1.0]);
        let v2 = DVector::from_vec(vec![0.0, 0.0, 3.0, 1.0]);
        let result = optimal_contraction(&v1, &q1, &v2, &q2);
        assert!(!result.solved);
        // v1 at z=1 is the best of {v1: 2, v2: 18, mid at z=2: 8}
        assert_relative_eq!(result.attr[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.error, 2.0, epsilon = 1e-12);
    }
}
