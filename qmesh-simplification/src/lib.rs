//! Mesh decimation algorithms for qmesh
//!
//! This crate reduces the polygon count of a triangulated surface while
//! minimizing geometric distortion:
//! - Quadric error metrics with closed-form optimal vertex placement
//! - Greedy lowest-error pair contraction with lazy invalidation
//! - Geometric and UV boundary protection, optional non-edge pairs

pub mod quadric;
pub mod pairs;
pub mod search;
pub mod qslim;

pub use quadric::*;
pub use search::*;
pub use qslim::*;

use qmesh_core::{Result, TriangleMesh};

/// Simplify a mesh by reducing the number of faces/vertices
pub trait MeshSimplifier {
    /// Simplify mesh with target reduction ratio (0.0 = no reduction, 1.0 = maximum reduction)
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh>;
}
