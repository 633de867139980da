//! Core data structures and traits for qmesh
//!
//! This crate provides the fundamental types shared by the qmesh algorithm
//! crates: points, triangle meshes with optional per-vertex and texture
//! attributes, face adjacency queries, and essential traits.

pub mod point;
pub mod mesh;
pub mod adjacency;
pub mod traits;
pub mod error;

pub use point::*;
pub use mesh::*;
pub use adjacency::*;
pub use traits::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{DMatrix, DVector, Point2, Point3, Vector3};
