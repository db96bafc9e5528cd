//! Ray tracing and sampling for random ray transport
//!
#![doc = include_str!("../readme.md")]

mod error;
mod lattice;
mod sampling;
mod segment;
mod tracer;

#[doc(inline)]
pub use crate::error::{Error, Result};

#[doc(inline)]
pub use crate::lattice::{Boundary, BoxLattice, LatticeSegments};

#[doc(inline)]
pub use crate::sampling::{isotropic_direction, ray_rng, sample_ray};

#[doc(inline)]
pub use crate::segment::Segment;

#[doc(inline)]
pub use crate::tracer::RayTracer;

// Re-export the vector types used throughout the public API
pub use nalgebra::{Point3, Vector3};
