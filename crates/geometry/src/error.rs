//! Result and Error types for rrtools-geometry

/// Type alias for Result<T, geometry::Error>
pub type Result<T> = core::result::Result<T, Error>;

/// The error type for the `rrtools-geometry` crate
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("lower bound {lower:?} is not strictly below upper bound {upper:?}")]
    InvalidBounds { lower: [f64; 3], upper: [f64; 3] },

    #[error("lattice must have at least one cell along every axis, found {0:?}")]
    EmptyLattice([usize; 3]),

    #[error("point {0:?} lies outside the geometry")]
    PointOutsideGeometry([f64; 3]),
}
