//! Result and Error types for rrtools-domain

/// Type alias for Result<T, domain::Error>
pub type Result<T> = core::result::Result<T, Error>;

/// The error type for the `rrtools-domain` crate
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("no energy groups defined")]
    NoEnergyGroups,

    #[error("domain has no source regions")]
    NoSourceRegions,

    #[error("domain volume must be positive and finite, found {0}")]
    InvalidVolume(f64),

    #[error("material {material:?} has {found} {field} entries, expected {expected}")]
    MaterialGroupMismatch {
        material: String,
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("material {material:?} has an unusable {field} value in group {group}")]
    InvalidCrossSection {
        material: String,
        field: &'static str,
        group: usize,
    },

    #[error("region {region} uses material {material} but only {available} are defined")]
    UnknownMaterial {
        region: usize,
        material: usize,
        available: usize,
    },

    #[error("external source in region {region} is outside the {regions} source regions")]
    SourceOutsideDomain { region: usize, regions: usize },

    #[error("external source in region {region} has {found} group strengths, expected {expected}")]
    SourceGroupMismatch {
        region: usize,
        expected: usize,
        found: usize,
    },

    #[error("kinetics {field} has {found} entries, expected {expected}")]
    KineticsMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("kinetics {field} must be finite and non-negative")]
    InvalidKinetics { field: &'static str },

    #[error("time-dependent steps need kinetics data")]
    MissingKinetics,

    #[error("time step must be positive and finite, found {0}")]
    InvalidTimeStep(f64),

    #[error(
        "initial condition shape mismatch for {field} (expected {expected:?}, found {found:?})"
    )]
    InitialConditionMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("expected one centroid per region ({expected}), found {found}")]
    CentroidMismatch { expected: usize, found: usize },

    #[error("expected one correction factor per region ({expected}), found {found}")]
    CorrectionMismatch { expected: usize, found: usize },
}
