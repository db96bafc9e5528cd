//! Result and Error types for rrtools-solver

use crate::simulation::SimulationState;

/// Type alias for Result<T, solver::Error>
pub type Result<T> = core::result::Result<T, Error>;

/// The error type for the `rrtools-solver` crate
///
/// Only [ConvergenceFailure](Error::ConvergenceFailure) leaves a usable
/// simulation behind, see [is_convergence_failure()](Error::is_convergence_failure).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed input/output stream")]
    IOError(#[from] std::io::Error),

    #[error("failed to (de)serialise")]
    FailedSerde(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("unstable solution at iteration {iteration} (miss rate {miss_rate:.4}, k-eff {k_eff:.5})")]
    Instability {
        iteration: usize,
        miss_rate: f64,
        k_eff: f64,
    },

    #[error("not converged after {iterations} iterations (k-eff {k_eff:.5})")]
    ConvergenceFailure { iterations: usize, k_eff: f64 },

    #[error("{operation}() is not valid in the {state} state")]
    InvalidState {
        operation: &'static str,
        state: SimulationState,
    },

    #[error("failed to initialise progress bar: {0}")]
    ProgressBar(String),
}

impl Error {
    /// True for the non-fatal outcome of running out of iterations
    pub fn is_convergence_failure(&self) -> bool {
        matches!(self, Error::ConvergenceFailure { .. })
    }
}

impl From<rrtools_domain::Error> for Error {
    fn from(e: rrtools_domain::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}

impl From<rrtools_geometry::Error> for Error {
    fn from(e: rrtools_geometry::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}
