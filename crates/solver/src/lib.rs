//! Random ray iteration control and kinetics chaining
#![doc = include_str!("../readme.md")]

// Split into subfiles for development, but anything important is re-exported
mod driver;
mod error;
mod monitor;
mod report;
mod settings;
mod simulation;
mod statistics;
mod sweep;
mod validation;

#[doc(inline)]
pub use driver::{
    run_kinetics, run_random_ray, run_random_ray_time_dependent,
    run_random_ray_time_dependent_with, run_random_ray_with, KineticsOutcome, RunOutcome,
};

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use monitor::{is_unstable, InstabilityMonitor, Stability};

#[doc(inline)]
pub use report::{print_results_random_ray, JsonReporter, LogReporter, Reporter, SimulationResults};

#[doc(inline)]
pub use settings::{
    read_inputs, read_settings, AdaptiveRays, GeometryInput, Inputs, InstabilityPolicy,
    MissRateAveraging, MissRateCriterion, RunMode, Settings, SourceShape, TimeSteps,
};

#[doc(inline)]
pub use simulation::{Simulation, SimulationState};

#[doc(inline)]
pub use statistics::{
    partition_rays, reduce_statistics, GlobalStatistics, IterationStatistics, WorkerStatistics,
};

#[doc(inline)]
pub use validation::validate_random_ray_inputs;
