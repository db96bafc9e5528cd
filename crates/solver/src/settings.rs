// internal modules
use crate::error::{Error, Result};

// neutronics toolbox
use rrtools_domain::{ExternalSource, KineticsData, Material};
use rrtools_geometry::{Boundary, BoxLattice};
use rrtools_utils::f;

// external crates
use serde::{Deserialize, Serialize};

// standard library
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Type of transport problem being solved
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Power iteration for the fundamental mode and k-eff
    #[default]
    Eigenvalue,
    /// Fixed external sources with k-eff held at unity
    FixedSource,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eigenvalue => write!(f, "eigenvalue"),
            Self::FixedSource => write!(f, "fixed source"),
        }
    }
}

/// Shape of the source within each region
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceShape {
    /// Constant source, the classic flat source region
    #[default]
    Flat,
    /// Constant plus a gradient, needs region centroids
    Linear,
}

impl std::fmt::Display for SourceShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

/// Scheme for averaging region miss rates over iterations
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissRateAveraging {
    /// Plain mean over every iteration so far
    #[default]
    Cumulative,
    /// Exponential moving average, `weight` given to the newest iteration
    Exponential { weight: f64 },
}

/// Which miss rate is held against the instability threshold
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissRateCriterion {
    /// The miss rate of the iteration being checked
    #[default]
    Iteration,
    /// The running average, after folding in the iteration being checked
    Average,
}

/// Policy for flagging and acting on unstable iterations
///
/// An iteration is unstable if the miss rate picked by `criterion` is above
/// `miss_rate_threshold`, or if k-eff falls outside `[k_min, k_max]`. The
/// run is aborted once `consecutive_limit` unstable iterations happen in a
/// row.
///
/// With [MissRateCriterion::Average] and exponential averaging of weight 1
/// the two criteria agree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstabilityPolicy {
    /// Miss rate above which an iteration counts as unstable
    pub miss_rate_threshold: f64,
    /// Average miss rate above which the final results carry a warning
    pub warning_miss_rate: f64,
    /// Lowest plausible k-eff
    pub k_min: f64,
    /// Highest plausible k-eff
    pub k_max: f64,
    /// Number of unstable iterations in a row that aborts the run
    pub consecutive_limit: usize,
    /// How the running average miss rate is formed
    pub averaging: MissRateAveraging,
    /// Miss rate compared against `miss_rate_threshold`
    pub criterion: MissRateCriterion,
}

impl Default for InstabilityPolicy {
    fn default() -> Self {
        Self {
            miss_rate_threshold: 0.1,
            warning_miss_rate: 0.01,
            k_min: 0.01,
            k_max: 10.0,
            consecutive_limit: 10,
            averaging: MissRateAveraging::Cumulative,
            criterion: MissRateCriterion::Iteration,
        }
    }
}

/// Growth of the ray batch while regions are being missed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveRays {
    /// Factor applied to the batch size each time growth is triggered
    pub growth: f64,
    /// Upper limit on rays per iteration
    pub max_rays: usize,
    /// Average miss rate that triggers growth
    pub trigger_miss_rate: f64,
}

impl Default for AdaptiveRays {
    fn default() -> Self {
        Self {
            growth: 1.5,
            max_rays: 100_000,
            trigger_miss_rate: 0.01,
        }
    }
}

/// Time discretisation for kinetics chaining
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSteps {
    /// Step length (s)
    pub dt: f64,
    /// Number of steps to take
    pub steps: usize,
}

/// Global random ray settings
///
/// Everything has a sensible default, so a JSON file only needs the values
/// that differ.
///
/// ```rust
/// # use rrtools_solver::{Settings, SourceShape};
/// let settings: Settings = serde_json::from_str(r#"{
///     "source_shape": "linear",
///     "rays_per_iteration": 200
/// }"#).unwrap();
///
/// assert_eq!(settings.source_shape, SourceShape::Linear);
/// assert_eq!(settings.rays_per_iteration, 200);
/// assert_eq!(settings.max_iterations, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Eigenvalue or fixed source problem
    pub mode: RunMode,
    /// Flat or linear source regions
    pub source_shape: SourceShape,
    /// Number of rays traced in each iteration
    pub rays_per_iteration: usize,
    /// Dead zone length travelled before tallies start (cm)
    pub distance_inactive: f64,
    /// Tallied length of every ray (cm)
    pub distance_active: f64,
    /// Seed for the ray sampling streams
    pub seed: u64,
    /// Optional growth of the ray batch
    pub adaptive: Option<AdaptiveRays>,
    /// Iteration limit, reaching it is a convergence failure
    pub max_iterations: usize,
    /// Relative change in k-eff considered converged
    pub k_tolerance: f64,
    /// Largest relative change in any region flux considered converged
    pub flux_tolerance: f64,
    /// Converged iterations needed in a row before stopping
    pub consecutive_converged: usize,
    /// Instability detection policy
    pub instability: InstabilityPolicy,
    /// Mean crossings per iteration above which a region needs no correction
    pub reference_crossings: f64,
    /// Number of worker partitions for statistics, defaults to the thread count
    pub workers: Option<usize>,
    /// Draw a progress bar over iterations
    pub progress: bool,
    /// Time steps for kinetics chaining
    pub time_steps: Option<TimeSteps>,
    /// Keep stepping through time after a step fails to converge
    pub continue_on_convergence_failure: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            source_shape: SourceShape::default(),
            rays_per_iteration: 1000,
            distance_inactive: 10.0,
            distance_active: 100.0,
            seed: 1,
            adaptive: None,
            max_iterations: 500,
            k_tolerance: 1.0e-5,
            flux_tolerance: 1.0e-4,
            consecutive_converged: 3,
            instability: InstabilityPolicy::default(),
            reference_crossings: 1.0,
            workers: None,
            progress: false,
            time_steps: None,
            continue_on_convergence_failure: false,
        }
    }
}

impl Settings {
    /// Number of worker partitions used for statistics
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }

    /// Check every setting is usable
    pub fn check(&self) -> Result<()> {
        if self.rays_per_iteration == 0 {
            return Err(invalid("at least one ray per iteration is required"));
        }

        if !positive(self.distance_active) {
            return Err(invalid(f!(
                "active distance must be positive, found {}",
                self.distance_active
            )));
        }

        if !self.distance_inactive.is_finite() || self.distance_inactive < 0.0 {
            return Err(invalid(f!(
                "inactive distance must be non-negative, found {}",
                self.distance_inactive
            )));
        }

        if self.max_iterations == 0 || self.consecutive_converged == 0 {
            return Err(invalid("iteration limits must be at least 1"));
        }

        if !positive(self.k_tolerance) || !positive(self.flux_tolerance) {
            return Err(invalid("convergence tolerances must be positive"));
        }

        if !self.reference_crossings.is_finite() || self.reference_crossings < 0.0 {
            return Err(invalid("reference crossings must be non-negative"));
        }

        if self.workers == Some(0) {
            return Err(invalid("worker count must be at least 1"));
        }

        self.check_instability()?;

        if let Some(adaptive) = &self.adaptive {
            if !adaptive.growth.is_finite() || adaptive.growth < 1.0 {
                return Err(invalid("adaptive ray growth must be at least 1"));
            }
            if adaptive.max_rays < self.rays_per_iteration {
                return Err(invalid(f!(
                    "adaptive ray limit {} is below the initial {} rays",
                    adaptive.max_rays,
                    self.rays_per_iteration
                )));
            }
        }

        if let Some(steps) = &self.time_steps {
            if !positive(steps.dt) || steps.steps == 0 {
                return Err(invalid(f!(
                    "time steps need a positive length and count, found {} x {} s",
                    steps.steps,
                    steps.dt
                )));
            }
        }

        Ok(())
    }

    fn check_instability(&self) -> Result<()> {
        let policy = &self.instability;
        let fraction = |v: f64| v.is_finite() && v > 0.0 && v <= 1.0;

        if !fraction(policy.miss_rate_threshold) || !fraction(policy.warning_miss_rate) {
            return Err(invalid("miss rate thresholds must be in (0, 1]"));
        }

        if !(policy.k_min.is_finite() && policy.k_max.is_finite() && policy.k_min < policy.k_max) {
            return Err(invalid(f!(
                "implausible k-eff bounds [{}, {}]",
                policy.k_min,
                policy.k_max
            )));
        }

        if policy.consecutive_limit == 0 {
            return Err(invalid("instability limit must be at least 1"));
        }

        if let MissRateAveraging::Exponential { weight } = policy.averaging {
            if !fraction(weight) {
                return Err(invalid(f!("averaging weight must be in (0, 1], found {weight}")));
            }
        }

        Ok(())
    }
}

/// Axis-aligned lattice geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryInput {
    /// Lower corner (cm)
    pub lower: [f64; 3],
    /// Upper corner (cm)
    pub upper: [f64; 3],
    /// Regions along each axis
    pub shape: [usize; 3],
    /// Outer boundary condition
    pub boundary: Boundary,
}

impl Default for GeometryInput {
    fn default() -> Self {
        Self {
            lower: [0.0; 3],
            upper: [1.0; 3],
            shape: [1; 3],
            boundary: Boundary::Reflective,
        }
    }
}

impl GeometryInput {
    /// Build the ray tracer
    pub fn build(&self) -> Result<BoxLattice> {
        Ok(BoxLattice::new(
            self.lower,
            self.upper,
            self.shape,
            self.boundary,
        )?)
    }

    /// Number of regions in the lattice
    pub fn region_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Everything needed to set up a simulation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inputs {
    /// Global settings
    pub settings: Settings,
    /// Lattice used by the drivers
    pub geometry: GeometryInput,
    /// Multigroup cross sections
    pub materials: Vec<Material>,
    /// Index into `materials` for every region
    pub region_materials: Vec<usize>,
    /// Reference point of every region, required by linear sources
    pub region_centroids: Option<Vec<[f64; 3]>>,
    /// Fixed external sources
    pub sources: Vec<ExternalSource>,
    /// Delayed neutron data for kinetics
    pub kinetics: Option<KineticsData>,
}

impl Inputs {
    /// Number of energy groups, taken from the first material
    pub fn group_count(&self) -> usize {
        self.materials.first().map_or(0, |m| m.total.len())
    }
}

/// Read [Settings] from a JSON file
///
/// ```rust, no_run
/// # use rrtools_solver::read_settings;
/// let settings = read_settings("path/to/settings.json").unwrap();
/// ```
pub fn read_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

/// Read complete simulation [Inputs] from a JSON file
///
/// ```rust, no_run
/// # use rrtools_solver::read_inputs;
/// let inputs = read_inputs("path/to/inputs.json").unwrap();
/// println!("{} regions", inputs.region_materials.len());
/// ```
pub fn read_inputs<P: AsRef<Path>>(path: P) -> Result<Inputs> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn invalid<S: Into<String>>(message: S) -> Error {
    Error::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().check().is_ok());
    }

    #[test]
    fn zero_rays_rejected() {
        let settings = Settings {
            rays_per_iteration: 0,
            ..Default::default()
        };
        assert!(matches!(settings.check(), Err(Error::Configuration(_))));
    }

    #[test]
    fn inverted_k_bounds_rejected() {
        let mut settings = Settings::default();
        settings.instability.k_min = 5.0;
        settings.instability.k_max = 1.0;
        assert!(settings.check().is_err());
    }

    #[test]
    fn exponential_weight_checked() {
        let mut settings = Settings::default();
        settings.instability.averaging = MissRateAveraging::Exponential { weight: 0.0 };
        assert!(settings.check().is_err());
        settings.instability.averaging = MissRateAveraging::Exponential { weight: 0.2 };
        assert!(settings.check().is_ok());
    }

    #[test]
    fn averaging_from_json() {
        let policy: InstabilityPolicy =
            serde_json::from_str(r#"{"averaging": {"exponential": {"weight": 0.25}}}"#).unwrap();
        assert_eq!(policy.averaging, MissRateAveraging::Exponential { weight: 0.25 });
        assert_eq!(policy.consecutive_limit, 10);
    }

    #[test]
    fn inputs_from_json() {
        let inputs: Inputs = serde_json::from_str(
            r#"{
                "geometry": {"upper": [2.0, 2.0, 2.0], "shape": [2, 1, 1]},
                "materials": [{"name": "water", "total": [1.0], "scatter": [[0.9]]}],
                "region_materials": [0, 0]
            }"#,
        )
        .unwrap();

        assert_eq!(inputs.group_count(), 1);
        assert_eq!(inputs.geometry.region_count(), 2);
        assert_eq!(inputs.geometry.boundary, Boundary::Reflective);
        assert!(inputs.geometry.build().is_ok());
    }
}
