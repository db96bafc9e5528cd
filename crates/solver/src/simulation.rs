// internal modules
use crate::error::{Error, Result};
use crate::monitor::{InstabilityMonitor, Stability};
use crate::report::{Reporter, SimulationResults};
use crate::settings::{Inputs, RunMode, Settings, SourceShape};
use crate::statistics::{
    partition_rays, reduce_statistics, GlobalStatistics, IterationStatistics, WorkerStatistics,
};
use crate::sweep::{merge, sweep, RayParameters};
use crate::validation::validate_random_ray_inputs;

// neutronics toolbox
use rrtools_domain::{
    FlatSourceDomain, InitialCondition, LinearSourceDomain, RayDensity, SourceDomain,
};
use rrtools_geometry::RayTracer;
use rrtools_utils::{SliceExt, ValueExt};

// external crates
use kdam::{Bar, BarBuilder, BarExt};
use log::{debug, error, info, warn};

/// Bounds on the volume ratio used by segment correction factors
const CORRECTION_LIMITS: (f64, f64) = (0.5, 2.0);

/// Lifecycle of a [Simulation]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    /// Not yet set up
    #[default]
    Uninitialized,
    /// Ready for, or in the middle of, power iteration
    Iterating,
    /// Iteration finished, with or without meeting tolerances
    Converged,
    /// Worker statistics combined into global totals
    Reduced,
    /// Results handed to a reporter
    Reported,
    /// Stopped by persistent instability
    Aborted,
}

impl std::fmt::Display for SimulationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Iterating => "iterating",
            Self::Converged => "converged",
            Self::Reduced => "reduced",
            Self::Reported => "reported",
            Self::Aborted => "aborted",
        };
        write!(f, "{name}")
    }
}

/// Random ray power iteration over a single source domain
///
/// The simulation exclusively owns its [SourceDomain], chosen from the
/// source shape in the settings, and borrows the geometry it traces rays
/// through.
///
/// Methods must be called in lifecycle order:
///
/// | Method                                                              | Valid in                | Moves to    |
/// | ------------------------------------------------------------------- | ----------------------- | ----------- |
/// | [simulate()](Simulation::simulate)                                  | `Iterating`             | `Converged` |
/// | [reduce_simulation_statistics()](Simulation::reduce_simulation_statistics) | `Converged`      | `Reduced`   |
/// | [output_simulation_results()](Simulation::output_simulation_results) | `Reduced`              | `Reported`  |
/// | `get_*_initial_condition()`                                         | `Reduced`, `Reported`   |             |
///
/// Anything else fails with [Error::InvalidState]. Persistent instability
/// moves the simulation to `Aborted`, from which nothing is valid.
///
/// ```rust, no_run
/// # use rrtools_solver::{read_inputs, LogReporter, Simulation};
/// let inputs = read_inputs("path/to/inputs.json").unwrap();
/// let lattice = inputs.geometry.build().unwrap();
///
/// let mut simulation = Simulation::new(&inputs, &lattice).unwrap();
/// simulation.simulate().unwrap();
/// simulation.reduce_simulation_statistics().unwrap();
/// simulation.output_simulation_results(&mut LogReporter).unwrap();
///
/// let flux = simulation.get_scalar_flux_initial_condition().unwrap();
/// ```
#[derive(Debug)]
pub struct Simulation<'t, T: RayTracer> {
    tracer: &'t T,
    domain: Box<dyn SourceDomain>,
    settings: Settings,
    state: SimulationState,
    monitor: InstabilityMonitor,

    k_eff: f64,
    avg_miss_rate: f64,
    total_geometric_intersections: u64,
    negroups: usize,
    ndgroups: usize,

    iteration: usize,
    rays: usize,
    converged: bool,
    time_step: Option<f64>,
    history: Vec<IterationStatistics>,
    workers: Vec<WorkerStatistics>,
    global: Option<GlobalStatistics>,
}

impl<'t, T: RayTracer> Simulation<'t, T> {
    /// Validate inputs and set up a fresh simulation
    ///
    /// Fails with [Error::Configuration] before any domain data is allocated
    /// if the inputs are invalid for the geometry.
    pub fn new(inputs: &Inputs, tracer: &'t T) -> Result<Self> {
        validate_random_ray_inputs(inputs, tracer.region_count())?;

        let groups = inputs.group_count();
        let mut flat = FlatSourceDomain::new(
            inputs.materials.clone(),
            inputs.region_materials.clone(),
            tracer.volume(),
            groups,
        )?
        .with_external_sources(&inputs.sources)?;

        if let Some(kinetics) = &inputs.kinetics {
            flat = flat.with_kinetics(kinetics.clone())?;
        }

        let domain: Box<dyn SourceDomain> = match inputs.settings.source_shape {
            SourceShape::Flat => Box::new(flat),
            SourceShape::Linear => {
                let centroids = inputs.region_centroids.clone().unwrap_or_default();
                Box::new(LinearSourceDomain::new(flat, centroids)?)
            }
        };

        let settings = inputs.settings.clone();
        let ndgroups = domain.precursor_group_count();

        info!(
            "Random ray {} problem: {} {} source regions, {groups} energy groups",
            settings.mode,
            domain.region_count(),
            settings.source_shape,
        );

        Ok(Self {
            tracer,
            domain,
            monitor: InstabilityMonitor::new(settings.instability),
            rays: settings.rays_per_iteration,
            workers: vec![WorkerStatistics::default(); settings.worker_count()],
            settings,
            state: SimulationState::Iterating,
            k_eff: 1.0,
            avg_miss_rate: 0.0,
            total_geometric_intersections: 0,
            negroups: groups,
            ndgroups,
            iteration: 0,
            converged: false,
            time_step: None,
            history: Vec::new(),
            global: None,
        })
    }

    /// Set up a simulation starting from a previous run's state
    ///
    /// With a `time_step` the simulation advances the snapshot through one
    /// backward Euler step, otherwise the snapshot is only an initial guess.
    /// k-eff starts from the snapshot value.
    ///
    /// A snapshot with different region or group counts is rejected with
    /// [Error::Configuration] before any ray is traced.
    pub fn with_initial_condition(
        inputs: &Inputs,
        tracer: &'t T,
        initial: &InitialCondition,
        time_step: Option<f64>,
    ) -> Result<Self> {
        let mut simulation = Self::new(inputs, tracer)?;
        simulation
            .domain
            .load_initial_condition(initial, time_step)?;

        simulation.k_eff = initial.k_eff();
        simulation.time_step = time_step;

        if let Some(dt) = time_step {
            info!("Advancing initial condition by {} s", dt.sci(4, 2));
        }
        Ok(simulation)
    }

    // ! ------------------------------------------------------------------------
    // !    Power iteration
    // ! ------------------------------------------------------------------------

    /// Run power iteration until converged
    ///
    /// Stops once both k-eff and the region fluxes change by less than their
    /// tolerances for enough iterations in a row. Running out of iterations
    /// still moves the simulation to `Converged`, but returns
    /// [Error::ConvergenceFailure] so the caller can decide what to do with
    /// the results.
    ///
    /// Persistent instability moves the simulation to `Aborted` and returns
    /// [Error::Instability].
    pub fn simulate(&mut self) -> Result<()> {
        self.require(&[SimulationState::Iterating], "simulate")?;

        let mut progress_bar = self.init_progress_bar()?;
        if self.settings.progress {
            progress_bar.refresh()?;
        }

        let mut streak = 0;
        while self.iteration < self.settings.max_iterations {
            let statistics = self.iterate()?;
            self.instability_check(statistics.hits, statistics.k_eff)?;
            self.adapt_ray_count();
            progress_bar.update(1)?;

            let converged = statistics.iteration > 1
                && statistics.k_change < self.settings.k_tolerance
                && statistics.flux_change < self.settings.flux_tolerance;

            streak = match converged {
                true => streak + 1,
                false => 0,
            };

            if streak >= self.settings.consecutive_converged {
                info!(
                    "Converged after {} iterations, k-eff = {:.6}",
                    self.iteration, self.k_eff
                );
                self.converged = true;
                self.state = SimulationState::Converged;
                return Ok(());
            }
        }

        self.state = SimulationState::Converged;
        let failure = Error::ConvergenceFailure {
            iterations: self.iteration,
            k_eff: self.k_eff,
        };
        warn!("{failure}");
        Err(failure)
    }

    /// One complete transport sweep and update
    fn iterate(&mut self) -> Result<IterationStatistics> {
        self.iteration += 1;

        self.compute_segment_correction_factors()?;
        self.domain.reset_iteration();
        self.domain.update_source(self.k_eff);

        let parameters = RayParameters {
            seed: self.settings.seed,
            iteration: self.iteration as u64,
            distance_inactive: self.settings.distance_inactive,
            distance_active: self.settings.distance_active,
        };
        let tallies = sweep(self.tracer, self.domain.as_ref(), parameters, self.rays);

        let mut intersections = 0;
        let mut active_distance = 0.0;
        for tally in &tallies {
            merge(self.domain.as_mut(), tally);
            intersections += tally.intersections;
            active_distance += tally.active_distance;
        }

        let flux_old = self.domain.flux_state().to_vec();
        let hits = self.domain.update_flux_and_source(active_distance);

        let k_old = self.k_eff;
        self.update_eigenvalue();
        self.domain.update_precursors(self.k_eff);

        let miss_rate = self.miss_rate(hits);
        self.total_geometric_intersections += intersections;

        let blocks = partition_rays(tallies.len(), self.workers.len());
        for (worker, block) in self.workers.iter_mut().zip(blocks) {
            let rays = block.len() as u64;
            let crossed = tallies[block].iter().map(|t| t.intersections).sum();
            worker.record(rays, crossed, miss_rate);
        }

        // undefined fluxes mean the iteration blew up
        let change = self.domain.flux_state().max_relative_change(&flux_old);
        let flux_change = match change {
            Ok(change) => change,
            Err(e) => return Err(self.abort(miss_rate, &e.to_string())),
        };

        let statistics = IterationStatistics {
            iteration: self.iteration,
            rays: tallies.len(),
            hits,
            intersections,
            miss_rate,
            k_eff: self.k_eff,
            k_change: relative_change(self.k_eff, k_old),
            flux_change,
        };

        info!(
            "Iteration {:>4}: k-eff = {:.6}, miss rate = {}",
            statistics.iteration,
            statistics.k_eff,
            miss_rate.percent(3)
        );
        debug!("{statistics:?}");

        self.history.push(statistics);
        Ok(statistics)
    }

    /// Power iteration update, skipped when k-eff is fixed
    fn update_eigenvalue(&mut self) {
        if self.settings.mode == RunMode::FixedSource || self.time_step.is_some() {
            return;
        }

        let previous = self.domain.previous_fission_production();
        if previous > 0.0 {
            self.k_eff *= self.domain.fission_production() / previous;
        }
    }

    fn adapt_ray_count(&mut self) {
        let Some(adaptive) = &self.settings.adaptive else {
            return;
        };

        if self.avg_miss_rate > adaptive.trigger_miss_rate && self.rays < adaptive.max_rays {
            let grown = (self.rays as f64 * adaptive.growth).ceil() as usize;
            let rays = grown.clamp(self.rays + 1, adaptive.max_rays);
            info!(
                "Average miss rate {} above {}, increasing rays from {} to {rays}",
                self.avg_miss_rate.percent(2),
                adaptive.trigger_miss_rate.percent(2),
                self.rays
            );
            self.rays = rays;
        }
    }

    /// Update per-region correction factors from accumulated ray density
    ///
    /// Regions crossed less than `reference_crossings` times per iteration
    /// on average have their track length estimates scaled towards the
    /// latest volume estimate, since the simulation averaged volume is
    /// unreliable when sampled so rarely.
    ///
    /// Depends only on statistics from completed iterations, so calling it
    /// again without an iteration in between changes nothing.
    pub fn compute_segment_correction_factors(&mut self) -> Result<()> {
        let reference = self.settings.reference_crossings;
        let factors: Vec<f64> = (0..self.domain.region_count())
            .map(|r| correction_factor(self.domain.ray_density(r), reference))
            .collect();

        self.domain.set_correction_factors(&factors)?;
        Ok(())
    }

    /// Fold an iteration into the running miss rate and act on instability
    ///
    /// `n_hits` is the number of source regions crossed during the
    /// iteration. A single unstable iteration only produces a warning. Once
    /// the policy's consecutive limit is reached the simulation moves to
    /// `Aborted` and [Error::Instability] is returned.
    pub fn instability_check(&mut self, n_hits: u64, k_eff: f64) -> Result<Stability> {
        self.require(&[SimulationState::Iterating], "instability_check")?;

        let miss_rate = self.miss_rate(n_hits);
        let stability = self.monitor.check(miss_rate, k_eff);
        self.avg_miss_rate = self.monitor.average_miss_rate();

        match stability {
            Stability::Stable => {}
            Stability::Unstable { consecutive } => warn!(
                "Unstable iteration {} ({consecutive} in a row): miss rate {}, k-eff {k_eff:.5}",
                self.iteration,
                miss_rate.percent(2)
            ),
            Stability::Fatal => return Err(self.abort(miss_rate, "persistent instability")),
        }

        Ok(stability)
    }

    fn abort(&mut self, miss_rate: f64, reason: &str) -> Error {
        self.state = SimulationState::Aborted;
        let e = Error::Instability {
            iteration: self.iteration,
            miss_rate,
            k_eff: self.k_eff,
        };
        error!("Aborting random ray solve, {reason}: {e}");
        e
    }

    fn miss_rate(&self, n_hits: u64) -> f64 {
        let regions = self.domain.region_count() as f64;
        (regions - (n_hits as f64).min(regions)) / regions
    }

    // ! ------------------------------------------------------------------------
    // !    Reduction and reporting
    // ! ------------------------------------------------------------------------

    /// Combine worker statistics into global totals
    ///
    /// The ray-weighted mean miss rate lands in [GlobalStatistics], the
    /// running average formed by the instability policy is left as it is.
    pub fn reduce_simulation_statistics(&mut self) -> Result<()> {
        self.require(&[SimulationState::Converged], "reduce_simulation_statistics")?;

        let global = reduce_statistics(&self.workers);
        self.total_geometric_intersections = global.intersections;
        self.global = Some(global);

        debug!("Reduced {} worker partitions: {global:?}", self.workers.len());
        self.state = SimulationState::Reduced;
        Ok(())
    }

    /// Hand the final results to a reporter
    pub fn output_simulation_results(
        &mut self,
        reporter: &mut dyn Reporter,
    ) -> Result<SimulationResults> {
        self.require(&[SimulationState::Reduced], "output_simulation_results")?;

        let results = self.results();
        reporter.report(&results)?;
        self.state = SimulationState::Reported;
        Ok(results)
    }

    /// Read-only view of the current results
    pub fn results(&self) -> SimulationResults {
        SimulationResults {
            mode: self.settings.mode,
            source_shape: self.settings.source_shape,
            converged: self.converged,
            iterations: self.iteration,
            k_eff: self.k_eff,
            avg_miss_rate: self.avg_miss_rate,
            mean_miss_rate: self.global.map_or(0.0, |g| g.miss_rate),
            warning_miss_rate: self.settings.instability.warning_miss_rate,
            total_geometric_intersections: self.total_geometric_intersections,
            total_rays: self.global.map_or(0, |g| g.rays),
            negroups: self.negroups,
            ndgroups: self.ndgroups,
            n_source_regions: self.domain.region_count(),
            n_external_source_regions: self.domain.external_source_regions(),
            region_volumes: (0..self.domain.region_count())
                .map(|r| self.domain.region_volume(r))
                .collect(),
            time_step: self.time_step,
        }
    }

    // ! ------------------------------------------------------------------------
    // !    Initial conditions
    // ! ------------------------------------------------------------------------

    /// Copy of the precursor concentrations, region-major
    pub fn get_precursor_initial_condition(&self) -> Result<Vec<f64>> {
        self.require_final("get_precursor_initial_condition")?;
        Ok(self.domain.precursor_state().to_vec())
    }

    /// Copy of the scalar flux, region-major
    pub fn get_scalar_flux_initial_condition(&self) -> Result<Vec<f64>> {
        self.require_final("get_scalar_flux_initial_condition")?;
        Ok(self.domain.flux_state().to_vec())
    }

    /// Copy of the source, region-major
    pub fn get_source_initial_condition(&self) -> Result<Vec<f64>> {
        self.require_final("get_source_initial_condition")?;
        Ok(self.domain.source_state().to_vec())
    }

    /// Complete snapshot for seeding another simulation
    pub fn initial_condition(&self) -> Result<InitialCondition> {
        self.require_final("initial_condition")?;
        Ok(InitialCondition::new(
            self.k_eff,
            self.domain.region_count(),
            self.negroups,
            self.ndgroups,
            self.get_precursor_initial_condition()?,
            self.get_scalar_flux_initial_condition()?,
            self.get_source_initial_condition()?,
        )?)
    }

    fn require_final(&self, operation: &'static str) -> Result<()> {
        self.require(
            &[SimulationState::Reduced, SimulationState::Reported],
            operation,
        )
    }

    fn require(&self, valid: &[SimulationState], operation: &'static str) -> Result<()> {
        match valid.contains(&self.state) {
            true => Ok(()),
            false => Err(Error::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    fn init_progress_bar(&self) -> Result<Bar> {
        BarBuilder::default()
            .total(self.settings.max_iterations)
            .desc("power iteration")
            .unit(" it")
            .disable(!self.settings.progress)
            .build()
            .map_err(|e| Error::ProgressBar(e.to_string()))
    }

    // ! ------------------------------------------------------------------------
    // !    Accessors
    // ! ------------------------------------------------------------------------

    /// Current lifecycle state
    pub fn state(&self) -> SimulationState {
        self.state
    }

    /// Current eigenvalue estimate
    pub fn k_eff(&self) -> f64 {
        self.k_eff
    }

    /// Running average region miss rate, as configured by the policy
    pub fn avg_miss_rate(&self) -> f64 {
        self.avg_miss_rate
    }

    /// Segments traced over all iterations so far
    pub fn total_geometric_intersections(&self) -> u64 {
        self.total_geometric_intersections
    }

    /// Number of energy groups
    pub fn negroups(&self) -> usize {
        self.negroups
    }

    /// Number of delayed neutron precursor groups
    pub fn ndgroups(&self) -> usize {
        self.ndgroups
    }

    /// Number of source regions
    pub fn n_source_regions(&self) -> usize {
        self.domain.region_count()
    }

    /// Iterations completed
    pub fn iterations(&self) -> usize {
        self.iteration
    }

    /// Rays that will be traced next iteration
    pub fn rays_per_iteration(&self) -> usize {
        self.rays
    }

    /// Statistics of every completed iteration
    pub fn history(&self) -> &[IterationStatistics] {
        &self.history
    }

    /// Per-worker partial statistics
    pub fn worker_statistics(&self) -> &[WorkerStatistics] {
        &self.workers
    }

    /// Global statistics, available once reduced
    pub fn global_statistics(&self) -> Option<GlobalStatistics> {
        self.global
    }

    /// The owned source domain
    pub fn domain(&self) -> &dyn SourceDomain {
        self.domain.as_ref()
    }
}

/// Change from `old` to `new` relative to `new`, absolute when `new` is zero
fn relative_change(new: f64, old: f64) -> f64 {
    match new != 0.0 {
        true => ((new - old) / new).abs(),
        false => (new - old).abs(),
    }
}

/// Correction applied to a region's track length tallies
///
/// Blends between no correction for well sampled regions and the ratio of
/// the averaged to the latest volume estimate for regions crossed less than
/// `reference` times per iteration.
fn correction_factor(density: RayDensity, reference: f64) -> f64 {
    let weight = match reference > 0.0 {
        true => (1.0 - density.mean_crossings / reference).max(0.0),
        false => 0.0,
    };

    let ratio = match density.naive_volume > 0.0 {
        true => (density.averaged_volume / density.naive_volume)
            .clamp(CORRECTION_LIMITS.0, CORRECTION_LIMITS.1),
        false => 1.0,
    };

    1.0 + weight * (ratio - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_sampled_regions_uncorrected() {
        let density = RayDensity {
            mean_crossings: 4.0,
            averaged_volume: 0.1,
            naive_volume: 0.2,
        };
        assert_eq!(correction_factor(density, 1.0), 1.0);
    }

    #[test]
    fn rarely_sampled_regions_corrected() {
        let density = RayDensity {
            mean_crossings: 0.5,
            averaged_volume: 0.1,
            naive_volume: 0.2,
        };
        // half weight towards a ratio of 0.5
        assert_eq!(correction_factor(density, 1.0), 0.75);
    }

    #[test]
    fn ratio_is_clamped() {
        let density = RayDensity {
            mean_crossings: 0.0,
            averaged_volume: 1.0,
            naive_volume: 0.01,
        };
        assert_eq!(correction_factor(density, 1.0), 2.0);
    }

    #[test]
    fn unseen_regions_uncorrected() {
        assert_eq!(correction_factor(RayDensity::default(), 1.0), 1.0);
    }

    #[test]
    fn eigenvalue_change() {
        assert_eq!(relative_change(0.8, 1.0), 0.25);
        assert_eq!(relative_change(0.0, 0.0), 0.0);
        assert_eq!(relative_change(0.0, 0.5), 0.5);
        assert!(relative_change(0.0, 1e-12).is_finite());
    }

    #[test]
    fn state_names() {
        assert_eq!(SimulationState::Aborted.to_string(), "aborted");
        assert_eq!(SimulationState::default(), SimulationState::Uninitialized);
    }
}
