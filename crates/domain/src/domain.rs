// internal modules
use crate::error::Result;
use crate::initial::InitialCondition;

// neutronics toolbox
use rrtools_geometry::{Point3, Segment};

/// Ray sampling statistics of a single region
///
/// Used to judge whether a region is crossed often enough for its track
/// length estimates to be trusted.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RayDensity {
    /// Mean number of ray crossings per completed iteration
    pub mean_crossings: f64,
    /// Fraction of the domain volume, averaged over all iterations
    pub averaged_volume: f64,
    /// Fraction of the domain volume seen in the last iteration alone
    pub naive_volume: f64,
}

/// Capability interface for per-region source data
///
/// A domain owns the volume, scalar flux, source and precursor estimates of
/// every source region. The solver drives one iteration as:
///
/// 1. [reset_iteration()](SourceDomain::reset_iteration)
/// 2. [update_source()](SourceDomain::update_source)
/// 3. trace rays, calling [attenuate()](SourceDomain::attenuate) per
///    segment and merging the results with the `accumulate_*` methods
/// 4. [update_flux_and_source()](SourceDomain::update_flux_and_source)
/// 5. [update_precursors()](SourceDomain::update_precursors)
///
/// Arrays are flattened region-major, `index = region * groups + group`.
///
/// Implementations differ in the shape of the source within a region, and the
/// solver never needs to know which one it holds.
pub trait SourceDomain: std::fmt::Debug + Send + Sync {
    /// Number of source regions
    fn region_count(&self) -> usize;

    /// Number of energy groups
    fn group_count(&self) -> usize;

    /// Number of delayed neutron precursor groups
    fn precursor_group_count(&self) -> usize;

    /// Total volume of the geometry (cm3)
    fn domain_volume(&self) -> f64;

    /// Number of regions containing a fixed external source
    fn external_source_regions(&self) -> usize;

    /// Clear the per-iteration tallies
    fn reset_iteration(&mut self);

    /// Recompute region sources from the latest flux for eigenvalue `k_eff`
    fn update_source(&mut self, k_eff: f64);

    /// Fill `psi` with the source at `point`, the starting angular flux of a
    /// new ray
    fn angular_flux_source(&self, region: usize, point: &Point3<f64>, psi: &mut [f64]);

    /// Attenuate the angular flux `psi` across a segment
    ///
    /// Writes the per-group change in angular flux to `delta` and updates
    /// `psi` in place. Never mutates the domain, so rays can be traced in
    /// parallel against a shared reference.
    fn attenuate(&self, segment: &Segment, psi: &mut [f64], delta: &mut [f64]);

    /// Record a segment crossing for the volume estimate
    fn accumulate_volume(&mut self, segment: &Segment);

    /// Add a track length flux contribution, weighted by `correction`
    fn accumulate_track_length(
        &mut self,
        region: usize,
        group: usize,
        contribution: f64,
        correction: f64,
    );

    /// Add spatial flux moments of a segment, for sources that need them
    fn accumulate_moments(&mut self, _segment: &Segment, _delta: &[f64], _correction: f64) {}

    /// Normalise the tallies of a finished sweep into new scalar fluxes
    ///
    /// `active_distance` is the total distance tallied by all rays in the
    /// iteration. Returns the number of regions crossed by at least one ray.
    fn update_flux_and_source(&mut self, active_distance: f64) -> u64;

    /// Volume integrated fission neutron production of the latest flux
    fn fission_production(&self) -> f64;

    /// Volume integrated fission neutron production of the flux before the
    /// last update
    fn previous_fission_production(&self) -> f64;

    /// Update delayed neutron precursors from the latest flux
    fn update_precursors(&mut self, k_eff: f64);

    /// Estimated volume of a region (cm3)
    fn region_volume(&self, region: usize) -> f64;

    /// Ray sampling statistics of a region
    fn ray_density(&self, region: usize) -> RayDensity;

    /// Replace the per-region track length correction weights
    fn set_correction_factors(&mut self, factors: &[f64]) -> Result<()>;

    /// Track length correction weight of a region
    fn correction_factor(&self, region: usize) -> f64;

    /// Precursor concentrations, region-major
    fn precursor_state(&self) -> &[f64];

    /// Scalar fluxes, region-major
    fn flux_state(&self) -> &[f64];

    /// Region sources, region-major
    fn source_state(&self) -> &[f64];

    /// Load the state of a previous solve
    ///
    /// With `time_step` set the domain also switches to time-dependent
    /// sources, taking the loaded state as the beginning of the step.
    fn load_initial_condition(
        &mut self,
        initial: &InitialCondition,
        time_step: Option<f64>,
    ) -> Result<()>;
}
