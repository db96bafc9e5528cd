//! Tracing and merging of individual rays

// neutronics toolbox
use rrtools_domain::SourceDomain;
use rrtools_geometry::{ray_rng, sample_ray, RayTracer, Segment};

// external crates
use rayon::prelude::*;

/// Fixed parameters shared by every ray of an iteration
#[derive(Debug, Clone, Copy)]
pub(crate) struct RayParameters {
    pub seed: u64,
    pub iteration: u64,
    pub distance_inactive: f64,
    pub distance_active: f64,
}

/// Everything a single ray contributes to an iteration
///
/// Rays only read the domain while tracing. Tallies are merged afterwards
/// in ray order, which keeps results identical for any number of threads.
#[derive(Debug, Default, Clone)]
pub(crate) struct RayTally {
    /// Active segments in order of travel
    pub segments: Vec<Segment>,
    /// Change in angular flux over each active segment, groups contiguous
    pub deltas: Vec<f64>,
    /// Segments traced, including the dead zone
    pub intersections: u64,
    /// Distance travelled in the active zone
    pub active_distance: f64,
}

/// Trace every ray of an iteration in parallel
pub(crate) fn sweep<T>(
    tracer: &T,
    domain: &dyn SourceDomain,
    parameters: RayParameters,
    rays: usize,
) -> Vec<RayTally>
where
    T: RayTracer + ?Sized,
{
    (0..rays)
        .into_par_iter()
        .map(|ray| trace_ray(tracer, domain, parameters, ray as u64))
        .collect()
}

/// Follow one ray through its dead zone and active length
///
/// The angular flux starts at the source of the birth region. Dead zone
/// segments attenuate the flux without being tallied, a segment straddling
/// the end of the dead zone is split in two.
pub(crate) fn trace_ray<T>(
    tracer: &T,
    domain: &dyn SourceDomain,
    parameters: RayParameters,
    ray: u64,
) -> RayTally
where
    T: RayTracer + ?Sized,
{
    let mut rng = ray_rng(parameters.seed, parameters.iteration, ray);
    let (origin, direction) = sample_ray(&mut rng, tracer);

    let groups = domain.group_count();
    let mut psi = vec![0.0; groups];
    let mut delta = vec![0.0; groups];
    let mut tally = RayTally::default();

    let dead = parameters.distance_inactive;
    let total = dead + parameters.distance_active;
    let mut travelled = 0.0;

    for (i, segment) in tracer.trace(origin, direction).enumerate() {
        if i == 0 {
            domain.angular_flux_source(segment.region, &segment.start, &mut psi);
        }
        tally.intersections += 1;

        // never tally beyond the end of the ray
        let (segment, _) = segment.split_at(total - travelled);

        let (inactive, active) = segment.split_at((dead - travelled).max(0.0));
        if inactive.length > 0.0 {
            domain.attenuate(&inactive, &mut psi, &mut delta);
            travelled += inactive.length;
        }

        if active.length > 0.0 {
            domain.attenuate(&active, &mut psi, &mut delta);
            tally.segments.push(active);
            tally.deltas.extend_from_slice(&delta);
            tally.active_distance += active.length;
            travelled += active.length;
        }

        if travelled >= total {
            break;
        }
    }

    tally
}

/// Fold one ray's contributions into the domain
pub(crate) fn merge(domain: &mut dyn SourceDomain, tally: &RayTally) {
    let groups = domain.group_count();

    for (segment, delta) in tally.segments.iter().zip(tally.deltas.chunks_exact(groups)) {
        let region = segment.region;
        let correction = domain.correction_factor(region);

        domain.accumulate_volume(segment);
        for (g, d) in delta.iter().enumerate() {
            domain.accumulate_track_length(region, g, *d, correction);
        }
        domain.accumulate_moments(segment, delta, correction);
    }
}
