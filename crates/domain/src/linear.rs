// internal modules
use crate::domain::{RayDensity, SourceDomain};
use crate::error::{Error, Result};
use crate::flat::FlatSourceDomain;
use crate::initial::InitialCondition;

// neutronics toolbox
use rrtools_geometry::{Point3, Segment, Vector3};

// external crates
use itertools::izip;
use log::trace;
use nalgebra::Matrix3;

/// Below this optical thickness the moment kernel switches to its series form
const SERIES_THRESHOLD: f64 = 1.0e-2;

/// Relative determinant below which a moment matrix is treated as singular
const SINGULAR_THRESHOLD: f64 = 1.0e-10;

/// Source regions with a linearly varying source
///
/// Extends the flat source with a spatial gradient per region and group, so
/// the source at a point `r` in a region with centroid `c` is
///
/// ```text
/// q(r) = q + grad(q) . (r - c)
/// ```
///
/// The mean flux is estimated exactly as for a flat source. Gradients come
/// from the first spatial moments of the flux tallied along every segment,
/// solved against the track-based spatial moment matrix of the region.
/// Regions whose moment matrix is singular (for example, crossed by a
/// single ray) fall back to a flat shape for that iteration.
///
/// Delayed neutron and time absorption sources are kept flat.
#[derive(Debug, Clone)]
pub struct LinearSourceDomain {
    flat: FlatSourceDomain,
    centroids: Vec<Point3<f64>>,

    // per region, current iteration
    track_first: Vec<Vector3<f64>>,
    track_second: Vec<Matrix3<f64>>,

    // per region and energy group, current iteration
    flux_zeroth: Vec<f64>,
    flux_first: Vec<Vector3<f64>>,

    // per region and energy group
    flux_gradient: Vec<Vector3<f64>>,
    source_gradient: Vec<Vector3<f64>>,
}

impl LinearSourceDomain {
    /// Wrap a flat source domain with one centroid per region
    pub fn new(flat: FlatSourceDomain, centroids: Vec<[f64; 3]>) -> Result<Self> {
        let regions = flat.region_count();
        if centroids.len() != regions {
            return Err(Error::CentroidMismatch {
                expected: regions,
                found: centroids.len(),
            });
        }

        let n = regions * flat.group_count();
        trace!("Allocating linear source moments for {n} region-groups");

        Ok(Self {
            flat,
            centroids: centroids.into_iter().map(Point3::from).collect(),
            track_first: vec![Vector3::zeros(); regions],
            track_second: vec![Matrix3::zeros(); regions],
            flux_zeroth: vec![0.0; n],
            flux_first: vec![Vector3::zeros(); n],
            flux_gradient: vec![Vector3::zeros(); n],
            source_gradient: vec![Vector3::zeros(); n],
        })
    }

    /// Underlying flat source estimates
    pub fn flat(&self) -> &FlatSourceDomain {
        &self.flat
    }

    /// Scalar flux gradient of a region in group `g`
    pub fn flux_gradient(&self, region: usize, g: usize) -> Vector3<f64> {
        self.flux_gradient[region * self.flat.group_count() + g]
    }

    /// Source gradient of a region in group `g`
    pub fn source_gradient(&self, region: usize, g: usize) -> Vector3<f64> {
        self.source_gradient[region * self.flat.group_count() + g]
    }

    /// Source at the segment midpoint and its slope along the segment
    fn segment_source(&self, segment: &Segment, g: usize) -> (f64, f64) {
        let region = segment.region;
        let gradient = self.source_gradient(region, g);
        let offset = segment.midpoint() - self.centroids[region];
        (
            self.flat.flat_source(region, g) + gradient.dot(&offset),
            gradient.dot(&segment.direction),
        )
    }

    fn update_flux_gradients(&mut self) {
        let groups = self.flat.group_count();

        for region in 0..self.flat.region_count() {
            let length = self.flat.track_iteration(region);
            if !self.flat.was_hit(region) || length <= 0.0 {
                continue;
            }

            let mean_position = self.track_first[region] / length;
            let moments =
                self.track_second[region] / length - outer(&mean_position, &mean_position);
            let inverse = invert_moments(&moments);

            let span = region * groups..(region + 1) * groups;
            for (zeroth, first, gradient) in izip!(
                &self.flux_zeroth[span.clone()],
                &self.flux_first[span.clone()],
                &mut self.flux_gradient[span]
            ) {
                *gradient = match inverse {
                    Some(inverse) => {
                        let mean_flux = zeroth / length;
                        inverse * (first / length - mean_position * mean_flux)
                    }
                    None => Vector3::zeros(),
                };
            }
        }
    }

    fn update_source_gradients(&mut self, k_eff: f64) {
        let groups = self.flat.group_count();
        let prompt_fraction = self.flat.prompt_fraction();

        for region in 0..self.flat.region_count() {
            let material = self.flat.material(region);
            let span = region * groups..(region + 1) * groups;
            let gradients = &self.flux_gradient[span.clone()];

            // each axis of the gradient is its own multigroup vector
            let axes: Vec<Vec<f64>> = (0..3)
                .map(|axis| gradients.iter().map(|v| v[axis]).collect())
                .collect();
            let fission: Vec<f64> = axes
                .iter()
                .map(|phi| prompt_fraction * material.fission_rate(phi) / k_eff)
                .collect();

            for (g, idx) in span.enumerate() {
                let sigma = self.flat.sigma_t(region, g);
                self.source_gradient[idx] = Vector3::from_fn(|axis, _| {
                    (material.in_scatter(&axes[axis], g) + material.chi(g) * fission[axis]) / sigma
                });
            }
        }
    }
}

impl SourceDomain for LinearSourceDomain {
    fn region_count(&self) -> usize {
        self.flat.region_count()
    }

    fn group_count(&self) -> usize {
        self.flat.group_count()
    }

    fn precursor_group_count(&self) -> usize {
        self.flat.precursor_group_count()
    }

    fn domain_volume(&self) -> f64 {
        self.flat.domain_volume()
    }

    fn external_source_regions(&self) -> usize {
        self.flat.external_source_regions()
    }

    fn reset_iteration(&mut self) {
        self.flat.reset_iteration();
        self.track_first.fill(Vector3::zeros());
        self.track_second.fill(Matrix3::zeros());
        self.flux_zeroth.fill(0.0);
        self.flux_first.fill(Vector3::zeros());
    }

    fn update_source(&mut self, k_eff: f64) {
        self.flat.update_source(k_eff);
        self.update_source_gradients(k_eff);
    }

    fn angular_flux_source(&self, region: usize, point: &Point3<f64>, psi: &mut [f64]) {
        self.flat.angular_flux_source(region, point, psi);
        let offset = point - self.centroids[region];
        for (g, value) in psi.iter_mut().enumerate() {
            *value += self.source_gradient(region, g).dot(&offset);
        }
    }

    /// Exact attenuation through a source varying linearly along the segment
    ///
    /// With `Q(s) = Qm + G (s - L/2)` and `A = psi(0) - Q(0) + G / sigma`,
    /// the change over the segment is `A (1 - exp(-tau)) - G L`.
    fn attenuate(&self, segment: &Segment, psi: &mut [f64], delta: &mut [f64]) {
        let region = segment.region;
        let length = segment.length;

        for g in 0..self.flat.group_count() {
            let sigma = self.flat.sigma_t(region, g);
            let (q_mid, slope) = self.segment_source(segment, g);
            let amplitude = psi[g] - (q_mid - 0.5 * slope * length) + slope / sigma;
            let change = amplitude * -(-sigma * length).exp_m1() - slope * length;
            delta[g] = change;
            psi[g] -= change;
        }
    }

    fn accumulate_volume(&mut self, segment: &Segment) {
        self.flat.accumulate_volume(segment);

        let region = segment.region;
        let length = segment.length;
        let offset = segment.midpoint() - self.centroids[region];
        let u = &segment.direction;

        self.track_first[region] += offset * length;
        self.track_second[region] +=
            (outer(&offset, &offset) + outer(u, u) * (length * length / 12.0)) * length;
    }

    fn accumulate_track_length(
        &mut self,
        region: usize,
        group: usize,
        contribution: f64,
        correction: f64,
    ) {
        self.flat
            .accumulate_track_length(region, group, contribution, correction);
    }

    fn accumulate_moments(&mut self, segment: &Segment, delta: &[f64], correction: f64) {
        let region = segment.region;
        let length = segment.length;
        let groups = self.flat.group_count();
        let offset = segment.midpoint() - self.centroids[region];

        for (g, change) in delta.iter().enumerate() {
            let sigma = self.flat.sigma_t(region, g);
            let tau = sigma * length;
            let (q_mid, slope) = self.segment_source(segment, g);

            // integral of psi along the segment, and of (s - L/2) psi
            let zeroth = q_mid * length + change / sigma;
            let amplitude = (change + slope * length) / -(-tau).exp_m1();
            let along = slope * length.powi(3) / 12.0
                + amplitude * length * length * centred_exponential_moment(tau);

            let idx = region * groups + g;
            self.flux_zeroth[idx] += zeroth * correction;
            self.flux_first[idx] += (offset * zeroth + segment.direction * along) * correction;
        }
    }

    fn update_flux_and_source(&mut self, active_distance: f64) -> u64 {
        let hits = self.flat.update_flux_and_source(active_distance);
        self.update_flux_gradients();
        hits
    }

    fn fission_production(&self) -> f64 {
        self.flat.fission_production()
    }

    fn previous_fission_production(&self) -> f64 {
        self.flat.previous_fission_production()
    }

    fn update_precursors(&mut self, k_eff: f64) {
        self.flat.update_precursors(k_eff);
    }

    fn region_volume(&self, region: usize) -> f64 {
        self.flat.region_volume(region)
    }

    fn ray_density(&self, region: usize) -> RayDensity {
        self.flat.ray_density(region)
    }

    fn set_correction_factors(&mut self, factors: &[f64]) -> Result<()> {
        self.flat.set_correction_factors(factors)
    }

    fn correction_factor(&self, region: usize) -> f64 {
        self.flat.correction_factor(region)
    }

    fn precursor_state(&self) -> &[f64] {
        self.flat.precursor_state()
    }

    fn flux_state(&self) -> &[f64] {
        self.flat.flux_state()
    }

    fn source_state(&self) -> &[f64] {
        self.flat.source_state()
    }

    fn load_initial_condition(
        &mut self,
        initial: &InitialCondition,
        time_step: Option<f64>,
    ) -> Result<()> {
        self.flat.load_initial_condition(initial, time_step)?;
        // snapshots only carry flat shapes
        self.flux_gradient.fill(Vector3::zeros());
        self.source_gradient.fill(Vector3::zeros());
        Ok(())
    }
}

fn outer(a: &Vector3<f64>, b: &Vector3<f64>) -> Matrix3<f64> {
    a * b.transpose()
}

fn invert_moments(moments: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let scale = moments.trace();
    if scale <= 0.0 || moments.determinant().abs() <= SINGULAR_THRESHOLD * scale.powi(3) {
        return None;
    }
    moments.try_inverse()
}

/// `h(tau) = integral of (x - 1/2) exp(-tau x) over [0, 1]`, divided by `1 - exp(-tau)`
fn centred_exponential_moment(tau: f64) -> f64 {
    let attenuation = -(-tau).exp_m1();
    let h = match tau < SERIES_THRESHOLD {
        true => tau * (-1.0 / 12.0 + tau * (1.0 / 24.0 + tau * (-1.0 / 80.0 + tau / 360.0))),
        false => {
            let tail = attenuation - tau * (-tau).exp();
            tail / (tau * tau) - attenuation / (2.0 * tau)
        }
    };
    h / attenuation
}
