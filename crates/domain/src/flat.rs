// internal modules
use crate::domain::{RayDensity, SourceDomain};
use crate::error::{Error, Result};
use crate::initial::InitialCondition;
use crate::kinetics::KineticsData;
use crate::material::{ExternalSource, Material};

// neutronics toolbox
use rrtools_geometry::{Point3, Segment};

// external crates
use log::{debug, trace};

/// State at the beginning of a time step
#[derive(Debug, Clone)]
struct TimeStep {
    dt: f64,
    flux: Vec<f64>,
    precursors: Vec<f64>,
}

/// Source regions with a spatially constant source
///
/// The classic flat source approximation. Within a region the source `q` is
/// constant, and the angular flux across a segment of length `l` changes by
///
/// ```text
/// delta = (psi - q) * (1 - exp(-sigma_t * l))
/// ```
///
/// Summing `delta` over all segments gives the scalar flux estimate
///
/// ```text
/// phi = sum(delta) / (sigma_t * track length) + q
/// ```
///
/// where the track length uses the simulation averaged volume estimate, i.e.
/// the fraction of all tallied distance ever spent in the region.
///
/// Sources are stored divided by the total cross section, as that is how they
/// enter the attenuation. With a time step loaded, the total cross section
/// also carries the time absorption `1 / (v dt)`.
///
/// ```rust
/// # use rrtools_domain::{FlatSourceDomain, Material, SourceDomain};
/// let material = Material {
///     total: vec![1.0],
///     scatter: vec![vec![0.5]],
///     ..Default::default()
/// };
///
/// // four regions of the same material filling 8 cm3
/// let domain = FlatSourceDomain::new(vec![material], vec![0; 4], 8.0, 1).unwrap();
/// assert_eq!(domain.region_count(), 4);
/// assert_eq!(domain.flux_state(), &[1.0; 4]);
/// ```
#[derive(Debug, Clone)]
pub struct FlatSourceDomain {
    materials: Vec<Material>,
    region_material: Vec<usize>,
    groups: usize,
    precursor_groups: usize,
    volume: f64,
    kinetics: Option<KineticsData>,
    time_step: Option<TimeStep>,

    // effective total cross section per material and group
    removal: Vec<f64>,

    // per region
    volumes: Vec<f64>,
    track_total: Vec<f64>,
    track_iteration: Vec<f64>,
    naive_volume: Vec<f64>,
    crossings_total: Vec<u64>,
    crossings_iteration: Vec<u64>,
    hit: Vec<bool>,
    corrections: Vec<f64>,
    distance_total: f64,
    iterations: u64,

    // per region and energy group
    scalar_flux: Vec<f64>,
    scalar_flux_old: Vec<f64>,
    flux_tally: Vec<f64>,
    source: Vec<f64>,
    external: Vec<f64>,

    // per region and precursor group
    precursors: Vec<f64>,
}

impl FlatSourceDomain {
    /// Build a domain of `region_material.len()` regions
    ///
    /// - `materials` - cross sections, each checked against `groups`
    /// - `region_material` - index into `materials` for every region
    /// - `volume` - total volume of the geometry (cm3)
    /// - `groups` - number of energy groups
    ///
    /// Scalar fluxes start at unity and sources at zero.
    pub fn new(
        materials: Vec<Material>,
        region_material: Vec<usize>,
        volume: f64,
        groups: usize,
    ) -> Result<Self> {
        if groups == 0 {
            return Err(Error::NoEnergyGroups);
        }

        if region_material.is_empty() {
            return Err(Error::NoSourceRegions);
        }

        if !volume.is_finite() || volume <= 0.0 {
            return Err(Error::InvalidVolume(volume));
        }

        for material in &materials {
            material.check(groups)?;
        }

        if let Some((region, material)) = region_material
            .iter()
            .enumerate()
            .find(|(_, m)| **m >= materials.len())
        {
            return Err(Error::UnknownMaterial {
                region,
                material: *material,
                available: materials.len(),
            });
        }

        let regions = region_material.len();
        let n = regions * groups;
        trace!("Allocating flat source domain: {regions} regions, {groups} groups");

        let mut domain = Self {
            materials,
            region_material,
            groups,
            precursor_groups: 0,
            volume,
            kinetics: None,
            time_step: None,
            removal: Vec::new(),
            volumes: vec![0.0; regions],
            track_total: vec![0.0; regions],
            track_iteration: vec![0.0; regions],
            naive_volume: vec![0.0; regions],
            crossings_total: vec![0; regions],
            crossings_iteration: vec![0; regions],
            hit: vec![false; regions],
            corrections: vec![1.0; regions],
            distance_total: 0.0,
            iterations: 0,
            scalar_flux: vec![1.0; n],
            scalar_flux_old: vec![1.0; n],
            flux_tally: vec![0.0; n],
            source: vec![0.0; n],
            external: vec![0.0; n],
            precursors: Vec::new(),
        };
        domain.rebuild_removal();
        Ok(domain)
    }

    /// Add fixed external sources, summing any that share a region
    pub fn with_external_sources(mut self, sources: &[ExternalSource]) -> Result<Self> {
        let regions = self.region_material.len();

        for source in sources {
            if source.region >= regions {
                return Err(Error::SourceOutsideDomain {
                    region: source.region,
                    regions,
                });
            }

            if source.strength.len() != self.groups {
                return Err(Error::SourceGroupMismatch {
                    region: source.region,
                    expected: self.groups,
                    found: source.strength.len(),
                });
            }

            let start = source.region * self.groups;
            for (total, s) in self.external[start..start + self.groups]
                .iter_mut()
                .zip(&source.strength)
            {
                *total += s;
            }
        }

        Ok(self)
    }

    /// Attach delayed neutron data, enabling precursor tracking
    pub fn with_kinetics(mut self, kinetics: KineticsData) -> Result<Self> {
        kinetics.check(self.groups)?;
        self.precursor_groups = kinetics.precursor_groups();
        self.precursors = vec![0.0; self.region_material.len() * self.precursor_groups];
        self.kinetics = Some(kinetics);
        Ok(self)
    }

    /// Material assigned to a region
    pub fn material(&self, region: usize) -> &Material {
        &self.materials[self.region_material[region]]
    }

    /// Effective total cross section of a region in group `g`
    pub fn sigma_t(&self, region: usize, g: usize) -> f64 {
        self.removal[self.region_material[region] * self.groups + g]
    }

    /// True once a time step has been loaded
    pub fn is_time_dependent(&self) -> bool {
        self.time_step.is_some()
    }

    /// Fraction of fission neutrons released promptly in the current mode
    ///
    /// Steady state solves treat all fission neutrons as prompt, the delayed
    /// part only appears once precursors are tracked through time.
    pub(crate) fn prompt_fraction(&self) -> f64 {
        match (&self.time_step, &self.kinetics) {
            (Some(_), Some(kinetics)) => 1.0 - kinetics.beta(),
            _ => 1.0,
        }
    }

    /// Was the region crossed during the current iteration
    pub(crate) fn was_hit(&self, region: usize) -> bool {
        self.hit[region]
    }

    /// Distance tallied in a region during the current iteration
    pub(crate) fn track_iteration(&self, region: usize) -> f64 {
        self.track_iteration[region]
    }

    /// Flat source of a region in group `g`
    pub(crate) fn flat_source(&self, region: usize, g: usize) -> f64 {
        self.source[region * self.groups + g]
    }

    fn rebuild_removal(&mut self) {
        let step = self.time_step.as_ref().map(|s| s.dt);
        self.removal = self
            .materials
            .iter()
            .flat_map(|m| m.total.iter().copied().enumerate())
            .map(|(g, sigma)| match (step, &self.kinetics) {
                (Some(dt), Some(kinetics)) => sigma + kinetics.time_absorption(g, dt),
                _ => sigma,
            })
            .collect();
    }

    fn production(&self, flux: &[f64]) -> f64 {
        flux.chunks_exact(self.groups)
            .zip(&self.volumes)
            .zip(&self.region_material)
            .map(|((phi, volume), m)| volume * self.materials[*m].fission_rate(phi))
            .sum()
    }
}

impl SourceDomain for FlatSourceDomain {
    fn region_count(&self) -> usize {
        self.region_material.len()
    }

    fn group_count(&self) -> usize {
        self.groups
    }

    fn precursor_group_count(&self) -> usize {
        self.precursor_groups
    }

    fn domain_volume(&self) -> f64 {
        self.volume
    }

    fn external_source_regions(&self) -> usize {
        self.external
            .chunks_exact(self.groups)
            .filter(|s| s.iter().any(|v| *v > 0.0))
            .count()
    }

    fn reset_iteration(&mut self) {
        self.flux_tally.fill(0.0);
        self.track_iteration.fill(0.0);
        self.crossings_iteration.fill(0);
        self.hit.fill(false);
    }

    fn update_source(&mut self, k_eff: f64) {
        let prompt_fraction = self.prompt_fraction();
        let mut source = Vec::with_capacity(self.source.len());

        for region in 0..self.region_material.len() {
            let material = self.material(region);
            let span = region * self.groups..(region + 1) * self.groups;
            let phi = &self.scalar_flux[span.clone()];
            let fission = prompt_fraction * material.fission_rate(phi) / k_eff;

            let delayed = match (&self.kinetics, &self.time_step) {
                (Some(kinetics), Some(_)) => {
                    let d = self.precursor_groups;
                    kinetics.delayed_emission(&self.precursors[region * d..(region + 1) * d])
                }
                _ => 0.0,
            };

            for (g, idx) in span.enumerate() {
                let mut q = material.in_scatter(phi, g)
                    + material.chi(g) * (fission + delayed)
                    + self.external[idx];

                if let (Some(step), Some(kinetics)) = (&self.time_step, &self.kinetics) {
                    q += kinetics.time_absorption(g, step.dt) * step.flux[idx];
                }

                source.push(q / self.sigma_t(region, g));
            }
        }

        self.source = source;
    }

    fn angular_flux_source(&self, region: usize, _point: &Point3<f64>, psi: &mut [f64]) {
        let start = region * self.groups;
        psi.copy_from_slice(&self.source[start..start + self.groups]);
    }

    fn attenuate(&self, segment: &Segment, psi: &mut [f64], delta: &mut [f64]) {
        let region = segment.region;
        for g in 0..self.groups {
            let tau = self.sigma_t(region, g) * segment.length;
            let change = (psi[g] - self.flat_source(region, g)) * -(-tau).exp_m1();
            delta[g] = change;
            psi[g] -= change;
        }
    }

    fn accumulate_volume(&mut self, segment: &Segment) {
        let region = segment.region;
        self.track_iteration[region] += segment.length;
        self.crossings_iteration[region] += 1;
        self.hit[region] = true;
    }

    fn accumulate_track_length(
        &mut self,
        region: usize,
        group: usize,
        contribution: f64,
        correction: f64,
    ) {
        self.flux_tally[region * self.groups + group] += contribution * correction;
    }

    fn update_flux_and_source(&mut self, active_distance: f64) -> u64 {
        self.iterations += 1;
        self.distance_total += active_distance;
        self.scalar_flux_old.copy_from_slice(&self.scalar_flux);

        let mut hits = 0;
        for region in 0..self.region_material.len() {
            self.track_total[region] += self.track_iteration[region];
            self.crossings_total[region] += self.crossings_iteration[region];

            let averaged = match self.distance_total > 0.0 {
                true => self.track_total[region] / self.distance_total,
                false => 0.0,
            };
            self.naive_volume[region] = match active_distance > 0.0 {
                true => self.track_iteration[region] / active_distance,
                false => 0.0,
            };
            self.volumes[region] = averaged * self.volume;

            let start = region * self.groups;
            if self.hit[region] && averaged > 0.0 && active_distance > 0.0 {
                hits += 1;
                for g in 0..self.groups {
                    let idx = start + g;
                    let sigma = self.sigma_t(region, g);
                    self.scalar_flux[idx] =
                        self.flux_tally[idx] / (sigma * averaged * active_distance) + self.source[idx];
                }
            } else if self.track_total[region] == 0.0 {
                // never seen by a ray, the source is the only information
                self.scalar_flux[start..start + self.groups]
                    .copy_from_slice(&self.source[start..start + self.groups]);
            }
            // missed this time but seen before, keep the last estimate
        }

        debug!(
            "Flux update: {hits}/{} regions hit over {active_distance:.5e} cm",
            self.region_material.len()
        );
        hits
    }

    fn fission_production(&self) -> f64 {
        self.production(&self.scalar_flux)
    }

    fn previous_fission_production(&self) -> f64 {
        self.production(&self.scalar_flux_old)
    }

    fn update_precursors(&mut self, k_eff: f64) {
        let Some(kinetics) = &self.kinetics else {
            return;
        };

        let d = self.precursor_groups;
        if d == 0 {
            return;
        }

        for (region, m) in self.region_material.iter().enumerate() {
            let phi = &self.scalar_flux[region * self.groups..(region + 1) * self.groups];
            let fission = self.materials[*m].fission_rate(phi);
            let span = region * d..(region + 1) * d;

            let updated = match &self.time_step {
                Some(step) => {
                    kinetics.advance_precursors(&step.precursors[span.clone()], fission, k_eff, step.dt)
                }
                None => kinetics.equilibrium_precursors(fission, k_eff),
            };

            self.precursors[span].copy_from_slice(&updated);
        }
    }

    fn region_volume(&self, region: usize) -> f64 {
        self.volumes[region]
    }

    fn ray_density(&self, region: usize) -> RayDensity {
        RayDensity {
            mean_crossings: match self.iterations {
                0 => 0.0,
                n => self.crossings_total[region] as f64 / n as f64,
            },
            averaged_volume: match self.distance_total > 0.0 {
                true => self.track_total[region] / self.distance_total,
                false => 0.0,
            },
            naive_volume: self.naive_volume[region],
        }
    }

    fn set_correction_factors(&mut self, factors: &[f64]) -> Result<()> {
        if factors.len() != self.corrections.len() {
            return Err(Error::CorrectionMismatch {
                expected: self.corrections.len(),
                found: factors.len(),
            });
        }
        self.corrections.copy_from_slice(factors);
        Ok(())
    }

    fn correction_factor(&self, region: usize) -> f64 {
        self.corrections[region]
    }

    fn precursor_state(&self) -> &[f64] {
        &self.precursors
    }

    fn flux_state(&self) -> &[f64] {
        &self.scalar_flux
    }

    fn source_state(&self) -> &[f64] {
        &self.source
    }

    fn load_initial_condition(
        &mut self,
        initial: &InitialCondition,
        time_step: Option<f64>,
    ) -> Result<()> {
        initial.check_shape(
            self.region_material.len(),
            self.groups,
            self.precursor_groups,
        )?;

        // everything is checked before any state changes
        let step = match time_step {
            Some(dt) if !dt.is_finite() || dt <= 0.0 => return Err(Error::InvalidTimeStep(dt)),
            Some(_) if self.kinetics.is_none() => return Err(Error::MissingKinetics),
            Some(dt) => Some(TimeStep {
                dt,
                flux: initial.scalar_flux().to_vec(),
                precursors: initial.precursors().to_vec(),
            }),
            None => None,
        };

        self.scalar_flux.copy_from_slice(initial.scalar_flux());
        self.scalar_flux_old.copy_from_slice(initial.scalar_flux());
        self.source.copy_from_slice(initial.source());
        self.precursors.copy_from_slice(initial.precursors());
        self.time_step = step;
        self.rebuild_removal();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrtools_geometry::Vector3;

    fn two_group() -> Material {
        Material {
            name: "fuel".to_string(),
            total: vec![1.0, 2.0],
            nu_fission: vec![0.2, 2.4],
            chi: vec![1.0, 0.0],
            scatter: vec![vec![0.0, 0.5], vec![0.0, 0.0]],
        }
    }

    fn segment(region: usize, length: f64) -> Segment {
        Segment {
            region,
            length,
            start: Point3::origin(),
            direction: Vector3::x(),
        }
    }

    #[test]
    fn unknown_material() {
        let result = FlatSourceDomain::new(vec![two_group()], vec![0, 1], 1.0, 2);
        assert_eq!(
            result.unwrap_err(),
            Error::UnknownMaterial {
                region: 1,
                material: 1,
                available: 1
            }
        );
    }

    #[test]
    fn source_from_unit_flux() {
        let mut domain = FlatSourceDomain::new(vec![two_group()], vec![0], 1.0, 2).unwrap();
        domain.update_source(1.0);
        // (0.2 + 2.4) / 1.0 and 0.5 / 2.0
        assert!((domain.source_state()[0] - 2.6).abs() < 1e-12);
        assert_eq!(domain.source_state()[1], 0.25);
    }

    #[test]
    fn attenuation_towards_source() {
        let mut domain = FlatSourceDomain::new(vec![two_group()], vec![0], 1.0, 2).unwrap();
        domain.update_source(1.0);

        let mut psi = vec![0.0, 0.0];
        let mut delta = vec![0.0, 0.0];
        domain.attenuate(&segment(0, 1.0e6), &mut psi, &mut delta);

        // an optically thick segment relaxes onto the source
        assert!((psi[0] - domain.source_state()[0]).abs() < 1e-12);
        assert!((psi[1] - domain.source_state()[1]).abs() < 1e-12);
        assert!(delta[0] < 0.0);
    }

    #[test]
    fn single_region_flux_is_source() {
        let mut domain = FlatSourceDomain::new(vec![two_group()], vec![0], 2.0, 2).unwrap();
        domain.reset_iteration();
        domain.update_source(1.0);

        // a ray starting on the source never changes
        let mut psi = vec![0.0; 2];
        let mut delta = vec![0.0; 2];
        domain.angular_flux_source(0, &Point3::origin(), &mut psi);
        let s = segment(0, 3.0);
        domain.attenuate(&s, &mut psi, &mut delta);
        domain.accumulate_volume(&s);
        for (g, d) in delta.iter().enumerate() {
            domain.accumulate_track_length(0, g, *d, 1.0);
        }

        assert_eq!(domain.update_flux_and_source(3.0), 1);
        assert_eq!(domain.flux_state(), domain.source_state());
        assert_eq!(domain.region_volume(0), 2.0);
    }

    #[test]
    fn missed_regions_keep_flux() {
        let mut domain = FlatSourceDomain::new(vec![two_group()], vec![0, 0], 2.0, 2).unwrap();

        // first iteration sees both regions
        domain.reset_iteration();
        domain.update_source(1.0);
        domain.accumulate_volume(&segment(0, 1.0));
        domain.accumulate_volume(&segment(1, 1.0));
        assert_eq!(domain.update_flux_and_source(2.0), 2);
        let first = domain.flux_state().to_vec();

        // second iteration misses region 1
        domain.reset_iteration();
        domain.update_source(1.0);
        domain.accumulate_volume(&segment(0, 2.0));
        assert_eq!(domain.update_flux_and_source(2.0), 1);
        assert_eq!(domain.flux_state()[2..], first[2..]);
        assert_eq!(domain.ray_density(1).naive_volume, 0.0);
        assert_eq!(domain.ray_density(1).mean_crossings, 0.5);
    }

    #[test]
    fn volumes_sum_to_domain() {
        let mut domain = FlatSourceDomain::new(vec![two_group()], vec![0; 3], 6.0, 2).unwrap();
        domain.reset_iteration();
        domain.accumulate_volume(&segment(0, 1.0));
        domain.accumulate_volume(&segment(1, 2.0));
        domain.accumulate_volume(&segment(2, 3.0));
        domain.update_flux_and_source(6.0);

        let total: f64 = (0..3).map(|r| domain.region_volume(r)).sum();
        assert!((total - 6.0).abs() < 1e-12);
        assert_eq!(domain.region_volume(2), 3.0);
    }

    #[test]
    fn external_source_added() {
        let material = Material {
            total: vec![2.0],
            scatter: vec![vec![0.0]],
            ..Default::default()
        };
        let source = ExternalSource {
            region: 1,
            strength: vec![4.0],
        };
        let mut domain = FlatSourceDomain::new(vec![material], vec![0, 0], 1.0, 1)
            .unwrap()
            .with_external_sources(&[source])
            .unwrap();

        domain.update_source(1.0);
        assert_eq!(domain.source_state(), &[0.0, 2.0]);
        assert_eq!(domain.external_source_regions(), 1);
    }

    #[test]
    fn time_step_needs_kinetics() {
        let mut domain = FlatSourceDomain::new(vec![two_group()], vec![0], 1.0, 2).unwrap();
        let initial = InitialCondition::new(1.0, 1, 2, 0, vec![], vec![1.0; 2], vec![1.0; 2]).unwrap();
        assert_eq!(
            domain.load_initial_condition(&initial, Some(1.0)),
            Err(Error::MissingKinetics)
        );
        assert!(domain.load_initial_condition(&initial, None).is_ok());
    }

    #[test]
    fn time_absorption_added_to_total() {
        let kinetics = KineticsData {
            velocities: vec![10.0, 1.0],
            delayed_fractions: vec![0.0065],
            decay_constants: vec![0.08],
        };
        let mut domain = FlatSourceDomain::new(vec![two_group()], vec![0], 1.0, 2)
            .unwrap()
            .with_kinetics(kinetics)
            .unwrap();
        let initial =
            InitialCondition::new(1.0, 1, 2, 1, vec![0.0], vec![1.0; 2], vec![1.0; 2]).unwrap();

        domain.load_initial_condition(&initial, Some(0.5)).unwrap();
        assert!(domain.is_time_dependent());
        assert_eq!(domain.sigma_t(0, 0), 1.2);
        assert_eq!(domain.sigma_t(0, 1), 4.0);
    }
}
