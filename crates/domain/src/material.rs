// internal modules
use crate::error::{Error, Result};

// external crates
use serde::{Deserialize, Serialize};

/// Multigroup macroscopic cross sections for one material
///
/// All values are per unit length (1/cm). Fission data may be left empty for
/// non-fissile materials, in which case they are treated as zero.
///
/// The scattering matrix is indexed as `scatter[from][to]`, so `scatter[0][1]`
/// is down-scattering from the first group into the second.
///
/// ```rust
/// # use rrtools_domain::Material;
/// let absorber = Material {
///     name: "absorber".to_string(),
///     total: vec![1.0, 2.0],
///     scatter: vec![vec![0.0, 0.5], vec![0.0, 0.0]],
///     ..Default::default()
/// };
///
/// assert!(absorber.check(2).is_ok());
/// assert!(!absorber.is_fissile());
/// assert_eq!(absorber.nu_fission(1), 0.0);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    /// Name used in messages
    pub name: String,
    /// Total cross section per group
    pub total: Vec<f64>,
    /// Fission neutron production (nu * sigma_f) per group
    pub nu_fission: Vec<f64>,
    /// Fission spectrum, fraction of fission neutrons born in each group
    pub chi: Vec<f64>,
    /// Group-to-group scattering matrix, `scatter[from][to]`
    pub scatter: Vec<Vec<f64>>,
}

impl Material {
    /// Check the material is usable for a problem with `groups` energy groups
    pub fn check(&self, groups: usize) -> Result<()> {
        self.check_length("total", self.total.len(), groups)?;
        self.check_length("scatter", self.scatter.len(), groups)?;
        for row in &self.scatter {
            self.check_length("scatter row", row.len(), groups)?;
        }

        // fission data is all or nothing
        if self.is_fissile() || !self.chi.is_empty() {
            self.check_length("nu_fission", self.nu_fission.len(), groups)?;
            self.check_length("chi", self.chi.len(), groups)?;
        }

        for (group, sigma) in self.total.iter().enumerate() {
            if !sigma.is_finite() || *sigma <= 0.0 {
                return Err(self.invalid("total", group));
            }
        }

        let non_negative = |v: &f64| v.is_finite() && *v >= 0.0;
        if let Some(group) = self.nu_fission.iter().position(|v| !non_negative(v)) {
            return Err(self.invalid("nu_fission", group));
        }
        if let Some(group) = self.chi.iter().position(|v| !non_negative(v)) {
            return Err(self.invalid("chi", group));
        }
        for row in &self.scatter {
            if let Some(group) = row.iter().position(|v| !non_negative(v)) {
                return Err(self.invalid("scatter", group));
            }
        }

        Ok(())
    }

    /// True if any group produces fission neutrons
    pub fn is_fissile(&self) -> bool {
        self.nu_fission.iter().any(|v| *v > 0.0)
    }

    /// Fission neutron production in group `g`, zero if non-fissile
    pub fn nu_fission(&self, g: usize) -> f64 {
        self.nu_fission.get(g).copied().unwrap_or(0.0)
    }

    /// Fission spectrum in group `g`, zero if non-fissile
    pub fn chi(&self, g: usize) -> f64 {
        self.chi.get(g).copied().unwrap_or(0.0)
    }

    /// Fission neutron production rate density for a group-wise flux
    pub fn fission_rate(&self, flux: &[f64]) -> f64 {
        flux.iter()
            .enumerate()
            .map(|(g, phi)| self.nu_fission(g) * phi)
            .sum()
    }

    /// In-scatter rate density into group `g` for a group-wise flux
    pub fn in_scatter(&self, flux: &[f64], g: usize) -> f64 {
        self.scatter
            .iter()
            .zip(flux)
            .map(|(row, phi)| row[g] * phi)
            .sum()
    }

    fn check_length(&self, field: &'static str, found: usize, expected: usize) -> Result<()> {
        if found != expected {
            return Err(Error::MaterialGroupMismatch {
                material: self.name.clone(),
                field,
                expected,
                found,
            });
        }
        Ok(())
    }

    fn invalid(&self, field: &'static str, group: usize) -> Error {
        Error::InvalidCrossSection {
            material: self.name.clone(),
            field,
            group,
        }
    }
}

/// Fixed, isotropic neutron source in a single region
///
/// Strengths are emission densities per group (n/cm3/s), and are added to the
/// region source on every iteration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSource {
    /// Index of the source region
    pub region: usize,
    /// Emission density per group
    pub strength: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn fuel() -> Material {
        Material {
            name: "fuel".to_string(),
            total: vec![1.0, 2.0],
            nu_fission: vec![0.2, 2.4],
            chi: vec![1.0, 0.0],
            scatter: vec![vec![0.0, 0.5], vec![0.0, 0.0]],
        }
    }

    #[test]
    fn valid_fuel() {
        assert!(fuel().check(2).is_ok());
        assert!(fuel().is_fissile());
    }

    #[test]
    fn wrong_group_count() {
        assert_eq!(
            fuel().check(3),
            Err(Error::MaterialGroupMismatch {
                material: "fuel".to_string(),
                field: "total",
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn fission_without_spectrum() {
        let mut material = fuel();
        material.chi.clear();
        assert!(material.check(2).is_err());
    }

    #[test]
    fn zero_total_rejected() {
        let mut material = fuel();
        material.total[1] = 0.0;
        assert_eq!(
            material.check(2),
            Err(Error::InvalidCrossSection {
                material: "fuel".to_string(),
                field: "total",
                group: 1
            })
        );
    }

    #[rstest]
    #[case(-0.1)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn undefined_scatter_rejected(#[case] value: f64) {
        let mut material = fuel();
        material.scatter[0][1] = value;
        assert_eq!(
            material.check(2),
            Err(Error::InvalidCrossSection {
                material: "fuel".to_string(),
                field: "scatter",
                group: 1
            })
        );
    }

    #[test]
    fn rates() {
        let material = fuel();
        let flux = [2.6, 0.65];
        assert!((material.fission_rate(&flux) - 2.08).abs() < 1e-12);
        assert_eq!(material.in_scatter(&flux, 1), 1.3);
        assert_eq!(material.in_scatter(&flux, 0), 0.0);
    }
}
