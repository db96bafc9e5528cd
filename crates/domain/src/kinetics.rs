// internal modules
use crate::error::{Error, Result};

// external crates
use serde::{Deserialize, Serialize};

/// Delayed neutron and neutron speed data for time-dependent steps
///
/// A single set of delayed neutron data is applied to every fissile
/// material, and delayed neutrons are born with the prompt fission spectrum.
///
/// ```rust
/// # use rrtools_domain::KineticsData;
/// let kinetics = KineticsData {
///     velocities: vec![2.0e9, 2.2e5],
///     delayed_fractions: vec![2.1e-4, 1.4e-3],
///     decay_constants: vec![0.0124, 0.0305],
/// };
///
/// assert!(kinetics.check(2).is_ok());
/// assert_eq!(kinetics.precursor_groups(), 2);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KineticsData {
    /// Mean neutron speed per energy group (cm/s)
    pub velocities: Vec<f64>,
    /// Delayed neutron fraction (beta) per precursor group
    pub delayed_fractions: Vec<f64>,
    /// Decay constant (lambda) per precursor group (1/s)
    pub decay_constants: Vec<f64>,
}

impl KineticsData {
    /// Number of delayed neutron precursor groups
    pub fn precursor_groups(&self) -> usize {
        self.delayed_fractions.len()
    }

    /// Total delayed neutron fraction
    pub fn beta(&self) -> f64 {
        self.delayed_fractions.iter().sum()
    }

    /// Check consistency against the number of energy groups
    pub fn check(&self, groups: usize) -> Result<()> {
        if self.velocities.len() != groups {
            return Err(Error::KineticsMismatch {
                field: "velocities",
                expected: groups,
                found: self.velocities.len(),
            });
        }

        if self.decay_constants.len() != self.precursor_groups() {
            return Err(Error::KineticsMismatch {
                field: "decay_constants",
                expected: self.precursor_groups(),
                found: self.decay_constants.len(),
            });
        }

        if self.velocities.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(Error::InvalidKinetics {
                field: "velocities",
            });
        }

        let valid = |v: &f64| v.is_finite() && *v >= 0.0;
        if !self.delayed_fractions.iter().all(valid) || self.beta() >= 1.0 {
            return Err(Error::InvalidKinetics {
                field: "delayed_fractions",
            });
        }

        if !self.decay_constants.iter().all(valid) {
            return Err(Error::InvalidKinetics {
                field: "decay_constants",
            });
        }

        Ok(())
    }

    /// Precursor concentration in equilibrium with a steady fission rate
    ///
    /// Balances production `beta * F / k` against decay `lambda * C`. Groups
    /// that never decay have no equilibrium and are left empty.
    pub fn equilibrium_precursors(&self, fission_rate: f64, k_eff: f64) -> Vec<f64> {
        self.delayed_fractions
            .iter()
            .zip(&self.decay_constants)
            .map(|(beta, lambda)| match *lambda > 0.0 {
                true => beta * fission_rate / (k_eff * lambda),
                false => 0.0,
            })
            .collect()
    }

    /// Advance precursor concentrations over one backward Euler time step
    ///
    /// `C(n+1) = (C(n) + dt * beta * F / k) / (1 + lambda * dt)`
    ///
    /// Groups that never decay are frozen at `C(n)`, matching the empty
    /// equilibrium they get in a static solve.
    pub fn advance_precursors(
        &self,
        previous: &[f64],
        fission_rate: f64,
        k_eff: f64,
        dt: f64,
    ) -> Vec<f64> {
        previous
            .iter()
            .zip(&self.delayed_fractions)
            .zip(&self.decay_constants)
            .map(|((c, beta), lambda)| match *lambda > 0.0 {
                true => (c + dt * beta * fission_rate / k_eff) / (1.0 + lambda * dt),
                false => *c,
            })
            .collect()
    }

    /// Delayed neutron emission rate density from precursor concentrations
    pub fn delayed_emission(&self, precursors: &[f64]) -> f64 {
        precursors
            .iter()
            .zip(&self.decay_constants)
            .map(|(c, lambda)| lambda * c)
            .sum()
    }

    /// Time absorption `1 / (v dt)` for energy group `g`
    pub fn time_absorption(&self, g: usize, dt: f64) -> f64 {
        1.0 / (self.velocities[g] * dt)
    }
}
