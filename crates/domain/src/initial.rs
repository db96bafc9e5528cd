// internal modules
use crate::error::{Error, Result};

// external crates
use serde::{Deserialize, Serialize};

/// Converged state handed from one solve to the next
///
/// Holds deep copies of the precursor concentrations, scalar fluxes and
/// sources of a finished solve, along with the eigenvalue used to normalise
/// fission in later time steps. Arrays are flattened region-major:
///
/// ```text
/// scalar_flux[region * groups + group]
/// source[region * groups + group]
/// precursors[region * precursor_groups + precursor_group]
/// ```
///
/// The shape is checked on construction and the contents cannot be changed
/// afterwards. Persisting a snapshot is left to the caller, which is why it
/// can be (de)serialised.
///
/// ```rust
/// # use rrtools_domain::InitialCondition;
/// let initial = InitialCondition::new(1.0, 2, 1, 0, vec![], vec![1.0, 2.0], vec![0.5, 0.5]).unwrap();
/// assert_eq!(initial.scalar_flux(), &[1.0, 2.0]);
///
/// // two regions of one group needs two flux values
/// assert!(InitialCondition::new(1.0, 2, 1, 0, vec![], vec![1.0], vec![0.5, 0.5]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialCondition {
    k_eff: f64,
    regions: usize,
    groups: usize,
    precursor_groups: usize,
    precursors: Vec<f64>,
    scalar_flux: Vec<f64>,
    source: Vec<f64>,
}

impl InitialCondition {
    /// Build a snapshot, checking every array against the stated shape
    pub fn new(
        k_eff: f64,
        regions: usize,
        groups: usize,
        precursor_groups: usize,
        precursors: Vec<f64>,
        scalar_flux: Vec<f64>,
        source: Vec<f64>,
    ) -> Result<Self> {
        let initial = Self {
            k_eff,
            regions,
            groups,
            precursor_groups,
            precursors,
            scalar_flux,
            source,
        };
        initial.check_lengths()?;
        Ok(initial)
    }

    /// Check this snapshot fits a domain of the given shape
    ///
    /// Group counts are compared before array lengths so that the reported
    /// error points at the real cause.
    pub fn check_shape(&self, regions: usize, groups: usize, precursor_groups: usize) -> Result<()> {
        let expected = [
            ("regions", regions, self.regions),
            ("energy groups", groups, self.groups),
            ("precursor groups", precursor_groups, self.precursor_groups),
        ];

        for (field, expected, found) in expected {
            if expected != found {
                return Err(Error::InitialConditionMismatch {
                    field,
                    expected,
                    found,
                });
            }
        }

        self.check_lengths()
    }

    fn check_lengths(&self) -> Result<()> {
        let expected = [
            ("precursors", self.regions * self.precursor_groups, self.precursors.len()),
            ("scalar flux", self.regions * self.groups, self.scalar_flux.len()),
            ("source", self.regions * self.groups, self.source.len()),
        ];

        for (field, expected, found) in expected {
            if expected != found {
                return Err(Error::InitialConditionMismatch {
                    field,
                    expected,
                    found,
                });
            }
        }

        Ok(())
    }

    /// Eigenvalue of the solve that produced the snapshot
    pub fn k_eff(&self) -> f64 {
        self.k_eff
    }

    /// Number of source regions
    pub fn regions(&self) -> usize {
        self.regions
    }

    /// Number of energy groups
    pub fn groups(&self) -> usize {
        self.groups
    }

    /// Number of delayed neutron precursor groups
    pub fn precursor_groups(&self) -> usize {
        self.precursor_groups
    }

    /// Precursor concentrations per region per precursor group
    pub fn precursors(&self) -> &[f64] {
        &self.precursors
    }

    /// Scalar flux per region per energy group
    pub fn scalar_flux(&self) -> &[f64] {
        &self.scalar_flux
    }

    /// Source per region per energy group
    pub fn source(&self) -> &[f64] {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> InitialCondition {
        InitialCondition::new(
            0.95,
            2,
            2,
            1,
            vec![0.1, 0.2],
            vec![1.0, 2.0, 3.0, 4.0],
            vec![0.5; 4],
        )
        .unwrap()
    }

    #[test]
    fn matching_shape() {
        assert!(snapshot().check_shape(2, 2, 1).is_ok());
    }

    #[test]
    fn group_mismatch_reported_first() {
        assert_eq!(
            snapshot().check_shape(2, 3, 1),
            Err(Error::InitialConditionMismatch {
                field: "energy groups",
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn precursor_group_mismatch() {
        assert!(snapshot().check_shape(2, 2, 6).is_err());
    }

    #[test]
    fn bad_precursor_length() {
        let result = InitialCondition::new(1.0, 2, 1, 2, vec![0.0; 3], vec![1.0; 2], vec![1.0; 2]);
        assert_eq!(
            result,
            Err(Error::InitialConditionMismatch {
                field: "precursors",
                expected: 4,
                found: 3
            })
        );
    }
}
