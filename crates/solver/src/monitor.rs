//! Detection of iterations spoilt by poor ray coverage

// internal modules
use crate::settings::{InstabilityPolicy, MissRateAveraging, MissRateCriterion};

/// Classification of a single iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stability {
    /// Nothing unusual
    Stable,
    /// Flagged, but not yet enough in a row to abort
    Unstable { consecutive: usize },
    /// Persistent or unrecoverable instability, the run must stop
    Fatal,
}

/// Is an iteration with this region miss rate and k-eff unstable
///
/// A pure function of the iteration statistics, any state is held by the
/// [InstabilityMonitor].
///
/// ```rust
/// # use rrtools_solver::{is_unstable, InstabilityPolicy};
/// let policy = InstabilityPolicy::default();
/// assert!(!is_unstable(&policy, 0.0, 1.0));
/// assert!(is_unstable(&policy, 0.5, 1.0));
/// assert!(is_unstable(&policy, 0.0, 25.0));
/// ```
pub fn is_unstable(policy: &InstabilityPolicy, miss_rate: f64, k_eff: f64) -> bool {
    miss_rate > policy.miss_rate_threshold || k_eff < policy.k_min || k_eff > policy.k_max
}

/// Running miss rate average and consecutive instability counter
#[derive(Debug, Clone, PartialEq)]
pub struct InstabilityMonitor {
    policy: InstabilityPolicy,
    samples: usize,
    average: f64,
    consecutive: usize,
}

impl InstabilityMonitor {
    /// Fresh monitor with no iterations recorded
    pub fn new(policy: InstabilityPolicy) -> Self {
        Self {
            policy,
            samples: 0,
            average: 0.0,
            consecutive: 0,
        }
    }

    /// Fold one iteration into the average and classify it
    ///
    /// The policy's criterion decides whether the iteration's own miss rate
    /// or the updated average is held against the threshold. A non-finite
    /// k-eff can never recover and is fatal straight away.
    pub fn check(&mut self, miss_rate: f64, k_eff: f64) -> Stability {
        self.average = self.averaged(miss_rate);
        self.samples += 1;

        if !k_eff.is_finite() || !miss_rate.is_finite() {
            return Stability::Fatal;
        }

        let judged = match self.policy.criterion {
            MissRateCriterion::Iteration => miss_rate,
            MissRateCriterion::Average => self.average,
        };

        if !is_unstable(&self.policy, judged, k_eff) {
            self.consecutive = 0;
            return Stability::Stable;
        }

        self.consecutive += 1;
        match self.consecutive >= self.policy.consecutive_limit {
            true => Stability::Fatal,
            false => Stability::Unstable {
                consecutive: self.consecutive,
            },
        }
    }

    /// Running average miss rate over all recorded iterations
    pub fn average_miss_rate(&self) -> f64 {
        self.average
    }

    /// Current number of unstable iterations in a row
    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    /// The policy this monitor applies
    pub fn policy(&self) -> &InstabilityPolicy {
        &self.policy
    }

    fn averaged(&self, miss_rate: f64) -> f64 {
        if self.samples == 0 {
            return miss_rate;
        }

        match self.policy.averaging {
            MissRateAveraging::Cumulative => {
                let n = self.samples as f64;
                (self.average * n + miss_rate) / (n + 1.0)
            }
            MissRateAveraging::Exponential { weight } => {
                weight * miss_rate + (1.0 - weight) * self.average
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(limit: usize) -> InstabilityPolicy {
        InstabilityPolicy {
            consecutive_limit: limit,
            ..Default::default()
        }
    }

    #[test]
    fn cumulative_average() {
        let mut monitor = InstabilityMonitor::new(policy(5));
        monitor.check(0.5, 1.0);
        monitor.check(0.0, 1.0);
        monitor.check(0.25, 1.0);
        assert_eq!(monitor.average_miss_rate(), 0.25);
    }

    #[test]
    fn exponential_average() {
        let mut monitor = InstabilityMonitor::new(InstabilityPolicy {
            averaging: MissRateAveraging::Exponential { weight: 0.5 },
            ..Default::default()
        });
        monitor.check(1.0, 1.0);
        monitor.check(0.0, 1.0);
        monitor.check(0.0, 1.0);
        assert_eq!(monitor.average_miss_rate(), 0.25);
    }

    #[test]
    fn clean_iteration_resets_count() {
        let mut monitor = InstabilityMonitor::new(policy(3));
        assert_eq!(monitor.check(0.5, 1.0), Stability::Unstable { consecutive: 1 });
        assert_eq!(monitor.check(0.5, 1.0), Stability::Unstable { consecutive: 2 });
        assert_eq!(monitor.check(0.0, 1.0), Stability::Stable);
        assert_eq!(monitor.check(0.5, 1.0), Stability::Unstable { consecutive: 1 });
    }

    #[test]
    fn average_criterion_remembers_bad_iterations() {
        let mut monitor = InstabilityMonitor::new(InstabilityPolicy {
            criterion: MissRateCriterion::Average,
            ..policy(5)
        });
        assert_eq!(monitor.check(0.5, 1.0), Stability::Unstable { consecutive: 1 });
        assert_eq!(monitor.check(0.5, 1.0), Stability::Unstable { consecutive: 2 });

        // a clean iteration only pulls the mean down to 1/3
        assert_eq!(monitor.check(0.0, 1.0), Stability::Unstable { consecutive: 3 });
        assert!((monitor.average_miss_rate() - 1.0 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn average_criterion_with_unit_weight() {
        let mut monitor = InstabilityMonitor::new(InstabilityPolicy {
            averaging: MissRateAveraging::Exponential { weight: 1.0 },
            criterion: MissRateCriterion::Average,
            ..policy(3)
        });
        assert_eq!(monitor.check(0.5, 1.0), Stability::Unstable { consecutive: 1 });
        assert_eq!(monitor.check(0.5, 1.0), Stability::Unstable { consecutive: 2 });
        assert_eq!(monitor.check(0.0, 1.0), Stability::Stable);
        assert_eq!(monitor.average_miss_rate(), 0.0);
    }

    #[test]
    fn average_criterion_decays_with_exponential_weight() {
        let mut monitor = InstabilityMonitor::new(InstabilityPolicy {
            averaging: MissRateAveraging::Exponential { weight: 0.5 },
            criterion: MissRateCriterion::Average,
            ..policy(10)
        });
        monitor.check(0.3, 1.0);

        // 0.15 then 0.075, which is under the threshold
        assert_eq!(monitor.check(0.0, 1.0), Stability::Unstable { consecutive: 2 });
        assert_eq!(monitor.check(0.0, 1.0), Stability::Stable);
        assert_eq!(monitor.check(0.0, 1.0), Stability::Stable);
    }

    #[test]
    fn persistent_instability_is_fatal() {
        let mut monitor = InstabilityMonitor::new(policy(2));
        monitor.check(0.0, 50.0);
        assert_eq!(monitor.check(0.0, 50.0), Stability::Fatal);
    }

    #[test]
    fn undefined_eigenvalue_is_fatal() {
        let mut monitor = InstabilityMonitor::new(policy(10));
        assert_eq!(monitor.check(0.0, f64::NAN), Stability::Fatal);
    }
}
