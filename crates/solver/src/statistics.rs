//! Per-iteration and per-worker counters, and their reduction

// neutronics toolbox
use rrtools_utils::SliceExt;

// external crates
use serde::Serialize;

// standard library
use std::ops::Range;

/// Summary of one sweep, consumed by the instability monitor
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct IterationStatistics {
    /// Iteration number, starting at 1
    pub iteration: usize,
    /// Rays traced
    pub rays: usize,
    /// Source regions crossed by at least one active segment
    pub hits: u64,
    /// Ray segments traced, including the dead zone
    pub intersections: u64,
    /// Fraction of source regions missed
    pub miss_rate: f64,
    /// Eigenvalue at the end of the iteration
    pub k_eff: f64,
    /// Relative change in k-eff
    pub k_change: f64,
    /// Largest relative change in any region flux
    pub flux_change: f64,
}

/// Partial sums from one worker's share of the rays
///
/// Each worker owns a contiguous block of ray indices in every iteration.
/// The miss rate is the ray-weighted mean of the iteration miss rates seen
/// by the worker.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct WorkerStatistics {
    /// Rays traced by this worker
    pub rays: u64,
    /// Segments traced by this worker
    pub intersections: u64,
    /// Ray-weighted mean region miss rate
    pub miss_rate: f64,
}

impl WorkerStatistics {
    /// Add the rays of one iteration
    pub fn record(&mut self, rays: u64, intersections: u64, miss_rate: f64) {
        let total = self.rays + rays;
        if total > 0 {
            self.miss_rate =
                (self.miss_rate * self.rays as f64 + miss_rate * rays as f64) / total as f64;
        }
        self.rays = total;
        self.intersections += intersections;
    }
}

/// Whole-run totals after reduction over workers
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct GlobalStatistics {
    /// Rays traced over the run
    pub rays: u64,
    /// Segments traced over the run
    pub intersections: u64,
    /// Ray-weighted mean region miss rate
    pub miss_rate: f64,
}

/// Combine worker partial sums into global totals
///
/// Counts are summed and rates averaged with each worker weighted by its ray
/// count, so the result does not depend on how rays were split between
/// workers or in which order the workers are given.
///
/// ```rust
/// # use rrtools_solver::{reduce_statistics, WorkerStatistics};
/// let workers = [
///     WorkerStatistics { rays: 30, intersections: 300, miss_rate: 0.25 },
///     WorkerStatistics { rays: 10, intersections: 50, miss_rate: 0.5 },
/// ];
///
/// let global = reduce_statistics(&workers);
/// assert_eq!(global.rays, 40);
/// assert_eq!(global.intersections, 350);
/// assert_eq!(global.miss_rate, 0.3125);
/// ```
pub fn reduce_statistics(workers: &[WorkerStatistics]) -> GlobalStatistics {
    let rates: Vec<f64> = workers.iter().map(|w| w.miss_rate).collect();
    let weights: Vec<f64> = workers.iter().map(|w| w.rays as f64).collect();

    GlobalStatistics {
        rays: workers.iter().map(|w| w.rays).sum(),
        intersections: workers.iter().map(|w| w.intersections).sum(),
        // no rays at all means nothing was missed either
        miss_rate: rates.weighted_mean(&weights).unwrap_or(0.0),
    }
}

/// Split `rays` ray indices into `workers` contiguous blocks
///
/// Block sizes differ by at most one, earlier blocks take the remainder.
///
/// ```rust
/// # use rrtools_solver::partition_rays;
/// assert_eq!(partition_rays(10, 3), vec![0..4, 4..7, 7..10]);
/// assert_eq!(partition_rays(2, 3), vec![0..1, 1..2, 2..2]);
/// ```
pub fn partition_rays(rays: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let base = rays / workers;
    let remainder = rays % workers;

    let mut start = 0;
    (0..workers)
        .map(|w| {
            let size = base + usize::from(w < remainder);
            let block = start..start + size;
            start += size;
            block
        })
        .collect()
}
