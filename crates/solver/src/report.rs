// internal modules
use crate::error::Result;
use crate::settings::{RunMode, SourceShape};

// neutronics toolbox
use rrtools_utils::ValueExt;

// external crates
use log::{info, warn};
use serde::Serialize;

// standard library
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Average miss rate above which results are very likely unreliable
const VERY_HIGH_MISS_RATE: f64 = 0.1;

/// Final numbers of a simulation, as handed to a [Reporter]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResults {
    /// Eigenvalue or fixed source problem
    pub mode: RunMode,
    /// Flat or linear source regions
    pub source_shape: SourceShape,
    /// Tolerances met before the iteration limit
    pub converged: bool,
    /// Iterations completed
    pub iterations: usize,
    /// Final eigenvalue
    pub k_eff: f64,
    /// Running average region miss rate, as formed by the instability policy
    pub avg_miss_rate: f64,
    /// Ray-weighted mean region miss rate over the whole run
    pub mean_miss_rate: f64,
    /// Miss rate above which results carry a warning
    pub warning_miss_rate: f64,
    /// Segments traced over the run
    pub total_geometric_intersections: u64,
    /// Rays traced over the run
    pub total_rays: u64,
    /// Number of energy groups
    pub negroups: usize,
    /// Number of delayed neutron precursor groups
    pub ndgroups: usize,
    /// Number of source regions
    pub n_source_regions: usize,
    /// Number of regions containing an external source
    pub n_external_source_regions: usize,
    /// Estimated volume of every region (cm3)
    pub region_volumes: Vec<f64>,
    /// Time step length for transient runs (s)
    pub time_step: Option<f64>,
}

/// Destination for final simulation results
pub trait Reporter {
    /// Present one set of results
    fn report(&mut self, results: &SimulationResults) -> Result<()>;
}

/// Writes a formatted summary through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, results: &SimulationResults) -> Result<()> {
        print_results_random_ray(results);
        Ok(())
    }
}

/// Writes every set of results as one line of JSON
///
/// ```rust
/// # use rrtools_solver::{JsonReporter};
/// let reporter = JsonReporter::new(Vec::new());
/// assert!(reporter.into_inner().is_empty());
/// ```
#[derive(Debug)]
pub struct JsonReporter<W: Write> {
    writer: W,
}

impl<W: Write> JsonReporter<W> {
    /// Report into any writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonReporter<BufWriter<File>> {
    /// Report into a new file, replacing any existing one
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report(&mut self, results: &SimulationResults) -> Result<()> {
        serde_json::to_writer(&mut self.writer, results)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Log the summary block of a random ray solve
pub fn print_results_random_ray(results: &SimulationResults) {
    let iterations = results.iterations.max(1) as f64;
    let regions = results.n_source_regions.max(1) as f64;
    let intersections = results.total_geometric_intersections as f64;

    info!("===================>     SIMULATION RESULTS     <====================");
    info!("Run mode                          = {}", results.mode);
    info!("Source shape                      = {}", results.source_shape);
    info!("Total iterations                  = {}", results.iterations);
    info!("Converged                         = {}", results.converged);
    info!("Number of source regions          = {}", results.n_source_regions);
    info!("Number of external source regions = {}", results.n_external_source_regions);
    info!("Total rays                        = {}", results.total_rays);
    info!(
        "Total geometric intersections     = {}",
        results.total_geometric_intersections.sci(4, 2)
    );
    info!("  Avg per iteration               = {}", (intersections / iterations).sci(4, 2));
    info!(
        "  Avg per iteration per region    = {:.2}",
        intersections / iterations / regions
    );
    info!("Avg region miss rate per iteration = {}", results.avg_miss_rate.percent(4));
    info!("  Ray-weighted mean               = {}", results.mean_miss_rate.percent(4));
    info!("Energy groups                     = {}", results.negroups);
    info!("Precursor groups                  = {}", results.ndgroups);
    if let Some(dt) = results.time_step {
        info!("Time step (s)                     = {}", dt.sci(4, 2));
    }

    if results.mode == RunMode::Eigenvalue {
        info!("k-effective                       = {:.6}", results.k_eff);
    }

    if results.avg_miss_rate > VERY_HIGH_MISS_RATE {
        warn!(
            "Very high region miss rate ({}), results may be unstable. More rays or a longer active distance will increase ray density.",
            results.avg_miss_rate.percent(3)
        );
    } else if results.avg_miss_rate > results.warning_miss_rate {
        warn!(
            "Elevated region miss rate ({}). More rays or a longer active distance may improve accuracy.",
            results.avg_miss_rate.percent(3)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> SimulationResults {
        SimulationResults {
            mode: RunMode::Eigenvalue,
            source_shape: SourceShape::Flat,
            converged: true,
            iterations: 12,
            k_eff: 1.25,
            avg_miss_rate: 0.0,
            mean_miss_rate: 0.0,
            warning_miss_rate: 0.01,
            total_geometric_intersections: 1200,
            total_rays: 120,
            negroups: 2,
            ndgroups: 0,
            n_source_regions: 4,
            n_external_source_regions: 0,
            region_volumes: vec![0.25; 4],
            time_step: None,
        }
    }

    #[test]
    fn json_lines() {
        let mut reporter = JsonReporter::new(Vec::new());
        reporter.report(&results()).unwrap();
        reporter.report(&results()).unwrap();

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(value["k_eff"], 1.25);
        assert_eq!(value["mode"], "eigenvalue");
        assert_eq!(value["time_step"], serde_json::Value::Null);
    }

    #[test]
    fn log_reporter_never_fails() {
        assert!(LogReporter.report(&results()).is_ok());
    }
}
