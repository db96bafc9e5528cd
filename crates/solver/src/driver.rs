//! Static and time-dependent run sequences

// internal modules
use crate::error::{Error, Result};
use crate::report::{Reporter, SimulationResults};
use crate::settings::Inputs;
use crate::simulation::Simulation;

// neutronics toolbox
use rrtools_domain::InitialCondition;
use rrtools_geometry::RayTracer;
use rrtools_utils::ValueExt;

// external crates
use log::{info, warn};

/// Results and final state of a single solve
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Final numbers, as reported
    pub results: SimulationResults,
    /// Snapshot for seeding a following run
    pub initial_condition: InitialCondition,
}

/// Static solve followed by a transient chain
#[derive(Debug, Clone, PartialEq)]
pub struct KineticsOutcome {
    /// The static solve that seeded the chain
    pub initial: RunOutcome,
    /// Snapshot at the end of every time step
    pub steps: Vec<InitialCondition>,
}

/// Run a complete random ray solve on the lattice described by the inputs
///
/// Validates, sets up, iterates, reduces and reports. An optional snapshot
/// from a previous run replaces the default initial guess.
///
/// Running out of iterations is not an error here, check `converged` in the
/// results. Instability and invalid inputs are.
///
/// ```rust, no_run
/// # use rrtools_solver::{read_inputs, run_random_ray, LogReporter};
/// let inputs = read_inputs("path/to/inputs.json").unwrap();
/// let outcome = run_random_ray(&inputs, None, &mut LogReporter).unwrap();
/// println!("k-eff = {:.5}", outcome.results.k_eff);
/// ```
pub fn run_random_ray(
    inputs: &Inputs,
    initial: Option<&InitialCondition>,
    reporter: &mut dyn Reporter,
) -> Result<RunOutcome> {
    let lattice = inputs.geometry.build()?;
    run_random_ray_with(inputs, &lattice, initial, reporter)
}

/// [run_random_ray()] through any ray tracer
pub fn run_random_ray_with<T: RayTracer>(
    inputs: &Inputs,
    tracer: &T,
    initial: Option<&InitialCondition>,
    reporter: &mut dyn Reporter,
) -> Result<RunOutcome> {
    let mut simulation = match initial {
        Some(initial) => Simulation::with_initial_condition(inputs, tracer, initial, None)?,
        None => Simulation::new(inputs, tracer)?,
    };

    finish(&mut simulation, reporter)
}

/// Advance a snapshot through every time step in the settings
///
/// Steps run strictly in sequence, each one a fresh simulation seeded with
/// the snapshot of the step before. Returns the snapshot at the end of
/// every step.
///
/// A step that fails to converge stops the chain with
/// [Error::ConvergenceFailure], unless the settings allow continuing.
pub fn run_random_ray_time_dependent(
    inputs: &Inputs,
    initial: &InitialCondition,
    reporter: &mut dyn Reporter,
) -> Result<Vec<InitialCondition>> {
    let lattice = inputs.geometry.build()?;
    run_random_ray_time_dependent_with(inputs, &lattice, initial, reporter)
}

/// [run_random_ray_time_dependent()] through any ray tracer
pub fn run_random_ray_time_dependent_with<T: RayTracer>(
    inputs: &Inputs,
    tracer: &T,
    initial: &InitialCondition,
    reporter: &mut dyn Reporter,
) -> Result<Vec<InitialCondition>> {
    let Some(time_steps) = inputs.settings.time_steps else {
        return Err(Error::Configuration(
            "time dependent runs need time steps".to_string(),
        ));
    };

    let mut snapshots: Vec<InitialCondition> = Vec::with_capacity(time_steps.steps);

    for step in 1..=time_steps.steps {
        info!(
            "Time step {step}/{}, t = {} s",
            time_steps.steps,
            (step as f64 * time_steps.dt).sci(4, 2)
        );

        let previous = snapshots.last().unwrap_or(initial);
        let mut simulation =
            Simulation::with_initial_condition(inputs, tracer, previous, Some(time_steps.dt))?;

        let outcome = finish(&mut simulation, reporter)?;
        halt_unless_converged(inputs, &outcome.results)?;
        snapshots.push(outcome.initial_condition);
    }

    Ok(snapshots)
}

/// Static solve, then the transient chain from its converged state
///
/// Fails before any solve if the inputs lack time steps or kinetics data.
pub fn run_kinetics(inputs: &Inputs, reporter: &mut dyn Reporter) -> Result<KineticsOutcome> {
    if inputs.settings.time_steps.is_none() || inputs.kinetics.is_none() {
        return Err(Error::Configuration(
            "kinetics runs need both time steps and kinetics data".to_string(),
        ));
    }

    let lattice = inputs.geometry.build()?;

    let initial = run_random_ray_with(inputs, &lattice, None, reporter)?;
    halt_unless_converged(inputs, &initial.results)?;

    let steps =
        run_random_ray_time_dependent_with(inputs, &lattice, &initial.initial_condition, reporter)?;

    Ok(KineticsOutcome { initial, steps })
}

/// Iterate, reduce and report a constructed simulation
fn finish<T: RayTracer>(
    simulation: &mut Simulation<'_, T>,
    reporter: &mut dyn Reporter,
) -> Result<RunOutcome> {
    match simulation.simulate() {
        Err(e) if !e.is_convergence_failure() => return Err(e),
        _ => {}
    }

    simulation.reduce_simulation_statistics()?;
    let results = simulation.output_simulation_results(reporter)?;

    Ok(RunOutcome {
        results,
        initial_condition: simulation.initial_condition()?,
    })
}

fn halt_unless_converged(inputs: &Inputs, results: &SimulationResults) -> Result<()> {
    if results.converged {
        return Ok(());
    }

    let failure = Error::ConvergenceFailure {
        iterations: results.iterations,
        k_eff: results.k_eff,
    };

    match inputs.settings.continue_on_convergence_failure {
        true => {
            warn!("Continuing after failure: {failure}");
            Ok(())
        }
        false => Err(failure),
    }
}
