//! Integration tests for the simulation lifecycle and initial condition handoff

use rrtools_domain::{InitialCondition, Material};
use rrtools_geometry::{Boundary, BoxLattice};
use rrtools_solver::{
    validate_random_ray_inputs, Error, GeometryInput, Inputs, LogReporter, MissRateAveraging,
    MissRateCriterion, Simulation, SimulationState, SourceShape, Stability,
};
use rstest::{fixture, rstest};

fn fuel() -> Material {
    Material {
        name: "fuel".to_string(),
        total: vec![1.0, 2.0],
        nu_fission: vec![0.2, 2.4],
        chi: vec![1.0, 0.0],
        scatter: vec![vec![0.0, 0.5], vec![0.0, 0.0]],
    }
}

#[fixture]
fn lattice() -> BoxLattice {
    BoxLattice::cube(2.0, [2, 2, 1], Boundary::Reflective).unwrap()
}

#[fixture]
fn inputs() -> Inputs {
    let mut inputs = Inputs {
        geometry: GeometryInput {
            upper: [2.0, 2.0, 2.0],
            shape: [2, 2, 1],
            ..Default::default()
        },
        materials: vec![fuel()],
        region_materials: vec![0; 4],
        ..Default::default()
    };
    inputs.settings.rays_per_iteration = 20;
    inputs.settings.distance_inactive = 2.0;
    inputs.settings.distance_active = 10.0;
    inputs.settings.max_iterations = 30;
    inputs.settings.k_tolerance = 1e-8;
    inputs.settings.flux_tolerance = 1e-8;
    inputs.settings.consecutive_converged = 2;
    inputs.settings.instability.consecutive_limit = 3;
    inputs
}

/// Simulation that has been run, reduced and reported
fn finished<'t>(inputs: &Inputs, lattice: &'t BoxLattice) -> Simulation<'t, BoxLattice> {
    let mut simulation = Simulation::new(inputs, lattice).unwrap();
    simulation.simulate().unwrap();
    simulation.reduce_simulation_statistics().unwrap();
    simulation
        .output_simulation_results(&mut LogReporter)
        .unwrap();
    simulation
}

#[rstest]
fn lifecycle_order(inputs: Inputs, lattice: BoxLattice) {
    let mut simulation = Simulation::new(&inputs, &lattice).unwrap();
    assert_eq!(simulation.state(), SimulationState::Iterating);
    assert_eq!(simulation.k_eff(), 1.0);
    assert_eq!(simulation.avg_miss_rate(), 0.0);
    assert_eq!(simulation.total_geometric_intersections(), 0);
    assert_eq!(simulation.negroups(), 2);
    assert_eq!(simulation.ndgroups(), 0);

    // nothing to reduce or snapshot yet
    assert!(matches!(
        simulation.reduce_simulation_statistics(),
        Err(Error::InvalidState { .. })
    ));
    assert!(simulation.get_scalar_flux_initial_condition().is_err());

    simulation.simulate().unwrap();
    assert_eq!(simulation.state(), SimulationState::Converged);
    assert!(simulation.output_simulation_results(&mut LogReporter).is_err());

    simulation.reduce_simulation_statistics().unwrap();
    assert_eq!(simulation.state(), SimulationState::Reduced);
    assert!(simulation.get_scalar_flux_initial_condition().is_ok());

    let results = simulation
        .output_simulation_results(&mut LogReporter)
        .unwrap();
    assert_eq!(simulation.state(), SimulationState::Reported);
    assert!(results.converged);
    assert_eq!(results.n_source_regions, 4);
    assert_eq!(results.total_rays, 20 * results.iterations as u64);
    assert!(results.total_geometric_intersections > 0);

    // simulating again is not allowed
    assert!(simulation.simulate().is_err());
}

#[rstest]
fn uniform_lattice_is_exact(inputs: Inputs, lattice: BoxLattice) {
    let simulation = finished(&inputs, &lattice);

    // an infinite uniform medium has the analytic solution in every region
    assert!((simulation.k_eff() - 0.8).abs() < 1e-10);
    let flux = simulation.get_scalar_flux_initial_condition().unwrap();
    for phi in flux.chunks_exact(2) {
        assert!((phi[1] / phi[0] - 0.25).abs() < 1e-10);
    }

    let volume: f64 = simulation.results().region_volumes.iter().sum();
    assert!((volume - 8.0).abs() < 1e-9);
}

#[rstest]
fn snapshots_are_copies(inputs: Inputs, lattice: BoxLattice) {
    let simulation = finished(&inputs, &lattice);

    let first = simulation.get_scalar_flux_initial_condition().unwrap();
    let mut second = simulation.get_scalar_flux_initial_condition().unwrap();
    assert_eq!(first, second);

    second.iter_mut().for_each(|phi| *phi = -1.0);
    assert_eq!(simulation.get_scalar_flux_initial_condition().unwrap(), first);

    let initial = simulation.initial_condition().unwrap();
    assert_eq!(initial.scalar_flux(), first.as_slice());
    assert_eq!(
        initial.source(),
        simulation.get_source_initial_condition().unwrap().as_slice()
    );
    assert!(simulation.get_precursor_initial_condition().unwrap().is_empty());
}

#[rstest]
#[case(1, 4, 0)] // wrong group count
#[case(2, 3, 0)] // wrong region count
#[case(2, 4, 1)] // precursors without kinetics
fn mismatched_snapshot_rejected(
    inputs: Inputs,
    lattice: BoxLattice,
    #[case] groups: usize,
    #[case] regions: usize,
    #[case] precursor_groups: usize,
) {
    let initial = InitialCondition::new(
        1.0,
        regions,
        groups,
        precursor_groups,
        vec![0.0; regions * precursor_groups],
        vec![1.0; regions * groups],
        vec![1.0; regions * groups],
    )
    .unwrap();

    let result = Simulation::with_initial_condition(&inputs, &lattice, &initial, None);
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[rstest]
fn snapshot_restarts_converged(inputs: Inputs, lattice: BoxLattice) {
    let first = finished(&inputs, &lattice).initial_condition().unwrap();

    let mut simulation =
        Simulation::with_initial_condition(&inputs, &lattice, &first, None).unwrap();
    assert_eq!(simulation.k_eff(), first.k_eff());

    // already converged, so only the minimum number of iterations is needed
    simulation.simulate().unwrap();
    assert_eq!(simulation.iterations(), 3);
}

#[rstest]
fn persistent_instability_aborts(inputs: Inputs, lattice: BoxLattice) {
    let mut simulation = Simulation::new(&inputs, &lattice).unwrap();

    // one region out of four is a 75 % miss rate
    assert_eq!(
        simulation.instability_check(1, 1.0).unwrap(),
        Stability::Unstable { consecutive: 1 }
    );
    assert!(simulation.instability_check(1, 1.0).is_ok());
    assert!(matches!(
        simulation.instability_check(1, 1.0),
        Err(Error::Instability { .. })
    ));
    assert_eq!(simulation.state(), SimulationState::Aborted);

    // nothing is valid after an abort
    assert!(matches!(
        simulation.simulate(),
        Err(Error::InvalidState { .. })
    ));
}

#[rstest]
fn transient_instability_recovers(inputs: Inputs, lattice: BoxLattice) {
    let mut simulation = Simulation::new(&inputs, &lattice).unwrap();

    assert!(simulation.instability_check(1, 1.0).is_ok());
    assert!(simulation.instability_check(1, 1.0).is_ok());
    assert_eq!(simulation.instability_check(4, 1.0).unwrap(), Stability::Stable);
    assert_eq!(simulation.state(), SimulationState::Iterating);

    // the count restarts after a clean iteration
    assert!(simulation.instability_check(1, 1.0).is_ok());
    assert!(simulation.instability_check(1, 1.0).is_ok());
    assert_eq!(simulation.state(), SimulationState::Iterating);
    assert_eq!(simulation.avg_miss_rate(), 0.6);
}

#[rstest]
fn implausible_eigenvalue_is_unstable(inputs: Inputs, lattice: BoxLattice) {
    let mut simulation = Simulation::new(&inputs, &lattice).unwrap();
    assert_eq!(
        simulation.instability_check(4, 50.0).unwrap(),
        Stability::Unstable { consecutive: 1 }
    );
    assert!(simulation.instability_check(4, f64::INFINITY).is_err());
    assert_eq!(simulation.state(), SimulationState::Aborted);
}

#[rstest]
fn linear_source_needs_centroids(mut inputs: Inputs, lattice: BoxLattice) {
    inputs.settings.source_shape = SourceShape::Linear;
    assert!(matches!(
        validate_random_ray_inputs(&inputs, 4),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        Simulation::new(&inputs, &lattice),
        Err(Error::Configuration(_))
    ));

    inputs.region_centroids = Some(vec![[0.0; 3]; 3]);
    assert!(Simulation::new(&inputs, &lattice).is_err());

    inputs.region_centroids = Some(lattice.centroids());
    assert!(Simulation::new(&inputs, &lattice).is_ok());
}

#[rstest]
#[case(MissRateAveraging::Exponential { weight: 1.0 }, SimulationState::Iterating)]
#[case(MissRateAveraging::Cumulative, SimulationState::Aborted)]
fn averaged_miss_rate_criterion(
    mut inputs: Inputs,
    lattice: BoxLattice,
    #[case] averaging: MissRateAveraging,
    #[case] state: SimulationState,
) {
    inputs.settings.instability.averaging = averaging;
    inputs.settings.instability.criterion = MissRateCriterion::Average;
    let mut simulation = Simulation::new(&inputs, &lattice).unwrap();

    // two iterations missing three of four regions, then a clean one
    assert!(simulation.instability_check(1, 1.0).is_ok());
    assert!(simulation.instability_check(1, 1.0).is_ok());
    let _ = simulation.instability_check(4, 1.0);

    assert_eq!(simulation.state(), state);
}
