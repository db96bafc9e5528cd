//! Integration tests for ray tracing through box lattices

use rrtools_geometry::{ray_rng, sample_ray, Boundary, BoxLattice, Point3, RayTracer, Vector3};
use rstest::{fixture, rstest};

#[fixture]
fn vacuum_cube() -> BoxLattice {
    BoxLattice::cube(4.0, [4, 4, 4], Boundary::Vacuum).unwrap()
}

#[fixture]
fn reflective_cube() -> BoxLattice {
    BoxLattice::cube(4.0, [4, 4, 4], Boundary::Reflective).unwrap()
}

#[rstest]
#[case([0.0, 0.5, 0.5], [1.0, 0.0, 0.0], 4.0)] // full chord along x
#[case([2.0, 2.0, 2.0], [0.0, -1.0, 0.0], 2.0)] // half chord from the centre
#[case([0.0, 0.0, 0.0], [1.0, 1.0, 1.0], 48.0_f64.sqrt())] // body diagonal
fn vacuum_chord_lengths(
    vacuum_cube: BoxLattice,
    #[case] origin: [f64; 3],
    #[case] direction: [f64; 3],
    #[case] expected: f64,
) {
    let direction = Vector3::from(direction).normalize();
    let total: f64 = vacuum_cube
        .trace(Point3::from(origin), direction)
        .map(|s| s.length)
        .sum();
    assert!((total - expected).abs() < 1e-9, "{total} != {expected}");
}

#[rstest]
fn segments_are_contiguous(vacuum_cube: BoxLattice) {
    let mut rng = ray_rng(11, 0, 0);
    for _ in 0..200 {
        let (origin, direction) = sample_ray(&mut rng, &vacuum_cube);
        let segments: Vec<_> = vacuum_cube.trace(origin, direction).collect();

        for pair in segments.windows(2) {
            let end = pair[0].start + pair[0].direction * pair[0].length;
            assert!((end - pair[1].start).norm() < 1e-9);
            assert_ne!(pair[0].region, pair[1].region);
        }
        assert!(segments.iter().all(|s| s.length > 0.0));
    }
}

#[rstest]
fn reflective_rays_stay_inside(reflective_cube: BoxLattice) {
    let mut rng = ray_rng(5, 2, 9);
    let (origin, direction) = sample_ray(&mut rng, &reflective_cube);

    let mut travelled = 0.0;
    for segment in reflective_cube.trace(origin, direction) {
        assert!(segment.region < reflective_cube.region_count());
        travelled += segment.length;
        if travelled > 100.0 {
            break;
        }
    }
    assert!(travelled > 100.0);
}

#[rstest]
fn track_lengths_estimate_volumes(reflective_cube: BoxLattice) {
    let mut tally = vec![0.0; reflective_cube.region_count()];
    let mut total = 0.0;

    for ray in 0..400 {
        let mut rng = ray_rng(3, 0, ray);
        let (origin, direction) = sample_ray(&mut rng, &reflective_cube);
        let mut travelled: f64 = 0.0;

        for segment in reflective_cube.trace(origin, direction) {
            let (head, _) = segment.split_at((50.0 - travelled).min(segment.length));
            tally[head.region] += head.length;
            travelled += head.length;
            if travelled >= 50.0 {
                break;
            }
        }
        total += travelled;
    }

    // each of the 64 cells holds 1/64 of the volume
    for length in tally {
        let fraction = length / total;
        assert!((fraction - 1.0 / 64.0).abs() < 0.005, "{fraction}");
    }
}
