//! Random ray origins and directions

// internal modules
use crate::tracer::RayTracer;

// external crates
use nalgebra::{Point3, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Odd constant used to decorrelate the seeds of consecutive iterations
const ITERATION_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Independent random stream for one ray of one iteration
///
/// Every ray gets its own stream, so sampling is reproducible for a given
/// seed no matter which thread traces the ray or in what order.
///
/// ```rust
/// # use rrtools_geometry::ray_rng;
/// # use rand::Rng;
/// let a: f64 = ray_rng(1, 0, 7).gen();
/// let b: f64 = ray_rng(1, 0, 7).gen();
/// let c: f64 = ray_rng(1, 0, 8).gen();
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
pub fn ray_rng(seed: u64, iteration: u64, ray: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed ^ iteration.wrapping_mul(ITERATION_STRIDE));
    rng.set_stream(ray);
    rng
}

/// Unit vector sampled uniformly over the sphere
pub fn isotropic_direction<R: Rng + ?Sized>(rng: &mut R) -> Vector3<f64> {
    let mu: f64 = 2.0 * rng.gen::<f64>() - 1.0;
    let phi: f64 = 2.0 * std::f64::consts::PI * rng.gen::<f64>();
    let sin_theta = (1.0 - mu * mu).max(0.0).sqrt();
    Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), mu)
}

/// Sample a ray origin uniformly inside the tracer bounds and an isotropic
/// direction
pub fn sample_ray<R, T>(rng: &mut R, tracer: &T) -> (Point3<f64>, Vector3<f64>)
where
    R: Rng + ?Sized,
    T: RayTracer + ?Sized,
{
    let (lower, upper) = tracer.bounds();
    let xi = Vector3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>());
    let origin = lower + (upper - lower).component_mul(&xi);
    (origin, isotropic_direction(rng))
}
