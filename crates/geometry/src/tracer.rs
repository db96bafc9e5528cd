use crate::segment::Segment;
use nalgebra::{Point3, Vector3};

/// Capability for tracing rays through numbered source regions
///
/// Implementations produce segments lazily, in order of travel. The sequence
/// belongs to one ray only and cannot be restarted, a new ray needs a new
/// call to [trace()](RayTracer::trace). Sequences may be unbounded for
/// reflective problems, callers stop consuming once the ray has travelled
/// far enough.
///
/// Region indices must be stable for the lifetime of the tracer and run from
/// `0` to `region_count() - 1`.
pub trait RayTracer: Sync {
    /// Lazy iterator over the segments of a single ray
    type Segments<'a>: Iterator<Item = Segment>
    where
        Self: 'a;

    /// Start a ray at `origin` travelling along the unit vector `direction`
    fn trace(&self, origin: Point3<f64>, direction: Vector3<f64>) -> Self::Segments<'_>;

    /// Number of source regions the geometry is divided into
    fn region_count(&self) -> usize;

    /// Axis-aligned bounding box used to sample ray origins
    fn bounds(&self) -> (Point3<f64>, Point3<f64>);

    /// Total volume of the geometry (cm3)
    ///
    /// Defaults to the bounding box volume, which is exact for geometries
    /// that completely fill their bounds.
    fn volume(&self) -> f64 {
        let (lower, upper) = self.bounds();
        (upper - lower).product()
    }

    /// Geometric centre of a region, if the geometry knows it
    fn region_centroid(&self, _region: usize) -> Option<Point3<f64>> {
        None
    }
}
