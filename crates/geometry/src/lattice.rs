// internal modules
use crate::error::{Error, Result};
use crate::segment::Segment;
use crate::tracer::RayTracer;

// external crates
use log::trace;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Treatment of rays reaching the outer surface of the geometry
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// Rays leave the problem and stop
    #[default]
    Vacuum,
    /// Rays are mirrored back into the problem
    Reflective,
}

/// Regular Cartesian lattice of source regions
///
/// An axis-aligned box split into `nx * ny * nz` equal cells, each one a
/// source region. Regions are numbered with `x` varying fastest:
///
/// ```text
/// region = i + nx * (j + ny * k)
/// ```
///
/// Rays are walked cell by cell, so the number of segments is proportional to
/// the number of cells crossed rather than the number of cells in total.
///
/// ```rust
/// # use rrtools_geometry::{Boundary, BoxLattice, Point3, RayTracer, Vector3};
/// let lattice = BoxLattice::cube(2.0, [2, 1, 1], Boundary::Vacuum).unwrap();
///
/// // Straight through both cells along x
/// let segments: Vec<_> = lattice
///     .trace(Point3::new(0.0, 1.0, 1.0), Vector3::new(1.0, 0.0, 0.0))
///     .collect();
///
/// assert_eq!(segments.len(), 2);
/// assert_eq!(segments[0].region, 0);
/// assert_eq!(segments[1].region, 1);
/// assert_eq!(segments[1].length, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BoxLattice {
    lower: Point3<f64>,
    upper: Point3<f64>,
    shape: [usize; 3],
    pitch: Vector3<f64>,
    boundary: Boundary,
}

impl BoxLattice {
    /// Build a lattice spanning `lower` to `upper` with `shape` cells per axis
    pub fn new(
        lower: [f64; 3],
        upper: [f64; 3],
        shape: [usize; 3],
        boundary: Boundary,
    ) -> Result<Self> {
        if shape.iter().any(|n| *n == 0) {
            return Err(Error::EmptyLattice(shape));
        }

        let finite = lower.iter().chain(&upper).all(|v| v.is_finite());
        if !finite || lower.iter().zip(&upper).any(|(l, u)| l >= u) {
            return Err(Error::InvalidBounds { lower, upper });
        }

        let lower = Point3::from(lower);
        let upper = Point3::from(upper);
        let extent = upper - lower;
        let pitch = Vector3::new(
            extent.x / shape[0] as f64,
            extent.y / shape[1] as f64,
            extent.z / shape[2] as f64,
        );

        Ok(Self {
            lower,
            upper,
            shape,
            pitch,
            boundary,
        })
    }

    /// Cube of side `side` with its lower corner at the origin
    pub fn cube(side: f64, shape: [usize; 3], boundary: Boundary) -> Result<Self> {
        Self::new([0.0; 3], [side; 3], shape, boundary)
    }

    /// Number of cells along each axis
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Outer boundary condition
    pub fn boundary(&self) -> Boundary {
        self.boundary
    }

    /// Flat region index of a lattice cell
    pub fn region_index(&self, cell: [usize; 3]) -> usize {
        cell[0] + self.shape[0] * (cell[1] + self.shape[1] * cell[2])
    }

    /// Lattice cell containing a point
    ///
    /// Points on internal surfaces belong to the cell above, points on the
    /// upper outer surface belong to the last cell.
    pub fn locate(&self, point: &Point3<f64>) -> Result<[usize; 3]> {
        let mut cell = [0; 3];
        for axis in 0..3 {
            if point[axis] < self.lower[axis] || point[axis] > self.upper[axis] {
                return Err(Error::PointOutsideGeometry([point.x, point.y, point.z]));
            }
            let index = ((point[axis] - self.lower[axis]) / self.pitch[axis]).floor() as usize;
            cell[axis] = index.min(self.shape[axis] - 1);
        }
        Ok(cell)
    }

    /// Centre of every region, in region order
    ///
    /// Convenient as the reference points needed by linear sources.
    pub fn centroids(&self) -> Vec<[f64; 3]> {
        (0..self.region_count())
            .filter_map(|r| self.region_centroid(r))
            .map(|c| [c.x, c.y, c.z])
            .collect()
    }

    /// Position of the `index`-th cell surface along `axis`
    fn surface(&self, axis: usize, index: usize) -> f64 {
        if index >= self.shape[axis] {
            self.upper[axis]
        } else {
            self.lower[axis] + self.pitch[axis] * index as f64
        }
    }
}

impl RayTracer for BoxLattice {
    type Segments<'a> = LatticeSegments<'a>;

    fn trace(&self, origin: Point3<f64>, direction: Vector3<f64>) -> Self::Segments<'_> {
        // rays born outside the box have nothing to traverse
        let (cell, finished) = match self.locate(&origin) {
            Ok(cell) => (cell, false),
            Err(e) => {
                trace!("{e}, no segments produced");
                ([0; 3], true)
            }
        };

        LatticeSegments {
            lattice: self,
            position: origin,
            direction,
            cell,
            finished,
        }
    }

    fn region_count(&self) -> usize {
        self.shape.iter().product()
    }

    fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        (self.lower, self.upper)
    }

    fn region_centroid(&self, region: usize) -> Option<Point3<f64>> {
        if region >= self.region_count() {
            return None;
        }

        let i = region % self.shape[0];
        let j = (region / self.shape[0]) % self.shape[1];
        let k = region / (self.shape[0] * self.shape[1]);

        Some(Point3::new(
            self.lower.x + self.pitch.x * (i as f64 + 0.5),
            self.lower.y + self.pitch.y * (j as f64 + 0.5),
            self.lower.z + self.pitch.z * (k as f64 + 0.5),
        ))
    }
}

/// Lazy cell-by-cell walk of a single ray through a [BoxLattice]
///
/// Ends when the ray escapes through a vacuum boundary. Never ends for fully
/// reflective lattices.
#[derive(Debug, Clone)]
pub struct LatticeSegments<'a> {
    lattice: &'a BoxLattice,
    position: Point3<f64>,
    direction: Vector3<f64>,
    cell: [usize; 3],
    finished: bool,
}

impl LatticeSegments<'_> {
    /// Distance to the nearest cell surface and the axis it is normal to
    fn nearest_surface(&self) -> (f64, usize) {
        let mut nearest = (f64::INFINITY, 0);

        for axis in 0..3 {
            let u = self.direction[axis];
            let distance = if u > 0.0 {
                (self.lattice.surface(axis, self.cell[axis] + 1) - self.position[axis]) / u
            } else if u < 0.0 {
                (self.lattice.surface(axis, self.cell[axis]) - self.position[axis]) / u
            } else {
                f64::INFINITY
            };

            if distance < nearest.0 {
                nearest = (distance, axis);
            }
        }

        nearest
    }

    /// Move into the neighbouring cell across a surface normal to `axis`
    fn cross(&mut self, axis: usize) {
        let forward = self.direction[axis] > 0.0;

        // snap onto the surface to stop round-off drifting between cells
        let index = if forward {
            self.cell[axis] + 1
        } else {
            self.cell[axis]
        };
        self.position[axis] = self.lattice.surface(axis, index);

        let n = self.lattice.shape[axis];
        match (forward, self.cell[axis]) {
            (true, c) if c + 1 < n => self.cell[axis] += 1,
            (false, c) if c > 0 => self.cell[axis] -= 1,
            _ => match self.lattice.boundary {
                Boundary::Vacuum => self.finished = true,
                Boundary::Reflective => self.direction[axis] = -self.direction[axis],
            },
        }
    }
}

impl Iterator for LatticeSegments<'_> {
    type Item = Segment;

    fn next(&mut self) -> Option<Self::Item> {
        // corner crossings produce zero length steps, skip over them
        while !self.finished {
            let (distance, axis) = self.nearest_surface();

            // a zero direction vector never reaches anything
            if !distance.is_finite() {
                self.finished = true;
                break;
            }

            let length = distance.max(0.0);
            let segment = Segment {
                region: self.lattice.region_index(self.cell),
                length,
                start: self.position,
                direction: self.direction,
            };

            self.position += self.direction * length;
            self.cross(axis);

            if length > 0.0 {
                return Some(segment);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_lattices() {
        assert_eq!(
            BoxLattice::cube(1.0, [0, 1, 1], Boundary::Vacuum),
            Err(Error::EmptyLattice([0, 1, 1]))
        );
        assert!(BoxLattice::new([0.0; 3], [1.0, 0.0, 1.0], [1; 3], Boundary::Vacuum).is_err());
    }

    #[test]
    fn region_numbering() {
        let lattice = BoxLattice::cube(3.0, [3, 2, 2], Boundary::Vacuum).unwrap();
        assert_eq!(lattice.region_count(), 12);
        assert_eq!(lattice.region_index([0, 0, 0]), 0);
        assert_eq!(lattice.region_index([2, 0, 0]), 2);
        assert_eq!(lattice.region_index([0, 1, 0]), 3);
        assert_eq!(lattice.region_index([0, 0, 1]), 6);
        assert_eq!(lattice.region_index([2, 1, 1]), 11);
    }

    #[test]
    fn locate_points() {
        let lattice = BoxLattice::cube(2.0, [2, 2, 2], Boundary::Vacuum).unwrap();
        assert_eq!(lattice.locate(&Point3::new(0.5, 1.5, 0.5)), Ok([0, 1, 0]));
        assert_eq!(lattice.locate(&Point3::new(2.0, 2.0, 2.0)), Ok([1, 1, 1]));
        assert!(lattice.locate(&Point3::new(-0.1, 1.0, 1.0)).is_err());
    }

    #[test]
    fn centroid_of_last_region() {
        let lattice = BoxLattice::cube(2.0, [2, 2, 2], Boundary::Vacuum).unwrap();
        assert_eq!(lattice.region_centroid(7), Some(Point3::new(1.5, 1.5, 1.5)));
        assert_eq!(lattice.region_centroid(8), None);
        assert_eq!(lattice.centroids().len(), 8);
    }

    #[test]
    fn vacuum_ray_escapes() {
        let lattice = BoxLattice::cube(4.0, [4, 1, 1], Boundary::Vacuum).unwrap();
        let segments: Vec<Segment> = lattice
            .trace(Point3::new(1.5, 2.0, 2.0), Vector3::new(-1.0, 0.0, 0.0))
            .collect();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].region, 1);
        assert_eq!(segments[0].length, 0.5);
        assert_eq!(segments[1].region, 0);
        assert_eq!(segments[1].length, 1.0);
    }

    #[test]
    fn reflective_ray_turns_around() {
        let lattice = BoxLattice::cube(2.0, [2, 1, 1], Boundary::Reflective).unwrap();
        let segments: Vec<Segment> = lattice
            .trace(Point3::new(1.5, 1.0, 1.0), Vector3::new(1.0, 0.0, 0.0))
            .take(3)
            .collect();

        assert_eq!(segments[0].region, 1);
        assert_eq!(segments[0].length, 0.5);
        // bounced off the +x face, back through region 1 then 0
        assert_eq!(segments[1].region, 1);
        assert_eq!(segments[1].direction, Vector3::new(-1.0, 0.0, 0.0));
        assert_eq!(segments[1].length, 1.0);
        assert_eq!(segments[2].region, 0);
    }

    #[test]
    fn outside_origin_has_no_segments() {
        let lattice = BoxLattice::cube(1.0, [1, 1, 1], Boundary::Reflective).unwrap();
        let mut segments = lattice.trace(Point3::new(5.0, 0.5, 0.5), Vector3::new(1.0, 0.0, 0.0));
        assert!(segments.next().is_none());
    }
}
