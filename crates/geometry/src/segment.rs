use nalgebra::{Point3, Vector3};

/// A straight piece of a ray inside a single source region
///
/// The start point and direction are kept so that spatially varying sources
/// can be evaluated along the segment. Directions change on reflection, so
/// these belong to the segment rather than to the ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Index of the traversed source region
    pub region: usize,
    /// Length of the chord through the region (cm)
    pub length: f64,
    /// Entry point into the region
    pub start: Point3<f64>,
    /// Unit direction of travel
    pub direction: Vector3<f64>,
}

impl Segment {
    /// Point halfway along the segment
    ///
    /// ```rust
    /// # use rrtools_geometry::{Point3, Segment, Vector3};
    /// let segment = Segment {
    ///     region: 0,
    ///     length: 2.0,
    ///     start: Point3::new(0.0, 0.0, 0.0),
    ///     direction: Vector3::new(1.0, 0.0, 0.0),
    /// };
    /// assert_eq!(segment.midpoint(), Point3::new(1.0, 0.0, 0.0));
    /// ```
    pub fn midpoint(&self) -> Point3<f64> {
        self.start + self.direction * (0.5 * self.length)
    }

    /// Split the segment at `distance` from its start
    ///
    /// Returns the leading and trailing parts. Distances outside of the
    /// segment are clamped, in which case one of the parts has zero length.
    pub fn split_at(&self, distance: f64) -> (Segment, Segment) {
        let distance = distance.clamp(0.0, self.length);
        let head = Segment {
            length: distance,
            ..*self
        };
        let tail = Segment {
            length: self.length - distance,
            start: self.start + self.direction * distance,
            ..*self
        };
        (head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> Segment {
        Segment {
            region: 3,
            length: 4.0,
            start: Point3::new(1.0, 1.0, 1.0),
            direction: Vector3::new(0.0, 1.0, 0.0),
        }
    }

    #[test]
    fn split_inside() {
        let (head, tail) = segment().split_at(1.0);
        assert_eq!(head.length, 1.0);
        assert_eq!(tail.length, 3.0);
        assert_eq!(tail.start, Point3::new(1.0, 2.0, 1.0));
        assert_eq!(head.region, tail.region);
    }

    #[test]
    fn split_clamped() {
        let (head, tail) = segment().split_at(10.0);
        assert_eq!(head.length, 4.0);
        assert_eq!(tail.length, 0.0);
    }
}
