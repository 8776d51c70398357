//! Mathematical structs and functions.

use cgmath::{Point3, Vector3};

/// A 3D point
pub type Point3d = Point3<f64>;

/// A 3D vector
pub type Vector3d = Vector3<f64>;

/// Projects the offset from `location` to `target` onto `heading` in plan view.
///
/// The vertical component is ignored so grades and ramps do not distort the
/// result. A non-positive value means `target` is beside or behind `location`
/// relative to the heading.
pub fn forward_projection(location: Point3d, heading: Vector3d, target: Point3d) -> f64 {
    let offset = target - location;
    offset.x * heading.x + offset.y * heading.y
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn projection_sign() {
        let location = Point3d::new(10.0, 5.0, 0.0);
        let heading = Vector3d::new(1.0, 0.0, 0.0);

        assert!(forward_projection(location, heading, Point3d::new(14.0, 5.0, 0.0)) > 0.0);
        assert!(forward_projection(location, heading, Point3d::new(6.0, 5.0, 0.0)) < 0.0);
        assert_approx_eq!(
            forward_projection(location, heading, Point3d::new(10.0, 9.0, 0.0)),
            0.0
        );
    }

    #[test]
    fn projection_ignores_grade() {
        let location = Point3d::new(0.0, 0.0, 0.0);
        let heading = Vector3d::new(0.0, 1.0, 0.0);
        let flat = forward_projection(location, heading, Point3d::new(0.0, 7.5, 0.0));
        let ramp = forward_projection(location, heading, Point3d::new(0.0, 7.5, 3.0));
        assert_approx_eq!(flat, ramp);
    }
}
