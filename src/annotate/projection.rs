//! Planar projection used for distance computations.

use geo::MapCoords;
use geo_types::{Coord, Geometry};
use serde::{Deserialize, Serialize};

const ANTIPODE_EPSILON: f64 = 1e-12;

/// Spherical Lambert azimuthal equal-area projection.
///
/// The default is the US National Atlas Equal Area frame (EPSG:2163):
/// centre 45°N 100°W on a sphere of radius 6 370 997 m. Output is metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanarProjection {
    pub center_lat: f64,
    pub center_lon: f64,
    pub radius: f64,
}

impl Default for PlanarProjection {
    fn default() -> Self {
        Self {
            center_lat: 45.0,
            center_lon: -100.0,
            radius: 6_370_997.0,
        }
    }
}

impl PlanarProjection {
    /// Project a lon/lat pair (degrees) to planar `[x, y]`
    pub fn project(&self, lon: f64, lat: f64) -> [f64; 2] {
        let phi = lat.to_radians();
        let phi1 = self.center_lat.to_radians();
        let dlambda = (lon - self.center_lon).to_radians();

        let (sin_phi, cos_phi) = phi.sin_cos();
        let (sin_phi1, cos_phi1) = phi1.sin_cos();
        let cos_dlambda = dlambda.cos();

        let k = (2.0 / (1.0 + sin_phi1 * sin_phi + cos_phi1 * cos_phi * cos_dlambda)).sqrt();
        let x = self.radius * k * cos_phi * dlambda.sin();
        let y = self.radius * k * (cos_phi1 * sin_phi - sin_phi1 * cos_phi * cos_dlambda);
        [x, y]
    }

    /// Like `project`, but `None` for coordinates outside the valid
    /// lon/lat range, non-finite input, and the antipode of the centre where
    /// the projection is undefined
    pub fn try_project(&self, lon: f64, lat: f64) -> Option<[f64; 2]> {
        if !lon.is_finite() || !lat.is_finite() || lon.abs() > 180.0 || lat.abs() > 90.0 {
            return None;
        }
        let phi = lat.to_radians();
        let phi1 = self.center_lat.to_radians();
        let dlambda = (lon - self.center_lon).to_radians();
        let denominator = 1.0 + phi1.sin() * phi.sin() + phi1.cos() * phi.cos() * dlambda.cos();
        if denominator <= ANTIPODE_EPSILON {
            return None;
        }

        let projected = self.project(lon, lat);
        projected.iter().all(|v| v.is_finite()).then_some(projected)
    }

    pub fn project_coord(&self, coord: Coord<f64>) -> Coord<f64> {
        let [x, y] = self.project(coord.x, coord.y);
        Coord { x, y }
    }

    pub fn project_geometry(&self, geometry: &Geometry<f64>) -> Geometry<f64> {
        geometry.map_coords(|c| self.project_coord(c))
    }
}

/// Euclidean distance between two planar points
pub fn planar_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;

    #[test]
    fn test_center_maps_to_origin() {
        let [x, y] = PlanarProjection::default().project(-100.0, 45.0);
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let projection = PlanarProjection::default();
        let a = projection.project(-100.0, 45.0);
        let b = projection.project(-100.0, 46.0);
        let d = planar_distance(a, b);
        // 1° of arc on the sphere is ~111.2 km
        assert!((d - 111_194.0).abs() < 100.0, "distance {}", d);
    }

    #[test]
    fn test_east_is_positive_x() {
        let [x, y] = PlanarProjection::default().project(-99.0, 45.0);
        assert!(x > 0.0);
        assert!(y > 0.0, "LAEA bends parallels toward the pole");
    }

    #[test]
    fn test_try_project_rejects_unplaceable_points() {
        let projection = PlanarProjection::default();
        // antipode of 45N 100W
        assert!(projection.try_project(80.0, -45.0).is_none());
        assert!(projection.try_project(f64::NAN, 45.0).is_none());
        assert!(projection.try_project(-100.0, f64::INFINITY).is_none());
        assert!(projection.try_project(-100.0, 91.0).is_none());
        assert!(projection.try_project(181.0, 45.0).is_none());
        assert_eq!(
            projection.try_project(-99.0, 45.0),
            Some(projection.project(-99.0, 45.0))
        );
    }

    #[test]
    fn test_project_geometry() {
        let projection = PlanarProjection::default();
        let geometry: Geometry<f64> = point!(x: -100.0, y: 45.0).into();
        match projection.project_geometry(&geometry) {
            Geometry::Point(p) => assert!(p.x().abs() < 1e-6 && p.y().abs() < 1e-6),
            other => panic!("unexpected {:?}", other),
        }
    }
}
