//! Geodetic observatory location and its rotational velocity.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::frames::terrestrial_to_j2000;

/// WGS84 semi-major axis in metres.
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// Earth rotation rate in rad/s.
pub const EARTH_ROTATION_RATE: f64 = 7.292_115_855_306_589e-5;

/// Telescope site. Longitude is east-positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservatoryLocation {
    pub lon_deg: f64,
    pub lat_deg: f64,
    pub alt_m: f64,
}

impl ObservatoryLocation {
    pub const fn new(lon_deg: f64, lat_deg: f64, alt_m: f64) -> Self {
        Self {
            lon_deg,
            lat_deg,
            alt_m,
        }
    }

    /// Earth-fixed Cartesian position in metres.
    pub fn terrestrial_position(&self) -> Vector3<f64> {
        let e2 = WGS84_F * (2.0 - WGS84_F);
        let (sin_lat, cos_lat) = self.lat_deg.to_radians().sin_cos();
        let (sin_lon, cos_lon) = self.lon_deg.to_radians().sin_cos();
        let n = WGS84_A / (1.0 - e2 * sin_lat * sin_lat).sqrt();

        Vector3::new(
            (n + self.alt_m) * cos_lat * cos_lon,
            (n + self.alt_m) * cos_lat * sin_lon,
            (n * (1.0 - e2) + self.alt_m) * sin_lat,
        )
    }

    /// Velocity from Earth rotation in km/s, in J2000 equatorial axes.
    pub fn rotational_velocity(&self, jd_ut1: f64, jd_tt: f64) -> Vector3<f64> {
        let r = self.terrestrial_position();
        let v_terrestrial = Vector3::new(-EARTH_ROTATION_RATE * r.y, EARTH_ROTATION_RATE * r.x, 0.0);
        terrestrial_to_j2000(jd_ut1, jd_tt) * v_terrestrial / 1000.0
    }
}
