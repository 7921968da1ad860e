//! Barycentric velocities of the Earth and the Sun from VSOP87E.

use nalgebra::{Matrix3, Vector3};
use vsop87::{vsop87e, RectangularCoordinates};

/// Kilometres per astronomical unit.
pub const AU_KM: f64 = 149_597_870.7;

/// Half-width of the central difference, in days.
const DIFF_STEP_DAYS: f64 = 0.01;

/// VSOP87 ecliptic and equinox J2000 to the FK5 equator.
fn ecliptic_to_equatorial() -> Matrix3<f64> {
    Matrix3::new(
        1.0,
        0.000_000_440_360,
        -0.000_000_190_919,
        -0.000_000_479_966,
        0.917_482_137_087,
        -0.397_776_982_902,
        0.0,
        0.397_776_982_902,
        0.917_482_137_087,
    )
}

fn to_vector(c: RectangularCoordinates) -> Vector3<f64> {
    Vector3::new(c.x, c.y, c.z)
}

/// Equatorial barycentric velocity in km/s of a body whose VSOP87E
/// position (AU) at a TDB Julian Date is given by `position`.
fn barycentric_velocity(position: fn(f64) -> RectangularCoordinates, jd_tdb: f64) -> Vector3<f64> {
    let ahead = to_vector(position(jd_tdb + DIFF_STEP_DAYS));
    let behind = to_vector(position(jd_tdb - DIFF_STEP_DAYS));
    let au_per_day = (ahead - behind) / (2.0 * DIFF_STEP_DAYS);
    ecliptic_to_equatorial() * au_per_day * (AU_KM / super::time::SECONDS_PER_DAY)
}

pub fn earth_velocity(jd_tdb: f64) -> Vector3<f64> {
    barycentric_velocity(vsop87e::earth, jd_tdb)
}

pub fn sun_velocity(jd_tdb: f64) -> Vector3<f64> {
    barycentric_velocity(vsop87e::sun, jd_tdb)
}
