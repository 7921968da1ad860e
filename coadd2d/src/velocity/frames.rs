//! Earth orientation: precession, nutation and sidereal time.
//!
//! IAU 1976 precession, the four largest nutation terms and the GMST
//! polynomial of Meeus. Rotations are passive (frame rotations).

use nalgebra::Matrix3;

use super::time::{centuries_since_j2000, J2000};

const ARCSEC_TO_RAD: f64 = std::f64::consts::PI / (180.0 * 3600.0);

/// Frame rotation about the x axis.
pub fn rot_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, s, 0.0, -s, c)
}

/// Frame rotation about the y axis.
pub fn rot_y(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, 0.0, -s, 0.0, 1.0, 0.0, s, 0.0, c)
}

/// Frame rotation about the z axis.
pub fn rot_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, s, 0.0, -s, c, 0.0, 0.0, 0.0, 1.0)
}

/// J2000 mean equator to mean equator of date.
pub fn precession(t: f64) -> Matrix3<f64> {
    let zeta = (2306.2181 * t + 0.30188 * t * t + 0.017998 * t * t * t) * ARCSEC_TO_RAD;
    let z = (2306.2181 * t + 1.09468 * t * t + 0.018203 * t * t * t) * ARCSEC_TO_RAD;
    let theta = (2004.3109 * t - 0.42665 * t * t - 0.041833 * t * t * t) * ARCSEC_TO_RAD;
    rot_z(-z) * rot_y(theta) * rot_z(-zeta)
}

/// Nutation angles of date in radians.
#[derive(Debug, Clone, Copy)]
pub struct Nutation {
    /// Mean obliquity of the ecliptic.
    pub eps0: f64,
    /// Nutation in longitude.
    pub dpsi: f64,
    /// Nutation in obliquity.
    pub deps: f64,
}

impl Nutation {
    pub fn at(t: f64) -> Self {
        let omega = (125.04452 - 1934.136261 * t).to_radians();
        let l_sun = (280.4665 + 36000.7698 * t).to_radians();
        let l_moon = (218.3165 + 481267.8813 * t).to_radians();

        let dpsi = -17.20 * omega.sin() - 1.32 * (2.0 * l_sun).sin() - 0.23 * (2.0 * l_moon).sin()
            + 0.21 * (2.0 * omega).sin();
        let deps = 9.20 * omega.cos() + 0.57 * (2.0 * l_sun).cos() + 0.10 * (2.0 * l_moon).cos()
            - 0.09 * (2.0 * omega).cos();
        let eps0 = 84381.448 - 46.8150 * t - 0.00059 * t * t + 0.001813 * t * t * t;

        Self {
            eps0: eps0 * ARCSEC_TO_RAD,
            dpsi: dpsi * ARCSEC_TO_RAD,
            deps: deps * ARCSEC_TO_RAD,
        }
    }

    /// Mean equator of date to true equator of date.
    pub fn matrix(&self) -> Matrix3<f64> {
        rot_x(-(self.eps0 + self.deps)) * rot_z(-self.dpsi) * rot_x(self.eps0)
    }

    /// Equation of the equinoxes.
    pub fn equation_of_equinoxes(&self) -> f64 {
        self.dpsi * self.eps0.cos()
    }
}

/// Greenwich mean sidereal time in radians.
pub fn gmst(jd_ut1: f64) -> f64 {
    let t = centuries_since_j2000(jd_ut1);
    let deg = 280.46061837 + 360.98564736629 * (jd_ut1 - J2000) + 0.000387933 * t * t
        - t * t * t / 38_710_000.0;
    deg.rem_euclid(360.0).to_radians()
}

/// Rotation from the terrestrial frame (polar motion ignored) to the J2000
/// mean equator.
pub fn terrestrial_to_j2000(jd_ut1: f64, jd_tt: f64) -> Matrix3<f64> {
    let t = centuries_since_j2000(jd_tt);
    let nutation = Nutation::at(t);
    let gast = gmst(jd_ut1) + nutation.equation_of_equinoxes();

    let celestial_to_terrestrial = rot_z(gast) * nutation.matrix() * precession(t);
    celestial_to_terrestrial.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_rotations_are_orthonormal() {
        let m = rot_z(0.3) * rot_y(-1.1) * rot_x(2.0);
        let identity = m * m.transpose();
        assert!((identity - Matrix3::identity()).norm() < 1e-12);
    }

    #[test]
    fn test_frame_rotation_direction() {
        // Rotating the frame by +90° about z moves the x axis onto -y.
        let v = rot_z(std::f64::consts::FRAC_PI_2) * Vector3::new(1.0, 0.0, 0.0);
        assert!((v - Vector3::new(0.0, -1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_precession_vanishes_at_j2000() {
        assert!((precession(0.0) - Matrix3::identity()).norm() < 1e-15);
    }

    #[test]
    fn test_gmst_at_j2000() {
        let expected = 280.46061837_f64.to_radians();
        assert!((gmst(J2000) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_mean_obliquity_j2000() {
        let nutation = Nutation::at(0.0);
        assert!((nutation.eps0.to_degrees() - 23.439_291).abs() < 1e-6);
        // Nutation in longitude stays within ±20 arcsec.
        assert!(nutation.dpsi.abs() < 20.0 * ARCSEC_TO_RAD);
    }
}
