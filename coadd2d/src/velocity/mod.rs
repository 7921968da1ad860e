//! Heliocentric and barycentric velocity corrections.
//!
//! The line-of-sight velocity of the observer is built from the barycentric
//! velocity of the Earth (VSOP87E), the rotational velocity of the site and,
//! for the heliocentric frame, the barycentric velocity of the Sun. Extracted
//! wavelengths are then scaled by the relativistic Doppler factor.

mod ephemeris;
mod frames;
mod observatory;
mod time;


use nalgebra::Vector3;

use crate::config::VelocityFrame;
use crate::extraction::SpecObj;

pub use ephemeris::{earth_velocity, sun_velocity, AU_KM};
pub use observatory::{ObservatoryLocation, EARTH_ROTATION_RATE};
pub use time::{jd_tt, jd_ut1, tai_minus_utc};

/// Speed of light in km/s.
pub const SPEED_OF_LIGHT_KMS: f64 = 299_792.458;

/// Unit vector towards `(ra, dec)` in equatorial axes.
fn direction(ra_deg: f64, dec_deg: f64) -> Vector3<f64> {
    let (sin_ra, cos_ra) = ra_deg.to_radians().sin_cos();
    let (sin_dec, cos_dec) = dec_deg.to_radians().sin_cos();
    Vector3::new(cos_dec * cos_ra, cos_dec * sin_ra, sin_dec)
}

/// Observer velocity along the line of sight, in km/s.
///
/// Negative values mean the observer recedes from the target. The
/// heliocentric value adds the barycentric velocity of the Sun to that of
/// the observer. [`VelocityFrame::None`] returns 0.
pub fn geomotion_velocity(
    mjd_utc: f64,
    ra_deg: f64,
    dec_deg: f64,
    location: &ObservatoryLocation,
    frame: VelocityFrame,
) -> f64 {
    if frame == VelocityFrame::None {
        return 0.0;
    }

    let tt = jd_tt(mjd_utc);
    let mut velocity = earth_velocity(tt) + location.rotational_velocity(jd_ut1(mjd_utc), tt);
    if frame == VelocityFrame::Heliocentric {
        velocity += sun_velocity(tt);
    }
    direction(ra_deg, dec_deg).dot(&velocity)
}

/// Relativistic Doppler factor `sqrt((1 + v/c) / (1 - v/c))`.
pub fn doppler_factor(vel_kms: f64) -> f64 {
    let beta = vel_kms / SPEED_OF_LIGHT_KMS;
    ((1.0 + beta) / (1.0 - beta)).sqrt()
}

/// Scale the wavelengths of every extracted object by the Doppler factor
/// of `vel_kms` and return that factor.
pub fn geomotion_correct(specobjs: &mut [SpecObj], vel_kms: f64) -> f64 {
    let factor = doppler_factor(vel_kms);
    for specobj in specobjs.iter_mut() {
        specobj.apply_velocity_factor(factor);
    }
    tracing::debug!(vel_kms, factor, nobj = specobjs.len(), "Applied velocity correction");
    factor
}
