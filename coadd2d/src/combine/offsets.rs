//! Spatial offsets between the exposures of a stack.

use strum_macros::Display;

use crate::error::{Error, Result};
use crate::exposure::{Exposure, ExposureStack, Spec1dTrace};
use crate::math::profile::cross_correlation_shift;

/// Where the offsets of a combination came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum OffsetSource {
    User,
    /// Mean position of the brightest spec1d trace of each exposure.
    Traces,
    /// Cross-correlation of collapsed spatial profiles.
    Profiles,
}

/// Offsets of every exposure relative to the first, in native pixels.
///
/// A feature at column `x` of the first exposure sits at `x + offsets[k]`
/// in exposure `k`.
pub fn measure_offsets(
    stack: &ExposureStack,
    user: Option<&[f64]>,
    max_shift: usize,
) -> Result<(Vec<f64>, OffsetSource)> {
    let exposures = stack.exposures();

    if let Some(user) = user {
        if user.len() != exposures.len() {
            return Err(Error::Configuration(format!(
                "{} offsets given for {} exposures",
                user.len(),
                exposures.len()
            )));
        }
        let first = user.first().copied().unwrap_or(0.0);
        return Ok((user.iter().map(|o| o - first).collect(), OffsetSource::User));
    }

    if let Some(offsets) = offsets_from_traces(exposures) {
        return Ok((offsets, OffsetSource::Traces));
    }

    Ok((offsets_from_profiles(stack, max_shift), OffsetSource::Profiles))
}

fn brightest_trace(exposure: &Exposure) -> Option<&Spec1dTrace> {
    exposure
        .traces
        .iter()
        .filter(|t| t.mean_position().is_some())
        .max_by(|a, b| a.brightness().total_cmp(&b.brightness()))
}

/// `None` unless every exposure has a usable trace.
fn offsets_from_traces(exposures: &[Exposure]) -> Option<Vec<f64>> {
    let positions: Vec<f64> = exposures
        .iter()
        .map(|e| brightest_trace(e).and_then(Spec1dTrace::mean_position))
        .collect::<Option<_>>()?;
    let first = *positions.first()?;
    Some(positions.iter().map(|p| p - first).collect())
}

/// Sky-subtracted flux of the good pixels summed over spectral rows.
pub(crate) fn collapsed_profile(exposure: &Exposure) -> Vec<f64> {
    let (width, height) = exposure.shape();
    let mut profile = vec![0.0; width];
    for y in 0..height {
        for (x, p) in profile.iter_mut().enumerate() {
            let idx = exposure.sciimg.index_of(x, y);
            if exposure.is_good(idx) {
                *p += exposure.sciimg[idx] - exposure.skymodel[idx];
            }
        }
    }
    profile
}

fn offsets_from_profiles(stack: &ExposureStack, max_shift: usize) -> Vec<f64> {
    let exposures = stack.exposures();
    let Some(first) = exposures.first() else {
        return Vec::new();
    };
    let reference = collapsed_profile(first);

    let mut offsets = vec![0.0];
    for exposure in &exposures[1..] {
        let shift = cross_correlation_shift(&reference, &collapsed_profile(exposure), max_shift);
        let offset = shift.unwrap_or_else(|| {
            tracing::warn!(
                det = %stack.det(),
                path = %exposure.path.display(),
                "Spatial profile carries no signal, assuming zero offset"
            );
            0.0
        });
        offsets.push(offset);
    }
    offsets
}
