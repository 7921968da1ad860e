//! Object tracing along the spectral axis.

use common::Buffer2;

use super::findobj::Detection;
use crate::combine::CombinedFrame;
use crate::math::polyfit::fit_clipped;
use crate::math::sigma_to_fwhm;

const CENTROID_ITERATIONS: usize = 3;
const TRACE_SIGREJ: f64 = 3.0;

/// Spatial position of one object for every spectral row.
#[derive(Debug, Clone)]
pub(crate) struct Trace {
    pub spat: Vec<f64>,
    pub fwhm: f64,
    pub sign: f64,
}

impl Trace {
    /// Trace position at the middle row, rounded to a column.
    pub fn spat_pixel(&self) -> usize {
        let mid = self.spat.len() / 2;
        self.spat.get(mid).map_or(0, |s| s.round().max(0.0) as usize)
    }
}

/// Sign-flipped, sky-subtracted value of a good pixel.
fn signed_flux(
    frame: &CombinedFrame,
    residual_sky: &Buffer2<f64>,
    sign: f64,
    idx: usize,
) -> Option<f64> {
    frame
        .is_good(idx)
        .then(|| sign * (frame.sciimg[idx] - residual_sky[idx]))
}

/// Flux-weighted centroid of rows `rows` within `±half_width` of `center`.
///
/// Only positive flux contributes. Returns `None` when nothing does.
fn chunk_centroid(
    frame: &CombinedFrame,
    residual_sky: &Buffer2<f64>,
    sign: f64,
    rows: std::ops::Range<usize>,
    center: f64,
    half_width: f64,
) -> Option<f64> {
    let width = frame.shape().0;
    let lo = (center - half_width).ceil().max(0.0) as usize;
    let hi = ((center + half_width).floor() as usize).min(width.saturating_sub(1));

    let mut sum = 0.0;
    let mut sum_x = 0.0;
    for y in rows {
        for x in lo..=hi {
            let idx = frame.sciimg.index_of(x, y);
            if let Some(flux) = signed_flux(frame, residual_sky, sign, idx).filter(|f| *f > 0.0) {
                sum += flux;
                sum_x += flux * x as f64;
            }
        }
    }
    (sum > 0.0).then(|| sum_x / sum)
}

/// Trace `detection` through the frame.
///
/// Centroids are measured in chunks of `chunk` rows and fit with a
/// polynomial of `order`. A constant trace is used when fewer than
/// `order + 1` chunks give a centroid.
pub(crate) fn trace_object(
    frame: &CombinedFrame,
    residual_sky: &Buffer2<f64>,
    detection: &Detection,
    fwhm: f64,
    order: usize,
    chunk: usize,
) -> Trace {
    let (width, height) = frame.shape();
    let chunk = chunk.max(1);
    let max_spat = width.saturating_sub(1) as f64;

    let mut ys = Vec::new();
    let mut centroids = Vec::new();
    for start in (0..height).step_by(chunk) {
        let rows = start..(start + chunk).min(height);
        let mut center = Some(detection.spat);
        for _ in 0..CENTROID_ITERATIONS {
            let Some(c) = center else { break };
            center = chunk_centroid(frame, residual_sky, detection.sign, rows.clone(), c, fwhm);
        }
        if let Some(c) = center {
            ys.push(0.5 * (rows.start + rows.end - 1) as f64);
            centroids.push(c);
        }
    }

    let fit = (centroids.len() > order)
        .then(|| fit_clipped(&ys, &centroids, &vec![1.0; ys.len()], order, TRACE_SIGREJ, 1))
        .flatten();
    let spat: Vec<f64> = match fit {
        Some(fit) => (0..height)
            .map(|y| fit.poly.eval(y as f64).clamp(0.0, max_spat))
            .collect(),
        None => {
            tracing::debug!(
                spat = detection.spat,
                chunks = centroids.len(),
                "Too few trace chunks, using a constant trace"
            );
            vec![detection.spat.clamp(0.0, max_spat); height]
        }
    };

    let fwhm = measure_fwhm(frame, residual_sky, &spat, detection.sign, fwhm).unwrap_or(fwhm);
    Trace {
        spat,
        fwhm,
        sign: detection.sign,
    }
}

/// FWHM from the second moment of the signed flux within `±2·fwhm` of the trace.
fn measure_fwhm(
    frame: &CombinedFrame,
    residual_sky: &Buffer2<f64>,
    trace: &[f64],
    sign: f64,
    fwhm: f64,
) -> Option<f64> {
    let width = frame.shape().0;
    let half_width = 2.0 * fwhm;

    let mut sum = 0.0;
    let mut sum_d2 = 0.0;
    for (y, &center) in trace.iter().enumerate() {
        let lo = (center - half_width).ceil().max(0.0) as usize;
        let hi = ((center + half_width).floor() as usize).min(width.saturating_sub(1));
        for x in lo..=hi {
            let idx = frame.sciimg.index_of(x, y);
            if let Some(flux) = signed_flux(frame, residual_sky, sign, idx) {
                let d = x as f64 - center;
                sum += flux;
                sum_d2 += flux * d * d;
            }
        }
    }

    let variance = sum_d2 / sum;
    (sum > 0.0 && variance.is_finite() && variance > 0.0).then(|| sigma_to_fwhm(variance.sqrt()))
}
