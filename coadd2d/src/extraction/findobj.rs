//! Object finding on the collapsed spatial S/N profile.

use common::Buffer2;

use crate::combine::CombinedFrame;
use crate::math::fwhm_to_sigma;
use crate::math::profile::{gaussian_smooth, local_maxima, parabolic_offset};
use crate::math::statistics::{median, robust_sigma};

/// A peak of the spatial profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Column position with sub-pixel refinement.
    pub spat: f64,
    pub significance: f64,
    /// +1 for positive traces, -1 for the negative traces of difference imaging.
    pub sign: f64,
}

/// Thresholds of one search.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FindParams {
    pub fwhm: f64,
    pub sig_thresh: f64,
    pub max_objects: usize,
    pub trim_edge: usize,
}

/// Column S/N profile `Σ f·w / √Σw` of the residual-sky-subtracted image.
pub(crate) fn snr_profile(frame: &CombinedFrame, residual_sky: &Buffer2<f64>) -> Vec<f64> {
    let (width, height) = frame.shape();
    let mut sum_fw = vec![0.0; width];
    let mut sum_w = vec![0.0; width];
    for y in 0..height {
        for x in 0..width {
            let idx = frame.sciimg.index_of(x, y);
            if !frame.is_good(idx) {
                continue;
            }
            let w = frame.ivar[idx];
            sum_fw[x] += (frame.sciimg[idx] - residual_sky[idx]) * w;
            sum_w[x] += w;
        }
    }
    sum_fw
        .iter()
        .zip(&sum_w)
        .map(|(fw, w)| if *w > 0.0 { fw / w.sqrt() } else { 0.0 })
        .collect()
}

/// Significance of every sample of the smoothed profile.
pub(crate) fn significance(profile: &[f64], fwhm: f64) -> Vec<f64> {
    let smoothed = gaussian_smooth(profile, fwhm_to_sigma(fwhm));
    let center = median(&smoothed).unwrap_or(0.0);
    let noise = robust_sigma(&smoothed)
        .filter(|s| *s > f64::EPSILON)
        .unwrap_or(f64::EPSILON);
    smoothed.iter().map(|v| (v - center) / noise).collect()
}

/// Peaks of `significance` above threshold, strongest first.
pub(crate) fn find_peaks(significance: &[f64], sign: f64, params: &FindParams) -> Vec<Detection> {
    let n = significance.len();
    let lo = params.trim_edge;
    let hi = n.saturating_sub(params.trim_edge);

    local_maxima(significance, params.fwhm)
        .into_iter()
        .filter(|&i| i >= lo && i < hi && significance[i] >= params.sig_thresh)
        .take(params.max_objects)
        .map(|i| {
            let offset = parabolic_offset(significance[i - 1], significance[i], significance[i + 1]);
            Detection {
                spat: i as f64 + offset,
                significance: significance[i],
                sign,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_profile(n: usize, centers: &[(f64, f64)]) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let base = 0.1 * ((i * 7919) % 13) as f64 - 0.6;
                base + centers
                    .iter()
                    .map(|&(c, amp)| amp * (-0.5 * ((i as f64 - c) / 1.3).powi(2)).exp())
                    .sum::<f64>()
            })
            .collect()
    }

    fn params() -> FindParams {
        FindParams {
            fwhm: 3.0,
            sig_thresh: 10.0,
            max_objects: 10,
            trim_edge: 3,
        }
    }

    #[test]
    fn test_finds_two_separated_peaks() {
        let profile = gaussian_profile(80, &[(20.3, 40.0), (55.0, 25.0)]);
        let sig = significance(&profile, 3.0);
        let peaks = find_peaks(&sig, 1.0, &params());

        assert_eq!(peaks.len(), 2);
        assert!((peaks[0].spat - 20.3).abs() < 0.3, "spat {}", peaks[0].spat);
        assert!((peaks[1].spat - 55.0).abs() < 0.3, "spat {}", peaks[1].spat);
        assert!(peaks[0].significance > peaks[1].significance);
    }

    #[test]
    fn test_edge_peaks_are_trimmed() {
        let profile = gaussian_profile(80, &[(1.0, 40.0), (40.0, 30.0)]);
        let sig = significance(&profile, 3.0);
        let peaks = find_peaks(&sig, 1.0, &params());
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].spat - 40.0).abs() < 0.3);
    }

    #[test]
    fn test_max_objects_keeps_strongest() {
        let profile = gaussian_profile(80, &[(20.0, 20.0), (55.0, 40.0)]);
        let sig = significance(&profile, 3.0);
        let peaks = find_peaks(
            &sig,
            1.0,
            &FindParams {
                max_objects: 1,
                ..params()
            },
        );
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].spat - 55.0).abs() < 0.3);
    }

    #[test]
    fn test_flat_profile_has_no_peaks() {
        let profile = gaussian_profile(80, &[]);
        let sig = significance(&profile, 3.0);
        assert!(find_peaks(&sig, 1.0, &params()).is_empty());
    }
}
