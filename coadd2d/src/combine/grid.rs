//! Output grids of the rectified combination.
//!
//! Both grids are uniform in a grid coordinate: wavelength or log10
//! wavelength along the spectral axis, reference-frame pixels along the
//! spatial axis. Bin `j` covers `[start + j·step, start + (j + 1)·step)`.

use std::ops::Range;

use crate::config::WaveGridMethod;
use crate::exposure::ExposureStack;
use crate::math::statistics::median_mut;

/// Spatial columns sampled per exposure when measuring the native dispersion.
const DISPERSION_COLUMNS: usize = 16;

/// Slack applied before rounding bin counts up, so exact multiples of the
/// step do not gain an extra bin.
const BIN_COUNT_SLACK: f64 = 1e-9;

#[inline]
pub(crate) fn is_valid_wave(wave: f64) -> bool {
    wave.is_finite() && wave > 0.0
}

/// Bins of a uniform grid overlapping `[lo, hi)`, clipped to the grid.
fn overlapping_bins(start: f64, step: f64, nbins: usize, lo: f64, hi: f64) -> Range<usize> {
    let first = ((lo - start) / step).floor().max(0.0);
    let last = ((hi - start) / step).ceil().min(nbins as f64);
    if last <= first {
        return 0..0;
    }
    first as usize..last as usize
}

// ============================================================================
// Wavelength grid
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveGrid {
    pub method: WaveGridMethod,
    /// Lower edge of the first bin in grid coordinate.
    pub start: f64,
    pub step: f64,
    pub nbins: usize,
    /// Median native step in grid coordinate, before the sampling factor.
    pub native_step: f64,
}

impl WaveGrid {
    /// Grid covering every valid wavelength of the good pixels of `stack`.
    ///
    /// Returns `None` when the stack has no usable wavelength.
    pub fn from_stack(stack: &ExposureStack, method: WaveGridMethod, samp_fact: f64) -> Option<Self> {
        assert!(samp_fact > 0.0, "samp_fact must be positive");
        let to_coord = |wave: f64| coordinate(method, wave);

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for exposure in stack.exposures() {
            for (idx, &wave) in exposure.waveimg.pixels().iter().enumerate() {
                if is_valid_wave(wave) && exposure.is_good(idx) {
                    let c = to_coord(wave);
                    min = min.min(c);
                    max = max.max(c);
                }
            }
        }
        if min > max {
            return None;
        }

        let mut steps = Vec::new();
        for exposure in stack.exposures() {
            let waveimg = &exposure.waveimg;
            let stride = (waveimg.width() / DISPERSION_COLUMNS).max(1);
            for x in (0..waveimg.width()).step_by(stride) {
                for y in 1..waveimg.height() {
                    let (a, b) = (waveimg[(x, y - 1)], waveimg[(x, y)]);
                    if is_valid_wave(a) && is_valid_wave(b) && a != b {
                        steps.push((to_coord(b) - to_coord(a)).abs());
                    }
                }
            }
        }
        let native_step = median_mut(&mut steps).filter(|s| *s > 0.0)?;
        let step = native_step / samp_fact;
        let nbins = ((max - min) / step - BIN_COUNT_SLACK).ceil().max(0.0) as usize + 1;

        Some(Self {
            method,
            start: min - 0.5 * step,
            step,
            nbins,
            native_step,
        })
    }

    /// Grid coordinate of `wave`.
    #[inline]
    pub fn coordinate(&self, wave: f64) -> f64 {
        coordinate(self.method, wave)
    }

    /// Wavelength at the center of bin `j`.
    pub fn center_wave(&self, j: usize) -> f64 {
        let c = self.start + (j as f64 + 0.5) * self.step;
        match self.method {
            WaveGridMethod::Linear => c,
            WaveGridMethod::Log10 => 10f64.powf(c),
        }
    }

    pub fn bin_edges(&self, j: usize) -> (f64, f64) {
        let lo = self.start + j as f64 * self.step;
        (lo, lo + self.step)
    }

    pub fn bins_overlapping(&self, lo: f64, hi: f64) -> Range<usize> {
        overlapping_bins(self.start, self.step, self.nbins, lo, hi)
    }
}

fn coordinate(method: WaveGridMethod, wave: f64) -> f64 {
    match method {
        WaveGridMethod::Linear => wave,
        WaveGridMethod::Log10 => wave.log10(),
    }
}

// ============================================================================
// Spatial grid
// ============================================================================

/// Spatial grid in the pixel frame of the first exposure.
///
/// Native pixel `x` of exposure `k` covers `[x - off_k, x + 1 - off_k)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialGrid {
    pub start: f64,
    pub step: f64,
    pub nbins: usize,
}

impl SpatialGrid {
    /// Grid spanning `nspat` native pixels of every exposure after shifting
    /// by its offset.
    pub fn from_offsets(nspat: usize, offsets: &[f64], spat_samp_fact: f64) -> Self {
        assert!(spat_samp_fact > 0.0, "spat_samp_fact must be positive");
        let max_off = offsets.iter().copied().fold(0.0, f64::max);
        let min_off = offsets.iter().copied().fold(0.0, f64::min);

        let start = -max_off;
        let end = nspat as f64 - min_off;
        let step = 1.0 / spat_samp_fact;
        let nbins = ((end - start) / step - BIN_COUNT_SLACK).ceil().max(1.0) as usize;
        Self { start, step, nbins }
    }

    pub fn bin_edges(&self, j: usize) -> (f64, f64) {
        let lo = self.start + j as f64 * self.step;
        (lo, lo + self.step)
    }

    /// Reference-frame position of the center of bin `j`.
    pub fn center(&self, j: usize) -> f64 {
        self.start + (j as f64 + 0.5) * self.step
    }

    pub fn bins_overlapping(&self, lo: f64, hi: f64) -> Range<usize> {
        overlapping_bins(self.start, self.step, self.nbins, lo, hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_bins_clip_to_grid() {
        assert_eq!(overlapping_bins(0.0, 1.0, 10, 2.0, 3.0), 2..3);
        assert_eq!(overlapping_bins(0.0, 1.0, 10, 2.5, 4.2), 2..5);
        assert_eq!(overlapping_bins(0.0, 1.0, 10, -3.0, 0.5), 0..1);
        assert_eq!(overlapping_bins(0.0, 1.0, 10, 9.5, 12.0), 9..10);
        assert_eq!(overlapping_bins(0.0, 1.0, 10, 11.0, 12.0), 0..0);
    }

    #[test]
    fn test_spatial_grid_spans_all_offsets() {
        let grid = SpatialGrid::from_offsets(50, &[0.0, 2.5, -1.0], 1.0);
        assert_eq!(grid.start, -2.5);
        assert_eq!(grid.nbins, 54);

        let fine = SpatialGrid::from_offsets(50, &[0.0], 2.0);
        assert_eq!(fine.nbins, 100);
        assert!((fine.center(1) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_spatial_grid_without_offsets_is_native() {
        let grid = SpatialGrid::from_offsets(60, &[0.0, 0.0], 1.0);
        assert_eq!(grid.start, 0.0);
        assert_eq!(grid.nbins, 60);
        assert_eq!(grid.bin_edges(7), (7.0, 8.0));
    }
}
