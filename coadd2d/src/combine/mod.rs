//! Rectified, inverse-variance weighted combination of an exposure stack.
//!
//! Every good input pixel is treated as an axis-aligned drop: one native
//! pixel wide along the spatial axis (shifted by the exposure offset) and
//! half-way to its spectral neighbours along the wavelength axis. The drop is
//! distributed over the output bins it overlaps, with the overlap fraction
//! `a` of each bin scaling its inverse-variance weight.
//!
//! The combined science image is sky subtracted. In difference-imaging mode
//! object models keep their sign; otherwise negative model noise is clipped.

mod accumulator;
mod grid;
mod offsets;


use common::{BitBuffer2, Buffer2};
use strum_macros::Display;

use accumulator::{CombineAccumulator, Sample};
use crate::config::CombineConfig;
use crate::detector::DetectorId;
use crate::error::{Error, Result};
use crate::exposure::{Exposure, ExposureStack};
use crate::math::interval_overlap;

pub use grid::{SpatialGrid, WaveGrid};
pub(crate) use grid::is_valid_wave;
pub use offsets::{measure_offsets, OffsetSource};

/// Contributions covering less than this fraction of an output bin are dropped.
pub const MIN_OVERLAP: f64 = 1e-6;

// ============================================================================
// Redux mode
// ============================================================================

/// Sky-subtraction regime of the input reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum ReduxMode {
    /// Sky modelled and subtracted per exposure.
    #[default]
    Standard,
    /// Sky removed by differencing offset exposures (IR reductions).
    DifferenceImaging,
}

impl ReduxMode {
    /// Mode of a spec2d header `SKYSUB` value.
    pub fn from_skysub(skysub: &str) -> Self {
        if skysub.to_ascii_uppercase().contains("DIFF") {
            ReduxMode::DifferenceImaging
        } else {
            ReduxMode::Standard
        }
    }

    pub fn is_difference(self) -> bool {
        self == ReduxMode::DifferenceImaging
    }
}

// ============================================================================
// Combined frame
// ============================================================================

/// One detector's coadd.
///
/// Images share the output grid: `width = spat_grid.nbins`,
/// `height = wave_grid.nbins`. `ivar` is zero wherever `mask` is set.
#[derive(Debug, Clone)]
pub struct CombinedFrame {
    pub det: DetectorId,
    pub mode: ReduxMode,
    /// Sky-subtracted combined science image.
    pub sciimg: Buffer2<f64>,
    pub ivar: Buffer2<f64>,
    pub mask: BitBuffer2,
    pub skymodel: Buffer2<f64>,
    pub objmodel: Buffer2<f64>,
    pub waveimg: Buffer2<f64>,
    pub wave_grid: WaveGrid,
    pub spat_grid: SpatialGrid,
    /// Offsets applied to each exposure, relative to the first.
    pub offsets: Vec<f64>,
    pub offset_source: OffsetSource,
}

impl CombinedFrame {
    /// `(nspat, nspec)` of the output grid.
    pub fn shape(&self) -> (usize, usize) {
        self.sciimg.shape()
    }

    #[inline]
    pub fn is_good(&self, idx: usize) -> bool {
        !self.mask.get(idx) && self.ivar[idx] > 0.0
    }
}

// ============================================================================
// Combiner
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Combiner {
    config: CombineConfig,
}

impl Combiner {
    pub fn new(config: CombineConfig) -> Self {
        assert!(config.samp_fact > 0.0, "samp_fact must be positive");
        assert!(
            config.spat_samp_fact > 0.0,
            "spat_samp_fact must be positive"
        );
        Self { config }
    }

    pub fn config(&self) -> &CombineConfig {
        &self.config
    }

    /// Combine `stack` onto a common wavelength and spatial grid.
    ///
    /// Fails with [`Error::InsufficientData`] when the stack is empty or no
    /// output bin receives weight.
    pub fn combine(&self, stack: &ExposureStack, mode: ReduxMode) -> Result<CombinedFrame> {
        let det = stack.det();
        let insufficient = |reason: &str| Error::InsufficientData {
            det,
            reason: reason.to_string(),
        };

        let (nspat, _) = stack
            .shape()
            .ok_or_else(|| insufficient("empty exposure stack"))?;

        let (offsets, offset_source) =
            measure_offsets(stack, self.config.offsets.as_deref(), self.config.max_shift)?;
        let wave_grid = WaveGrid::from_stack(stack, self.config.wave_method, self.config.samp_fact)
            .ok_or_else(|| insufficient("no valid wavelengths in the stack"))?;
        let spat_grid = SpatialGrid::from_offsets(nspat, &offsets, self.config.spat_samp_fact);

        tracing::info!(
            det = %det,
            nexp = stack.len(),
            mode = %mode,
            offsets = ?offsets,
            offset_source = %offset_source,
            nspat = spat_grid.nbins,
            nspec = wave_grid.nbins,
            "Combining exposures"
        );

        let mut acc = CombineAccumulator::new(spat_grid.nbins, wave_grid.nbins);
        for (exposure, &offset) in stack.exposures().iter().zip(&offsets) {
            rectify_exposure(&mut acc, exposure, offset, mode, &wave_grid, &spat_grid);
        }
        if !acc.has_weight() {
            return Err(insufficient("no output pixel received any weight"));
        }

        let combined = acc.finalize(&wave_grid);
        let nbad = combined.mask.count_ones();
        tracing::debug!(det = %det, nbad, "Combined frame finalized");

        Ok(CombinedFrame {
            det,
            mode,
            sciimg: combined.sciimg,
            ivar: combined.ivar,
            mask: combined.mask,
            skymodel: combined.skymodel,
            objmodel: combined.objmodel,
            waveimg: combined.waveimg,
            wave_grid,
            spat_grid,
            offsets,
            offset_source,
        })
    }
}

/// Spectral extent of pixel `(x, y)` in grid coordinate.
///
/// Edges sit half-way to the valid neighbours of the same column; a missing
/// neighbour mirrors the other side. Isolated pixels get the native step.
fn spectral_footprint(exposure: &Exposure, x: usize, y: usize, grid: &WaveGrid) -> Option<(f64, f64)> {
    let waveimg = &exposure.waveimg;
    let wave = waveimg[(x, y)];
    if !is_valid_wave(wave) {
        return None;
    }
    let c = grid.coordinate(wave);
    let neighbour = |yy: Option<usize>| {
        yy.filter(|&yy| yy < waveimg.height())
            .map(|yy| waveimg[(x, yy)])
            .filter(|&w| is_valid_wave(w))
            .map(|w| grid.coordinate(w))
    };

    let (lo, hi) = match (neighbour(y.checked_sub(1)), neighbour(Some(y + 1))) {
        (Some(prev), Some(next)) => (0.5 * (prev + c), 0.5 * (c + next)),
        (Some(prev), None) => (0.5 * (prev + c), c + 0.5 * (c - prev)),
        (None, Some(next)) => (c - 0.5 * (next - c), 0.5 * (c + next)),
        (None, None) => (c - 0.5 * grid.native_step, c + 0.5 * grid.native_step),
    };
    // Wavelength may decrease with row number.
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    (hi > lo).then_some((lo, hi))
}

fn rectify_exposure(
    acc: &mut CombineAccumulator,
    exposure: &Exposure,
    offset: f64,
    mode: ReduxMode,
    wave_grid: &WaveGrid,
    spat_grid: &SpatialGrid,
) {
    let (width, height) = exposure.shape();
    for y in 0..height {
        for x in 0..width {
            let idx = exposure.sciimg.index_of(x, y);
            if !exposure.is_good(idx) {
                continue;
            }
            let Some((c_lo, c_hi)) = spectral_footprint(exposure, x, y, wave_grid) else {
                continue;
            };
            let u_lo = x as f64 - offset;
            let u_hi = u_lo + 1.0;

            let obj = exposure.objmodel[idx];
            let sample = Sample {
                sci: exposure.sciimg[idx] - exposure.skymodel[idx],
                sky: exposure.skymodel[idx],
                obj: if mode.is_difference() { obj } else { obj.max(0.0) },
                wave: exposure.waveimg[idx],
                ivar: exposure.ivar[idx],
            };

            for oy in wave_grid.bins_overlapping(c_lo, c_hi) {
                let (b_lo, b_hi) = wave_grid.bin_edges(oy);
                let a_spec = interval_overlap(c_lo, c_hi, b_lo, b_hi) / wave_grid.step;
                if a_spec < MIN_OVERLAP {
                    continue;
                }
                for ox in spat_grid.bins_overlapping(u_lo, u_hi) {
                    let (s_lo, s_hi) = spat_grid.bin_edges(ox);
                    let a = a_spec * interval_overlap(u_lo, u_hi, s_lo, s_hi) / spat_grid.step;
                    if a >= MIN_OVERLAP {
                        acc.add(ox, oy, a, sample);
                    }
                }
            }
        }
    }
}
