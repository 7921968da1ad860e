//! Weighted sums of the rectified combination.

use common::{BitBuffer2, Buffer2};

use super::grid::WaveGrid;

/// Running sums for every output bin.
///
/// Each contribution carries an overlap fraction `a` and a weight `w`:
/// the value is `Σawv / Σaw` and the inverse variance `(Σaw)² / Σa²w`.
#[derive(Debug)]
pub(super) struct CombineAccumulator {
    width: usize,
    height: usize,
    sum_aw: Vec<f64>,
    sum_a2w: Vec<f64>,
    sum_sci: Vec<f64>,
    sum_sky: Vec<f64>,
    sum_obj: Vec<f64>,
    sum_wave: Vec<f64>,
}

/// One input pixel's values.
#[derive(Debug, Clone, Copy)]
pub(super) struct Sample {
    /// Sky-subtracted science value.
    pub sci: f64,
    pub sky: f64,
    pub obj: f64,
    pub wave: f64,
    pub ivar: f64,
}

/// Combined products before they are wrapped into a frame.
pub(super) struct Combined {
    pub sciimg: Buffer2<f64>,
    pub ivar: Buffer2<f64>,
    pub mask: BitBuffer2,
    pub skymodel: Buffer2<f64>,
    pub objmodel: Buffer2<f64>,
    pub waveimg: Buffer2<f64>,
}

impl CombineAccumulator {
    pub fn new(width: usize, height: usize) -> Self {
        let n = width * height;
        Self {
            width,
            height,
            sum_aw: vec![0.0; n],
            sum_a2w: vec![0.0; n],
            sum_sci: vec![0.0; n],
            sum_sky: vec![0.0; n],
            sum_obj: vec![0.0; n],
            sum_wave: vec![0.0; n],
        }
    }

    #[inline]
    pub fn add(&mut self, x: usize, y: usize, overlap: f64, sample: Sample) {
        debug_assert!(x < self.width && y < self.height);
        let idx = y * self.width + x;
        let aw = overlap * sample.ivar;
        self.sum_aw[idx] += aw;
        self.sum_a2w[idx] += overlap * aw;
        self.sum_sci[idx] += aw * sample.sci;
        self.sum_sky[idx] += aw * sample.sky;
        self.sum_obj[idx] += aw * sample.obj;
        self.sum_wave[idx] += aw * sample.wave;
    }

    /// Whether any bin received weight.
    pub fn has_weight(&self) -> bool {
        self.sum_aw.iter().any(|&w| w > 0.0)
    }

    /// Normalize the sums. Bins without weight are masked with value 0,
    /// ivar 0 and the grid wavelength.
    pub fn finalize(self, wave_grid: &WaveGrid) -> Combined {
        let (width, height) = (self.width, self.height);
        let n = width * height;

        let mut sciimg = vec![0.0; n];
        let mut ivar = vec![0.0; n];
        let mut skymodel = vec![0.0; n];
        let mut objmodel = vec![0.0; n];
        let mut waveimg = vec![0.0; n];
        let mut mask = BitBuffer2::new_default(width, height);

        for idx in 0..n {
            let aw = self.sum_aw[idx];
            if aw > 0.0 {
                sciimg[idx] = self.sum_sci[idx] / aw;
                skymodel[idx] = self.sum_sky[idx] / aw;
                objmodel[idx] = self.sum_obj[idx] / aw;
                waveimg[idx] = self.sum_wave[idx] / aw;
                ivar[idx] = aw * aw / self.sum_a2w[idx];
            } else {
                waveimg[idx] = wave_grid.center_wave(idx / width);
                mask.set(idx, true);
            }
        }

        Combined {
            sciimg: Buffer2::new(width, height, sciimg),
            ivar: Buffer2::new(width, height, ivar),
            mask,
            skymodel: Buffer2::new(width, height, skymodel),
            objmodel: Buffer2::new(width, height, objmodel),
            waveimg: Buffer2::new(width, height, waveimg),
        }
    }
}
