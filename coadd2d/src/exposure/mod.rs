//! Per-exposure spec2d products and the stack of exposures for one detector.

pub(crate) mod fits;
mod header;
mod loader;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use common::{BitBuffer2, Buffer2};

use crate::detector::DetectorId;
use crate::error::Result;

pub use fits::{extension_name, spec1d_table_name, FitsExposureSource};
pub use header::{parse_sexagesimal, Header, HeaderValue};
pub use loader::StackLoader;

// ============================================================================
// Metadata
// ============================================================================

/// Scalars read from the primary header of a spec2d file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureMeta {
    pub target: Option<String>,
    pub airmass: Option<f64>,
    pub exptime: Option<f64>,
    pub mjd: Option<f64>,
    pub ra_deg: Option<f64>,
    pub dec_deg: Option<f64>,
    /// Calibration key tying this exposure to its master frames.
    pub master_key: Option<String>,
    /// Directory holding the master calibration frames.
    pub master_dir: Option<String>,
    /// Sky subtraction mode the exposure was reduced with.
    pub skysub: Option<String>,
}

impl ExposureMeta {
    pub fn from_header(header: &Header) -> Self {
        let text = |key: &str| header.get(key).map(|v| v.to_string());
        Self {
            target: text("TARGET").or_else(|| text("OBJECT")),
            airmass: header.get_f64("AIRMASS"),
            exptime: header.get_f64("EXPTIME"),
            mjd: header.get_f64("MJD"),
            ra_deg: header.ra_deg(),
            dec_deg: header.dec_deg(),
            master_key: text("PYPMFKEY"),
            master_dir: text("PYPMFDIR"),
            skysub: text("SKYSUB"),
        }
    }
}

/// Extracted object of a single-exposure spec1d file.
#[derive(Debug, Clone, PartialEq)]
pub struct Spec1dTrace {
    /// Table name, e.g. `SPAT0123-DET01`.
    pub name: String,
    /// Spatial position of the trace for every spectral row.
    pub trace_spat: Vec<f64>,
    pub counts: Vec<f64>,
    pub counts_ivar: Vec<f64>,
}

impl Spec1dTrace {
    /// Summed positive flux, used to pick the reference object.
    pub fn brightness(&self) -> f64 {
        self.counts
            .iter()
            .zip(&self.counts_ivar)
            .filter(|(c, iv)| c.is_finite() && **iv > 0.0)
            .map(|(c, _)| c.max(0.0))
            .sum()
    }

    pub fn mean_position(&self) -> Option<f64> {
        let finite: Vec<f64> = self
            .trace_spat
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        (!finite.is_empty()).then(|| finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

// ============================================================================
// Exposure
// ============================================================================

/// One reduced exposure of one detector.
///
/// Images have `width = nspat` and `height = nspec`. A set mask bit marks a
/// bad pixel.
#[derive(Debug, Clone)]
pub struct Exposure {
    pub path: PathBuf,
    pub sciimg: Buffer2<f64>,
    pub ivar: Buffer2<f64>,
    pub skymodel: Buffer2<f64>,
    pub objmodel: Buffer2<f64>,
    pub mask: BitBuffer2,
    pub waveimg: Buffer2<f64>,
    pub traces: Vec<Spec1dTrace>,
    pub meta: ExposureMeta,
}

impl Exposure {
    /// `(width, height)` of the science image.
    pub fn shape(&self) -> (usize, usize) {
        self.sciimg.shape()
    }

    /// Describe the first product whose shape differs from the science image.
    pub fn shape_mismatch(&self) -> Option<String> {
        let expected = self.shape();
        let products = [
            ("ivar", self.ivar.shape()),
            ("skymodel", self.skymodel.shape()),
            ("objmodel", self.objmodel.shape()),
            ("mask", self.mask.shape()),
            ("waveimg", self.waveimg.shape()),
        ];
        products
            .iter()
            .find(|(_, shape)| *shape != expected)
            .map(|(name, shape)| format!("{} shape {:?} != sciimg shape {:?}", name, shape, expected))
    }

    /// Pixel usable for combination: unmasked with positive weight.
    #[inline]
    pub fn is_good(&self, idx: usize) -> bool {
        !self.mask.get(idx) && self.ivar[idx] > 0.0
    }

    /// Mask pixels with invalid inverse variance or a non-finite science,
    /// sky or object value.
    ///
    /// Returns the number of newly masked pixels.
    pub(crate) fn sanitize(&mut self) -> usize {
        let mut count = 0;
        for idx in 0..self.ivar.len() {
            let ivar = self.ivar[idx];
            let invalid = !ivar.is_finite()
                || ivar < 0.0
                || !self.sciimg[idx].is_finite()
                || !self.skymodel[idx].is_finite()
                || !self.objmodel[idx].is_finite();
            if invalid {
                self.ivar[idx] = 0.0;
                if !self.mask.get(idx) {
                    self.mask.set(idx, true);
                    count += 1;
                }
            }
        }
        count
    }
}

// ============================================================================
// Stack
// ============================================================================

/// All exposures of one detector, sharing one pixel geometry.
#[derive(Debug, Clone)]
pub struct ExposureStack {
    det: DetectorId,
    exposures: Vec<Exposure>,
}

impl ExposureStack {
    /// Build a stack. Shapes are checked by [`StackLoader`]; this only
    /// asserts the invariant.
    pub fn new(det: DetectorId, exposures: Vec<Exposure>) -> Self {
        if let Some(first) = exposures.first() {
            assert!(
                exposures.iter().all(|e| e.shape() == first.shape()),
                "all exposures of a stack must share one shape"
            );
        }
        Self { det, exposures }
    }

    pub fn det(&self) -> DetectorId {
        self.det
    }

    pub fn exposures(&self) -> &[Exposure] {
        &self.exposures
    }

    pub fn len(&self) -> usize {
        self.exposures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exposures.is_empty()
    }

    /// `(nspat, nspec)` shared by every exposure.
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.exposures.first().map(Exposure::shape)
    }
}

/// Calibration identifiers of the first exposure, used for output naming.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterKeys {
    pub master_key: String,
    pub master_dir: String,
}

// ============================================================================
// Reading primitive
// ============================================================================

/// Read access to reduced single-exposure products.
pub trait ExposureSource {
    fn exists(&self, path: &Path) -> bool;

    /// Primary header of a spec2d or spec1d file.
    fn read_header(&self, path: &Path) -> Result<Header>;

    /// Images and header metadata of one detector. `traces` is left empty.
    fn read_exposure(&self, path: &Path, det: DetectorId) -> Result<Exposure>;

    /// Extracted objects of one detector from a spec1d file.
    fn read_spec1d(&self, path: &Path, det: DetectorId) -> Result<Vec<Spec1dTrace>>;
}

/// Companion spec1d path: `spec2d` in the file name becomes `spec1d`.
pub fn spec1d_path(spec2d: &Path) -> PathBuf {
    match spec2d.file_name().and_then(|n| n.to_str()) {
        Some(name) => spec2d.with_file_name(name.replacen("spec2d", "spec1d", 1)),
        None => spec2d.to_path_buf(),
    }
}
