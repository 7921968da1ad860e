//! Synthetic spec2d scenes and in-memory collaborators for tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use common::{BitBuffer2, Buffer2};
use rand::prelude::*;

use crate::coadd::{CoaddOutput, OutputWriter};
use crate::detector::DetectorId;
use crate::error::{Error, Result};
use crate::exposure::{
    spec1d_path, Exposure, ExposureMeta, ExposureSource, Header, Spec1dTrace,
};
use crate::math::fwhm_to_sigma;

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Synthetic scenes
// ============================================================================

/// Gaussian trace at a constant spatial position.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticObject {
    /// Spatial center in the first exposure, in pixels.
    pub spat: f64,
    /// Peak counts. Negative values produce difference-imaging traces.
    pub amplitude: f64,
    pub fwhm: f64,
}

#[derive(Debug, Clone)]
pub struct SceneConfig {
    pub nspat: usize,
    pub nspec: usize,
    pub wave_start: f64,
    /// Wavelength step per spectral row.
    pub dispersion: f64,
    pub sky_level: f64,
    pub objects: Vec<SyntheticObject>,
    /// Gaussian noise added to the science image; 0 keeps it noiseless.
    pub noise_sigma: f64,
    pub seed: u64,
    pub skysub: String,
    pub mjd: f64,
    pub ra: String,
    pub dec: String,
    pub master_key: String,
    pub master_dir: String,
    pub spectrograph: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            nspat: 60,
            nspec: 200,
            wave_start: 5000.0,
            dispersion: 1.0,
            sky_level: 100.0,
            objects: vec![SyntheticObject {
                spat: 30.0,
                amplitude: 50.0,
                fwhm: 3.0,
            }],
            noise_sigma: 0.0,
            seed: 1,
            skysub: "GLOBAL".to_string(),
            mjd: 57783.269661,
            ra: "07:06:23.45".to_string(),
            dec: "+30:20:50.5".to_string(),
            master_key: "A_1_01".to_string(),
            master_dir: "Masters".to_string(),
            spectrograph: "keck_lris_blue".to_string(),
        }
    }
}

impl SceneConfig {
    /// Primary header of a spec2d file of this scene.
    pub fn header(&self) -> Header {
        Header::new()
            .with("SKYSUB", self.skysub.as_str())
            .with("PYPMFDIR", self.master_dir.as_str())
            .with("PYPMFKEY", self.master_key.as_str())
            .with("SPECTROG", self.spectrograph.as_str())
            .with("MJD", self.mjd)
            .with("RA", self.ra.as_str())
            .with("DEC", self.dec.as_str())
            .with("TARGET", "J0706+3020")
            .with("EXPTIME", 600.0)
            .with("AIRMASS", 1.1)
    }

    /// Object counts at pixel column `x` for an exposure shifted by `offset`.
    fn object_counts(&self, x: usize, offset: f64) -> f64 {
        self.objects
            .iter()
            .map(|obj| {
                let sigma = fwhm_to_sigma(obj.fwhm);
                let d = (x as f64 - (obj.spat + offset)) / sigma;
                obj.amplitude * (-0.5 * d * d).exp()
            })
            .sum()
    }
}

/// One exposure of `cfg` with every object shifted by `offset` pixels.
///
/// The science image is sky + objects (+ noise), the object model holds the
/// noiseless objects and each positive object gets a straight spec1d trace.
pub fn synthetic_exposure(cfg: &SceneConfig, offset: f64, path: &Path) -> Exposure {
    let (w, h) = (cfg.nspat, cfg.nspec);
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let objmodel = Buffer2::new(
        w,
        h,
        (0..w * h).map(|i| cfg.object_counts(i % w, offset)).collect(),
    );
    let skymodel = Buffer2::new_filled(w, h, cfg.sky_level);

    let mut sciimg = Buffer2::new(
        w,
        h,
        objmodel.pixels().iter().map(|o| o + cfg.sky_level).collect(),
    );
    if cfg.noise_sigma > 0.0 {
        for v in sciimg.pixels_mut() {
            let u1: f64 = rng.random_range(1e-10..1.0);
            let u2: f64 = rng.random_range(0.0..1.0);
            let r = (-2.0 * u1.ln()).sqrt() * cfg.noise_sigma;
            *v += r * (2.0 * std::f64::consts::PI * u2).cos();
        }
    }

    let sigma = if cfg.noise_sigma > 0.0 {
        cfg.noise_sigma
    } else {
        1.0
    };
    let ivar = Buffer2::new_filled(w, h, 1.0 / (sigma * sigma));
    let waveimg = Buffer2::new(
        w,
        h,
        (0..w * h)
            .map(|i| cfg.wave_start + cfg.dispersion * (i / w) as f64)
            .collect(),
    );

    let traces = cfg
        .objects
        .iter()
        .filter(|obj| obj.amplitude > 0.0)
        .map(|obj| {
            let spat = obj.spat + offset;
            let counts = obj.amplitude * (2.0 * std::f64::consts::PI).sqrt() * fwhm_to_sigma(obj.fwhm);
            Spec1dTrace {
                name: format!("SPAT{:04}-DET01", spat.round() as usize),
                trace_spat: vec![spat; h],
                counts: vec![counts; h],
                counts_ivar: vec![1.0; h],
            }
        })
        .collect();

    Exposure {
        path: path.to_path_buf(),
        sciimg,
        ivar,
        skymodel,
        objmodel,
        mask: BitBuffer2::new_default(w, h),
        waveimg,
        traces,
        meta: ExposureMeta::from_header(&cfg.header()),
    }
}

/// Exposure whose every pixel is masked.
pub fn masked_exposure(cfg: &SceneConfig, path: &Path) -> Exposure {
    let mut exposure = synthetic_exposure(cfg, 0.0, path);
    exposure.mask = BitBuffer2::new_filled(cfg.nspat, cfg.nspec, true);
    exposure.ivar.fill(0.0);
    exposure
}

// ============================================================================
// In-memory source
// ============================================================================

/// [`ExposureSource`] backed by hash maps.
#[derive(Debug, Default)]
pub struct MemorySource {
    headers: HashMap<PathBuf, Header>,
    exposures: HashMap<(PathBuf, DetectorId), Exposure>,
    spec1d: HashMap<(PathBuf, DetectorId), Vec<Spec1dTrace>>,
    files: HashSet<PathBuf>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `exposure` as detector `det` of `path` and of its spec1d
    /// companion. Its traces move to the companion.
    pub fn add(&mut self, path: &Path, det: DetectorId, mut exposure: Exposure, header: Header) {
        let spec1d = spec1d_path(path);
        let traces = std::mem::take(&mut exposure.traces);

        self.headers.insert(path.to_path_buf(), header.clone());
        self.headers.insert(spec1d.clone(), header);
        self.files.insert(path.to_path_buf());
        self.files.insert(spec1d.clone());
        self.exposures.insert((path.to_path_buf(), det), exposure);
        self.spec1d.insert((spec1d, det), traces);
    }

    /// Add one exposure of `cfg` for each `(path, offset)` on every detector.
    pub fn with_scene(cfg: &SceneConfig, dets: &[DetectorId], frames: &[(&str, f64)]) -> Self {
        let mut source = Self::new();
        for &(name, offset) in frames {
            let path = PathBuf::from(name);
            for &det in dets {
                let exposure = synthetic_exposure(cfg, offset, &path);
                source.add(&path, det, exposure, cfg.header());
            }
        }
        source
    }

    /// Forget that a file exists.
    pub fn remove_file(&mut self, path: &Path) {
        self.files.remove(path);
    }

    pub fn exposure_mut(&mut self, path: &Path, det: DetectorId) -> Option<&mut Exposure> {
        self.exposures.get_mut(&(path.to_path_buf(), det))
    }

    pub fn header_mut(&mut self, path: &Path) -> Option<&mut Header> {
        self.headers.get_mut(path)
    }
}

impl ExposureSource for MemorySource {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    fn read_header(&self, path: &Path) -> Result<Header> {
        self.headers
            .get(path)
            .cloned()
            .ok_or_else(|| Error::MissingFile {
                path: path.to_path_buf(),
                det: None,
            })
    }

    fn read_exposure(&self, path: &Path, det: DetectorId) -> Result<Exposure> {
        self.exposures
            .get(&(path.to_path_buf(), det))
            .cloned()
            .ok_or_else(|| Error::DataConsistency {
                det,
                path: path.to_path_buf(),
                reason: format!("missing extension {}", det),
            })
    }

    fn read_spec1d(&self, path: &Path, det: DetectorId) -> Result<Vec<Spec1dTrace>> {
        Ok(self
            .spec1d
            .get(&(path.to_path_buf(), det))
            .cloned()
            .unwrap_or_default())
    }
}

// ============================================================================
// Recording writer
// ============================================================================

/// [`OutputWriter`] that keeps every output it is handed.
#[derive(Default)]
pub struct RecordingWriter {
    pub saved: Vec<CoaddOutput>,
}

impl OutputWriter for RecordingWriter {
    fn save_all(&mut self, output: CoaddOutput) -> Result<()> {
        self.saved.push(output);
        Ok(())
    }
}
