//! Per-detector coadd orchestration.
//!
//! Detectors are processed in ascending order, each one loading its stack,
//! combining it and re-extracting objects. The results are collected in a
//! [`SciDict`] and handed to an [`OutputWriter`] exactly once, after every
//! detector succeeded.

mod writer;


use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::combine::{CombinedFrame, Combiner, ReduxMode};
use crate::config::{CoaddConfig, VelocityFrame};
use crate::detector::DetectorId;
use crate::error::{Error, Result};
use crate::exposure::{spec1d_path, ExposureSource, ExposureStack, Header, MasterKeys, StackLoader};
use crate::extraction::{ExtractionFlags, ReExtractionResult, ReExtractor};
use crate::spectrograph::Spectrograph;
use crate::velocity::{geomotion_correct, geomotion_velocity};

pub use writer::FitsOutputWriter;

/// Directory below the reduction root that receives the coadded products.
pub const SCIENCE_COADD_DIR: &str = "Science_coadd";

// ============================================================================
// Products
// ============================================================================

/// Scalars shared by every detector of a coadd.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SciMeta {
    /// Line-of-sight velocity correction in km/s.
    pub vel_corr: f64,
    pub vel_frame: VelocityFrame,
    pub mode: ReduxMode,
}

/// Combined frame and re-extraction of one detector.
#[derive(Debug, Clone)]
pub struct DetectorResult {
    pub frame: CombinedFrame,
    pub extraction: ReExtractionResult,
}

/// Per-detector results in ascending detector order.
pub type SciDict = BTreeMap<DetectorId, DetectorResult>;

/// Everything the writer needs for one coadd.
#[derive(Debug, Clone)]
pub struct CoaddOutput {
    pub sci_dict: SciDict,
    pub meta: SciMeta,
    pub master_keys: MasterKeys,
    pub spectrograph: String,
    pub head1d: Header,
    pub head2d: Header,
    /// `<redux>/Science_coadd`.
    pub output_dir: PathBuf,
    /// `<redux>/<master dir>_coadd`.
    pub master_dir: PathBuf,
    pub basename: String,
}

/// Persistence of a finished coadd.
pub trait OutputWriter {
    fn save_all(&mut self, output: CoaddOutput) -> Result<()>;
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoaddState {
    Init,
    LoadingStacks(DetectorId),
    Combining(DetectorId),
    Extracting(DetectorId),
    Done,
}

impl fmt::Display for CoaddState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoaddState::Init => write!(f, "init"),
            CoaddState::LoadingStacks(det) => write!(f, "loading stacks ({})", det),
            CoaddState::Combining(det) => write!(f, "combining ({})", det),
            CoaddState::Extracting(det) => write!(f, "extracting ({})", det),
            CoaddState::Done => write!(f, "done"),
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Inputs of one coadd run.
#[derive(Debug, Clone)]
pub struct CoaddRequest {
    /// Spec2d files in combination order.
    pub spec2d_files: Vec<PathBuf>,
    pub basename: String,
    pub flags: ExtractionFlags,
}

/// Runs the per-detector coadd of a list of spec2d files.
pub struct Coadd2d<'a, S: ExposureSource + ?Sized> {
    config: CoaddConfig,
    spectrograph: &'a dyn Spectrograph,
    source: &'a S,
    state: CoaddState,
}

impl<'a, S: ExposureSource + ?Sized> Coadd2d<'a, S> {
    pub fn new(config: CoaddConfig, spectrograph: &'a dyn Spectrograph, source: &'a S) -> Self {
        Self {
            config,
            spectrograph,
            source,
            state: CoaddState::Init,
        }
    }

    pub fn state(&self) -> CoaddState {
        self.state
    }

    pub fn config(&self) -> &CoaddConfig {
        &self.config
    }

    fn transition(&mut self, next: CoaddState) {
        tracing::debug!(from = %self.state, to = %next, "Coadd state transition");
        self.state = next;
    }

    /// Process every selected detector and hand the results to `writer`.
    ///
    /// Any error other than [`Error::NoObjectsFound`] aborts the run before
    /// the writer is called.
    pub fn run(&mut self, request: &CoaddRequest, writer: &mut dyn OutputWriter) -> Result<()> {
        self.config.validate()?;
        let first = request
            .spec2d_files
            .first()
            .ok_or_else(|| Error::Configuration("no spec2d files to coadd".to_string()))?;

        let detectors = self.resolve_detectors()?;
        let head2d = self.source.read_header(first)?;
        let head1d = self.source.read_header(&spec1d_path(first))?;
        let skysub = head2d.get_str("SKYSUB").ok_or_else(|| Error::MissingKeyword {
            path: first.clone(),
            key: "SKYSUB".to_string(),
        })?;
        let mode = ReduxMode::from_skysub(skysub);

        tracing::info!(
            files = ?request.spec2d_files,
            skysub,
            mode = %mode,
            spectrograph = self.spectrograph.name(),
            "Coadding 2D spectra"
        );

        let master_dir = self.create_master_dir(&head2d)?;

        let combiner = Combiner::new(self.config.combine.clone());
        let extractor = ReExtractor::new(self.config.extraction.clone(), request.flags);

        let mut sci_dict = SciDict::new();
        let mut master_keys: Option<MasterKeys> = None;
        let mut vel_corr: Option<f64> = None;
        for det in detectors {
            self.transition(CoaddState::LoadingStacks(det));
            let (stack, keys) = StackLoader::new(self.source).load(&request.spec2d_files, det)?;
            master_keys.get_or_insert(keys);

            self.transition(CoaddState::Combining(det));
            let frame = combiner.combine(&stack, mode)?;
            let vel = *vel_corr.get_or_insert_with(|| self.velocity_correction(&stack));

            self.transition(CoaddState::Extracting(det));
            let mut extraction = match extractor.extract(&frame) {
                Ok(result) => result,
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(det = %det, "{}, continuing with an empty object list", err);
                    ReExtractionResult::empty(&frame)
                }
                Err(err) => return Err(err),
            };
            if vel != 0.0 {
                geomotion_correct(&mut extraction.specobjs, vel);
            }

            sci_dict.insert(det, DetectorResult { frame, extraction });
        }

        let output_dir = self.config.redux_path.join(SCIENCE_COADD_DIR);
        create_dir(&output_dir)?;

        self.transition(CoaddState::Done);
        let output = CoaddOutput {
            sci_dict,
            meta: SciMeta {
                vel_corr: vel_corr.unwrap_or(0.0),
                vel_frame: self.config.velocity,
                mode,
            },
            master_keys: master_keys.unwrap_or_default(),
            spectrograph: self.spectrograph.name().to_string(),
            head1d,
            head2d,
            output_dir,
            master_dir,
            basename: request.basename.clone(),
        };
        writer.save_all(output)
    }

    fn resolve_detectors(&self) -> Result<Vec<DetectorId>> {
        let detectors = self.spectrograph.select_detectors(self.config.detnum);
        let skipped: Vec<String> = (1..=self.spectrograph.ndet())
            .map(DetectorId::new)
            .filter(|det| !detectors.contains(det))
            .map(|det| det.to_string())
            .collect();
        if !skipped.is_empty() {
            tracing::warn!(skipped = ?skipped, "Skipping detectors not selected by detnum");
        }
        if detectors.is_empty() {
            return Err(Error::Configuration(format!(
                "detnum {:?} selects no detector of {} ({} detectors)",
                self.config.detnum,
                self.spectrograph.name(),
                self.spectrograph.ndet()
            )));
        }
        Ok(detectors)
    }

    /// Create `<redux>/<master dir>_coadd`.
    ///
    /// `Science_coadd` is only created once every detector has been coadded.
    fn create_master_dir(&self, head2d: &Header) -> Result<PathBuf> {
        let master_name = head2d
            .get_str("PYPMFDIR")
            .and_then(|dir| Path::new(dir.trim_end_matches('/')).file_name())
            .and_then(|name| name.to_str())
            .unwrap_or("Masters");
        let master_dir = self.config.redux_path.join(format!("{}_coadd", master_name));
        create_dir(&master_dir)?;
        Ok(master_dir)
    }

    /// Velocity correction from the first exposure of `stack`.
    fn velocity_correction(&self, stack: &ExposureStack) -> f64 {
        let frame = self.config.velocity;
        if frame == VelocityFrame::None {
            return 0.0;
        }
        let Some(meta) = stack.exposures().first().map(|e| &e.meta) else {
            return 0.0;
        };
        let (Some(mjd), Some(ra), Some(dec)) = (meta.mjd, meta.ra_deg, meta.dec_deg) else {
            tracing::warn!(
                det = %stack.det(),
                "Missing MJD, RA or DEC, skipping the velocity correction"
            );
            return 0.0;
        };

        let location = self.spectrograph.location();
        let vel = geomotion_velocity(mjd, ra, dec, &location, frame);
        tracing::info!(frame = %frame, vel_kms = vel, "Velocity correction");
        vel
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    if common::file_utils::ensure_dir(dir).map_err(|e| Error::io(dir, e))? {
        tracing::info!(dir = %dir.display(), "Created directory");
    }
    Ok(())
}
