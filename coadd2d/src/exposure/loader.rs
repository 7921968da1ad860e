//! Loading of aligned exposure stacks.

use std::path::{Path, PathBuf};

use super::{spec1d_path, Exposure, ExposureSource, ExposureStack, MasterKeys};
use crate::combine::ReduxMode;
use crate::detector::DetectorId;
use crate::error::{Error, Result};

/// Reads every exposure of one detector through an [`ExposureSource`].
pub struct StackLoader<'a, S: ExposureSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: ExposureSource + ?Sized> StackLoader<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Load the stack of `det` from `spec2d_files`, in the given order.
    ///
    /// Fails with [`Error::MissingFile`] when a spec2d file or its spec1d
    /// companion does not exist, and with [`Error::DataConsistency`] when
    /// pixel geometries disagree. Pixels with invalid inverse variance are
    /// masked and counted rather than rejected.
    pub fn load(
        &self,
        spec2d_files: &[PathBuf],
        det: DetectorId,
    ) -> Result<(ExposureStack, MasterKeys)> {
        if spec2d_files.is_empty() {
            return Err(Error::InsufficientData {
                det,
                reason: "no spec2d files to combine".to_string(),
            });
        }

        let mut exposures: Vec<Exposure> = Vec::with_capacity(spec2d_files.len());
        for path in spec2d_files {
            let exposure = self.load_one(path, det)?;

            if let Some(first) = exposures.first() {
                if exposure.shape() != first.shape() {
                    return Err(Error::DataConsistency {
                        det,
                        path: path.clone(),
                        reason: format!(
                            "shape {:?} differs from {:?} of '{}'",
                            exposure.shape(),
                            first.shape(),
                            first.path.display()
                        ),
                    });
                }
            }
            exposures.push(exposure);
        }

        for path in skysub_mismatches(&exposures) {
            tracing::warn!(
                det = %det,
                path = %path.display(),
                first = %exposures[0].path.display(),
                "SKYSUB mode differs from the first exposure, combining with the first exposure's mode"
            );
        }

        let first_meta = &exposures[0].meta;
        let master_keys = MasterKeys {
            master_key: first_meta.master_key.clone().unwrap_or_default(),
            master_dir: first_meta.master_dir.clone().unwrap_or_default(),
        };

        tracing::info!(
            det = %det,
            nexp = exposures.len(),
            shape = ?exposures[0].shape(),
            "Loaded exposure stack"
        );
        Ok((ExposureStack::new(det, exposures), master_keys))
    }

    fn load_one(&self, path: &Path, det: DetectorId) -> Result<Exposure> {
        if !self.source.exists(path) {
            return Err(Error::MissingFile {
                path: path.to_path_buf(),
                det: Some(det),
            });
        }
        let spec1d = spec1d_path(path);
        if !self.source.exists(&spec1d) {
            return Err(Error::MissingFile {
                path: spec1d,
                det: Some(det),
            });
        }

        let mut exposure = self.source.read_exposure(path, det)?;
        if let Some(reason) = exposure.shape_mismatch() {
            return Err(Error::DataConsistency {
                det,
                path: path.to_path_buf(),
                reason,
            });
        }
        let masked = exposure.sanitize();
        if masked > 0 {
            tracing::warn!(
                det = %det,
                path = %path.display(),
                masked,
                "Masked pixels with invalid inverse variance or non-finite values"
            );
        }

        exposure.traces = self.source.read_spec1d(&spec1d, det)?;
        tracing::debug!(
            det = %det,
            path = %path.display(),
            ntraces = exposure.traces.len(),
            "Loaded exposure"
        );
        Ok(exposure)
    }
}

fn skysub_mode(exposure: &Exposure) -> Option<ReduxMode> {
    exposure.meta.skysub.as_deref().map(ReduxMode::from_skysub)
}

/// Paths of exposures whose `SKYSUB` mode disagrees with the first one.
///
/// Exposures without a `SKYSUB` value are not compared.
pub(crate) fn skysub_mismatches(exposures: &[Exposure]) -> Vec<&Path> {
    let Some(first) = exposures.first().and_then(skysub_mode) else {
        return Vec::new();
    };
    exposures[1..]
        .iter()
        .filter(|e| skysub_mode(e).is_some_and(|mode| mode != first))
        .map(|e| e.path.as_path())
        .collect()
}
