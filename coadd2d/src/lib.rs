//! coadd2d - Two-dimensional coaddition of multi-exposure spectroscopic reductions.
//!
//! Combines the spec2d products of several exposures of one target into a
//! single higher signal-to-noise frame per detector and re-extracts 1D
//! spectra from it:
//! - Stack loading with geometry and inverse-variance checks
//! - Rectified inverse-variance weighted combination onto a common grid
//! - Object finding, tracing, boxcar and optimal extraction
//! - Heliocentric and barycentric velocity corrections
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use coadd2d::{load_spectrograph, Coadd2d, CoaddRequest, FitsExposureSource, FitsOutputWriter};
//!
//! let spectrograph = load_spectrograph("keck_lris_blue")?;
//! let config = spectrograph.default_config();
//! let source = FitsExposureSource;
//! let request = CoaddRequest {
//!     spec2d_files: vec!["Science/spec2d_J0706+3020_a.fits".into()],
//!     basename: "J0706+3020".to_string(),
//!     flags: Default::default(),
//! };
//!
//! Coadd2d::new(config, spectrograph.as_ref(), &source).run(&request, &mut FitsOutputWriter::new())?;
//! ```

pub mod coadd;
pub mod coadd_file;
pub mod combine;
pub mod config;
pub mod detector;
pub mod error;
pub mod exposure;
pub mod extraction;
pub(crate) mod math;
pub mod spectrograph;
pub mod velocity;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Configuration and errors
// ============================================================================

pub use config::{CoaddConfig, CombineConfig, ExtractionConfig, VelocityFrame, WaveGridMethod};
pub use detector::{DetectorId, DetectorSelection};
pub use error::{Error, Result};

// ============================================================================
// Pipeline stages
// ============================================================================

pub use combine::{CombinedFrame, Combiner, ReduxMode};
pub use exposure::{ExposureSource, ExposureStack, FitsExposureSource, StackLoader};
pub use extraction::{ExtractionFlags, ReExtractionResult, ReExtractor, SpecObj};

// ============================================================================
// Orchestration
// ============================================================================

pub use coadd::{Coadd2d, CoaddOutput, CoaddRequest, FitsOutputWriter, OutputWriter, SciDict};
pub use coadd_file::{basename_from_spec2d, discover_spec2d, Coadd2dFile};
pub use spectrograph::{load_spectrograph, Spectrograph};
