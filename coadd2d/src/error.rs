//! Error types for coadd operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::detector::DetectorId;

/// Errors raised while loading, combining, extracting or writing a coadd.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing file '{path}'{}", det_suffix(.det))]
    MissingFile {
        path: PathBuf,
        det: Option<DetectorId>,
    },

    #[error("Header of '{path}' has no '{key}' keyword")]
    MissingKeyword { path: PathBuf, key: String },

    #[error("Inconsistent data for {det} in '{path}': {reason}")]
    DataConsistency {
        det: DetectorId,
        path: PathBuf,
        reason: String,
    },

    #[error("Insufficient data for {det}: {reason}")]
    InsufficientData { det: DetectorId, reason: String },

    #[error("No objects found on {det}")]
    NoObjectsFound { det: DetectorId },

    #[error("FITS error in '{path}': {source}")]
    Fits {
        path: PathBuf,
        #[source]
        source: fitsio::errors::Error,
    },

    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn det_suffix(det: &Option<DetectorId>) -> String {
    match det {
        Some(det) => format!(" for {}", det),
        None => String::new(),
    }
}

impl Error {
    /// Whether the orchestrator may continue with the next detector.
    ///
    /// Only [`Error::NoObjectsFound`] degrades to an empty result; everything
    /// else aborts the run before any output is written.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NoObjectsFound { .. })
    }

    pub(crate) fn fits(path: impl Into<PathBuf>, source: fitsio::errors::Error) -> Self {
        Error::Fits {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_message_includes_detector() {
        let err = Error::MissingFile {
            path: PathBuf::from("Science/spec1d_a.fits"),
            det: Some(DetectorId::new(2)),
        };
        let msg = err.to_string();
        assert!(msg.contains("Science/spec1d_a.fits"));
        assert!(msg.contains("DET02"));
    }

    #[test]
    fn test_missing_file_without_detector() {
        let err = Error::MissingFile {
            path: PathBuf::from("a.fits"),
            det: None,
        };
        assert_eq!(err.to_string(), "Missing file 'a.fits'");
    }

    #[test]
    fn test_data_consistency_message() {
        let err = Error::DataConsistency {
            det: DetectorId::new(1),
            path: PathBuf::from("spec2d_b.fits"),
            reason: "shape (10, 20) != (10, 21)".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DET01"));
        assert!(msg.contains("spec2d_b.fits"));
        assert!(msg.contains("(10, 21)"));
    }

    #[test]
    fn test_missing_keyword_message() {
        let err = Error::MissingKeyword {
            path: PathBuf::from("spec2d_a.fits"),
            key: "SKYSUB".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Header of 'spec2d_a.fits' has no 'SKYSUB' keyword"
        );
    }

    #[test]
    fn test_only_no_objects_is_recoverable() {
        let det = DetectorId::new(1);
        assert!(Error::NoObjectsFound { det }.is_recoverable());
        assert!(!Error::InsufficientData {
            det,
            reason: String::new()
        }
        .is_recoverable());
        assert!(!Error::Configuration("x".into()).is_recoverable());
    }

    #[test]
    fn test_io_error_source_chain() {
        use std::error::Error as StdError;

        let err = Error::io("/tmp/x", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("gone"));
    }
}
