//! FITS persistence of a finished coadd.

use std::path::{Path, PathBuf};

use common::{BitBuffer2, Buffer2};
use fitsio::hdu::FitsHdu;
use fitsio::images::{ImageDescription, ImageType};
use fitsio::tables::{ColumnDataType, ColumnDescription};
use fitsio::FitsFile;

use super::{CoaddOutput, DetectorResult, OutputWriter, SciMeta};
use crate::detector::DetectorId;
use crate::error::{Error, Result};
use crate::exposure::fits::{IVARMODEL, IVARRAW, MASK, MODEL, PROCESSED, SKY, WAVEIMG};
use crate::exposure::{extension_name, Header, HeaderValue};
use crate::extraction::SpecObj;

/// Writes `spec2d_<basename>.fits` and `spec1d_<basename>.fits` into the
/// output directory of the coadd. Existing files are replaced.
#[derive(Debug, Default)]
pub struct FitsOutputWriter {
    written: Vec<PathBuf>,
}

impl FitsOutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files written so far.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn spec2d_path(output: &CoaddOutput) -> PathBuf {
        output.output_dir.join(format!("spec2d_{}.fits", output.basename))
    }

    pub fn spec1d_path(output: &CoaddOutput) -> PathBuf {
        output.output_dir.join(format!("spec1d_{}.fits", output.basename))
    }
}

impl OutputWriter for FitsOutputWriter {
    fn save_all(&mut self, output: CoaddOutput) -> Result<()> {
        let spec2d = Self::spec2d_path(&output);
        write_spec2d(&spec2d, &output)?;
        tracing::info!(path = %spec2d.display(), ndet = output.sci_dict.len(), "Wrote spec2d file");
        self.written.push(spec2d);

        let spec1d = Self::spec1d_path(&output);
        let nobj = write_spec1d(&spec1d, &output)?;
        tracing::info!(path = %spec1d.display(), nobj, "Wrote spec1d file");
        self.written.push(spec1d);
        Ok(())
    }
}

// ============================================================================
// spec2d
// ============================================================================

fn write_spec2d(path: &Path, output: &CoaddOutput) -> Result<()> {
    let mut fptr = create(path)?;
    let primary = fptr.primary_hdu().map_err(|e| Error::fits(path, e))?;

    write_header(&primary, &mut fptr, path, &output.head2d, SPEC2D_KEYS)?;
    write_meta(&primary, &mut fptr, path, &output.meta)?;
    let write = |fptr: &mut FitsFile, key: &str, value: &str| {
        primary
            .write_key(fptr, key, value.to_string())
            .map_err(|e| Error::fits(path, e))
    };
    write(&mut fptr, "IR_REDUX", if output.meta.mode.is_difference() { "T" } else { "F" })?;
    write(&mut fptr, "PYPMFKEY", &output.master_keys.master_key)?;
    write(&mut fptr, "SPECTROG", &output.spectrograph)?;

    for (&det, result) in &output.sci_dict {
        write_detector(&mut fptr, path, det, result)?;
    }
    Ok(())
}

fn write_detector(fptr: &mut FitsFile, path: &Path, det: DetectorId, result: &DetectorResult) -> Result<()> {
    let frame = &result.frame;
    let extraction = &result.extraction;

    // The stored science image carries the combined sky like a single-exposure spec2d.
    let processed = Buffer2::new(
        frame.sciimg.width(),
        frame.sciimg.height(),
        frame
            .sciimg
            .pixels()
            .iter()
            .zip(frame.skymodel.pixels())
            .map(|(s, k)| s + k)
            .collect(),
    );

    write_image(fptr, path, &extension_name(det, PROCESSED), &processed)?;
    write_image(fptr, path, &extension_name(det, IVARRAW), &frame.ivar)?;
    write_image(fptr, path, &extension_name(det, SKY), &extraction.skymodel)?;
    write_image(fptr, path, &extension_name(det, MODEL), &extraction.objmodel)?;
    write_image(fptr, path, &extension_name(det, IVARMODEL), &extraction.ivarmodel)?;
    write_mask(fptr, path, &extension_name(det, MASK), &extraction.outmask)?;
    write_image(fptr, path, &extension_name(det, WAVEIMG), &frame.waveimg)?;
    Ok(())
}

fn write_image(fptr: &mut FitsFile, path: &Path, name: &str, image: &Buffer2<f64>) -> Result<()> {
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[image.height(), image.width()],
    };
    let hdu = fptr
        .create_image(name, &description)
        .map_err(|e| Error::fits(path, e))?;
    hdu.write_image(fptr, image.pixels())
        .map_err(|e| Error::fits(path, e))
}

fn write_mask(fptr: &mut FitsFile, path: &Path, name: &str, mask: &BitBuffer2) -> Result<()> {
    let description = ImageDescription {
        data_type: ImageType::Long,
        dimensions: &[mask.height(), mask.width()],
    };
    let bits: Vec<i32> = (0..mask.len()).map(|i| i32::from(mask.get(i))).collect();
    let hdu = fptr
        .create_image(name, &description)
        .map_err(|e| Error::fits(path, e))?;
    hdu.write_image(fptr, &bits).map_err(|e| Error::fits(path, e))
}

// ============================================================================
// spec1d
// ============================================================================

const DOUBLE_COLUMNS: &[&str] = &[
    "TRACE_SPAT",
    "BOX_WAVE",
    "BOX_COUNTS",
    "BOX_COUNTS_IVAR",
    "OPT_WAVE",
    "OPT_COUNTS",
    "OPT_COUNTS_IVAR",
];
const MASK_COLUMNS: &[&str] = &["BOX_MASK", "OPT_MASK"];

/// Returns the number of object tables written.
fn write_spec1d(path: &Path, output: &CoaddOutput) -> Result<usize> {
    let mut fptr = create(path)?;
    let primary = fptr.primary_hdu().map_err(|e| Error::fits(path, e))?;
    write_header(&primary, &mut fptr, path, &output.head1d, META_KEYS)?;
    write_meta(&primary, &mut fptr, path, &output.meta)?;

    let mut nobj = 0;
    for result in output.sci_dict.values() {
        for specobj in &result.extraction.specobjs {
            write_specobj(&mut fptr, path, specobj)?;
            nobj += 1;
        }
    }
    Ok(nobj)
}

fn write_specobj(fptr: &mut FitsFile, path: &Path, specobj: &SpecObj) -> Result<()> {
    let columns = DOUBLE_COLUMNS
        .iter()
        .map(|name| (name, ColumnDataType::Double))
        .chain(MASK_COLUMNS.iter().map(|name| (name, ColumnDataType::Int)))
        .map(|(name, data_type)| {
            ColumnDescription::new(*name)
                .with_type(data_type)
                .create()
                .map_err(|e| Error::fits(path, e))
        })
        .collect::<Result<Vec<_>>>()?;

    let hdu = fptr
        .create_table(specobj.name(), &columns)
        .map_err(|e| Error::fits(path, e))?;

    let doubles: [(&str, &[f64]); 7] = [
        ("TRACE_SPAT", &specobj.trace),
        ("BOX_WAVE", &specobj.boxcar.wave),
        ("BOX_COUNTS", &specobj.boxcar.counts),
        ("BOX_COUNTS_IVAR", &specobj.boxcar.counts_ivar),
        ("OPT_WAVE", &specobj.optimal.wave),
        ("OPT_COUNTS", &specobj.optimal.counts),
        ("OPT_COUNTS_IVAR", &specobj.optimal.counts_ivar),
    ];
    for (name, data) in doubles {
        hdu.write_col(fptr, name, data)
            .map_err(|e| Error::fits(path, e))?;
    }

    let masks = [("BOX_MASK", &specobj.boxcar.good), ("OPT_MASK", &specobj.optimal.good)];
    for (name, good) in masks {
        let bits: Vec<i32> = good.iter().map(|g| i32::from(*g)).collect();
        hdu.write_col(fptr, name, &bits)
            .map_err(|e| Error::fits(path, e))?;
    }

    let write_key = |fptr: &mut FitsFile, key: &str, value: f64| {
        hdu.write_key(fptr, key, value).map_err(|e| Error::fits(path, e))
    };
    write_key(fptr, "FWHM", specobj.fwhm)?;
    write_key(fptr, "S2N", specobj.s2n)?;
    write_key(fptr, "SIGNIF", specobj.significance)?;
    write_key(fptr, "SPAT_PIX", specobj.spat_pixel as f64)?;
    Ok(())
}

// ============================================================================
// Headers
// ============================================================================

fn create(path: &Path) -> Result<FitsFile> {
    FitsFile::create(path)
        .overwrite()
        .open()
        .map_err(|e| Error::fits(path, e))
}

/// Cards set from the coadd itself rather than copied from the inputs.
const META_KEYS: &[&str] = &["VEL_CORR", "VELFRAME"];
const SPEC2D_KEYS: &[&str] = &["VEL_CORR", "VELFRAME", "IR_REDUX", "PYPMFKEY", "SPECTROG"];

fn write_header(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    path: &Path,
    header: &Header,
    skip: &[&str],
) -> Result<()> {
    for (key, value) in header.iter().filter(|(key, _)| !skip.contains(key)) {
        let written = match value {
            HeaderValue::Float(v) => hdu.write_key(fptr, key, *v),
            HeaderValue::Int(v) => hdu.write_key(fptr, key, *v),
            HeaderValue::Text(v) => hdu.write_key(fptr, key, v.clone()),
        };
        written.map_err(|e| Error::fits(path, e))?;
    }
    Ok(())
}

fn write_meta(hdu: &FitsHdu, fptr: &mut FitsFile, path: &Path, meta: &SciMeta) -> Result<()> {
    hdu.write_key(fptr, "VEL_CORR", meta.vel_corr)
        .map_err(|e| Error::fits(path, e))?;
    hdu.write_key(fptr, "VELFRAME", meta.vel_frame.to_string())
        .map_err(|e| Error::fits(path, e))
}
