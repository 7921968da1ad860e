//! FITS reading of spec2d and spec1d products.

use std::path::Path;

use common::{BitBuffer2, Buffer2};
use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::FitsFile;

use super::{Exposure, ExposureMeta, ExposureSource, Header, HeaderValue, Spec1dTrace};
use crate::detector::DetectorId;
use crate::error::{Error, Result};

/// Suffixes of the per-detector image extensions of a spec2d file.
pub(crate) const PROCESSED: &str = "PROCESSED";
pub(crate) const IVARRAW: &str = "IVARRAW";
pub(crate) const SKY: &str = "SKY";
pub(crate) const MODEL: &str = "MODEL";
pub(crate) const IVARMODEL: &str = "IVARMODEL";
pub(crate) const MASK: &str = "MASK";
pub(crate) const WAVEIMG: &str = "WAVEIMG";

/// Primary header keywords copied between products.
pub(crate) const HEADER_KEYS: &[&str] = &[
    "SKYSUB", "PYPMFDIR", "PYPMFKEY", "SPECTROG", "MJD", "RA", "DEC", "AIRMASS", "EXPTIME",
    "OBJECT", "TARGET", "DATE-OBS", "INSTRUME", "TELESCOP", "VEL_CORR", "VELFRAME",
];

/// `DETnn-<suffix>` extension name.
pub fn extension_name(det: DetectorId, suffix: &str) -> String {
    format!("{}{}", det.extension_prefix(), suffix)
}

/// `SPATssss-DETnn` table name of an extracted object.
pub fn spec1d_table_name(spat_pixel: usize, det: DetectorId) -> String {
    format!("SPAT{:04}-{}", spat_pixel, det)
}

/// Reads products from FITS files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FitsExposureSource;

impl FitsExposureSource {
    fn open(path: &Path) -> Result<FitsFile> {
        FitsFile::open(path).map_err(|e| Error::fits(path, e))
    }

    fn read_image(
        fptr: &mut FitsFile,
        path: &Path,
        det: DetectorId,
        suffix: &str,
    ) -> Result<Buffer2<f64>> {
        let (hdu, width, height) = image_hdu(fptr, path, det, suffix)?;
        let pixels: Vec<f64> = hdu.read_image(fptr).map_err(|e| Error::fits(path, e))?;
        Ok(Buffer2::new(width, height, pixels))
    }

    fn read_mask(fptr: &mut FitsFile, path: &Path, det: DetectorId) -> Result<BitBuffer2> {
        let (hdu, width, height) = image_hdu(fptr, path, det, MASK)?;
        let bits: Vec<i32> = hdu.read_image(fptr).map_err(|e| Error::fits(path, e))?;
        let bad: Vec<bool> = bits.iter().map(|&b| b != 0).collect();
        Ok(BitBuffer2::from_slice(width, height, &bad))
    }
}

/// Locate `DETnn-<suffix>` and return it with its `(width, height)`.
fn image_hdu(
    fptr: &mut FitsFile,
    path: &Path,
    det: DetectorId,
    suffix: &str,
) -> Result<(FitsHdu, usize, usize)> {
    let name = extension_name(det, suffix);
    let hdu = fptr.hdu(name.as_str()).map_err(|_| Error::DataConsistency {
        det,
        path: path.to_path_buf(),
        reason: format!("missing extension {}", name),
    })?;

    let (width, height) = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() == 2 => (shape[1], shape[0]),
        _ => {
            return Err(Error::DataConsistency {
                det,
                path: path.to_path_buf(),
                reason: format!("extension {} is not a 2D image", name),
            })
        }
    };
    Ok((hdu, width, height))
}

fn read_header_card(hdu: &FitsHdu, fptr: &mut FitsFile, key: &str) -> Option<HeaderValue> {
    if let Ok(value) = hdu.read_key::<f64>(fptr, key) {
        return Some(HeaderValue::Float(value));
    }
    hdu.read_key::<String>(fptr, key).ok().map(HeaderValue::Text)
}

impl ExposureSource for FitsExposureSource {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_header(&self, path: &Path) -> Result<Header> {
        let mut fptr = Self::open(path)?;
        let hdu = fptr.primary_hdu().map_err(|e| Error::fits(path, e))?;

        let mut header = Header::new();
        for key in HEADER_KEYS {
            if let Some(value) = read_header_card(&hdu, &mut fptr, key) {
                header.insert(key, value);
            }
        }
        Ok(header)
    }

    fn read_exposure(&self, path: &Path, det: DetectorId) -> Result<Exposure> {
        let meta = ExposureMeta::from_header(&self.read_header(path)?);
        let mut fptr = Self::open(path)?;

        Ok(Exposure {
            path: path.to_path_buf(),
            sciimg: Self::read_image(&mut fptr, path, det, PROCESSED)?,
            ivar: Self::read_image(&mut fptr, path, det, IVARRAW)?,
            skymodel: Self::read_image(&mut fptr, path, det, SKY)?,
            objmodel: Self::read_image(&mut fptr, path, det, MODEL)?,
            mask: Self::read_mask(&mut fptr, path, det)?,
            waveimg: Self::read_image(&mut fptr, path, det, WAVEIMG)?,
            traces: Vec::new(),
            meta,
        })
    }

    fn read_spec1d(&self, path: &Path, det: DetectorId) -> Result<Vec<Spec1dTrace>> {
        let mut fptr = Self::open(path)?;
        let hdus: Vec<FitsHdu> = fptr.iter().collect();
        let suffix = format!("-{}", det);

        let mut traces = Vec::new();
        for hdu in hdus {
            if !matches!(hdu.info, HduInfo::TableInfo { .. }) {
                continue;
            }
            let Ok(name) = hdu.read_key::<String>(&mut fptr, "EXTNAME") else {
                continue;
            };
            if !name.starts_with("SPAT") || !name.ends_with(&suffix) {
                continue;
            }

            let column = |fptr: &mut FitsFile, col: &str| -> Result<Vec<f64>> {
                hdu.read_col::<f64>(fptr, col).map_err(|e| Error::fits(path, e))
            };
            traces.push(Spec1dTrace {
                trace_spat: column(&mut fptr, "TRACE_SPAT")?,
                counts: column(&mut fptr, "OPT_COUNTS")?,
                counts_ivar: column(&mut fptr, "OPT_COUNTS_IVAR")?,
                name,
            });
        }
        Ok(traces)
    }
}
