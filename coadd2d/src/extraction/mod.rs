//! Object finding, tracing and extraction on a combined frame.
//!
//! The engine fits a residual sky per spectral row, finds objects on the
//! collapsed S/N profile, traces them, refits the sky with the objects
//! masked and extracts boxcar and optimal spectra. In difference-imaging
//! frames negative traces are found and modelled too, but only positive
//! objects are reported.

mod extract;
mod findobj;
mod sky;
mod trace;


use common::{BitBuffer2, Buffer2};

use crate::combine::CombinedFrame;
use crate::config::ExtractionConfig;
use crate::detector::DetectorId;
use crate::error::{Error, Result};
use crate::exposure::spec1d_table_name;
use crate::math::statistics::median_mut;
use extract::{add_object_model, boxcar, optimal, ExtractionImage};
use findobj::{find_peaks, significance, snr_profile, FindParams};
use sky::fit_residual_sky;
use trace::{trace_object, Trace};

pub use findobj::Detection;

// ============================================================================
// Products
// ============================================================================

/// One extracted 1D spectrum, one entry per spectral row.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction1d {
    pub wave: Vec<f64>,
    pub counts: Vec<f64>,
    pub counts_ivar: Vec<f64>,
    /// `true` where the row received weight.
    pub good: Vec<bool>,
}

impl Extraction1d {
    fn with_len(len: usize) -> Self {
        Self {
            wave: vec![0.0; len],
            counts: vec![0.0; len],
            counts_ivar: vec![0.0; len],
            good: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.wave.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wave.is_empty()
    }

    /// Median per-row S/N over good rows, 0 when there are none.
    pub fn median_s2n(&self) -> f64 {
        let mut s2n: Vec<f64> = (0..self.len())
            .filter(|&i| self.good[i])
            .map(|i| self.counts[i] * self.counts_ivar[i].sqrt())
            .collect();
        median_mut(&mut s2n).unwrap_or(0.0)
    }
}

/// An object re-extracted from the combined frame.
#[derive(Debug, Clone)]
pub struct SpecObj {
    pub det: DetectorId,
    /// Trace column at the middle spectral row.
    pub spat_pixel: usize,
    /// Spatial position for every spectral row.
    pub trace: Vec<f64>,
    pub fwhm: f64,
    /// Peak significance of the detection.
    pub significance: f64,
    pub boxcar: Extraction1d,
    pub optimal: Extraction1d,
    /// Median optimal S/N.
    pub s2n: f64,
}

impl SpecObj {
    /// Table name in the spec1d output, `SPATnnnn-DETnn`.
    pub fn name(&self) -> String {
        spec1d_table_name(self.spat_pixel, self.det)
    }

    /// Scale both extraction wavelength vectors.
    pub fn apply_velocity_factor(&mut self, factor: f64) {
        for wave in self
            .boxcar
            .wave
            .iter_mut()
            .chain(self.optimal.wave.iter_mut())
        {
            *wave *= factor;
        }
    }
}

/// Models and objects of one re-extraction.
#[derive(Debug, Clone)]
pub struct ReExtractionResult {
    pub skymodel: Buffer2<f64>,
    pub objmodel: Buffer2<f64>,
    pub ivarmodel: Buffer2<f64>,
    pub outmask: BitBuffer2,
    /// Positive objects sorted by spatial position.
    pub specobjs: Vec<SpecObj>,
}

impl ReExtractionResult {
    /// Result for a frame without objects: the combined sky, ivar and mask
    /// and an empty object model.
    pub fn empty(frame: &CombinedFrame) -> Self {
        let (width, height) = frame.shape();
        Self {
            skymodel: frame.skymodel.clone(),
            objmodel: Buffer2::new_default(width, height),
            ivarmodel: frame.ivar.clone(),
            outmask: frame.mask.clone(),
            specobjs: Vec::new(),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Run-level switches of the extraction.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionFlags {
    /// Standard star: relaxed threshold and a single object.
    pub std: bool,
    /// Log a summary of the extracted objects.
    pub show: bool,
    /// Log every detected peak.
    pub show_peaks: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ReExtractor {
    config: ExtractionConfig,
    flags: ExtractionFlags,
}

impl ReExtractor {
    pub fn new(config: ExtractionConfig, flags: ExtractionFlags) -> Self {
        assert!(config.fwhm > 0.0, "fwhm must be positive");
        assert!(config.boxcar_radius > 0.0, "boxcar_radius must be positive");
        assert!(config.trace_chunk > 0, "trace_chunk must be positive");
        Self { config, flags }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Find, trace and extract the objects of `frame`.
    ///
    /// Fails with [`Error::NoObjectsFound`] when no positive object passes
    /// the detection threshold.
    pub fn extract(&self, frame: &CombinedFrame) -> Result<ReExtractionResult> {
        let det = frame.det;
        let cfg = &self.config;
        let (width, height) = frame.shape();

        let initial_sky = fit_residual_sky(frame, None, cfg.sky_order, cfg.sky_sigrej);
        let detections = self.find_objects(frame, &initial_sky);
        if !detections.iter().any(|d| d.sign > 0.0) {
            return Err(Error::NoObjectsFound { det });
        }

        let traces: Vec<Trace> = detections
            .iter()
            .map(|d| {
                trace_object(
                    frame,
                    &initial_sky,
                    d,
                    cfg.fwhm,
                    cfg.trace_order,
                    cfg.trace_chunk,
                )
            })
            .collect();

        let exclude = self.object_mask(&traces, width, height);
        let residual_sky = fit_residual_sky(frame, Some(&exclude), cfg.sky_order, cfg.sky_sigrej);
        let image = ExtractionImage {
            frame,
            residual_sky: &residual_sky,
        };

        let mut rejected = BitBuffer2::new_default(width, height);
        let mut objmodel = Buffer2::new_default(width, height);
        let mut specobjs = Vec::new();
        for (trace, detection) in traces.iter().zip(&detections) {
            let opt = optimal(&image, trace, cfg.reject_sigma, &mut rejected);
            add_object_model(&mut objmodel, trace, &opt);
            if trace.sign < 0.0 {
                continue;
            }
            let box_spec = boxcar(&image, trace, cfg.boxcar_radius);
            specobjs.push(SpecObj {
                det,
                spat_pixel: trace.spat_pixel(),
                trace: trace.spat.clone(),
                fwhm: trace.fwhm,
                significance: detection.significance,
                s2n: opt.median_s2n(),
                boxcar: box_spec,
                optimal: opt,
            });
        }
        specobjs.sort_by_key(|s| s.spat_pixel);

        let skymodel = Buffer2::new(
            width,
            height,
            frame
                .skymodel
                .pixels()
                .iter()
                .zip(residual_sky.pixels())
                .map(|(s, r)| s + r)
                .collect(),
        );
        let mut outmask = frame.mask.clone();
        outmask.union_with(&rejected);
        let ivarmodel = self.ivar_model(frame, &skymodel, &objmodel, &outmask);

        tracing::info!(
            det = %det,
            nobj = specobjs.len(),
            nneg = traces.len() - specobjs.len(),
            nrej = rejected.count_ones(),
            "Re-extraction finished"
        );
        if self.flags.show {
            for specobj in &specobjs {
                tracing::debug!(
                    name = %specobj.name(),
                    fwhm = specobj.fwhm,
                    s2n = specobj.s2n,
                    "Extracted object"
                );
            }
        }

        Ok(ReExtractionResult {
            skymodel,
            objmodel,
            ivarmodel,
            outmask,
            specobjs,
        })
    }

    fn find_objects(&self, frame: &CombinedFrame, residual_sky: &Buffer2<f64>) -> Vec<Detection> {
        let cfg = &self.config;
        let params = FindParams {
            fwhm: cfg.fwhm,
            sig_thresh: if self.flags.std {
                cfg.std_sig_thresh
            } else {
                cfg.sig_thresh
            },
            max_objects: if self.flags.std { 1 } else { cfg.max_objects },
            trim_edge: cfg.trim_edge,
        };

        let sig = significance(&snr_profile(frame, residual_sky), cfg.fwhm);
        let mut detections = find_peaks(&sig, 1.0, &params);
        if frame.mode.is_difference() {
            let negated: Vec<f64> = sig.iter().map(|v| -v).collect();
            detections.extend(find_peaks(&negated, -1.0, &params));
        }

        if self.flags.show_peaks {
            for d in &detections {
                tracing::debug!(
                    det = %frame.det,
                    spat = d.spat,
                    significance = d.significance,
                    sign = d.sign,
                    "Detected peak"
                );
            }
        }
        detections
    }

    /// Pixels within `max(boxcar_radius, 2·fwhm)` of any trace.
    fn object_mask(&self, traces: &[Trace], width: usize, height: usize) -> BitBuffer2 {
        let mut mask = BitBuffer2::new_default(width, height);
        for trace in traces {
            let radius = self.config.boxcar_radius.max(2.0 * trace.fwhm);
            for (y, &center) in trace.spat.iter().enumerate() {
                let first = (center - radius).ceil().max(0.0) as usize;
                let last = ((center + radius).floor().max(0.0) as usize).min(width.saturating_sub(1));
                for x in first..=last {
                    mask.set_xy(x, y, true);
                }
            }
        }
        mask
    }

    /// `1 / (1/ivar + (adderr·|sky + obj|)²)` on good pixels, 0 elsewhere.
    fn ivar_model(
        &self,
        frame: &CombinedFrame,
        skymodel: &Buffer2<f64>,
        objmodel: &Buffer2<f64>,
        outmask: &BitBuffer2,
    ) -> Buffer2<f64> {
        let adderr = self.config.adderr;
        let (width, height) = frame.shape();
        Buffer2::new(
            width,
            height,
            (0..width * height)
                .map(|idx| {
                    let ivar = frame.ivar[idx];
                    if outmask.get(idx) || ivar <= 0.0 {
                        return 0.0;
                    }
                    let extra = adderr * (skymodel[idx] + objmodel[idx]).abs();
                    1.0 / (1.0 / ivar + extra * extra)
                })
                .collect(),
        )
    }
}
