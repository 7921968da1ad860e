//! Coadd configuration.
//!
//! A single [`CoaddConfig`] carries everything the combiner, the re-extraction
//! engine and the orchestrator need. Instrument descriptors provide the
//! defaults; the configuration block of a coadd2d file overrides them with
//! `[section]` / `[[subsection]]` headers and `key = value` lines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use strum_macros::Display;

use crate::detector::DetectorSelection;
use crate::error::{Error, Result};

#[cfg(test)]
mod tests;

// ============================================================================
// Enums
// ============================================================================

/// Spacing of the output wavelength grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WaveGridMethod {
    /// Constant step in wavelength.
    #[default]
    Linear,
    /// Constant step in log10(wavelength).
    Log10,
}

/// Reference frame of the wavelength correction applied to extracted spectra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VelocityFrame {
    #[default]
    Heliocentric,
    Barycentric,
    /// Leave wavelengths in the observed (topocentric) frame.
    #[serde(alias = "observed")]
    None,
}

// ============================================================================
// Sections
// ============================================================================

/// Parameters of the frame combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Spectral sampling factor. Values above 1 make the wavelength grid finer.
    pub samp_fact: f64,
    /// Spatial sampling factor. Values above 1 make the spatial grid finer.
    pub spat_samp_fact: f64,
    pub wave_method: WaveGridMethod,
    /// Explicit spatial offsets in native pixels, one per exposure.
    /// `None` measures them from the spec1d traces or the spatial profiles.
    pub offsets: Option<Vec<f64>>,
    /// Largest lag searched when cross-correlating spatial profiles.
    pub max_shift: usize,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            samp_fact: 1.0,
            spat_samp_fact: 1.0,
            wave_method: WaveGridMethod::Linear,
            offsets: None,
            max_shift: 30,
        }
    }
}

/// Parameters of object finding, tracing, sky residual fitting and extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Expected object FWHM in spatial pixels.
    pub fwhm: f64,
    /// Detection threshold in units of the profile noise.
    pub sig_thresh: f64,
    /// Detection threshold used for standard stars.
    pub std_sig_thresh: f64,
    pub max_objects: usize,
    /// Spatial pixels ignored at each edge during object finding.
    pub trim_edge: usize,
    pub trace_order: usize,
    /// Spectral rows summed per centroid chunk while tracing.
    pub trace_chunk: usize,
    pub boxcar_radius: f64,
    /// Polynomial order of the per-row residual sky.
    pub sky_order: usize,
    pub sky_sigrej: f64,
    /// Rejection threshold of the optimal extraction.
    pub reject_sigma: f64,
    /// Fractional error added in quadrature to the model variance.
    pub adderr: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            fwhm: 3.0,
            sig_thresh: 10.0,
            std_sig_thresh: 5.0,
            max_objects: 10,
            trim_edge: 3,
            trace_order: 2,
            trace_chunk: 20,
            boxcar_radius: 3.0,
            sky_order: 1,
            sky_sigrej: 3.0,
            reject_sigma: 5.0,
            adderr: 0.01,
        }
    }
}

/// Complete configuration of one coadd run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoaddConfig {
    pub detnum: DetectorSelection,
    /// Root of the reduction tree; output directories are created below it.
    pub redux_path: PathBuf,
    pub velocity: VelocityFrame,
    pub combine: CombineConfig,
    pub extraction: ExtractionConfig,
}

impl Default for CoaddConfig {
    fn default() -> Self {
        Self {
            detnum: DetectorSelection::All,
            redux_path: PathBuf::from("."),
            velocity: VelocityFrame::Heliocentric,
            combine: CombineConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl CoaddConfig {
    /// Check value ranges. Called after every merge.
    pub fn validate(&self) -> Result<()> {
        let c = &self.combine;
        let e = &self.extraction;
        check(c.samp_fact > 0.0, "samp_fact must be positive")?;
        check(c.spat_samp_fact > 0.0, "spat_samp_fact must be positive")?;
        if let Some(offsets) = &c.offsets {
            check(
                offsets.iter().all(|o| o.is_finite()),
                "offsets must be finite",
            )?;
        }
        check(e.fwhm > 0.0, "fwhm must be positive")?;
        check(e.sig_thresh > 0.0, "sig_thresh must be positive")?;
        check(e.std_sig_thresh > 0.0, "std_sig_thresh must be positive")?;
        check(e.max_objects >= 1, "max_objects must be at least 1")?;
        check(e.trace_chunk >= 1, "trace_chunk must be at least 1")?;
        check(e.boxcar_radius > 0.0, "boxcar_radius must be positive")?;
        check(e.sky_sigrej > 0.0, "sky_sigrej must be positive")?;
        check(e.reject_sigma > 0.0, "reject_sigma must be positive")?;
        check(e.adderr >= 0.0, "adderr must not be negative")?;
        Ok(())
    }

    /// Merge configuration lines over `self` and validate the result.
    ///
    /// Keys that this crate does not know are logged and ignored. Values are
    /// coerced using the type of the value they replace.
    pub fn merged_with(&self, lines: &[String]) -> Result<CoaddConfig> {
        let mut root = serde_json::to_value(self)
            .map_err(|e| Error::Configuration(format!("cannot serialize defaults: {}", e)))?;

        let mut sections: Vec<String> = Vec::new();
        for (lineno, raw) in lines.iter().enumerate() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') {
                let depth = line.chars().take_while(|&c| c == '[').count();
                let name = line.trim_matches(|c| c == '[' || c == ']').trim();
                sections.truncate(depth.saturating_sub(1));
                sections.push(name.to_ascii_lowercase());
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::Configuration(format!(
                    "line {}: expected 'key = value', got '{}'",
                    lineno + 1,
                    line
                )));
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            let section = sections.last().map(String::as_str).unwrap_or("");

            apply_override(&mut root, section, &key, value)?;
        }

        let config: CoaddConfig = serde_json::from_value(root)
            .map_err(|e| Error::Configuration(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

fn check(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Configuration(message.to_string()))
    }
}

// ============================================================================
// Override parsing
// ============================================================================

/// Keys that belong to the run description rather than to [`CoaddConfig`].
const PASSTHROUGH_KEYS: &[(&str, &str)] = &[("rdx", "spectrograph")];

/// Map a configuration section and key to the field they set.
///
/// Returns the target object (`None` = top level) and the field name.
fn resolve_key<'a>(section: &str, key: &'a str) -> Option<(Option<&'static str>, &'a str)> {
    match section {
        "rdx" | "" => Some((None, key)),
        "coadd2d" | "combine" => Some((Some("combine"), key)),
        "findobj" | "skysub" | "extraction" | "extract" => Some((Some("extraction"), key)),
        "wavelengths" if key == "refframe" => Some((None, "velocity")),
        _ => None,
    }
}

fn apply_override(root: &mut Value, section: &str, key: &str, raw: &str) -> Result<()> {
    if PASSTHROUGH_KEYS.contains(&(section, key)) {
        return Ok(());
    }

    let Some((object, field)) = resolve_key(section, key) else {
        tracing::warn!(section, key, "Ignoring configuration key in unknown section");
        return Ok(());
    };
    let map = match object {
        Some(name) => root.get_mut(name).and_then(Value::as_object_mut),
        None => root.as_object_mut(),
    };
    let Some(map) = map.filter(|map| map.contains_key(field)) else {
        tracing::warn!(section, key, "Ignoring unknown configuration key");
        return Ok(());
    };

    let coerced = coerce(raw, &map[field]).map_err(|reason| {
        Error::Configuration(format!("[{}] {} = {}: {}", section, key, raw, reason))
    })?;
    map.insert(field.to_string(), coerced);
    Ok(())
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn unquote(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '\'' || c == '"')
}

fn is_none_literal(raw: &str) -> bool {
    matches!(raw, "None" | "none" | "null" | "")
}

/// Convert a raw string into a JSON value shaped like `template`.
fn coerce(raw: &str, template: &Value) -> std::result::Result<Value, String> {
    let raw = unquote(raw);
    match template {
        Value::Bool(_) => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err("expected a boolean".to_string()),
        },
        // Integers fall back to text so mixed fields like `detnum` accept `all`.
        Value::Number(n) if n.is_u64() => Ok(raw
            .parse::<u64>()
            .map(|v| Value::Number(v.into()))
            .unwrap_or_else(|_| Value::String(raw.to_string()))),
        Value::Number(_) => parse_float(raw),
        // Untyped defaults are optional float lists (`offsets`).
        Value::Array(_) | Value::Null => {
            if is_none_literal(raw) {
                return Ok(Value::Null);
            }
            raw.trim_matches(|c| c == '[' || c == ']')
                .split(',')
                .map(|item| parse_float(item.trim()))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        Value::String(_) => Ok(Value::String(raw.to_string())),
        Value::Object(_) => Err("cannot assign a value to a section".to_string()),
    }
}

fn parse_float(raw: &str) -> std::result::Result<Value, String> {
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| format!("expected a number, got '{}'", raw))
}
