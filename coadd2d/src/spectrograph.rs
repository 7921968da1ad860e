//! Built-in instrument descriptors.

use std::fmt;
use std::str::FromStr;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::config::CoaddConfig;
use crate::detector::{select_detectors, DetectorId, DetectorSelection};
use crate::error::{Error, Result};
use crate::velocity::ObservatoryLocation;

/// Instrument metadata the coadd needs.
pub trait Spectrograph: fmt::Debug {
    fn name(&self) -> &str;

    /// Number of detectors, numbered from 1.
    fn ndet(&self) -> u8;

    /// Telescope site used for velocity corrections.
    fn location(&self) -> ObservatoryLocation;

    /// Parameters before configuration-file overrides.
    fn default_config(&self) -> CoaddConfig {
        CoaddConfig::default()
    }

    fn select_detectors(&self, selection: DetectorSelection) -> Vec<DetectorId> {
        select_detectors(selection, self.ndet())
    }
}

/// Longitudes here are east-positive, so Maunakea sits at -155.5 deg.
///
/// Keck reference values quoted with +155.47833 treat that number as west
/// longitude; read as east longitude it would place the site in the western Pacific and
/// shift the Earth rotation term of the velocity correction by ~0.2 km/s.
const MAUNAKEA_KECK: ObservatoryLocation = ObservatoryLocation::new(-155.47833, 19.82833, 4160.0);
const MAUNAKEA_GEMINI: ObservatoryLocation = ObservatoryLocation::new(-155.46905, 19.82394, 4213.0);
const CERRO_PARANAL: ObservatoryLocation = ObservatoryLocation::new(-70.404_983, -24.627_439, 2635.43);

/// Spectrographs known by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinSpectrograph {
    KeckLrisBlue,
    KeckLrisRed,
    KeckDeimos,
    KeckMosfire,
    KeckNires,
    GeminiGnirs,
    VltXshooterNir,
}

impl Spectrograph for BuiltinSpectrograph {
    fn name(&self) -> &str {
        match self {
            Self::KeckLrisBlue => "keck_lris_blue",
            Self::KeckLrisRed => "keck_lris_red",
            Self::KeckDeimos => "keck_deimos",
            Self::KeckMosfire => "keck_mosfire",
            Self::KeckNires => "keck_nires",
            Self::GeminiGnirs => "gemini_gnirs",
            Self::VltXshooterNir => "vlt_xshooter_nir",
        }
    }

    fn ndet(&self) -> u8 {
        match self {
            Self::KeckLrisBlue | Self::KeckLrisRed => 2,
            Self::KeckDeimos => 8,
            Self::KeckMosfire | Self::KeckNires | Self::GeminiGnirs | Self::VltXshooterNir => 1,
        }
    }

    fn location(&self) -> ObservatoryLocation {
        match self {
            Self::GeminiGnirs => MAUNAKEA_GEMINI,
            Self::VltXshooterNir => CERRO_PARANAL,
            _ => MAUNAKEA_KECK,
        }
    }

    fn default_config(&self) -> CoaddConfig {
        let mut config = CoaddConfig::default();
        match self {
            Self::KeckLrisBlue | Self::KeckLrisRed | Self::KeckDeimos => {}
            // Near-IR slits are short and sky lines dominate the residuals.
            Self::KeckMosfire | Self::KeckNires | Self::GeminiGnirs | Self::VltXshooterNir => {
                config.extraction.sig_thresh = 5.0;
                config.extraction.trim_edge = 5;
                config.extraction.max_objects = 3;
                config.extraction.sky_order = 0;
            }
        }
        if *self == Self::KeckNires || *self == Self::GeminiGnirs {
            config.extraction.fwhm = 4.0;
            config.extraction.boxcar_radius = 4.0;
        }
        config
    }
}

/// Descriptor of the spectrograph called `name`.
pub fn load_spectrograph(name: &str) -> Result<Box<dyn Spectrograph>> {
    BuiltinSpectrograph::from_str(name.trim())
        .map(|s| Box::new(s) as Box<dyn Spectrograph>)
        .map_err(|_| {
            let known: Vec<String> = BuiltinSpectrograph::iter().map(|s| s.to_string()).collect();
            Error::Configuration(format!(
                "unknown spectrograph '{}', expected one of: {}",
                name,
                known.join(", ")
            ))
        })
}
