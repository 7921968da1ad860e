//! Detector identifiers and detector selection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One-based detector number, displayed as `DET01`, `DET02`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DetectorId(u8);

impl DetectorId {
    pub fn new(number: u8) -> Self {
        assert!(number > 0, "detector numbers start at 1");
        Self(number)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Prefix used for per-detector FITS extensions, e.g. `DET01-`.
    pub fn extension_prefix(self) -> String {
        format!("{}-", self)
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DET{:02}", self.0)
    }
}

/// Which detectors a run should process.
///
/// Configured as `detnum = all` or `detnum = 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "DetnumRepr", into = "DetnumRepr")]
pub enum DetectorSelection {
    /// Every detector the instrument has.
    #[default]
    All,
    /// A single detector by number.
    Single(u8),
}

impl DetectorSelection {
    /// Parse a `detnum` configuration value: `all`/`none` or a detector number.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") || value.eq_ignore_ascii_case("none") {
            return Some(Self::All);
        }
        value
            .parse::<u8>()
            .ok()
            .filter(|&n| n > 0)
            .map(Self::Single)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum DetnumRepr {
    Number(u8),
    Text(String),
}

impl TryFrom<DetnumRepr> for DetectorSelection {
    type Error = String;

    fn try_from(repr: DetnumRepr) -> Result<Self, Self::Error> {
        match repr {
            DetnumRepr::Number(0) => Err("detnum must be >= 1".to_string()),
            DetnumRepr::Number(n) => Ok(DetectorSelection::Single(n)),
            DetnumRepr::Text(text) => DetectorSelection::parse(&text)
                .ok_or_else(|| format!("invalid detnum '{}'", text)),
        }
    }
}

impl From<DetectorSelection> for DetnumRepr {
    fn from(selection: DetectorSelection) -> Self {
        match selection {
            DetectorSelection::All => DetnumRepr::Text("all".to_string()),
            DetectorSelection::Single(n) => DetnumRepr::Number(n),
        }
    }
}

/// Resolve a selection against an instrument with `ndet` detectors.
///
/// Returns detectors in ascending order. A single detector outside
/// `1..=ndet` resolves to an empty list.
pub fn select_detectors(selection: DetectorSelection, ndet: u8) -> Vec<DetectorId> {
    match selection {
        DetectorSelection::All => (1..=ndet).map(DetectorId::new).collect(),
        DetectorSelection::Single(n) if n >= 1 && n <= ndet => vec![DetectorId::new(n)],
        DetectorSelection::Single(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_zero_padded() {
        assert_eq!(DetectorId::new(3).to_string(), "DET03");
        assert_eq!(DetectorId::new(12).extension_prefix(), "DET12-");
    }

    #[test]
    fn test_select_all_is_ascending() {
        let dets = select_detectors(DetectorSelection::All, 4);
        let numbers: Vec<u8> = dets.iter().map(|d| d.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_select_single() {
        let dets = select_detectors(DetectorSelection::Single(2), 4);
        assert_eq!(dets, vec![DetectorId::new(2)]);
        assert!(select_detectors(DetectorSelection::Single(5), 4).is_empty());
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(DetectorSelection::parse("all"), Some(DetectorSelection::All));
        assert_eq!(DetectorSelection::parse(" 3 "), Some(DetectorSelection::Single(3)));
        assert_eq!(DetectorSelection::parse("0"), None);
        assert_eq!(DetectorSelection::parse("x"), None);
    }
}
