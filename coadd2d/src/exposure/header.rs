//! Scalar FITS header cards.

use std::collections::BTreeMap;
use std::fmt;

/// Value of a header card.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl HeaderValue {
    /// Numeric value. Text cards are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Int(v) => Some(*v as f64),
            HeaderValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Float(v) => write!(f, "{}", v),
            HeaderValue::Int(v) => write!(f, "{}", v),
            HeaderValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Int(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::Text(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::Text(v)
    }
}

/// Ordered set of header cards keyed by upper-case keyword.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: BTreeMap<String, HeaderValue>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<HeaderValue>) {
        self.cards.insert(key.to_ascii_uppercase(), value.into());
    }

    /// Builder-style [`Header::insert`].
    pub fn with(mut self, key: &str, value: impl Into<HeaderValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards.get(&key.to_ascii_uppercase())
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(HeaderValue::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Right ascension in degrees.
    ///
    /// Numeric cards are degrees; `HH:MM:SS.s` text is sexagesimal hours.
    pub fn ra_deg(&self) -> Option<f64> {
        match self.get("RA")? {
            HeaderValue::Text(s) if s.contains(':') => parse_sexagesimal(s).map(|h| h * 15.0),
            value => value.as_f64(),
        }
    }

    /// Declination in degrees from a numeric or `±DD:MM:SS.s` card.
    pub fn dec_deg(&self) -> Option<f64> {
        match self.get("DEC")? {
            HeaderValue::Text(s) if s.contains(':') => parse_sexagesimal(s),
            value => value.as_f64(),
        }
    }
}

/// Parse `[+-]A:B:C` into `A + B/60 + C/3600` carrying the sign.
pub fn parse_sexagesimal(text: &str) -> Option<f64> {
    let text = text.trim();
    let negative = text.starts_with('-');
    let mut parts = text.trim_start_matches(['+', '-']).split(':');

    let mut value = 0.0;
    let mut scale = 1.0;
    for _ in 0..3 {
        let Some(part) = parts.next() else { break };
        let part: f64 = part.trim().parse().ok()?;
        value += part / scale;
        scale *= 60.0;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(if negative { -value } else { value })
}
