//! Color normalization
//!
//! Accepts the two color encodings found in query strings and produces a
//! canonical [`Color`]:
//!
//! ```text
//! fff | e5e5e5            3 or 6 hex digits, no leading '#'
//! 0,0,0 | 255,255,255,0.5 3 or 4 comma separated numbers, 4th is alpha
//! ```
//!
//! A `Color` can only be obtained through [`normalize`], so every value the
//! pipeline hands to an engine has already been validated.

use std::collections::HashMap;
use std::fmt;

/// Canonical RGBA color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    r: u8,
    g: u8,
    b: u8,
    alpha: Option<f64>,
}

impl Color {
    /// Opaque black, the default background
    pub const BLACK: Color = Color {
        r: 0,
        g: 0,
        b: 0,
        alpha: None,
    };

    pub(crate) fn from_channels(r: u8, g: u8, b: u8, alpha: Option<f64>) -> Self {
        // alpha of 1 carries no information
        let alpha = alpha
            .map(|a| a.clamp(0.0, 1.0))
            .filter(|a| (*a - 1.0).abs() > f64::EPSILON);
        Self { r, g, b, alpha }
    }

    pub fn r(&self) -> u8 {
        self.r
    }

    pub fn g(&self) -> u8 {
        self.g
    }

    pub fn b(&self) -> u8 {
        self.b
    }

    /// Alpha in [0, 1]; `None` means fully opaque
    pub fn alpha(&self) -> Option<f64> {
        self.alpha
    }

    /// RGBA bytes with alpha scaled to 0-255
    pub fn to_rgba8(&self) -> [u8; 4] {
        let a = self
            .alpha
            .map(|a| (a * 255.0).round() as u8)
            .unwrap_or(255);
        [self.r, self.g, self.b, a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Canonical textual form, itself accepted by [`normalize`]
impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alpha {
            Some(a) => write!(f, "{},{},{},{}", self.r, self.g, self.b, a),
            None => write!(f, "{},{},{}", self.r, self.g, self.b),
        }
    }
}

/// Reasons a color string is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorError {
    #[error("color list must have 3 or 4 numeric components, got {0}")]
    ComponentCount(usize),

    #[error("hex color must be 3 or 6 hex digits: {0}")]
    InvalidHex(String),

    #[error("unrecognized color format: {0}")]
    Unrecognized(String),
}

/// Parse a hex or RGB(A) list string into a canonical color
pub fn normalize(raw: &str) -> Result<Color, ColorError> {
    if raw.contains(',') {
        normalize_list(raw)
    } else if raw.len() == 3 || raw.len() == 6 {
        normalize_hex(raw)
    } else {
        Err(ColorError::Unrecognized(raw.to_string()))
    }
}

fn normalize_list(raw: &str) -> Result<Color, ColorError> {
    let segments: Vec<&str> = raw.trim().split(',').filter(|s| !s.is_empty()).collect();
    if segments.len() != 3 && segments.len() != 4 {
        return Err(ColorError::ComponentCount(segments.len()));
    }

    let values: Vec<f64> = segments
        .iter()
        .filter_map(|s| leading_float(s.trim()))
        .collect();

    match values.as_slice() {
        [r, g, b] => Ok(Color::from_channels(channel(*r), channel(*g), channel(*b), None)),
        [r, g, b, a] => Ok(Color::from_channels(
            channel(*r),
            channel(*g),
            channel(*b),
            Some(*a),
        )),
        other => Err(ColorError::ComponentCount(other.len())),
    }
}

fn normalize_hex(raw: &str) -> Result<Color, ColorError> {
    if !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ColorError::InvalidHex(format!("#{}", raw)));
    }

    let digits: Vec<u8> = raw
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();

    let (r, g, b) = if digits.len() == 3 {
        (digits[0] * 17, digits[1] * 17, digits[2] * 17)
    } else {
        (
            digits[0] * 16 + digits[1],
            digits[2] * 16 + digits[3],
            digits[4] * 16 + digits[5],
        )
    };

    Ok(Color::from_channels(r, g, b, None))
}

/// Parse the longest numeric prefix of `s` as a float
///
/// `"12abc"` yields 12, `"abc"` yields `None`.
fn leading_float(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }

    if !seen_digit {
        return None;
    }
    s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
}

fn channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Per-parse memo of normalized colors keyed by the raw input string
#[derive(Debug, Default)]
pub struct ColorCache {
    entries: HashMap<String, Result<Color, ColorError>>,
}

impl ColorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `raw`, reusing an earlier result for the same input
    pub fn normalize(&mut self, raw: &str) -> Result<Color, ColorError> {
        if let Some(cached) = self.entries.get(raw) {
            return cached.clone();
        }
        let result = normalize(raw);
        self.entries.insert(raw.to_string(), result.clone());
        result
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
