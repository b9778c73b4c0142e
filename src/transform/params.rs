//! Transform option parsing
//!
//! Query parameters are loosely typed and frequently wrong. Parsing is
//! permissive: an unknown or malformed value is ignored and its field keeps
//! the default, so one bad flag never blocks a request.
//!
//! Both spellings of every parameter are accepted; the terse name wins when
//! both are present:
//!
//! ```text
//! ?w=800&h=600&fit=contain&bg=fff&fmt=webp&q=70
//! ?width=800&height=600&fit=contain&background=fff&format=webp&quality=70
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use super::coerce::{to_bool, to_float, to_unsigned_int};
use super::color::{Color, ColorCache};
use super::format::OutputFormat;
use crate::constants::{
    DEFAULT_QUALITY, DEFAULT_TRIM_THRESHOLD, MAX_BLUR_SIGMA, MAX_ROTATE_DEGREES, MIN_BLUR_SIGMA,
};

/// Raw query parameters, first occurrence of each key
pub type QueryParams = HashMap<String, String>;

/// How to fit the image within target dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Scale to cover both dimensions, crop the overflow (default)
    #[default]
    Cover,
    /// Scale to fit within both dimensions, pad with background
    Contain,
    /// Stretch to exactly the target dimensions
    Fill,
    /// Scale to fit within both dimensions, no padding
    Inside,
    /// Scale to cover both dimensions, no cropping
    Outside,
}

impl FitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::Contain => "contain",
            Self::Fill => "fill",
            Self::Inside => "inside",
            Self::Outside => "outside",
        }
    }
}

impl FromStr for FitMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cover" => Ok(FitMode::Cover),
            "contain" => Ok(FitMode::Contain),
            "fill" => Ok(FitMode::Fill),
            "inside" => Ok(FitMode::Inside),
            "outside" => Ok(FitMode::Outside),
            _ => Err(()),
        }
    }
}

/// Anchor for cropping and embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Top,
    RightTop,
    Right,
    RightBottom,
    Bottom,
    LeftBottom,
    Left,
    LeftTop,
    Center,
    /// Content-aware crop keeping the region with the highest entropy
    Entropy,
    /// Content-aware crop keeping the most salient region
    Attention,
}

impl Position {
    /// Content-aware positions only apply to `fit=cover` crops
    pub fn is_content_aware(&self) -> bool {
        matches!(self, Position::Entropy | Position::Attention)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::RightTop => "right top",
            Self::Right => "right",
            Self::RightBottom => "right bottom",
            Self::Bottom => "bottom",
            Self::LeftBottom => "left bottom",
            Self::Left => "left",
            Self::LeftTop => "left top",
            Self::Center => "center",
            Self::Entropy => "entropy",
            Self::Attention => "attention",
        }
    }
}

impl FromStr for Position {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "top" | "north" => Ok(Position::Top),
            "right top" | "northeast" => Ok(Position::RightTop),
            "right" | "east" => Ok(Position::Right),
            "right bottom" | "southeast" => Ok(Position::RightBottom),
            "bottom" | "south" => Ok(Position::Bottom),
            "left bottom" | "southwest" => Ok(Position::LeftBottom),
            "left" | "west" => Ok(Position::Left),
            "left top" | "northwest" => Ok(Position::LeftTop),
            "center" | "centre" => Ok(Position::Center),
            "entropy" | "detail" => Ok(Position::Entropy),
            "attention" | "luminance" => Ok(Position::Attention),
            _ => Err(()),
        }
    }
}

/// Resampling kernel used when resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    Nearest,
    Cubic,
    Mitchell,
    Lanczos2,
    #[default]
    Lanczos3,
}

impl Interpolation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Cubic => "cubic",
            Self::Mitchell => "mitchell",
            Self::Lanczos2 => "lanczos2",
            Self::Lanczos3 => "lanczos3",
        }
    }
}

impl FromStr for Interpolation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" => Ok(Interpolation::Nearest),
            "cubic" => Ok(Interpolation::Cubic),
            "mitchell" => Ok(Interpolation::Mitchell),
            "lanczos2" => Ok(Interpolation::Lanczos2),
            "lanczos3" => Ok(Interpolation::Lanczos3),
            _ => Err(()),
        }
    }
}

/// Resize request; present only when a width or height was given
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fit: FitMode,
    pub position: Option<Position>,
    pub interpolation: Interpolation,
    pub allow_upscale: bool,
    pub background: Color,
}

/// Which axes to mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flip {
    Horizontal,
    Vertical,
    Both,
}

impl FromStr for Flip {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "h" => Ok(Flip::Horizontal),
            "v" => Ok(Flip::Vertical),
            "both" | "hv" | "vh" => Ok(Flip::Both),
            _ => Err(()),
        }
    }
}

/// Parser policy knobs taken from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    /// Quality used when `q` is absent or invalid
    pub default_quality: u8,
    /// Threshold used when `trim` is given without a number
    pub trim_threshold: u32,
    /// Drop entropy/attention positions unless `fit=cover`
    pub content_aware_requires_cover: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            default_quality: DEFAULT_QUALITY,
            trim_threshold: DEFAULT_TRIM_THRESHOLD,
            content_aware_requires_cover: true,
        }
    }
}

/// Canonical, order-independent transform specification
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSpec {
    pub resize: Option<ResizeSpec>,
    pub rotate_degrees: f64,
    pub flip_vertical: bool,
    pub flip_horizontal: bool,
    pub trim_threshold: Option<u32>,
    pub sharpen: bool,
    pub greyscale: bool,
    pub negate: bool,
    pub preserve_metadata: bool,
    pub blur_sigma: Option<f64>,
    pub tint: Option<Color>,
    pub quality: u8,
    pub output_format: Option<OutputFormat>,
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            resize: None,
            rotate_degrees: 0.0,
            flip_vertical: false,
            flip_horizontal: false,
            trim_threshold: None,
            sharpen: false,
            greyscale: false,
            negate: false,
            preserve_metadata: false,
            blur_sigma: None,
            tint: None,
            quality: DEFAULT_QUALITY,
            output_format: None,
        }
    }
}

/// First present value among a parameter's spellings
fn lookup<'a>(query: &'a QueryParams, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| query.get(*name))
        .map(String::as_str)
}

fn lookup_parsed<T: FromStr>(query: &QueryParams, names: &[&str]) -> Option<T> {
    lookup(query, names).and_then(|v| v.trim().parse().ok())
}

impl TransformSpec {
    /// Build a spec from raw query parameters; never fails
    pub fn parse(query: &QueryParams, options: &ParseOptions) -> Self {
        let mut colors = ColorCache::new();

        TransformSpec {
            quality: options.default_quality,
            ..Default::default()
        }
        .with_resize(parse_resize(query, options, &mut colors))
        .with_quality(parse_quality(query))
        .with_output_format(lookup_parsed(query, &["fmt", "format"]))
        .with_rotation(parse_rotation(query))
        .with_flip(lookup_parsed(query, &["flip"]))
        .with_blur(parse_blur(query))
        .with_trim(parse_trim(query, options))
        .with_sharpen(to_bool(lookup(query, &["sharp", "sharpen"])))
        .with_negate(to_bool(lookup(query, &["neg", "negative"])))
        .with_greyscale(to_bool(lookup(query, &["gs", "greyscale", "grayscale"])))
        .with_preserve_metadata(to_bool(lookup(query, &["meta"])))
        .with_tint(lookup(query, &["tint"]).and_then(|raw| colors.normalize(raw).ok()))
    }

    pub fn with_resize(self, resize: Option<ResizeSpec>) -> Self {
        Self { resize, ..self }
    }

    /// Replace the quality when a valid one is given
    pub fn with_quality(self, quality: Option<u8>) -> Self {
        match quality {
            Some(quality) => Self { quality, ..self },
            None => self,
        }
    }

    pub fn with_output_format(self, output_format: Option<OutputFormat>) -> Self {
        Self {
            output_format,
            ..self
        }
    }

    pub fn with_rotation(self, rotate_degrees: f64) -> Self {
        Self {
            rotate_degrees,
            ..self
        }
    }

    fn with_flip(self, flip: Option<Flip>) -> Self {
        let (flip_horizontal, flip_vertical) = match flip {
            Some(Flip::Horizontal) => (true, false),
            Some(Flip::Vertical) => (false, true),
            Some(Flip::Both) => (true, true),
            None => (false, false),
        };
        Self {
            flip_horizontal,
            flip_vertical,
            ..self
        }
    }

    pub fn with_blur(self, blur_sigma: Option<f64>) -> Self {
        Self { blur_sigma, ..self }
    }

    pub fn with_trim(self, trim_threshold: Option<u32>) -> Self {
        Self {
            trim_threshold,
            ..self
        }
    }

    pub fn with_sharpen(self, sharpen: bool) -> Self {
        Self { sharpen, ..self }
    }

    pub fn with_negate(self, negate: bool) -> Self {
        Self { negate, ..self }
    }

    pub fn with_greyscale(self, greyscale: bool) -> Self {
        Self { greyscale, ..self }
    }

    pub fn with_preserve_metadata(self, preserve_metadata: bool) -> Self {
        Self {
            preserve_metadata,
            ..self
        }
    }

    pub fn with_tint(self, tint: Option<Color>) -> Self {
        Self { tint, ..self }
    }
}

fn parse_resize(
    query: &QueryParams,
    options: &ParseOptions,
    colors: &mut ColorCache,
) -> Option<ResizeSpec> {
    let width = lookup(query, &["w", "width"])
        .map(|v| to_unsigned_int(Some(v)))
        .filter(|w| *w > 0);
    let height = lookup(query, &["h", "height"])
        .map(|v| to_unsigned_int(Some(v)))
        .filter(|h| *h > 0);

    if width.is_none() && height.is_none() {
        return None;
    }

    let fit: FitMode = lookup_parsed(query, &["fit"]).unwrap_or_default();
    let position = lookup_parsed::<Position>(query, &["pos", "position"]).filter(|p| {
        !(options.content_aware_requires_cover && p.is_content_aware() && fit != FitMode::Cover)
    });

    Some(ResizeSpec {
        width,
        height,
        fit,
        position,
        interpolation: lookup_parsed(query, &["i", "interpolation"]).unwrap_or_default(),
        allow_upscale: to_bool(lookup(query, &["max", "enlarge"])),
        background: lookup(query, &["bg", "background"])
            .and_then(|raw| colors.normalize(raw).ok())
            .unwrap_or_default(),
    })
}

fn parse_quality(query: &QueryParams) -> Option<u8> {
    lookup(query, &["q", "quality"])
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|q| (1..=100).contains(q))
        .map(|q| q as u8)
}

fn parse_rotation(query: &QueryParams) -> f64 {
    to_float(lookup(query, &["r", "rotate"]))
        .filter(|deg| deg.abs() <= MAX_ROTATE_DEGREES)
        .unwrap_or(0.0)
}

fn parse_blur(query: &QueryParams) -> Option<f64> {
    to_float(lookup(query, &["blur"])).filter(|s| (MIN_BLUR_SIGMA..=MAX_BLUR_SIGMA).contains(s))
}

fn parse_trim(query: &QueryParams, options: &ParseOptions) -> Option<u32> {
    let raw = lookup(query, &["trim"])?;
    if !to_bool(Some(raw)) {
        return None;
    }
    match raw.trim().parse::<u32>() {
        Ok(threshold) if threshold > 0 => Some(threshold),
        _ => Some(options.trim_threshold),
    }
}
