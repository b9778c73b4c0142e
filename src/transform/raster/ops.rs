//! Pixel operations over RGBA buffers

use fast_image_resize::{FilterType, Image, MulDiv, PixelType, ResizeAlg, Resizer};
use image::{imageops, Rgba, RgbaImage};
use std::num::NonZeroU32;

use super::geometry::{gravity_offset, plan_resize, rotated_bounds, Frame};
use crate::error::ImagistError;
use crate::transform::color::Color;
use crate::transform::params::{Interpolation, Position, ResizeSpec};

const SHARPEN_SIGMA: f32 = 1.0;
const SHARPEN_THRESHOLD: i32 = 1;

/// Candidate offsets per axis when searching for a content-aware crop
const CROP_SEARCH_STEPS: u32 = 8;

fn luma(p: &Rgba<u8>) -> f64 {
    0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64
}

fn clamp_channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Crop to the bounding box of pixels that differ from the top-left pixel
pub fn trim(img: RgbaImage, threshold: u32) -> RgbaImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img;
    }
    let reference = *img.get_pixel(0, 0);
    let differs = |p: &Rgba<u8>| {
        p.0.iter()
            .zip(reference.0.iter())
            .any(|(a, b)| (*a as i32 - *b as i32).unsigned_abs() > threshold)
    };

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in img.enumerate_pixels() {
        if differs(p) {
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }

    match bounds {
        Some((x0, y0, x1, y1)) if (x1 - x0 + 1, y1 - y0 + 1) != (width, height) => {
            imageops::crop_imm(&img, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
        }
        _ => img,
    }
}

/// Clockwise rotation; arbitrary angles grow the canvas and fill with `background`
pub fn rotate(img: RgbaImage, degrees: f64, background: Color) -> RgbaImage {
    let normalized = degrees.rem_euclid(360.0);
    let is = |target: f64| (normalized - target).abs() < 1e-9;

    if is(0.0) || is(360.0) {
        return img;
    }
    if is(90.0) {
        return imageops::rotate90(&img);
    }
    if is(180.0) {
        return imageops::rotate180(&img);
    }
    if is(270.0) {
        return imageops::rotate270(&img);
    }

    let (width, height) = img.dimensions();
    let (out_w, out_h) = rotated_bounds(width, height, normalized);
    let fill = Rgba(background.to_rgba8());
    let rad = normalized.to_radians();
    let (sin, cos) = rad.sin_cos();
    let (src_cx, src_cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let (dst_cx, dst_cy) = (out_w as f64 / 2.0, out_h as f64 / 2.0);

    RgbaImage::from_fn(out_w, out_h, |x, y| {
        let dx = x as f64 + 0.5 - dst_cx;
        let dy = y as f64 + 0.5 - dst_cy;
        let sx = dx * cos + dy * sin + src_cx;
        let sy = -dx * sin + dy * cos + src_cy;
        if sx >= 0.0 && sy >= 0.0 && (sx as u32) < width && (sy as u32) < height {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            fill
        }
    })
}

pub fn flip(img: RgbaImage) -> RgbaImage {
    imageops::flip_vertical(&img)
}

pub fn flop(img: RgbaImage) -> RgbaImage {
    imageops::flip_horizontal(&img)
}

pub fn sharpen(img: RgbaImage) -> RgbaImage {
    imageops::unsharpen(&img, SHARPEN_SIGMA, SHARPEN_THRESHOLD)
}

pub fn blur(img: RgbaImage, sigma: f64) -> RgbaImage {
    imageops::blur(&img, sigma as f32)
}

/// Invert color channels, alpha is kept
pub fn negate(mut img: RgbaImage) -> RgbaImage {
    for p in img.pixels_mut() {
        p[0] = 255 - p[0];
        p[1] = 255 - p[1];
        p[2] = 255 - p[2];
    }
    img
}

/// Keep each pixel's luminance, take chroma from `color`
pub fn tint(mut img: RgbaImage, color: Color) -> RgbaImage {
    let [r, g, b, _] = color.to_rgba8();
    let (r, g, b) = (r as f64, g as f64, b as f64);
    let cb = -0.168736 * r - 0.331264 * g + 0.5 * b;
    let cr = 0.5 * r - 0.418688 * g - 0.081312 * b;

    for p in img.pixels_mut() {
        let y = luma(p);
        p[0] = clamp_channel(y + 1.402 * cr);
        p[1] = clamp_channel(y - 0.344136 * cb - 0.714136 * cr);
        p[2] = clamp_channel(y + 1.772 * cb);
    }
    img
}

pub fn greyscale(mut img: RgbaImage) -> RgbaImage {
    for p in img.pixels_mut() {
        let y = clamp_channel(luma(p));
        p[0] = y;
        p[1] = y;
        p[2] = y;
    }
    img
}

fn resize_alg(interpolation: Interpolation) -> ResizeAlg {
    match interpolation {
        Interpolation::Nearest => ResizeAlg::Nearest,
        Interpolation::Cubic => ResizeAlg::Convolution(FilterType::CatmullRom),
        Interpolation::Mitchell => ResizeAlg::Convolution(FilterType::Mitchell),
        Interpolation::Lanczos2 | Interpolation::Lanczos3 => {
            ResizeAlg::Convolution(FilterType::Lanczos3)
        }
    }
}

/// Resample to exactly `width` x `height`
fn resample(
    img: RgbaImage,
    width: u32,
    height: u32,
    interpolation: Interpolation,
) -> Result<RgbaImage, ImagistError> {
    if img.dimensions() == (width, height) {
        return Ok(img);
    }

    let non_zero = |v: u32, what: &str| {
        NonZeroU32::new(v).ok_or_else(|| ImagistError::transform_failed(format!("{} is 0", what)))
    };
    let src_width = non_zero(img.width(), "Source width")?;
    let src_height = non_zero(img.height(), "Source height")?;
    let dst_width = non_zero(width, "Target width")?;
    let dst_height = non_zero(height, "Target height")?;

    let mut src_image =
        Image::from_vec_u8(src_width, src_height, img.into_raw(), PixelType::U8x4).map_err(
            |e| ImagistError::transform_failed(format!("Failed to create source image: {:?}", e)),
        )?;

    let alpha_mul_div = MulDiv::default();
    alpha_mul_div
        .multiply_alpha_inplace(&mut src_image.view_mut())
        .map_err(|e| ImagistError::transform_failed(format!("Alpha premultiply failed: {:?}", e)))?;

    let mut dst_image = Image::new(dst_width, dst_height, PixelType::U8x4);
    let mut resizer = Resizer::new(resize_alg(interpolation));
    resizer
        .resize(&src_image.view(), &mut dst_image.view_mut())
        .map_err(|e| ImagistError::transform_failed(format!("Resize operation failed: {:?}", e)))?;

    alpha_mul_div
        .divide_alpha_inplace(&mut dst_image.view_mut())
        .map_err(|e| ImagistError::transform_failed(format!("Alpha unpremultiply failed: {:?}", e)))?;

    RgbaImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| ImagistError::transform_failed("Failed to create output image buffer"))
}

/// Resize according to fit, then crop or embed
///
/// `max_size` bounds every buffer the resize allocates. A source already
/// larger than the bound may keep its own size but never grow past it.
pub fn resize(
    img: RgbaImage,
    spec: &ResizeSpec,
    max_size: (u32, u32),
) -> Result<RgbaImage, ImagistError> {
    let plan = plan_resize(img.width(), img.height(), spec);
    let (width, height) = plan.extent();
    if width > max_size.0.max(img.width()) || height > max_size.1.max(img.height()) {
        return Err(ImagistError::transform_failed(format!(
            "Output {}x{} exceeds the {}x{} limit",
            width, height, max_size.0, max_size.1
        )));
    }
    let scaled = resample(img, plan.width, plan.height, spec.interpolation)?;

    match plan.frame {
        Frame::Full => Ok(scaled),
        Frame::Crop { width, height } => {
            let (x, y) = match spec.position {
                Some(p) if p.is_content_aware() => content_aware_offset(&scaled, width, height, p),
                other => gravity_offset(scaled.width() - width, scaled.height() - height, other),
            };
            Ok(imageops::crop_imm(&scaled, x, y, width, height).to_image())
        }
        Frame::Embed { width, height } => {
            let mut canvas = RgbaImage::from_pixel(width, height, Rgba(spec.background.to_rgba8()));
            let (x, y) = gravity_offset(
                width.saturating_sub(scaled.width()),
                height.saturating_sub(scaled.height()),
                spec.position,
            );
            imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
            Ok(canvas)
        }
    }
}

fn search_offsets(free: u32) -> Vec<u32> {
    let mut offsets: Vec<u32> = (0..=CROP_SEARCH_STEPS)
        .map(|i| free * i / CROP_SEARCH_STEPS)
        .collect();
    offsets.dedup();
    offsets
}

/// Shannon entropy of the luma histogram
fn entropy_score(img: &RgbaImage, x: u32, y: u32, width: u32, height: u32, stride: u32) -> f64 {
    let mut histogram = [0u32; 256];
    let mut total = 0u32;
    for py in (y..y + height).step_by(stride as usize) {
        for px in (x..x + width).step_by(stride as usize) {
            histogram[clamp_channel(luma(img.get_pixel(px, py))) as usize] += 1;
            total += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }
    histogram
        .iter()
        .filter(|count| **count > 0)
        .map(|count| {
            let p = *count as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

/// Mean brightness weighted by saturation
fn attention_score(img: &RgbaImage, x: u32, y: u32, width: u32, height: u32, stride: u32) -> f64 {
    let mut sum = 0.0;
    let mut total = 0u32;
    for py in (y..y + height).step_by(stride as usize) {
        for px in (x..x + width).step_by(stride as usize) {
            let p = img.get_pixel(px, py);
            let max = p[0].max(p[1]).max(p[2]) as f64;
            let min = p[0].min(p[1]).min(p[2]) as f64;
            let saturation = if max > 0.0 { (max - min) / max } else { 0.0 };
            sum += luma(p) * (1.0 + saturation);
            total += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        sum / total as f64
    }
}

/// Crop window offset with the highest entropy or attention score
pub fn content_aware_offset(
    img: &RgbaImage,
    width: u32,
    height: u32,
    strategy: Position,
) -> (u32, u32) {
    let free_x = img.width().saturating_sub(width);
    let free_y = img.height().saturating_sub(height);
    let stride = (width.max(height) / 128).max(1);

    let score = |x: u32, y: u32| match strategy {
        Position::Attention => attention_score(img, x, y, width, height, stride),
        _ => entropy_score(img, x, y, width, height, stride),
    };

    let mut best = gravity_offset(free_x, free_y, None);
    let mut best_score = f64::NEG_INFINITY;
    for y in search_offsets(free_y) {
        for x in search_offsets(free_x) {
            let s = score(x, y);
            if s > best_score {
                best_score = s;
                best = (x, y);
            }
        }
    }
    best
}
