//! Output encoders

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};
use std::io::Cursor;

use crate::error::ImagistError;
use crate::transform::format::OutputFormat;
use crate::transform::pipeline::EncodeDirective;

pub fn encode(img: RgbaImage, directive: EncodeDirective) -> Result<Vec<u8>, ImagistError> {
    let (width, height) = img.dimensions();
    match directive.format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgba8(img).to_rgb8();
            let mut output = Cursor::new(Vec::new());
            JpegEncoder::new_with_quality(&mut output, directive.quality)
                .write_image(rgb.as_raw(), width, height, ColorType::Rgb8)
                .map_err(|e| encode_failed("jpeg", e))?;
            Ok(output.into_inner())
        }
        OutputFormat::Png => {
            let mut output = Cursor::new(Vec::new());
            PngEncoder::new(&mut output)
                .write_image(img.as_raw(), width, height, ColorType::Rgba8)
                .map_err(|e| encode_failed("png", e))?;
            Ok(output.into_inner())
        }
        OutputFormat::Webp => {
            let encoded = webp::Encoder::from_rgba(img.as_raw(), width, height)
                .encode_simple(false, directive.quality as f32)
                .map_err(|e| encode_failed("webp", format!("{:?}", e)))?;
            Ok(encoded.to_vec())
        }
    }
}

fn encode_failed(format: &str, reason: impl std::fmt::Display) -> ImagistError {
    ImagistError::transform_failed(format!("Failed to encode {}: {}", format, reason))
}
