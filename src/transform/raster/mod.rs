//! Built-in raster engine
//!
//! decode → operations → encode on a blocking thread, backed by the
//! `image` crate, `fast_image_resize` and `webp`. The source is drained
//! into memory (bounded by `max_source_bytes`) because the decoders need
//! random access; the encoded output is streamed back in fixed chunks.

mod encode;
pub mod geometry;
mod ops;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};
use image::io::Reader as ImageReader;
use image::RgbaImage;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::engine::TransformEngine;
use super::pipeline::{Operation, OperationList};
use super::{body_error, ByteStream};
use crate::config::TransformConfig;
use crate::constants::{
    DEFAULT_MAX_OUTPUT_HEIGHT, DEFAULT_MAX_OUTPUT_WIDTH, DEFAULT_MAX_SOURCE_BYTES,
    DEFAULT_MAX_SOURCE_PIXELS, DEFAULT_OUTPUT_CHUNK_SIZE,
};
use crate::error::ImagistError;

/// Resource bounds for one render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterLimits {
    pub max_source_bytes: usize,
    pub max_source_pixels: u64,
    pub max_output_width: u32,
    pub max_output_height: u32,
    pub output_chunk_size: usize,
}

impl Default for RasterLimits {
    fn default() -> Self {
        Self {
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_source_pixels: DEFAULT_MAX_SOURCE_PIXELS,
            max_output_width: DEFAULT_MAX_OUTPUT_WIDTH,
            max_output_height: DEFAULT_MAX_OUTPUT_HEIGHT,
            output_chunk_size: DEFAULT_OUTPUT_CHUNK_SIZE,
        }
    }
}

impl From<&TransformConfig> for RasterLimits {
    fn from(config: &TransformConfig) -> Self {
        Self {
            max_source_bytes: config.max_source_bytes,
            max_source_pixels: config.max_source_pixels,
            max_output_width: config.max_output_width,
            max_output_height: config.max_output_height,
            output_chunk_size: config.output_chunk_size,
        }
    }
}

/// Sets the shared flag when dropped, which stops the blocking render
/// at its next checkpoint.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Counters for renders on the blocking pool
#[derive(Debug, Default)]
pub struct RenderStats {
    active: AtomicUsize,
    cancelled: AtomicU64,
}

impl RenderStats {
    /// Renders currently running
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Renders abandoned because their request went away
    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RasterEngine {
    limits: RasterLimits,
    stats: Arc<RenderStats>,
}

impl RasterEngine {
    pub fn new(limits: RasterLimits) -> Self {
        Self {
            limits,
            stats: Arc::default(),
        }
    }

    pub fn limits(&self) -> &RasterLimits {
        &self.limits
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }
}

#[async_trait]
impl TransformEngine for RasterEngine {
    async fn execute(
        &self,
        input: ByteStream,
        operations: OperationList,
    ) -> Result<ByteStream, ImagistError> {
        let data = drain(input, self.limits.max_source_bytes).await?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(cancelled.clone());
        let limits = self.limits.clone();
        let stats = Arc::clone(&self.stats);

        let encoded = tokio::task::spawn_blocking(move || {
            stats.active.fetch_add(1, Ordering::SeqCst);
            let result = render(&data, operations, &limits, &cancelled);
            if result.is_err() && cancelled.load(Ordering::Relaxed) {
                stats.cancelled.fetch_add(1, Ordering::SeqCst);
                debug!("Render abandoned after the request was dropped");
            }
            stats.active.fetch_sub(1, Ordering::SeqCst);
            result
        })
        .await
        .map_err(|e| ImagistError::transform_failed(format!("Render task failed: {}", e)))??;

        Ok(chunked(Bytes::from(encoded), self.limits.output_chunk_size))
    }

    fn name(&self) -> &'static str {
        "raster"
    }
}

async fn drain(mut input: ByteStream, limit: usize) -> Result<Bytes, ImagistError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = input.next().await {
        let chunk = chunk.map_err(body_error)?;
        if buf.len() + chunk.len() > limit {
            return Err(ImagistError::transform_failed(format!(
                "Source exceeds {} bytes",
                limit
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

fn chunked(data: Bytes, chunk_size: usize) -> ByteStream {
    let chunk_size = chunk_size.max(1);
    let pieces: Vec<std::io::Result<Bytes>> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
        .collect();
    stream::iter(pieces).boxed()
}

fn reader(data: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, ImagistError> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ImagistError::transform_failed(format!("Failed to read image: {}", e)))
}

fn decode(data: &[u8], max_pixels: u64) -> Result<RgbaImage, ImagistError> {
    let (width, height) = reader(data)?
        .into_dimensions()
        .map_err(|e| ImagistError::transform_failed(format!("Failed to decode image: {}", e)))?;

    if width as u64 * height as u64 > max_pixels {
        return Err(ImagistError::transform_failed(format!(
            "Image {}x{} exceeds {} pixels",
            width, height, max_pixels
        )));
    }

    let img = reader(data)?
        .decode()
        .map_err(|e| ImagistError::transform_failed(format!("Failed to decode image: {}", e)))?;
    Ok(img.to_rgba8())
}

fn apply(
    img: RgbaImage,
    operation: &Operation,
    limits: &RasterLimits,
) -> Result<RgbaImage, ImagistError> {
    Ok(match operation {
        Operation::Trim { threshold } => ops::trim(img, *threshold),
        Operation::Rotate {
            degrees,
            background,
        } => ops::rotate(img, *degrees, *background),
        Operation::Flip => ops::flip(img),
        Operation::Flop => ops::flop(img),
        Operation::Sharpen => ops::sharpen(img),
        Operation::Blur { sigma } => ops::blur(img, *sigma),
        Operation::Negate => ops::negate(img),
        Operation::Tint { color } => ops::tint(img, *color),
        Operation::Greyscale => ops::greyscale(img),
        Operation::KeepMetadata => {
            debug!("Metadata is not carried by the built-in encoders");
            img
        }
        Operation::Resize(spec) => ops::resize(
            img,
            spec,
            (limits.max_output_width, limits.max_output_height),
        )?,
    })
}

fn render(
    data: &[u8],
    operations: OperationList,
    limits: &RasterLimits,
    cancelled: &AtomicBool,
) -> Result<Vec<u8>, ImagistError> {
    let check = || {
        if cancelled.load(Ordering::Relaxed) {
            Err(ImagistError::transform_failed("Render cancelled"))
        } else {
            Ok(())
        }
    };

    let mut img = decode(data, limits.max_source_pixels)?;
    let (operations, directive) = operations.into_parts();

    for operation in &operations {
        check()?;
        img = apply(img, operation, limits)?;
    }
    check()?;

    debug!(
        width = img.width(),
        height = img.height(),
        format = directive.format.as_str(),
        quality = directive.quality,
        "Encoding output"
    );
    encode::encode(img, directive)
}
