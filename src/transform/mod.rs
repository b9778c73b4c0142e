//! Request-to-pipeline translation
//!
//! Query parameters become a [`TransformSpec`], the source bytes are
//! sniffed for their real type, and the two together become an
//! [`OperationList`] that a [`TransformEngine`] executes.

pub mod coerce;
pub mod color;
pub mod engine;
pub mod format;
pub mod params;
pub mod pipeline;
pub mod raster;
pub mod sniff;

use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;

use crate::error::ImagistError;

pub use color::{normalize, Color, ColorCache, ColorError};
pub use engine::TransformEngine;
pub use format::{MimeType, OutputFormat};
pub use params::{FitMode, Interpolation, ParseOptions, Position, QueryParams, ResizeSpec, TransformSpec};
pub use pipeline::{EncodeDirective, Operation, OperationList};
pub use raster::{RasterEngine, RasterLimits, RenderStats};
pub use sniff::Sniffer;

/// Body bytes flowing between fetch, sniffer, engine and response
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Classify an I/O error raised while pulling source body bytes
pub(crate) fn body_error(err: io::Error) -> ImagistError {
    if err.kind() == io::ErrorKind::TimedOut {
        ImagistError::fetch_timed_out("source body", err.to_string())
    } else {
        ImagistError::fetch_failed("source body", err.to_string())
    }
}
