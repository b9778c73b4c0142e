//! Operation list construction
//!
//! Turns a [`TransformSpec`] plus the sniffed input type into the ordered
//! list of operations an engine runs. The order is fixed regardless of the
//! order parameters appeared in the query:
//!
//! ```text
//! trim → rotate → flip → flop → sharpen → blur → negate → tint
//!      → greyscale → keep-metadata → resize → encode
//! ```

use super::color::Color;
use super::format::{MimeType, OutputFormat};
use super::params::{ResizeSpec, TransformSpec};

/// A single engine operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Trim { threshold: u32 },
    Rotate { degrees: f64, background: Color },
    /// Mirror top to bottom
    Flip,
    /// Mirror left to right
    Flop,
    Sharpen,
    Blur { sigma: f64 },
    Negate,
    Tint { color: Color },
    Greyscale,
    KeepMetadata,
    Resize(ResizeSpec),
}

impl Operation {
    /// Short name used in logs and assertions
    pub fn opcode(&self) -> &'static str {
        match self {
            Operation::Trim { .. } => "trim",
            Operation::Rotate { .. } => "rotate",
            Operation::Flip => "flip",
            Operation::Flop => "flop",
            Operation::Sharpen => "sharpen",
            Operation::Blur { .. } => "blur",
            Operation::Negate => "negate",
            Operation::Tint { .. } => "tint",
            Operation::Greyscale => "greyscale",
            Operation::KeepMetadata => "keep_metadata",
            Operation::Resize(_) => "resize",
        }
    }
}

/// Terminal encode step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeDirective {
    pub format: OutputFormat,
    pub quality: u8,
}

/// Ordered operations plus the encode directive
///
/// Moved into the engine exactly once; there are no mutating accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationList {
    operations: Vec<Operation>,
    encode: EncodeDirective,
}

impl OperationList {
    pub fn build(spec: &TransformSpec, input: MimeType) -> Self {
        let mut operations = Vec::new();

        if let Some(threshold) = spec.trim_threshold {
            operations.push(Operation::Trim { threshold });
        }
        if spec.rotate_degrees != 0.0 {
            let background = spec
                .resize
                .as_ref()
                .map(|r| r.background)
                .unwrap_or_default();
            operations.push(Operation::Rotate {
                degrees: spec.rotate_degrees,
                background,
            });
        }
        if spec.flip_vertical {
            operations.push(Operation::Flip);
        }
        if spec.flip_horizontal {
            operations.push(Operation::Flop);
        }
        if spec.sharpen {
            operations.push(Operation::Sharpen);
        }
        if let Some(sigma) = spec.blur_sigma {
            operations.push(Operation::Blur { sigma });
        }
        if spec.negate {
            operations.push(Operation::Negate);
        }
        if let Some(color) = spec.tint {
            operations.push(Operation::Tint { color });
        }
        if spec.greyscale {
            operations.push(Operation::Greyscale);
        }
        if spec.preserve_metadata {
            operations.push(Operation::KeepMetadata);
        }
        if let Some(resize) = &spec.resize {
            operations.push(Operation::Resize(resize.clone()));
        }

        let format = spec
            .output_format
            .or_else(|| input.reencodable())
            .unwrap_or(OutputFormat::Jpeg);

        Self {
            operations,
            encode: EncodeDirective {
                format,
                quality: spec.quality,
            },
        }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn encode(&self) -> EncodeDirective {
        self.encode
    }

    /// MIME type of the encoded output
    pub fn content_type(&self) -> &'static str {
        self.encode.format.content_type()
    }

    /// Opcodes in execution order, ending with `encode`
    pub fn opcodes(&self) -> Vec<&'static str> {
        self.operations
            .iter()
            .map(Operation::opcode)
            .chain(std::iter::once("encode"))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Operation>, EncodeDirective) {
        (self.operations, self.encode)
    }
}
