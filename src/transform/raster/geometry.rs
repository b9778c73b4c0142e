//! Fit and placement math
//!
//! Pure functions, no pixels involved.

use crate::transform::params::{FitMode, Position, ResizeSpec};

/// What happens after scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// The scaled image is the output
    Full,
    /// Cut a window of this size out of the scaled image
    Crop { width: u32, height: u32 },
    /// Place the scaled image on a background canvas of this size
    Embed { width: u32, height: u32 },
}

/// Scaled size plus the framing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub width: u32,
    pub height: u32,
    pub frame: Frame,
}

impl ResizePlan {
    /// Largest buffer the plan allocates: the scaled image, or the
    /// embedding canvas when that is bigger
    pub fn extent(&self) -> (u32, u32) {
        match self.frame {
            Frame::Embed { width, height } => (width.max(self.width), height.max(self.height)),
            _ => (self.width, self.height),
        }
    }
}

pub fn plan_resize(src_width: u32, src_height: u32, spec: &ResizeSpec) -> ResizePlan {
    let sw = src_width.max(1) as f64;
    let sh = src_height.max(1) as f64;

    let (scale_x, scale_y, frame) = match (spec.width, spec.height) {
        (Some(w), Some(h)) => {
            let rx = w as f64 / sw;
            let ry = h as f64 / sh;
            match spec.fit {
                FitMode::Fill => (rx, ry, Frame::Full),
                FitMode::Cover => {
                    let s = rx.max(ry);
                    (s, s, Frame::Crop { width: w, height: h })
                }
                FitMode::Contain => {
                    let s = rx.min(ry);
                    (s, s, Frame::Embed { width: w, height: h })
                }
                FitMode::Inside => {
                    let s = rx.min(ry);
                    (s, s, Frame::Full)
                }
                FitMode::Outside => {
                    let s = rx.max(ry);
                    (s, s, Frame::Full)
                }
            }
        }
        (Some(w), None) => {
            let s = w as f64 / sw;
            (s, s, Frame::Full)
        }
        (None, Some(h)) => {
            let s = h as f64 / sh;
            (s, s, Frame::Full)
        }
        (None, None) => (1.0, 1.0, Frame::Full),
    };

    let (scale_x, scale_y) = if spec.allow_upscale {
        (scale_x, scale_y)
    } else {
        (scale_x.min(1.0), scale_y.min(1.0))
    };

    let width = ((sw * scale_x).round() as u32).max(1);
    let height = ((sh * scale_y).round() as u32).max(1);

    let frame = match frame {
        Frame::Crop {
            width: cw,
            height: ch,
        } if width > cw || height > ch => Frame::Crop {
            width: cw.min(width),
            height: ch.min(height),
        },
        Frame::Embed {
            width: ew,
            height: eh,
        } if width < ew || height < eh => Frame::Embed {
            width: ew,
            height: eh,
        },
        _ => Frame::Full,
    };

    ResizePlan {
        width,
        height,
        frame,
    }
}

#[derive(Clone, Copy)]
enum Anchor {
    Start,
    Middle,
    End,
}

impl Anchor {
    fn offset(self, free: u32) -> u32 {
        match self {
            Anchor::Start => 0,
            Anchor::Middle => free / 2,
            Anchor::End => free,
        }
    }
}

/// Offset of a window within `free_x` by `free_y` slack for a gravity
///
/// Content-aware positions have no fixed anchor and resolve to center here.
pub fn gravity_offset(free_x: u32, free_y: u32, position: Option<Position>) -> (u32, u32) {
    let (h, v) = match position.unwrap_or(Position::Center) {
        Position::Top => (Anchor::Middle, Anchor::Start),
        Position::RightTop => (Anchor::End, Anchor::Start),
        Position::Right => (Anchor::End, Anchor::Middle),
        Position::RightBottom => (Anchor::End, Anchor::End),
        Position::Bottom => (Anchor::Middle, Anchor::End),
        Position::LeftBottom => (Anchor::Start, Anchor::End),
        Position::Left => (Anchor::Start, Anchor::Middle),
        Position::LeftTop => (Anchor::Start, Anchor::Start),
        Position::Center | Position::Entropy | Position::Attention => {
            (Anchor::Middle, Anchor::Middle)
        }
    };
    (h.offset(free_x), v.offset(free_y))
}

/// Canvas size that holds a `width` x `height` image rotated by `degrees`
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let rad = degrees.to_radians();
    let (sin, cos) = (rad.sin().abs(), rad.cos().abs());
    let w = width as f64;
    let h = height as f64;
    (
        ((w * cos + h * sin).round() as u32).max(1),
        ((w * sin + h * cos).round() as u32).max(1),
    )
}
