//! Content sniffing over a streamed body
//!
//! The sniffer pulls chunks only until the leading bytes settle on a type.
//! The moment the buffered prefix rules out every known signature it fails
//! without polling the stream again. On success the returned stream replays
//! the buffered prefix ahead of the untouched remainder.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};

use super::format::MimeType;
use super::{body_error, ByteStream};
use crate::constants::MIN_SNIFF_WINDOW;
use crate::error::ImagistError;

/// Placeholder for a byte that may take any value
const ANY: u16 = 0x100;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Magic number table
const SIGNATURES: &[(MimeType, &[u16])] = &[
    (MimeType::Jpeg, &[0xFF, 0xD8, 0xFF]),
    (
        MimeType::Png,
        &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
    ),
    (MimeType::Gif, &[0x47, 0x49, 0x46, 0x38, 0x37, 0x61]),
    (MimeType::Gif, &[0x47, 0x49, 0x46, 0x38, 0x39, 0x61]),
    (
        MimeType::Webp,
        &[
            0x52, 0x49, 0x46, 0x46, ANY, ANY, ANY, ANY, 0x57, 0x45, 0x42, 0x50,
        ],
    ),
    (MimeType::Tiff, &[0x49, 0x49, 0x2A, 0x00]),
    (MimeType::Tiff, &[0x4D, 0x4D, 0x00, 0x2A]),
];

/// Outcome of matching a prefix against one signature or the whole table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The prefix identifies this type
    Known(MimeType),
    /// The prefix is consistent with at least one type; more bytes needed
    NeedMore,
    /// No known type starts with this prefix
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureMatch {
    Full,
    Partial,
    Mismatch,
}

fn match_signature(prefix: &[u8], pattern: &[u16]) -> SignatureMatch {
    let consistent = prefix
        .iter()
        .zip(pattern)
        .all(|(byte, expected)| *expected == ANY || *expected == *byte as u16);

    if !consistent {
        SignatureMatch::Mismatch
    } else if prefix.len() >= pattern.len() {
        SignatureMatch::Full
    } else {
        SignatureMatch::Partial
    }
}

/// SVG is markup: optional BOM and whitespace, a `<`, and `<svg` in the window
fn match_svg(prefix: &[u8], window: usize) -> Verdict {
    let body = if prefix.starts_with(UTF8_BOM) {
        &prefix[UTF8_BOM.len()..]
    } else if UTF8_BOM.starts_with(prefix) {
        return Verdict::NeedMore;
    } else {
        prefix
    };

    let markup = match body.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(start) => &body[start..],
        None => return Verdict::NeedMore,
    };
    if markup[0] != b'<' {
        return Verdict::Unknown;
    }

    let scan = &prefix[..prefix.len().min(window)];
    if scan.windows(4).any(|w| w.eq_ignore_ascii_case(b"<svg")) {
        Verdict::Known(MimeType::Svg)
    } else if prefix.len() < window {
        Verdict::NeedMore
    } else {
        Verdict::Unknown
    }
}

/// Classify a buffered prefix
///
/// With `at_end` set the prefix is the whole body, so a partial match can
/// never complete and counts as unknown.
pub fn classify(prefix: &[u8], window: usize, at_end: bool) -> Verdict {
    let mut need_more = false;

    for (mime, pattern) in SIGNATURES {
        match match_signature(prefix, pattern) {
            SignatureMatch::Full => return Verdict::Known(*mime),
            SignatureMatch::Partial => need_more = true,
            SignatureMatch::Mismatch => {}
        }
    }

    match match_svg(prefix, window) {
        Verdict::Known(mime) => return Verdict::Known(mime),
        Verdict::NeedMore => need_more = true,
        Verdict::Unknown => {}
    }

    if need_more && !at_end && prefix.len() < window {
        Verdict::NeedMore
    } else {
        Verdict::Unknown
    }
}

/// Streaming content-type detector
#[derive(Debug, Clone)]
pub struct Sniffer {
    window: usize,
    accepted: Vec<MimeType>,
}

impl Sniffer {
    pub fn new(window: usize, accepted: Vec<MimeType>) -> Self {
        Self {
            window: window.max(MIN_SNIFF_WINDOW),
            accepted,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn accepts(&self, mime: MimeType) -> bool {
        self.accepted.contains(&mime)
    }

    /// Detect the type of `stream` and hand back an equivalent stream
    pub async fn sniff(
        &self,
        mut stream: ByteStream,
    ) -> Result<(MimeType, ByteStream), ImagistError> {
        let mut prefix = BytesMut::new();

        let mime = loop {
            match classify(&prefix, self.window, false) {
                Verdict::Known(mime) => break mime,
                Verdict::Unknown if !prefix.is_empty() => {
                    return Err(ImagistError::unsupported_type("unknown"));
                }
                _ => {}
            }

            match stream.next().await {
                Some(Ok(chunk)) => prefix.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(body_error(e)),
                None if prefix.is_empty() => {
                    return Err(ImagistError::unsupported_type("empty body"));
                }
                None => match classify(&prefix, self.window, true) {
                    Verdict::Known(mime) => break mime,
                    _ => return Err(ImagistError::unsupported_type("unknown")),
                },
            }
        };

        if !self.accepts(mime) {
            return Err(ImagistError::unsupported_type(mime.as_str()));
        }

        tracing::debug!(
            content_type = mime.as_str(),
            bytes = prefix.len(),
            "Sniffed source content type"
        );

        let head: Bytes = prefix.freeze();
        let replay = stream::iter(std::iter::once(Ok(head))).chain(stream);
        Ok((mime, replay.boxed()))
    }
}
