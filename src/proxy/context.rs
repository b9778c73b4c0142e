//! Per-request context carried through the Pingora hooks

use std::time::Instant;

use crate::handler::RequestLifecycle;
use crate::transform::params::QueryParams;

/// State for one HTTP request
#[derive(Debug)]
pub struct RequestContext {
    pub lifecycle: RequestLifecycle,
    started: Instant,
    bytes_sent: u64,
    streaming: bool,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            lifecycle: RequestLifecycle::new(),
            started: Instant::now(),
            bytes_sent: 0,
            streaming: false,
        }
    }

    pub fn request_id(&self) -> &str {
        self.lifecycle.request_id()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn add_bytes(&mut self, n: usize) {
        self.bytes_sent += n as u64;
    }

    /// True once image headers have been written
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.streaming = streaming;
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a raw query string into transform parameters
///
/// Keys and values are percent-decoded (`+` is a space). The first
/// occurrence of a key wins; a key without `=` maps to an empty string,
/// which keeps flags like `trim` or `ssl` present.
pub fn parse_query(query: Option<&str>) -> QueryParams {
    let mut params = QueryParams::new();
    let Some(query) = query else {
        return params;
    };

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        if key.is_empty() {
            continue;
        }
        params
            .entry(key)
            .or_insert_with(|| decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
