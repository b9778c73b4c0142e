// Constants module - centralized default values for configuration
//
// This module defines all default values used throughout the codebase.
// Using constants instead of magic numbers improves maintainability
// and makes it easier to understand and modify defaults.

// =============================================================================
// Server defaults
// =============================================================================

/// Default listen address
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8080;

/// Default number of worker threads
pub const DEFAULT_THREADS: usize = 4;

// =============================================================================
// Source fetch defaults
// =============================================================================

/// Default TCP connect timeout for remote sources in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default upper bound on time-to-first-byte from a remote source in seconds
pub const DEFAULT_FIRST_BYTE_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of redirects followed for a remote source
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

/// Chunk size used when streaming local source files (64 KB)
pub const LOCAL_READ_CHUNK_SIZE: usize = 64 * 1024;

// =============================================================================
// Transform defaults
// =============================================================================

/// Default output quality for lossy formats
pub const DEFAULT_QUALITY: u8 = 80;

/// Default threshold used when `trim` is given without a value
pub const DEFAULT_TRIM_THRESHOLD: u32 = 10;

/// Default number of leading bytes the sniffer may buffer
pub const DEFAULT_SNIFF_WINDOW: usize = 512;

/// Smallest sniff window accepted by config validation
pub const MIN_SNIFF_WINDOW: usize = 16;

/// Default maximum source body size (50 MB)
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 50 * 1024 * 1024;

/// Default maximum decoded source pixels (100 megapixels)
pub const DEFAULT_MAX_SOURCE_PIXELS: u64 = 100_000_000;

/// Default maximum width of a resized output canvas
pub const DEFAULT_MAX_OUTPUT_WIDTH: u32 = 4096;

/// Default maximum height of a resized output canvas
pub const DEFAULT_MAX_OUTPUT_HEIGHT: u32 = 4096;

/// Default size of the chunks the engine emits (64 KB)
pub const DEFAULT_OUTPUT_CHUNK_SIZE: usize = 64 * 1024;

/// Minimum accepted blur sigma
pub const MIN_BLUR_SIGMA: f64 = 0.3;

/// Maximum accepted blur sigma
pub const MAX_BLUR_SIGMA: f64 = 1000.0;

/// Largest accepted rotation magnitude in degrees
pub const MAX_ROTATE_DEGREES: f64 = 360.0;

// =============================================================================
// Logging defaults
// =============================================================================

/// Default log level filter
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Metrics
// =============================================================================

/// Latency samples kept for percentile estimates
pub const MAX_LATENCY_SAMPLES: usize = 10_000;
