// Configuration module

mod server;
mod source;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::{
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_OUTPUT_HEIGHT, DEFAULT_MAX_OUTPUT_WIDTH,
    DEFAULT_MAX_SOURCE_BYTES, DEFAULT_MAX_SOURCE_PIXELS, DEFAULT_OUTPUT_CHUNK_SIZE,
    DEFAULT_QUALITY, DEFAULT_SNIFF_WINDOW, DEFAULT_TRIM_THRESHOLD,
    MIN_SNIFF_WINDOW,
};
use crate::transform::format::MimeType;
use crate::transform::params::ParseOptions;

pub use server::ServerConfig;
pub use source::{FetchConfig, SourceConfig};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_trim_threshold() -> u32 {
    DEFAULT_TRIM_THRESHOLD
}

fn default_true() -> bool {
    true
}

fn default_accepted_types() -> Vec<MimeType> {
    vec![MimeType::Jpeg, MimeType::Png, MimeType::Webp, MimeType::Gif]
}

fn default_sniff_window() -> usize {
    DEFAULT_SNIFF_WINDOW
}

fn default_max_source_bytes() -> usize {
    DEFAULT_MAX_SOURCE_BYTES
}

fn default_max_source_pixels() -> u64 {
    DEFAULT_MAX_SOURCE_PIXELS
}

fn default_max_output_width() -> u32 {
    DEFAULT_MAX_OUTPUT_WIDTH
}

fn default_max_output_height() -> u32 {
    DEFAULT_MAX_OUTPUT_HEIGHT
}

fn default_output_chunk_size() -> usize {
    DEFAULT_OUTPUT_CHUNK_SIZE
}

/// Transform policy and engine limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransformConfig {
    /// Quality used when a request gives none (1-100)
    #[serde(default = "default_quality")]
    pub default_quality: u8,
    /// Threshold for a bare `trim` flag
    #[serde(default = "default_trim_threshold")]
    pub trim_threshold: u32,
    /// Drop entropy/attention positions unless fit is cover
    #[serde(default = "default_true")]
    pub content_aware_requires_cover: bool,
    /// Source content types accepted after sniffing
    #[serde(default = "default_accepted_types")]
    pub accepted_types: Vec<MimeType>,
    /// Maximum bytes buffered while sniffing
    #[serde(default = "default_sniff_window")]
    pub sniff_window: usize,
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
    #[serde(default = "default_max_source_pixels")]
    pub max_source_pixels: u64,
    /// Largest canvas a resize may produce beyond the source size
    #[serde(default = "default_max_output_width")]
    pub max_output_width: u32,
    #[serde(default = "default_max_output_height")]
    pub max_output_height: u32,
    #[serde(default = "default_output_chunk_size")]
    pub output_chunk_size: usize,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            default_quality: default_quality(),
            trim_threshold: default_trim_threshold(),
            content_aware_requires_cover: true,
            accepted_types: default_accepted_types(),
            sniff_window: default_sniff_window(),
            max_source_bytes: default_max_source_bytes(),
            max_source_pixels: default_max_source_pixels(),
            max_output_width: default_max_output_width(),
            max_output_height: default_max_output_height(),
            output_chunk_size: default_output_chunk_size(),
        }
    }
}

impl TransformConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            default_quality: self.default_quality,
            trim_threshold: self.trim_threshold,
            content_aware_requires_cover: self.content_aware_requires_cover,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| {
                format!(
                    "Environment variable '{}' is referenced but not set",
                    var_name
                )
            })?;
        }

        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be non-zero".to_string());
        }
        if self.server.threads == 0 {
            return Err("server.threads must be at least 1".to_string());
        }

        if let Some(base_host) = &self.source.base_host {
            if base_host.trim().is_empty() {
                return Err("source.base_host cannot be empty when present".to_string());
            }
        }
        if self.source.allowed_hosts.iter().any(|h| h.trim().is_empty()) {
            return Err("source.allowed_hosts cannot contain empty entries".to_string());
        }
        if let Some(root) = &self.source.local_root {
            if !root.is_dir() {
                return Err(format!(
                    "source.local_root '{}' is not a directory",
                    root.display()
                ));
            }
        }

        let fetch = &self.source.fetch;
        if fetch.connect_timeout_secs == 0 {
            return Err("source.fetch.connect_timeout_secs must be > 0".to_string());
        }
        if fetch.first_byte_timeout_secs == 0 {
            return Err("source.fetch.first_byte_timeout_secs must be > 0".to_string());
        }

        let transform = &self.transform;
        if !(1..=100).contains(&transform.default_quality) {
            return Err(format!(
                "transform.default_quality must be between 1 and 100, got {}",
                transform.default_quality
            ));
        }
        if transform.sniff_window < MIN_SNIFF_WINDOW {
            return Err(format!(
                "transform.sniff_window must be at least {} bytes, got {}",
                MIN_SNIFF_WINDOW, transform.sniff_window
            ));
        }
        if transform.accepted_types.is_empty() {
            return Err("transform.accepted_types cannot be empty".to_string());
        }
        if transform.max_source_bytes == 0 {
            return Err("transform.max_source_bytes must be > 0".to_string());
        }
        if transform.max_source_pixels == 0 {
            return Err("transform.max_source_pixels must be > 0".to_string());
        }
        if transform.max_output_width == 0 || transform.max_output_height == 0 {
            return Err("transform.max_output_width and max_output_height must be > 0".to_string());
        }
        if transform.output_chunk_size == 0 {
            return Err("transform.output_chunk_size must be > 0".to_string());
        }

        if self.logging.level.trim().is_empty() {
            return Err("logging.level cannot be empty".to_string());
        }

        Ok(())
    }
}
