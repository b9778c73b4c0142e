//! Source resolution and fetch configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_FIRST_BYTE_TIMEOUT_SECS, DEFAULT_MAX_REDIRECTS,
};

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_first_byte_timeout() -> u64 {
    DEFAULT_FIRST_BYTE_TIMEOUT_SECS
}

fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

fn default_user_agent() -> String {
    format!("imagist/{}", env!("CARGO_PKG_VERSION"))
}

/// Remote fetch tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Upper bound on the wait for response headers
    #[serde(default = "default_first_byte_timeout")]
    pub first_byte_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            first_byte_timeout_secs: default_first_byte_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

/// Where sources come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SourceConfig {
    /// Host that relative sources are resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_host: Option<String>,
    /// Use https for synthesized URLs unless the request overrides it
    #[serde(default)]
    pub tls: bool,
    /// Hosts remote sources may be fetched from; empty permits all
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Serve sources from this directory instead of the network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_root: Option<PathBuf>,
    #[serde(default)]
    pub fetch: FetchConfig,
}
