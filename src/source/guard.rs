//! Host allow-list
//!
//! Checked before any network call and again on every redirect hop.

use reqwest::Url;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::SourceConfig;
use crate::error::ImagistError;

#[derive(Debug, Clone, Default)]
pub struct HostGuard {
    allowed: Arc<HashSet<String>>,
}

impl HostGuard {
    /// Build a guard; `base_host` is only added to a non-empty list
    pub fn new<I, S>(allowed: I, base_host: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed: HashSet<String> = allowed.into_iter().map(Into::into).collect();
        if !allowed.is_empty() {
            if let Some(base) = base_host {
                allowed.insert(base.to_string());
            }
        }
        Self {
            allowed: Arc::new(allowed),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.allowed_hosts.iter().cloned(), config.base_host.as_deref())
    }

    /// An empty allow-list permits every host
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Exact, case-sensitive match of the URL host against the allow-list
    pub fn permits(&self, url: &Url) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        url.host_str()
            .is_some_and(|host| self.allowed.contains(host))
    }

    pub fn check(&self, url: &Url) -> Result<(), ImagistError> {
        if self.permits(url) {
            Ok(())
        } else {
            Err(ImagistError::host_not_allowed(
                url.host_str().unwrap_or("<none>"),
            ))
        }
    }
}
