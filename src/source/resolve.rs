//! Source resolution
//!
//! The request path names the source. Depending on configuration it is a
//! file under `local_root` or a remote URL, either absolute or relative to
//! a base host:
//!
//! ```text
//! /https://cdn.example.com/a.jpg        absolute URL
//! /photos/a.jpg?host=cdn.example.com    relative, host from the query
//! /photos/a.jpg                         relative to source.base_host
//! ```

use reqwest::Url;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::config::SourceConfig;
use crate::error::ImagistError;
use crate::transform::coerce::to_bool;
use crate::transform::params::QueryParams;

/// Where the source bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Remote(Url),
    Local(PathBuf),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Remote(url) => write!(f, "{}", url),
            Location::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A resolved source, created once per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub raw_param: String,
    pub location: Location,
}

impl SourceDescriptor {
    /// Host of a remote source
    pub fn host(&self) -> Option<&str> {
        match &self.location {
            Location::Remote(url) => url.host_str(),
            Location::Local(_) => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.location, Location::Remote(_))
    }
}

#[derive(Debug, Clone)]
pub struct SourceResolver {
    base_host: Option<String>,
    tls: bool,
    local_root: Option<PathBuf>,
}

impl SourceResolver {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            base_host: config.base_host.clone(),
            tls: config.tls,
            local_root: config.local_root.clone(),
        }
    }

    pub fn resolve(
        &self,
        raw: Option<&str>,
        query: &QueryParams,
    ) -> Result<SourceDescriptor, ImagistError> {
        let raw = raw.ok_or(ImagistError::MissingSource)?;
        let decoded = urlencoding::decode(raw)
            .map_err(|e| ImagistError::invalid_source(raw, format!("bad percent-encoding: {}", e)))?;
        let rest = decoded.strip_prefix('/').unwrap_or(&*decoded);

        if rest.is_empty() {
            return Err(ImagistError::MissingSource);
        }

        let location = match &self.local_root {
            Some(root) => Location::Local(local_path(root, rest)?),
            None => Location::Remote(self.remote_url(rest, query)?),
        };

        Ok(SourceDescriptor {
            raw_param: raw.to_string(),
            location,
        })
    }

    fn remote_url(&self, rest: &str, query: &QueryParams) -> Result<Url, ImagistError> {
        let candidate = match explicit_scheme(rest) {
            Some(scheme) => {
                if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
                    return Err(ImagistError::invalid_source(
                        rest,
                        format!("unsupported scheme '{}'", scheme),
                    ));
                }
                rest.to_string()
            }
            None => {
                let secure = query
                    .get("ssl")
                    .map(|v| to_bool(Some(v)))
                    .unwrap_or(self.tls);
                let scheme = if secure { "https" } else { "http" };

                let base_host = query
                    .get("host")
                    .map(String::as_str)
                    .filter(|h| !h.is_empty())
                    .or(self.base_host.as_deref());

                match base_host {
                    Some(host) => format!("{}://{}/{}", scheme, host.trim_end_matches('/'), rest),
                    None => format!("{}://{}", scheme, rest),
                }
            }
        };

        let url = Url::parse(&candidate)
            .map_err(|e| ImagistError::invalid_source(rest, e.to_string()))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(ImagistError::invalid_source(rest, "missing host"));
        }
        Ok(url)
    }
}

/// Scheme of `s` if it starts with `scheme://`
fn explicit_scheme(s: &str) -> Option<&str> {
    let (scheme, _) = s.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

fn local_path(root: &Path, rest: &str) -> Result<PathBuf, ImagistError> {
    if rest.contains('\0') {
        return Err(ImagistError::invalid_source(rest, "path contains NUL byte"));
    }

    let relative = Path::new(rest);
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(ImagistError::invalid_source(rest, "path traversal is not allowed"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ImagistError::invalid_source(rest, "absolute paths are not allowed"));
            }
        }
    }

    Ok(root.join(relative))
}
