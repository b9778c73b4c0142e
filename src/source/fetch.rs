//! Source fetching
//!
//! Remote sources go through a shared `reqwest` client whose redirect policy
//! re-applies the host guard on every hop. Local sources are read in fixed
//! chunks. Either way the caller gets a [`ByteStream`]; dropping it closes
//! the connection or file.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::redirect::{Attempt, Policy};
use reqwest::Url;
use std::error::Error as StdError;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use super::guard::HostGuard;
use super::resolve::{Location, SourceDescriptor};
use crate::config::FetchConfig;
use crate::constants::LOCAL_READ_CHUNK_SIZE;
use crate::error::ImagistError;
use crate::transform::ByteStream;

/// Opens a byte stream for a resolved source
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn open(&self, source: &SourceDescriptor) -> Result<ByteStream, ImagistError>;
}

/// Redirect refused by the host guard
#[derive(Debug, thiserror::Error)]
#[error("redirect to disallowed host {host}")]
struct RedirectBlocked {
    host: String,
}

fn redirect_policy(guard: HostGuard, max_redirects: usize) -> Policy {
    Policy::custom(move |attempt: Attempt| {
        if attempt.previous().len() > max_redirects {
            attempt.error(format!("too many redirects (max {})", max_redirects))
        } else if !guard.permits(attempt.url()) {
            let host = attempt.url().host_str().unwrap_or("<none>").to_string();
            attempt.error(RedirectBlocked { host })
        } else {
            attempt.follow()
        }
    })
}

fn blocked_redirect(err: &reqwest::Error) -> Option<&RedirectBlocked> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(blocked) = cause.downcast_ref::<RedirectBlocked>() {
            return Some(blocked);
        }
        source = cause.source();
    }
    None
}

/// HTTP(S) and local file fetcher
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    first_byte_timeout: Duration,
}

impl Fetcher {
    pub fn new(config: &FetchConfig, guard: HostGuard) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(redirect_policy(guard, config.max_redirects))
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            first_byte_timeout: Duration::from_secs(config.first_byte_timeout_secs),
        })
    }

    async fn open_remote(&self, url: &Url) -> Result<ByteStream, ImagistError> {
        let response = tokio::time::timeout(self.first_byte_timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| {
                ImagistError::fetch_timed_out(
                    url.as_str(),
                    format!("no response within {}s", self.first_byte_timeout.as_secs()),
                )
            })?
            .map_err(|e| {
                if let Some(blocked) = blocked_redirect(&e) {
                    ImagistError::host_not_allowed(blocked.host.clone())
                } else if e.is_timeout() {
                    ImagistError::fetch_timed_out(url.as_str(), e.to_string())
                } else {
                    ImagistError::fetch_failed(url.as_str(), e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImagistError::fetch_failed(
                url.as_str(),
                format!("upstream returned status {}", status.as_u16()),
            ));
        }

        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            content_length = response.content_length(),
            "Source response received"
        );

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| {
                    let kind = if e.is_timeout() {
                        io::ErrorKind::TimedOut
                    } else {
                        io::ErrorKind::Other
                    };
                    io::Error::new(kind, e)
                })
            })
            .boxed())
    }
}

async fn open_local(path: &Path) -> Result<ByteStream, ImagistError> {
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        let reason = match e.kind() {
            io::ErrorKind::NotFound => "file not found".to_string(),
            _ => e.to_string(),
        };
        ImagistError::fetch_failed(path.display().to_string(), reason)
    })?;

    let chunks = stream::unfold(Some(file), |state| async move {
        let mut file = state?;
        let mut buf = vec![0u8; LOCAL_READ_CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some(file)))
            }
            Err(e) => Some((Err(e), None)),
        }
    });
    Ok(chunks.boxed())
}

#[async_trait]
impl SourceFetcher for Fetcher {
    async fn open(&self, source: &SourceDescriptor) -> Result<ByteStream, ImagistError> {
        match &source.location {
            Location::Remote(url) => self.open_remote(url).await,
            Location::Local(path) => open_local(path).await,
        }
    }
}
