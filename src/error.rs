//! Request error taxonomy
//!
//! Every structural failure of a transform request is classified into one
//! of six variants. Parameter-level problems never reach this type: the
//! option parser absorbs them and falls back to defaults.

use std::fmt;

/// Errors that terminate a transform request
#[derive(Debug, Clone, PartialEq)]
pub enum ImagistError {
    /// No source path or URL was given
    MissingSource,
    /// Source failed URL syntax, scheme, or path validation
    InvalidSourceUrl { source: String, reason: String },
    /// Resolved host is not in the configured allow-list
    HostNotAllowed { host: String },
    /// Network error, non-2xx upstream status, or timeout
    FetchFailure {
        url: String,
        reason: String,
        timed_out: bool,
    },
    /// Sniffed content type is outside the accepted set
    UnsupportedContentType { detected: String },
    /// The transform engine rejected the input or an operation
    TransformFailure { message: String },
}

impl fmt::Display for ImagistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImagistError::MissingSource => write!(f, "Source URL is required"),
            ImagistError::InvalidSourceUrl { source, reason } => {
                write!(f, "Invalid source '{}': {}", source, reason)
            }
            ImagistError::HostNotAllowed { host } => {
                write!(f, "Host not allowed: {}", host)
            }
            ImagistError::FetchFailure {
                url,
                reason,
                timed_out,
            } => {
                if *timed_out {
                    write!(f, "Timed out fetching {}: {}", url, reason)
                } else {
                    write!(f, "Failed to fetch {}: {}", url, reason)
                }
            }
            ImagistError::UnsupportedContentType { detected } => {
                write!(f, "Unsupported content type: {}", detected)
            }
            ImagistError::TransformFailure { message } => {
                write!(f, "Transform failed: {}", message)
            }
        }
    }
}

impl std::error::Error for ImagistError {}

impl ImagistError {
    /// Maps request errors to HTTP status codes
    ///
    /// Status mapping:
    /// - MissingSource, InvalidSourceUrl → 400 (Bad Request)
    /// - HostNotAllowed → 403 (Forbidden)
    /// - FetchFailure → 502 (Bad Gateway), 504 (Gateway Timeout) when timed out
    /// - UnsupportedContentType → 415 (Unsupported Media Type)
    /// - TransformFailure → 422 (Unprocessable Entity)
    pub fn to_http_status(&self) -> u16 {
        match self {
            ImagistError::MissingSource | ImagistError::InvalidSourceUrl { .. } => 400,
            ImagistError::HostNotAllowed { .. } => 403,
            ImagistError::FetchFailure { timed_out, .. } => {
                if *timed_out {
                    504
                } else {
                    502
                }
            }
            ImagistError::UnsupportedContentType { .. } => 415,
            ImagistError::TransformFailure { .. } => 422,
        }
    }

    /// Stable short name used for metrics labels and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ImagistError::MissingSource => "missing_source",
            ImagistError::InvalidSourceUrl { .. } => "invalid_source_url",
            ImagistError::HostNotAllowed { .. } => "host_not_allowed",
            ImagistError::FetchFailure { .. } => "fetch_failure",
            ImagistError::UnsupportedContentType { .. } => "unsupported_content_type",
            ImagistError::TransformFailure { .. } => "transform_failure",
        }
    }

    /// Whether the error was caused by the client request rather than upstream
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ImagistError::MissingSource
                | ImagistError::InvalidSourceUrl { .. }
                | ImagistError::HostNotAllowed { .. }
        )
    }

    /// Helper constructors for common error patterns
    pub fn invalid_source(source: impl Into<String>, reason: impl Into<String>) -> Self {
        ImagistError::InvalidSourceUrl {
            source: source.into(),
            reason: reason.into(),
        }
    }

    pub fn host_not_allowed(host: impl Into<String>) -> Self {
        ImagistError::HostNotAllowed { host: host.into() }
    }

    pub fn fetch_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        ImagistError::FetchFailure {
            url: url.into(),
            reason: reason.into(),
            timed_out: false,
        }
    }

    pub fn fetch_timed_out(url: impl Into<String>, reason: impl Into<String>) -> Self {
        ImagistError::FetchFailure {
            url: url.into(),
            reason: reason.into(),
            timed_out: true,
        }
    }

    pub fn unsupported_type(detected: impl Into<String>) -> Self {
        ImagistError::UnsupportedContentType {
            detected: detected.into(),
        }
    }

    pub fn transform_failed(message: impl Into<String>) -> Self {
        ImagistError::TransformFailure {
            message: message.into(),
        }
    }

    /// JSON error body sent before any response byte has been committed
    pub fn to_json_body(&self) -> String {
        serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
            "status": self.to_http_status()
        })
        .to_string()
    }
}
