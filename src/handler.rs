//! Framework-agnostic request orchestration
//!
//! `handle` runs one transform request end to end:
//!
//! ```text
//! Init → Guarded → Fetching → Sniffing → Building → Transforming → Streaming → Done
//!   └──────────────────────────── Failed(kind) ─────────────────────────────┘
//! ```
//!
//! The first error ends the request; nothing is retried. The returned
//! [`TransformedImage`] hands the output stream to the HTTP adapter, which
//! moves the lifecycle through `Streaming` and `Done`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::ImagistError;
use crate::source::{Fetcher, HostGuard, Location, SourceFetcher, SourceResolver};
use crate::transform::params::{ParseOptions, QueryParams, TransformSpec};
use crate::transform::pipeline::OperationList;
use crate::transform::raster::{RasterEngine, RasterLimits};
use crate::transform::sniff::Sniffer;
use crate::transform::{ByteStream, TransformEngine};

/// Request phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Init,
    Guarded,
    Fetching,
    Sniffing,
    Building,
    Transforming,
    Streaming,
    Done,
    Failed(&'static str),
}

impl RequestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPhase::Init => "init",
            RequestPhase::Guarded => "guarded",
            RequestPhase::Fetching => "fetching",
            RequestPhase::Sniffing => "sniffing",
            RequestPhase::Building => "building",
            RequestPhase::Transforming => "transforming",
            RequestPhase::Streaming => "streaming",
            RequestPhase::Done => "done",
            RequestPhase::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestPhase::Done | RequestPhase::Failed(_))
    }
}

impl fmt::Display for RequestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestPhase::Failed(kind) => write!(f, "failed({})", kind),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Per-request phase tracker with a request id for log correlation
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    request_id: String,
    phase: RequestPhase,
    started: Instant,
}

impl RequestLifecycle {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            phase: RequestPhase::Init,
            started: Instant::now(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Move to `next`; terminal phases are final
    pub fn advance(&mut self, next: RequestPhase) {
        if self.phase.is_terminal() {
            return;
        }
        debug!(
            request_id = %self.request_id,
            from = self.phase.as_str(),
            phase = next.as_str(),
            "Request phase transition"
        );
        self.phase = next;
    }

    /// Record `err` and move to `Failed`
    pub fn fail(&mut self, err: &ImagistError) {
        if self.phase.is_terminal() {
            return;
        }
        let failed_in = self.phase.as_str();
        self.phase = RequestPhase::Failed(err.kind());

        if err.is_client_error() {
            warn!(
                request_id = %self.request_id,
                phase = failed_in,
                error_kind = err.kind(),
                error = %err,
                "Request rejected"
            );
        } else {
            error!(
                request_id = %self.request_id,
                phase = failed_in,
                error_kind = err.kind(),
                error = %err,
                "Request failed"
            );
        }
    }
}

impl Default for RequestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful outcome: a stream ready to be written to the client
pub struct TransformedImage {
    pub stream: ByteStream,
    pub content_type: &'static str,
    pub lifecycle: RequestLifecycle,
}

impl fmt::Debug for TransformedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformedImage")
            .field("content_type", &self.content_type)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

/// Failed outcome with the lifecycle kept for logging and metrics
#[derive(Debug)]
pub struct RequestFailure {
    pub error: ImagistError,
    pub lifecycle: RequestLifecycle,
}

/// guard → fetch → sniff → build → engine
#[derive(Clone)]
pub struct ImageProxy {
    resolver: SourceResolver,
    guard: HostGuard,
    fetcher: Arc<dyn SourceFetcher>,
    engine: Arc<dyn TransformEngine>,
    sniffer: Sniffer,
    parse_options: ParseOptions,
}

impl ImageProxy {
    pub fn new(
        resolver: SourceResolver,
        guard: HostGuard,
        fetcher: Arc<dyn SourceFetcher>,
        engine: Arc<dyn TransformEngine>,
        sniffer: Sniffer,
        parse_options: ParseOptions,
    ) -> Self {
        Self {
            resolver,
            guard,
            fetcher,
            engine,
            sniffer,
            parse_options,
        }
    }

    /// Wire the default fetcher and raster engine from configuration
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let guard = HostGuard::from_config(&config.source);
        let fetcher = Fetcher::new(&config.source.fetch, guard.clone())?;
        let engine = RasterEngine::new(RasterLimits::from(&config.transform));

        Ok(Self::new(
            SourceResolver::new(&config.source),
            guard,
            Arc::new(fetcher),
            Arc::new(engine),
            Sniffer::new(
                config.transform.sniff_window,
                config.transform.accepted_types.clone(),
            ),
            config.transform.parse_options(),
        ))
    }

    pub fn parse_options(&self) -> &ParseOptions {
        &self.parse_options
    }

    /// Run one request with a fresh lifecycle
    pub async fn handle(
        &self,
        source: Option<&str>,
        query: &QueryParams,
    ) -> Result<TransformedImage, ImagistError> {
        self.handle_with(RequestLifecycle::new(), source, query)
            .await
            .map_err(|failure| failure.error)
    }

    /// Run one request, tracking phases on `lifecycle`
    pub async fn handle_with(
        &self,
        mut lifecycle: RequestLifecycle,
        source: Option<&str>,
        query: &QueryParams,
    ) -> Result<TransformedImage, RequestFailure> {
        match self.run(&mut lifecycle, source, query).await {
            Ok((stream, content_type)) => Ok(TransformedImage {
                stream,
                content_type,
                lifecycle,
            }),
            Err(error) => {
                lifecycle.fail(&error);
                Err(RequestFailure { error, lifecycle })
            }
        }
    }

    async fn run(
        &self,
        lifecycle: &mut RequestLifecycle,
        source: Option<&str>,
        query: &QueryParams,
    ) -> Result<(ByteStream, &'static str), ImagistError> {
        let descriptor = self.resolver.resolve(source, query)?;
        if let Location::Remote(url) = &descriptor.location {
            self.guard.check(url)?;
        }
        lifecycle.advance(RequestPhase::Guarded);

        let spec = TransformSpec::parse(query, &self.parse_options);

        lifecycle.advance(RequestPhase::Fetching);
        debug!(
            request_id = %lifecycle.request_id(),
            source = %descriptor.location,
            host = descriptor.host().unwrap_or("-"),
            "Opening source"
        );
        let body = self.fetcher.open(&descriptor).await?;

        lifecycle.advance(RequestPhase::Sniffing);
        let (mime, body) = self.sniffer.sniff(body).await?;

        lifecycle.advance(RequestPhase::Building);
        let operations = OperationList::build(&spec, mime);
        let content_type = operations.content_type();
        debug!(
            request_id = %lifecycle.request_id(),
            input_type = mime.as_str(),
            content_type,
            operations = ?operations.opcodes(),
            "Built operation list"
        );

        lifecycle.advance(RequestPhase::Transforming);
        let output = self.engine.execute(body, operations).await?;

        Ok((output, content_type))
    }
}
