// Proxy module - Pingora ProxyHttp implementation
// Every request is answered in request_filter; no upstream peer is selected.

pub mod context;
pub mod special_endpoints;

use async_trait::async_trait;
use futures::StreamExt;
use http::Method;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_core::{Error, ErrorType, Result};
use pingora_http::ResponseHeader;
use pingora_proxy::{ProxyHttp, Session};
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::ImagistError;
use crate::handler::{ImageProxy, RequestPhase, TransformedImage};
use crate::metrics::Metrics;

pub use context::{parse_query, RequestContext};
use special_endpoints::{
    handle_health, handle_metrics, method_not_allowed, EndpointResponse, HEALTH_PATH,
    METRICS_PATH,
};

/// ImagistProxy implements the Pingora ProxyHttp trait
pub struct ImagistProxy {
    handler: ImageProxy,
    metrics: Arc<Metrics>,
    /// Start time for the /health uptime
    start_time: Instant,
}

impl ImagistProxy {
    pub fn new(config: &Config) -> std::result::Result<Self, String> {
        Ok(Self::with_handler(
            ImageProxy::from_config(config)?,
            Arc::new(Metrics::new()),
        ))
    }

    pub fn with_handler(handler: ImageProxy, metrics: Arc<Metrics>) -> Self {
        Self {
            handler,
            metrics,
            start_time: Instant::now(),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    async fn write_endpoint_response(
        &self,
        session: &mut Session,
        ctx: &RequestContext,
        response: EndpointResponse,
        head_only: bool,
    ) -> Result<()> {
        let mut header = ResponseHeader::build(response.status, None)?;
        header.insert_header("Content-Type", response.content_type)?;
        header.insert_header("Content-Length", response.body.len().to_string())?;
        header.insert_header("X-Request-Id", ctx.request_id())?;
        if response.status == 405 {
            header.insert_header("Allow", "GET, HEAD")?;
        }

        session
            .write_response_header(Box::new(header), head_only)
            .await?;
        if !head_only {
            session
                .write_response_body(Some(response.body.into()), true)
                .await?;
        }
        Ok(())
    }

    async fn write_failure(
        &self,
        session: &mut Session,
        ctx: &RequestContext,
        err: &ImagistError,
        head_only: bool,
    ) -> Result<()> {
        self.metrics.increment_error_count(err.kind());
        self.write_endpoint_response(session, ctx, EndpointResponse::from_error(err), head_only)
            .await
    }

    /// Write headers then pull and write one chunk at a time
    async fn stream_image(
        &self,
        session: &mut Session,
        ctx: &mut RequestContext,
        image: TransformedImage,
        head_only: bool,
    ) -> Result<()> {
        let TransformedImage {
            mut stream,
            content_type,
            lifecycle,
        } = image;
        ctx.lifecycle = lifecycle;

        let mut header = ResponseHeader::build(200, None)?;
        header.insert_header("Content-Type", content_type)?;
        header.insert_header("X-Request-Id", ctx.request_id())?;
        if !head_only {
            header.insert_header("Transfer-Encoding", "chunked")?;
        }

        session
            .write_response_header(Box::new(header), head_only)
            .await?;
        self.metrics.record_ttfb(ctx.elapsed_ms());
        ctx.lifecycle.advance(RequestPhase::Streaming);

        if head_only {
            // Dropping the stream cancels the fetch and the engine
            drop(stream);
            ctx.lifecycle.advance(RequestPhase::Done);
            return Ok(());
        }

        ctx.set_streaming(true);
        self.metrics.stream_started();
        let outcome = self.pump(session, ctx, &mut stream).await;
        self.metrics.stream_finished();
        ctx.set_streaming(false);
        outcome
    }

    async fn pump(
        &self,
        session: &mut Session,
        ctx: &mut RequestContext,
        stream: &mut crate::transform::ByteStream,
    ) -> Result<()> {
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    let len = bytes.len();
                    session.write_response_body(Some(bytes), false).await?;
                    ctx.add_bytes(len);
                    self.metrics.add_bytes_sent(len as u64);
                }
                Err(e) => {
                    // Headers are already out; abort the connection
                    let err = ImagistError::transform_failed(e.to_string());
                    self.metrics.increment_error_count(err.kind());
                    ctx.lifecycle.fail(&err);
                    return Err(Error::because(
                        ErrorType::InternalError,
                        "image stream failed after headers were sent",
                        e,
                    ));
                }
            }
        }

        session.write_response_body(None, true).await?;
        ctx.lifecycle.advance(RequestPhase::Done);
        tracing::info!(
            request_id = %ctx.request_id(),
            bytes_sent = ctx.bytes_sent(),
            duration_ms = ctx.elapsed_ms(),
            "Image response complete"
        );
        Ok(())
    }
}

#[async_trait]
impl ProxyHttp for ImagistProxy {
    type CTX = RequestContext;

    fn new_ctx(&self) -> Self::CTX {
        RequestContext::new()
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        Err(Error::explain(
            ErrorType::InternalError,
            format!(
                "request {} reached upstream selection; all requests are answered locally",
                ctx.request_id()
            ),
        ))
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        self.metrics.increment_request_count();

        let req = session.req_header();
        let method = req.method.clone();
        let path = req.uri.path().to_string();
        let query = parse_query(req.uri.query());

        tracing::debug!(
            request_id = %ctx.request_id(),
            method = %method,
            path = %path,
            "Request received"
        );

        if method != Method::GET && method != Method::HEAD {
            let response = method_not_allowed(method.as_str());
            self.write_endpoint_response(session, ctx, response, false)
                .await?;
            return Ok(true);
        }
        let head_only = method == Method::HEAD;

        match path.as_str() {
            HEALTH_PATH => {
                let response = handle_health(self.start_time);
                self.write_endpoint_response(session, ctx, response, head_only)
                    .await?;
                return Ok(true);
            }
            METRICS_PATH => {
                let response = handle_metrics(&self.metrics);
                self.write_endpoint_response(session, ctx, response, head_only)
                    .await?;
                return Ok(true);
            }
            _ => {}
        }

        let lifecycle = mem::take(&mut ctx.lifecycle);
        match self.handler.handle_with(lifecycle, Some(&path), &query).await {
            Ok(image) => self.stream_image(session, ctx, image, head_only).await?,
            Err(failure) => {
                ctx.lifecycle = failure.lifecycle;
                self.write_failure(session, ctx, &failure.error, head_only)
                    .await?;
            }
        }

        Ok(true)
    }

    async fn logging(&self, session: &mut Session, e: Option<&Error>, ctx: &mut Self::CTX) {
        let status_code = session
            .response_written()
            .map(|resp| resp.status.as_u16())
            .unwrap_or(500);
        self.metrics.increment_status_count(status_code);

        if ctx.is_streaming() {
            // Request future dropped mid-body, e.g. client disconnect
            self.metrics.stream_finished();
        }

        match e {
            Some(err) => tracing::warn!(
                request_id = %ctx.request_id(),
                status_code,
                phase = %ctx.lifecycle.phase(),
                error = %err,
                duration_ms = ctx.elapsed_ms(),
                "Request ended with error"
            ),
            None => tracing::info!(
                request_id = %ctx.request_id(),
                status_code,
                phase = %ctx.lifecycle.phase(),
                bytes_sent = ctx.bytes_sent(),
                duration_ms = ctx.elapsed_ms(),
                "Request completed"
            ),
        }
    }
}
