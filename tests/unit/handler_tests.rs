// Request handler tests with in-memory fetcher and engine

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use imagist::config::SourceConfig;
use imagist::error::ImagistError;
use imagist::handler::{ImageProxy, RequestLifecycle, RequestPhase};
use imagist::source::{HostGuard, SourceDescriptor, SourceFetcher, SourceResolver};
use imagist::transform::{
    ByteStream, MimeType, Operation, OperationList, OutputFormat, ParseOptions, QueryParams,
    Sniffer, TransformEngine,
};

const JPEG_HEAD: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// Serves fixed bytes and counts how often a source was opened
struct StaticFetcher {
    body: Vec<Bytes>,
    opens: AtomicUsize,
    last_source: Mutex<Option<SourceDescriptor>>,
}

impl StaticFetcher {
    fn new(chunks: &[&[u8]]) -> Arc<Self> {
        Arc::new(Self {
            body: chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect(),
            opens: AtomicUsize::new(0),
            last_source: Mutex::new(None),
        })
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn open(&self, source: &SourceDescriptor) -> Result<ByteStream, ImagistError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.last_source.lock().unwrap() = Some(source.clone());
        Ok(stream::iter(self.body.clone().into_iter().map(Ok)).boxed())
    }
}

/// Records the operation list and echoes a marker body
#[derive(Default)]
struct RecordingEngine {
    received: Mutex<Option<OperationList>>,
}

impl RecordingEngine {
    fn received(&self) -> OperationList {
        self.received.lock().unwrap().clone().expect("engine was not called")
    }
}

#[async_trait]
impl TransformEngine for RecordingEngine {
    async fn execute(
        &self,
        input: ByteStream,
        operations: OperationList,
    ) -> Result<ByteStream, ImagistError> {
        let consumed: Vec<_> = input.collect().await;
        assert!(consumed.iter().all(|c| c.is_ok()));
        *self.received.lock().unwrap() = Some(operations);
        Ok(stream::iter(vec![Ok(Bytes::from_static(b"transformed"))]).boxed())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

struct Harness {
    proxy: ImageProxy,
    fetcher: Arc<StaticFetcher>,
    engine: Arc<RecordingEngine>,
}

fn harness(source: SourceConfig, body: &[&[u8]]) -> Harness {
    let fetcher = StaticFetcher::new(body);
    let engine = Arc::new(RecordingEngine::default());
    let proxy = ImageProxy::new(
        SourceResolver::new(&source),
        HostGuard::from_config(&source),
        fetcher.clone(),
        engine.clone(),
        Sniffer::new(
            512,
            vec![MimeType::Jpeg, MimeType::Png, MimeType::Webp, MimeType::Gif],
        ),
        ParseOptions::default(),
    );
    Harness {
        proxy,
        fetcher,
        engine,
    }
}

fn allow(hosts: &[&str]) -> SourceConfig {
    SourceConfig {
        allowed_hosts: hosts.iter().map(|h| h.to_string()).collect(),
        ..Default::default()
    }
}

fn query(raw: &str) -> QueryParams {
    imagist::proxy::parse_query(Some(raw))
}

#[tokio::test]
async fn test_cover_resize_to_webp() {
    let h = harness(allow(&[]), &[JPEG_HEAD, b"rest of the jpeg"]);

    let image = h
        .proxy
        .handle(
            Some("/http://images.example.com/cat.jpg"),
            &query("w=100&h=50&fit=cover&fmt=webp"),
        )
        .await
        .unwrap();
    assert_eq!(image.content_type, "image/webp");
    assert_eq!(image.lifecycle.phase(), RequestPhase::Transforming);

    let body: Vec<u8> = image
        .stream
        .map(|c| c.unwrap().to_vec())
        .concat()
        .await;
    assert_eq!(body, b"transformed");

    let operations = h.engine.received();
    assert_eq!(operations.opcodes(), vec!["resize", "encode"]);
    assert_eq!(operations.encode().format, OutputFormat::Webp);
    assert_eq!(operations.encode().quality, 80);
    match &operations.operations()[0] {
        Operation::Resize(spec) => {
            assert_eq!(spec.width, Some(100));
            assert_eq!(spec.height, Some(50));
            assert_eq!(spec.fit.as_str(), "cover");
        }
        other => panic!("expected resize, got {:?}", other),
    }
    assert_eq!(h.fetcher.opens(), 1);
}

#[tokio::test]
async fn test_out_of_range_quality_falls_back() {
    let h = harness(allow(&[]), &[JPEG_HEAD]);

    let image = h
        .proxy
        .handle(Some("/http://images.example.com/a.jpg"), &query("q=150"))
        .await
        .unwrap();
    assert_eq!(image.content_type, "image/jpeg");
    drop(image);

    let operations = h.engine.received();
    assert_eq!(operations.encode().quality, 80);
    assert_eq!(operations.opcodes(), vec!["encode"]);
}

#[tokio::test]
async fn test_disallowed_host_never_fetches() {
    let h = harness(allow(&["images.example.com"]), &[JPEG_HEAD]);

    let err = h
        .proxy
        .handle(Some("/https://evil.example/a.jpg"), &query("w=10"))
        .await
        .unwrap_err();
    assert_eq!(err, ImagistError::host_not_allowed("evil.example"));
    assert_eq!(err.to_http_status(), 403);
    assert_eq!(h.fetcher.opens(), 0);
}

#[tokio::test]
async fn test_missing_source() {
    let h = harness(allow(&[]), &[JPEG_HEAD]);

    let err = h.proxy.handle(Some("/"), &query("w=10")).await.unwrap_err();
    assert_eq!(err, ImagistError::MissingSource);
    assert_eq!(err.to_http_status(), 400);
    assert_eq!(h.fetcher.opens(), 0);
}

#[tokio::test]
async fn test_non_image_body_is_rejected() {
    let h = harness(allow(&[]), &[b"<!DOCTYPE html><html><body>nope</body></html>"]);

    let failure = h
        .proxy
        .handle_with(
            RequestLifecycle::with_id("req-html"),
            Some("/http://images.example.com/page"),
            &query(""),
        )
        .await
        .unwrap_err();
    assert_eq!(failure.error.to_http_status(), 415);
    assert_eq!(failure.error.kind(), "unsupported_content_type");
    assert_eq!(
        failure.lifecycle.phase(),
        RequestPhase::Failed("unsupported_content_type")
    );
    assert_eq!(failure.lifecycle.request_id(), "req-html");
    assert!(h.engine.received.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_relative_path_uses_base_host() {
    let source = SourceConfig {
        base_host: Some("origin.example.com".to_string()),
        tls: true,
        ..Default::default()
    };
    let h = harness(source, &[JPEG_HEAD]);

    h.proxy
        .handle(Some("/photos/a.jpg"), &query("fmt=png"))
        .await
        .unwrap();

    let opened = h.fetcher.last_source.lock().unwrap().clone().unwrap();
    assert_eq!(opened.host(), Some("origin.example.com"));
    assert_eq!(opened.location.to_string(), "https://origin.example.com/photos/a.jpg");
    assert_eq!(h.engine.received().encode().format, OutputFormat::Png);
}

#[tokio::test]
async fn test_operation_order_is_fixed() {
    let h = harness(allow(&[]), &[JPEG_HEAD]);

    h.proxy
        .handle(
            Some("/http://images.example.com/a.jpg"),
            &query("w=10&gs&flip=both&r=90&trim&blur=2&neg&sharpen&tint=f00&meta"),
        )
        .await
        .unwrap();

    assert_eq!(
        h.engine.received().opcodes(),
        vec![
            "trim",
            "rotate",
            "flip",
            "flop",
            "sharpen",
            "blur",
            "negate",
            "tint",
            "greyscale",
            "keep_metadata",
            "resize",
            "encode"
        ]
    );
}
