// End-to-end transforms through the handler and the raster engine

use futures::StreamExt;
use image::GenericImageView;
use std::fs;
use tempfile::TempDir;

use imagist::config::Config;
use imagist::handler::{ImageProxy, TransformedImage};
use imagist::proxy::parse_query;

use super::support::{gradient_png, Origin, Reply};

async fn collect(image: TransformedImage) -> Vec<u8> {
    image.stream.map(|c| c.unwrap().to_vec()).concat().await
}

fn dimensions(bytes: &[u8]) -> (u32, u32) {
    image::load_from_memory(bytes)
        .expect("output should decode")
        .dimensions()
}

fn local_proxy(dir: &TempDir) -> ImageProxy {
    let mut config = Config::default();
    config.source.local_root = Some(dir.path().to_path_buf());
    config.transform.output_chunk_size = 256;
    config.validate().unwrap();
    ImageProxy::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_local_png_resized() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("wide.png"), gradient_png(64, 32)).unwrap();
    let proxy = local_proxy(&dir);

    let image = proxy
        .handle(Some("/wide.png"), &parse_query(Some("w=20")))
        .await
        .unwrap();
    assert_eq!(image.content_type, "image/png");

    let bytes = collect(image).await;
    assert_eq!(dimensions(&bytes), (20, 10));
}

#[tokio::test]
async fn test_local_png_cover_crop_to_webp() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("wide.png"), gradient_png(64, 32)).unwrap();
    let proxy = local_proxy(&dir);

    let image = proxy
        .handle(
            Some("/wide.png"),
            &parse_query(Some("w=16&h=16&fit=cover&fmt=webp&q=70")),
        )
        .await
        .unwrap();
    assert_eq!(image.content_type, "image/webp");

    let bytes = collect(image).await;
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(&bytes[8..12], b"WEBP");
}

#[tokio::test]
async fn test_rotation_swaps_dimensions() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("wide.png"), gradient_png(40, 10)).unwrap();
    let proxy = local_proxy(&dir);

    let image = proxy
        .handle(Some("/wide.png"), &parse_query(Some("r=90&flip=h&gs")))
        .await
        .unwrap();
    let bytes = collect(image).await;
    assert_eq!(dimensions(&bytes), (10, 40));
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let dir = TempDir::new().unwrap();
    let proxy = local_proxy(&dir);

    let err = proxy
        .handle(Some("/../secret.png"), &parse_query(None))
        .await
        .unwrap_err();
    assert_eq!(err.to_http_status(), 400);
}

#[tokio::test]
async fn test_missing_local_file() {
    let dir = TempDir::new().unwrap();
    let proxy = local_proxy(&dir);

    let err = proxy
        .handle(Some("/nope.png"), &parse_query(None))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "fetch_failure");
    assert_eq!(err.to_http_status(), 502);
}

#[tokio::test]
async fn test_oversized_canvas_is_refused() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("tiny.png"), gradient_png(10, 10)).unwrap();
    let proxy = local_proxy(&dir);

    let err = proxy
        .handle(
            Some("/tiny.png"),
            &parse_query(Some("w=100000&h=100000&fit=contain")),
        )
        .await
        .err()
        .expect("canvas beyond the output bound should fail");
    assert_eq!(err.kind(), "transform_failure");
    assert_eq!(err.to_http_status(), 422);

    let err = proxy
        .handle(Some("/tiny.png"), &parse_query(Some("w=200000&enlarge")))
        .await
        .err()
        .expect("upscale beyond the output bound should fail");
    assert_eq!(err.to_http_status(), 422);
}

#[tokio::test]
async fn test_remote_png_to_jpeg() {
    let png = gradient_png(30, 30);
    let origin = Origin::start(move |_| Reply::Ok {
        content_type: "application/octet-stream",
        body: png.clone(),
    })
    .await;

    let mut config = Config::default();
    config.source.base_host = Some(origin.addr.to_string());
    let proxy = ImageProxy::from_config(&config).unwrap();

    let image = proxy
        .handle(Some("/img/square"), &parse_query(Some("w=10&h=10&fmt=jpg")))
        .await
        .unwrap();
    assert_eq!(image.content_type, "image/jpeg");

    let bytes = collect(image).await;
    assert_eq!(&bytes[0..3], &[0xFF, 0xD8, 0xFF]);
    assert_eq!(dimensions(&bytes), (10, 10));
    assert_eq!(origin.hits(), 1);
}

#[tokio::test]
async fn test_remote_html_is_unsupported() {
    let origin = Origin::start(|_| Reply::Ok {
        content_type: "image/jpeg",
        body: b"<html><body>not an image</body></html>".to_vec(),
    })
    .await;

    let mut config = Config::default();
    config.source.base_host = Some(origin.addr.to_string());
    let proxy = ImageProxy::from_config(&config).unwrap();

    let err = proxy
        .handle(Some("/fake.jpg"), &parse_query(Some("w=10")))
        .await
        .unwrap_err();
    assert_eq!(err.to_http_status(), 415);
}
