// Fetcher behavior against a live local origin

use futures::StreamExt;
use reqwest::Url;
use std::time::Duration;

use imagist::config::{Config, FetchConfig};
use imagist::handler::ImageProxy;
use imagist::proxy::parse_query;
use imagist::source::{Fetcher, HostGuard, Location, SourceDescriptor, SourceFetcher};

use super::support::{gradient_png, Origin, Reply};

fn remote(url: &str) -> SourceDescriptor {
    SourceDescriptor {
        raw_param: url.to_string(),
        location: Location::Remote(Url::parse(url).unwrap()),
    }
}

fn fetcher(config: FetchConfig, guard: HostGuard) -> Fetcher {
    Fetcher::new(&config, guard).unwrap()
}

#[tokio::test]
async fn test_streams_remote_body() {
    let png = gradient_png(8, 8);
    let body = png.clone();
    let origin = Origin::start(move |_| Reply::Ok {
        content_type: "image/png",
        body: body.clone(),
    })
    .await;

    let stream = fetcher(FetchConfig::default(), HostGuard::default())
        .open(&remote(&origin.url("/a.png")))
        .await
        .unwrap();
    let received: Vec<u8> = stream.map(|c| c.unwrap().to_vec()).concat().await;
    assert_eq!(received, png);
}

#[tokio::test]
async fn test_upstream_error_status_is_bad_gateway() {
    let origin = Origin::start(|_| Reply::Status(404)).await;

    let err = fetcher(FetchConfig::default(), HostGuard::default())
        .open(&remote(&origin.url("/missing.jpg")))
        .await
        .err()
        .expect("404 should fail");
    assert_eq!(err.kind(), "fetch_failure");
    assert_eq!(err.to_http_status(), 502);
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_slow_origin_hits_first_byte_timeout() {
    let origin = Origin::start(|_| Reply::Delayed(Duration::from_secs(5))).await;
    let config = FetchConfig {
        first_byte_timeout_secs: 1,
        ..Default::default()
    };

    let started = std::time::Instant::now();
    let err = fetcher(config, HostGuard::default())
        .open(&remote(&origin.url("/slow.jpg")))
        .await
        .err()
        .expect("slow origin should time out");
    assert_eq!(err.to_http_status(), 504);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_redirect_to_disallowed_host_is_refused() {
    let origin = Origin::start(|path| {
        if path == "/start.jpg" {
            Reply::Redirect("http://localhost:9/elsewhere.jpg".to_string())
        } else {
            Reply::Status(500)
        }
    })
    .await;

    let guard = HostGuard::new(["127.0.0.1"], None);
    let err = fetcher(FetchConfig::default(), guard)
        .open(&remote(&origin.url("/start.jpg")))
        .await
        .err()
        .expect("redirect should be refused");
    assert_eq!(err.kind(), "host_not_allowed");
    assert_eq!(err.to_http_status(), 403);
    assert_eq!(origin.hits(), 1);
}

#[tokio::test]
async fn test_redirect_within_allow_list_is_followed() {
    let png = gradient_png(4, 4);
    let body = png.clone();
    let origin = Origin::start(move |path| match path {
        "/old.png" => Reply::Redirect("/new.png".to_string()),
        _ => Reply::Ok {
            content_type: "image/png",
            body: body.clone(),
        },
    })
    .await;

    let guard = HostGuard::new(["127.0.0.1"], None);
    let stream = fetcher(FetchConfig::default(), guard)
        .open(&remote(&origin.url("/old.png")))
        .await
        .unwrap();
    let received: Vec<u8> = stream.map(|c| c.unwrap().to_vec()).concat().await;
    assert_eq!(received, png);
    assert_eq!(origin.hits(), 2);
}

#[tokio::test]
async fn test_redirect_limit() {
    let origin = Origin::start(|_| Reply::Redirect("/loop.jpg".to_string())).await;
    let config = FetchConfig {
        max_redirects: 2,
        ..Default::default()
    };

    let err = fetcher(config, HostGuard::default())
        .open(&remote(&origin.url("/loop.jpg")))
        .await
        .err()
        .expect("redirect loop should fail");
    assert_eq!(err.kind(), "fetch_failure");
    assert!(origin.hits() <= 3);
}

#[tokio::test]
async fn test_dropped_request_closes_origin_connection() {
    let head = gradient_png(4, 4)[..16].to_vec();
    let origin = Origin::start(move |_| Reply::Trickle {
        content_type: "image/png",
        head: head.clone(),
        interval: Duration::from_millis(20),
    })
    .await;
    let mut config = Config::default();
    config.source.base_host = Some(origin.addr.to_string());
    let proxy = ImageProxy::from_config(&config).unwrap();

    // The engine buffers the source, so the request is stuck mid-body here
    let outcome = tokio::time::timeout(
        Duration::from_millis(300),
        proxy.handle(Some("/endless.png"), &parse_query(Some("w=10"))),
    )
    .await;
    assert!(outcome.is_err(), "an endless body must not complete");
    assert_eq!(origin.hits(), 1);

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        while origin.disconnects() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(closed.is_ok(), "origin connection stayed open after the request was dropped");
}
