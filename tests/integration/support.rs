// Shared helpers: a throwaway HTTP origin and generated images

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Canned reply for one request path
#[derive(Clone)]
pub enum Reply {
    Ok { content_type: &'static str, body: Vec<u8> },
    Status(u16),
    Redirect(String),
    Delayed(Duration),
    /// Sends headers and `head`, then one filler byte per `interval`
    /// until the client goes away
    Trickle {
        content_type: &'static str,
        head: Vec<u8>,
        interval: Duration,
    },
}

/// Minimal HTTP/1.1 origin that answers by request path
pub struct Origin {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
}

impl Origin {
    pub async fn start<F>(route: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let route = Arc::new(route);

        let counter = hits.clone();
        let dropped = disconnects.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let route = route.clone();
                let dropped = dropped.clone();
                tokio::spawn(async move {
                    let mut buffer = vec![0u8; 4096];
                    let n = socket.read(&mut buffer).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                    let response = match route(&path) {
                        Reply::Ok { content_type, body } => {
                            let mut head = format!(
                                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                                content_type,
                                body.len()
                            )
                            .into_bytes();
                            head.extend_from_slice(&body);
                            head
                        }
                        Reply::Status(code) => format!(
                            "HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            code
                        )
                        .into_bytes(),
                        Reply::Redirect(location) => format!(
                            "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            location
                        )
                        .into_bytes(),
                        Reply::Trickle {
                            content_type,
                            head,
                            interval,
                        } => {
                            if trickle(&mut socket, content_type, &head, interval).await {
                                dropped.fetch_add(1, Ordering::SeqCst);
                            }
                            return;
                        }
                        Reply::Delayed(delay) => {
                            tokio::time::sleep(delay).await;
                            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nHello"
                                .to_vec()
                        }
                    };
                    let _ = socket.write_all(&response).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            addr,
            hits,
            disconnects,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Connections the client closed before the body was complete
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

/// Returns true when the client hung up mid-body
async fn trickle(
    socket: &mut TcpStream,
    content_type: &str,
    head: &[u8],
    interval: Duration,
) -> bool {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        content_type,
        1u64 << 30
    );
    if socket.write_all(header.as_bytes()).await.is_err() || socket.write_all(head).await.is_err() {
        return true;
    }

    let (mut reader, mut writer) = socket.split();
    let mut scratch = [0u8; 64];
    loop {
        tokio::select! {
            read = reader.read(&mut scratch) => match read {
                Ok(0) | Err(_) => return true,
                Ok(_) => {}
            },
            _ = tokio::time::sleep(interval) => {
                if writer.write_all(&[0u8]).await.is_err() {
                    return true;
                }
            }
        }
    }
}

/// Horizontal gradient PNG
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128, 255])
    });
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(img.as_raw(), width, height, ColorType::Rgba8)
        .unwrap();
    out
}
