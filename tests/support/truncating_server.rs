//! Raw TCP HTTP/1.1 server that drops connections mid-body.
//!
//! The first `truncated_connections` connections each deliver at most `step`
//! bytes of the requested span (while advertising the full length) and then
//! close. Later connections deliver the whole span. `Range: bytes=N-` is
//! honored with a 206 answer.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::socket_guard::should_skip_socket_bound_test;

pub struct TruncatingServer {
    addr: std::net::SocketAddr,
    ranges: Arc<Mutex<Vec<Option<u64>>>>,
    handle: JoinHandle<()>,
}

impl TruncatingServer {
    /// Returns `None` when localhost sockets are unavailable.
    pub async fn start_or_skip(
        body: Vec<u8>,
        step: usize,
        truncated_connections: usize,
    ) -> Option<Self> {
        if should_skip_socket_bound_test() {
            return None;
        }
        let listener = TcpListener::bind("127.0.0.1:0").await.ok()?;
        let addr = listener.local_addr().ok()?;
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&ranges);
        let body = Arc::new(body);

        let handle = tokio::spawn(async move {
            let mut served = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                let truncate = served < truncated_connections;
                served += 1;
                let body = Arc::clone(&body);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve(stream, &body, truncate.then_some(step), &recorded).await;
                });
            }
        });

        Some(Self {
            addr,
            ranges,
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Range start of every request received, in order (`None` for no Range header).
    pub fn ranges(&self) -> Vec<Option<u64>> {
        self.ranges.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Drop for TruncatingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    body: &[u8],
    truncate_to: Option<usize>,
    recorded: &Mutex<Vec<Option<u64>>>,
) -> std::io::Result<()> {
    let head = read_request_head(&mut stream).await?;
    let range_start = parse_range_start(&head);
    if let Ok(mut ranges) = recorded.lock() {
        ranges.push(range_start);
    }

    let total = body.len();
    let start = range_start
        .and_then(|s| usize::try_from(s).ok())
        .unwrap_or(0)
        .min(total);
    let span = &body[start..];

    let status_and_range = if range_start.is_some() {
        format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {start}-{}/{total}\r\n",
            total.saturating_sub(1)
        )
    } else {
        "HTTP/1.1 200 OK\r\n".to_string()
    };
    let header = format!(
        "{status_and_range}Content-Length: {}\r\nConnection: close\r\n\r\n",
        span.len()
    );
    stream.write_all(header.as_bytes()).await?;

    let sent = truncate_to.map_or(span.len(), |step| step.min(span.len()));
    stream.write_all(&span[..sent]).await?;
    stream.flush().await?;
    stream.shutdown().await
}

async fn read_request_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

fn parse_range_start(head: &str) -> Option<u64> {
    head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("range") {
            return None;
        }
        value
            .trim()
            .strip_prefix("bytes=")?
            .trim_end_matches('-')
            .parse()
            .ok()
    })
}
