//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a single static body at `/file.bin`. Every response closes its
//! connection. The server records which byte ranges were requested so
//! tests can check that a resume fetches only what is missing.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const LAST_MODIFIED: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, HEAD returns 405 (simulates servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Send `Accept-Ranges: bytes`. Independent of `support_ranges`, so a
    /// server can advertise ranges and then ignore them.
    pub advertise_ranges: bool,
    /// Body is sent in 4 KiB pieces with this pause between them.
    pub chunk_delay: Option<Duration>,
    /// Every GET answers 500.
    pub fail_gets: bool,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            support_ranges: true,
            advertise_ranges: true,
            chunk_delay: None,
            fail_gets: false,
        }
    }
}

struct Shared {
    body: Vec<u8>,
    opts: RangeServerOptions,
    etag: Mutex<String>,
    gets: AtomicUsize,
    /// Served GET ranges as (start, end_exclusive).
    served: Mutex<Vec<(u64, u64)>>,
}

pub struct RangeServer {
    pub url: String,
    shared: Arc<Shared>,
}

#[allow(dead_code)]
impl RangeServer {
    /// Change the validator, as if the resource was replaced.
    pub fn set_etag(&self, etag: &str) {
        *self.shared.etag.lock().unwrap() = etag.to_string();
    }

    pub fn get_count(&self) -> usize {
        self.shared.gets.load(Ordering::SeqCst)
    }

    pub fn served_ranges(&self) -> Vec<(u64, u64)> {
        self.shared.served.lock().unwrap().clone()
    }

    /// Total bytes requested by GETs from the `skip`-th onwards.
    pub fn bytes_requested_since(&self, skip: usize) -> u64 {
        self.served_ranges()
            .iter()
            .skip(skip)
            .map(|(s, e)| e - s)
            .sum()
    }
}

/// Starts a server in a background thread serving `body`. The server runs
/// until the process exits.
#[allow(dead_code)]
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Like `start` but allows customizing server behavior (HEAD blocked, ranges missing, etc.).
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let shared = Arc::new(Shared {
        body,
        opts,
        etag: Mutex::new("v1".to_string()),
        gets: AtomicUsize::new(0),
        served: Mutex::new(Vec::new()),
    });
    let server_side = Arc::clone(&shared);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let shared = Arc::clone(&server_side);
            thread::spawn(move || handle(stream, &shared));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/file.bin", port),
        shared,
    }
}

fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(buf).ok()
}

fn handle(mut stream: TcpStream, shared: &Shared) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(request) = read_head(&mut stream) else {
        return;
    };
    let (method, range) = parse_request(&request);
    let opts = shared.opts;
    let body = &shared.body;
    let total = body.len() as u64;
    let etag = shared.etag.lock().unwrap().clone();
    let accept_ranges = if opts.advertise_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };
    let validators = format!("ETag: \"{}\"\r\nLast-Modified: {}\r\n", etag, LAST_MODIFIED);

    if method.eq_ignore_ascii_case("HEAD") {
        if !opts.head_allowed {
            let _ = stream
                .write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}{}Connection: close\r\n\r\n",
            total, accept_ranges, validators
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }

    shared.gets.fetch_add(1, Ordering::SeqCst);
    if opts.fail_gets {
        let _ = stream.write_all(
            b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }

    let (status, content_range, start, end_excl) = match range.filter(|_| opts.support_ranges) {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl {
                let response = format!(
                    "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    total
                );
                let _ = stream.write_all(response.as_bytes());
                return;
            }
            (
                "206 Partial Content",
                format!("Content-Range: bytes {}-{}/{}\r\n", start, end_incl, total),
                start,
                end_incl + 1,
            )
        }
        None => ("200 OK", String::new(), 0, total),
    };
    shared.served.lock().unwrap().push((start, end_excl));

    let slice = &body[start as usize..end_excl as usize];
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}{}Connection: close\r\n\r\n",
        status,
        slice.len(),
        content_range,
        accept_ranges,
        validators
    );
    if stream.write_all(response.as_bytes()).is_err() {
        return;
    }
    match opts.chunk_delay {
        None => {
            let _ = stream.write_all(slice);
        }
        Some(delay) => {
            for piece in slice.chunks(4096) {
                if stream.write_all(piece).is_err() {
                    return;
                }
                thread::sleep(delay);
            }
        }
    }
}

/// Returns (method, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(part) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
