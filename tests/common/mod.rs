//! Minimal HTTP/1.1 stub server for integration tests
//!
//! One thread per accepted connection. A closure maps the request path to a
//! canned [`Reply`]; the connection is closed after the reply.

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub enum Reply {
    /// Written in one go
    Raw(Vec<u8>),
    /// Head, then `count` copies of `chunk` with `delay` between them
    Slow {
        head: Vec<u8>,
        chunk: Vec<u8>,
        count: usize,
        delay: Duration,
    },
}

pub struct StubServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl StubServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let addr = listener.local_addr().expect("local addr");
        let hits = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let handler = Arc::clone(&handler);
                counter.fetch_add(1, Ordering::SeqCst);
                thread::spawn(move || serve(stream, handler.as_ref()));
            }
        });

        Self { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of connections accepted so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn serve<F>(mut stream: TcpStream, handler: &F)
where
    F: Fn(&str) -> Reply + ?Sized,
{
    let path = match read_request_path(&stream) {
        Some(path) => path,
        None => return,
    };

    match handler(&path) {
        Reply::Raw(bytes) => {
            let _ = stream.write_all(&bytes);
        }
        Reply::Slow {
            head,
            chunk,
            count,
            delay,
        } => {
            if stream.write_all(&head).is_err() {
                return;
            }
            for _ in 0..count {
                if stream.write_all(&chunk).is_err() {
                    return;
                }
                let _ = stream.flush();
                thread::sleep(delay);
            }
        }
    }
    let _ = stream.flush();
}

fn read_request_path(stream: &TcpStream) -> Option<String> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).ok()?;
    let path = request_line.split_whitespace().nth(1)?.to_string();

    // Drain the rest of the head
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) if line == "\r\n" || line == "\n" => break,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    Some(path)
}

pub fn ok(body: &[u8], content_type: &str) -> Reply {
    let mut bytes = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        content_type,
        body.len()
    )
    .into_bytes();
    bytes.extend_from_slice(body);
    Reply::Raw(bytes)
}

pub fn redirect(status: u16, location: &str) -> Reply {
    Reply::Raw(
        format!(
            "HTTP/1.1 {} Moved\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status, location
        )
        .into_bytes(),
    )
}

pub fn status(code: u16) -> Reply {
    let body = format!("<html><body>{}</body></html>", code);
    Reply::Raw(
        format!(
            "HTTP/1.1 {} Error\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            code,
            body.len(),
            body
        )
        .into_bytes(),
    )
}

pub fn chunked(parts: &[&[u8]]) -> Reply {
    let mut bytes = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
    for part in parts {
        bytes.extend_from_slice(format!("{:x}\r\n", part.len()).as_bytes());
        bytes.extend_from_slice(part);
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(b"0\r\n\r\n");
    Reply::Raw(bytes)
}

/// Declares `declared` bytes but sends only `body`, then hangs up
pub fn short_body(declared: usize, body: &[u8]) -> Reply {
    let mut bytes = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        declared
    )
    .into_bytes();
    bytes.extend_from_slice(body);
    Reply::Raw(bytes)
}

/// A slow body of `count` chunks of `chunk_len` bytes
pub fn slow(chunk_len: usize, count: usize, delay: Duration) -> Reply {
    Reply::Slow {
        head: format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            chunk_len * count
        )
        .into_bytes(),
        chunk: vec![0xFF; chunk_len],
        count,
        delay,
    }
}

/// `len` bytes that pass the mp3 magic-byte check
pub fn mp3_bytes(len: usize) -> Vec<u8> {
    let mut bytes = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    bytes.resize(len.max(bytes.len()), 0x55);
    bytes
}

/// Poll `check` until it holds or `timeout` passes
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    check()
}
