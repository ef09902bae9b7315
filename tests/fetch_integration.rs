//! Single-shot fetch against a local stub server

mod common;

use common::{chunked, ok, redirect, short_body, status, StubServer};
use mediafetch_core::http::{fetch, probe};
use mediafetch_core::{EngineError, ErrorKind, HttpOptions};
use std::net::TcpListener;

#[test]
fn test_fetch_small_body() {
    let server = StubServer::start(|path| match path {
        "/x" => ok(b"abc", "text/plain; charset=utf-8"),
        _ => status(404),
    });

    let result = fetch(&server.url("/x"), 16, &HttpOptions::default()).unwrap();
    assert_eq!(result.bytes, b"abc");
    assert_eq!(result.len(), 3);
    assert_eq!(result.content_type.as_deref(), Some("text/plain"));
    assert!(!result.truncated);
}

#[test]
fn test_fetch_follows_relative_redirect() {
    let server = StubServer::start(|path| match path {
        "/x" => redirect(302, "/y"),
        "/y" => ok(b"done", "text/plain"),
        _ => status(404),
    });

    let result = fetch(&server.url("/x"), 16, &HttpOptions::default()).unwrap();
    assert_eq!(result.text(), "done");
    assert!(result.final_url.ends_with("/y"));
    assert_eq!(server.hits(), 2);
}

/// `/hop/N` redirects to `/hop/N-1`; `/hop/0` answers
fn hop_server() -> StubServer {
    StubServer::start(|path| {
        let n: usize = path.trim_start_matches("/hop/").parse().unwrap_or(0);
        if n == 0 {
            ok(b"end", "text/plain")
        } else {
            redirect(if n % 2 == 0 { 301 } else { 307 }, &format!("/hop/{}", n - 1))
        }
    })
}

#[test]
fn test_redirect_chain_below_cap_resolves() {
    let server = hop_server();
    let opts = HttpOptions::default();
    assert_eq!(opts.max_redirects, 10);

    let result = fetch(&server.url("/hop/9"), 16, &opts).unwrap();
    assert_eq!(result.bytes, b"end");
}

#[test]
fn test_redirect_chain_at_cap_fails() {
    let server = hop_server();
    let err = fetch(&server.url("/hop/10"), 16, &HttpOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::TooManyRedirects { limit: 10 }));
    assert_eq!(err.kind(), ErrorKind::Protocol);

    let looping = StubServer::start(|_| redirect(302, "/again"));
    let opts = HttpOptions {
        max_redirects: 3,
        ..HttpOptions::default()
    };
    assert!(matches!(
        fetch(&looping.url("/start"), 16, &opts),
        Err(EngineError::TooManyRedirects { limit: 3 })
    ));
    assert_eq!(looping.hits(), 3);
}

#[test]
fn test_redirect_without_location_is_protocol_error() {
    let server = StubServer::start(|_| {
        common::Reply::Raw(b"HTTP/1.1 302 Found\r\nContent-Length: 0\r\n\r\n".to_vec())
    });
    let err = fetch(&server.url("/x"), 16, &HttpOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::Protocol(_)));
}

#[test]
fn test_body_is_capped_at_max_bytes() {
    let server = StubServer::start(|_| ok(&[b'z'; 100], "application/octet-stream"));
    let result = fetch(&server.url("/big"), 10, &HttpOptions::default()).unwrap();
    assert_eq!(result.len(), 10);
    assert!(result.truncated);

    let exact = fetch(&server.url("/big"), 100, &HttpOptions::default()).unwrap();
    assert_eq!(exact.len(), 100);
    assert!(!exact.truncated);
}

#[test]
fn test_non_success_status() {
    let server = StubServer::start(|_| status(404));
    let err = fetch(&server.url("/missing"), 64, &HttpOptions::default()).unwrap_err();
    assert!(matches!(err, EngineError::HttpStatus { status: 404, .. }));
    assert!(!err.is_retryable());
}

#[test]
fn test_chunked_body() {
    let server = StubServer::start(|_| chunked(&[b"hello ", b"chunked ", b"world"]));
    let result = fetch(&server.url("/c"), 64, &HttpOptions::default()).unwrap();
    assert_eq!(result.text(), "hello chunked world");
}

#[test]
fn test_json_body() {
    let server = StubServer::start(|_| ok(br#"{"episodes": [1, 2, 3]}"#, "application/json"));
    let result = fetch(&server.url("/feed"), 1024, &HttpOptions::default()).unwrap();
    let value: serde_json::Value = result.json().unwrap();
    assert_eq!(value["episodes"][2], 3);
}

#[test]
fn test_body_without_length_reads_until_close() {
    let server = StubServer::start(|_| {
        common::Reply::Raw(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nstreamed".to_vec())
    });
    let result = fetch(&server.url("/s"), 64, &HttpOptions::default()).unwrap();
    assert_eq!(result.text(), "streamed");
    assert_eq!(result.content_type, None);
}

#[test]
fn test_probe_reads_head_only() {
    let server = StubServer::start(|path| match path {
        "/release" => redirect(303, "/files/app.elf"),
        _ => short_body(123_456, b""),
    });
    let info = probe(&server.url("/release"), &HttpOptions::default()).unwrap();
    assert_eq!(info.status, 200);
    assert_eq!(info.content_length, Some(123_456));
    assert!(info.final_url.ends_with("/files/app.elf"));
}

#[test]
fn test_connection_refused() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = fetch(&format!("http://127.0.0.1:{}/", port), 16, &HttpOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connect);
}

#[test]
fn test_malformed_url_never_connects() {
    for url in ["", "stub/x", "http://", "https://:443/x", "http://host:0/"] {
        let err = fetch(url, 16, &HttpOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidUrl(_)), "{:?}", url);
    }
}
