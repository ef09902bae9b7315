//! Response head parsing and body framing
//!
//! The head (status line + headers) is read into a bounded buffer; whatever
//! arrived after the blank line is handed to [`BodyReader`] so no body byte
//! is lost. The body reader understands `Content-Length`, chunked transfer
//! coding and read-until-close.

use crate::error::{EngineError, Result};
use std::io::{self, BufRead, BufReader, Chain, Cursor, Read};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";
const HEAD_READ_SIZE: usize = 1024;

/// Status line and headers of a response
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    /// Header names lower-cased, values trimmed, in arrival order
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// Parse a head block (without the terminating blank line)
    pub fn parse(block: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(block);
        let mut lines = text.split("\r\n");

        let status_line = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| EngineError::protocol("empty response"))?;
        let (status, reason) = parse_status_line(status_line)?;

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) => {
                    headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()))
                }
                None => {
                    tracing::debug!(line, "ignoring malformed header line");
                }
            }
        }

        Ok(Self {
            status,
            reason,
            headers,
        })
    }

    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location").filter(|l| !l.is_empty())
    }

    /// Media type without parameters (`audio/mpeg; q=1` -> `audio/mpeg`)
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn content_length(&self) -> Option<u64> {
        if self.is_chunked() {
            return None;
        }
        self.header("content-length").and_then(|v| v.parse::<u64>().ok())
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }
}

fn parse_status_line(line: &str) -> Result<(u16, String)> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Err(EngineError::protocol(format!("bad status line: {:?}", line)));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|s| (100..1000).contains(s))
        .ok_or_else(|| EngineError::protocol(format!("bad status code: {:?}", line)))?;
    let reason = parts.next().unwrap_or("").trim().to_string();
    Ok((status, reason))
}

/// Read until the blank line that ends the head.
///
/// Returns the parsed head and any body bytes that arrived in the same reads.
/// Fails if `max_bytes` fill up before the terminator or the peer closes early.
pub fn read_head<R: Read>(
    reader: &mut R,
    max_bytes: usize,
    timeout_secs: u64,
) -> Result<(ResponseHead, Vec<u8>)> {
    let mut buf: Vec<u8> = Vec::with_capacity(HEAD_READ_SIZE);
    let mut chunk = [0u8; HEAD_READ_SIZE];
    let mut scanned = 0;

    loop {
        // Resume the scan a little before the previous end so a split
        // terminator is still found
        let from = scanned.saturating_sub(HEAD_TERMINATOR.len() - 1);
        if let Some(pos) = find(&buf[from..], HEAD_TERMINATOR) {
            let end = from + pos;
            let head = ResponseHead::parse(&buf[..end])?;
            let leftover = buf.split_off(end + HEAD_TERMINATOR.len());
            return Ok((head, leftover));
        }
        scanned = buf.len();

        if buf.len() >= max_bytes {
            return Err(EngineError::protocol(format!(
                "response head exceeds {} bytes",
                max_bytes
            )));
        }

        let want = HEAD_READ_SIZE.min(max_bytes - buf.len());
        let n = match reader.read(&mut chunk[..want]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(EngineError::from_socket(e, timeout_secs)),
        };
        if n == 0 {
            return Err(EngineError::protocol(if buf.is_empty() {
                "connection closed without a response".to_string()
            } else {
                "connection closed before end of headers".to_string()
            }));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[derive(Debug)]
enum Framing {
    Length { remaining: u64 },
    Chunked { remaining: u64, done: bool },
    UntilClose,
}

/// Body of a response, framed per its head
pub struct BodyReader<R: Read> {
    inner: BufReader<Chain<Cursor<Vec<u8>>, R>>,
    framing: Framing,
}

impl<R: Read> BodyReader<R> {
    pub fn new(head: &ResponseHead, leftover: Vec<u8>, stream: R) -> Self {
        let framing = if head.is_chunked() {
            Framing::Chunked {
                remaining: 0,
                done: false,
            }
        } else if let Some(len) = head.content_length() {
            Framing::Length { remaining: len }
        } else {
            Framing::UntilClose
        };

        Self {
            inner: BufReader::new(Cursor::new(leftover).chain(stream)),
            framing,
        }
    }

    /// Whether the framed body was fully consumed (always false for read-until-close
    /// bodies until EOF has been observed by the caller)
    pub fn is_complete(&self) -> bool {
        match self.framing {
            Framing::Length { remaining } => remaining == 0,
            Framing::Chunked { done, .. } => done,
            Framing::UntilClose => false,
        }
    }

    /// Give back the underlying stream (drops any buffered bytes)
    pub fn into_inner(self) -> R {
        self.inner.into_inner().into_inner().1
    }

    fn read_chunk_size(&mut self) -> io::Result<u64> {
        let mut line = String::new();
        if self.inner.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunked body ended before size line",
            ));
        }
        let size = line.trim().split(';').next().unwrap_or("").trim();
        u64::from_str_radix(size, 16).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, format!("bad chunk size {:?}", size))
        })
    }

    fn skip_crlf(&mut self) -> io::Result<()> {
        let mut crlf = [0u8; 2];
        self.inner.read_exact(&mut crlf)?;
        if &crlf != b"\r\n" {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "missing chunk terminator"));
        }
        Ok(())
    }

    fn skip_trailers(&mut self) -> io::Result<()> {
        loop {
            let mut line = String::new();
            if self.inner.read_line(&mut line)? == 0 || line.trim().is_empty() {
                return Ok(());
            }
        }
    }
}

impl<R: Read> Read for BodyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.framing {
            Framing::UntilClose => self.inner.read(buf),
            Framing::Length { remaining } => {
                if remaining == 0 {
                    return Ok(0);
                }
                let want = (buf.len() as u64).min(remaining) as usize;
                let n = self.inner.read(&mut buf[..want])?;
                self.framing = Framing::Length {
                    remaining: remaining - n as u64,
                };
                Ok(n)
            }
            Framing::Chunked { done: true, .. } => Ok(0),
            Framing::Chunked { mut remaining, .. } => {
                if remaining == 0 {
                    remaining = self.read_chunk_size()?;
                    if remaining == 0 {
                        self.skip_trailers()?;
                        self.framing = Framing::Chunked {
                            remaining: 0,
                            done: true,
                        };
                        return Ok(0);
                    }
                }
                let want = (buf.len() as u64).min(remaining) as usize;
                let n = self.inner.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "chunked body ended mid-chunk",
                    ));
                }
                remaining -= n as u64;
                if remaining == 0 {
                    self.skip_crlf()?;
                }
                self.framing = Framing::Chunked {
                    remaining,
                    done: false,
                };
                Ok(n)
            }
        }
    }
}

/// Map a body read error: framing violations are protocol errors, the rest
/// are socket trouble
pub fn body_error(err: io::Error, timeout_secs: u64) -> EngineError {
    if err.kind() == io::ErrorKind::InvalidData {
        EngineError::protocol(err.to_string())
    } else {
        EngineError::from_socket(err, timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head_of(raw: &[u8]) -> (ResponseHead, Vec<u8>) {
        read_head(&mut Cursor::new(raw.to_vec()), 4096, 1).unwrap()
    }

    #[test]
    fn test_parse_status_and_headers() {
        let (head, leftover) = head_of(
            b"HTTP/1.1 200 OK\r\nContent-Type: audio/mpeg; charset=x\r\nContent-Length: 3\r\n\r\nabc",
        );
        assert_eq!(head.status, 200);
        assert_eq!(head.reason, "OK");
        assert_eq!(head.content_type().as_deref(), Some("audio/mpeg"));
        assert_eq!(head.content_length(), Some(3));
        assert_eq!(leftover, b"abc");
    }

    #[test]
    fn test_redirect_detection_uses_status_line() {
        for code in [301, 302, 303, 307, 308] {
            let raw = format!("HTTP/1.1 {} Moved\r\nLocation: /y\r\n\r\n", code);
            let (head, _) = head_of(raw.as_bytes());
            assert!(head.is_redirect());
            assert_eq!(head.location(), Some("/y"));
        }
        // A header *value* mentioning 302 must not count
        let (head, _) = head_of(b"HTTP/1.1 200 OK\r\nX-Note: was 302\r\n\r\n");
        assert!(!head.is_redirect());
    }

    #[test]
    fn test_head_overflow_is_protocol_error() {
        let mut raw = b"HTTP/1.1 200 OK\r\n".to_vec();
        raw.extend(std::iter::repeat(b'a').take(10_000));
        let err = read_head(&mut Cursor::new(raw), 256, 1).err().unwrap();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[test]
    fn test_early_close_is_protocol_error() {
        let err = read_head(&mut Cursor::new(b"HTTP/1.1 200 OK\r\nA: b\r\n".to_vec()), 4096, 1)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Protocol(_)));
        let err = read_head(&mut Cursor::new(Vec::new()), 4096, 1).err().unwrap();
        assert!(matches!(err, EngineError::Protocol(_)));
    }

    #[test]
    fn test_garbage_status_line_rejected() {
        assert!(ResponseHead::parse(b"ICY 200 OK").is_err());
        assert!(ResponseHead::parse(b"HTTP/1.1 abc OK").is_err());
    }

    /// Reader that hands out one byte per call, to split the terminator
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(1);
            self.0.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_terminator_split_across_reads() {
        let raw = b"HTTP/1.0 204 No Content\r\nA: b\r\n\r\nrest".to_vec();
        let (head, leftover) = read_head(&mut Trickle(Cursor::new(raw)), 4096, 1).unwrap();
        assert_eq!(head.status, 204);
        assert!(leftover.is_empty() || leftover == b"r");
    }

    #[test]
    fn test_content_length_body_stops_at_length() {
        let (head, leftover) = head_of(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhel");
        let mut body = BodyReader::new(&head, leftover, Cursor::new(b"loEXTRA".to_vec()));
        let mut out = Vec::new();
        body.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
        assert!(body.is_complete());
    }

    #[test]
    fn test_chunked_body() {
        let (head, leftover) =
            head_of(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n");
        let rest = b"5;ext=1\r\npedia\r\n0\r\nX-Trailer: y\r\n\r\n".to_vec();
        let mut body = BodyReader::new(&head, leftover, Cursor::new(rest));
        let mut out = Vec::new();
        body.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"Wikipedia");
        assert!(body.is_complete());
    }

    #[test]
    fn test_chunked_body_with_bad_size_is_protocol_error() {
        let (head, leftover) =
            head_of(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nZZ\r\nabc\r\n");
        let mut body = BodyReader::new(&head, leftover, Cursor::new(Vec::new()));
        let mut out = Vec::new();
        let err = body.read_to_end(&mut out).unwrap_err();
        assert!(matches!(body_error(err, 1), EngineError::Protocol(_)));
    }

    #[test]
    fn test_until_close_body() {
        let (head, leftover) = head_of(b"HTTP/1.0 200 OK\r\n\r\nab");
        let mut body = BodyReader::new(&head, leftover, Cursor::new(b"cd".to_vec()));
        let mut out = Vec::new();
        body.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcd");
    }
}
