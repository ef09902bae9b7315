// MediaFetch - background network fetch and download engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Single-shot GET with redirect following
//!
//! Every request opens a fresh connection with `Connection: close` and
//! `Accept-Encoding: identity`. Redirects are resolved from the head alone;
//! the previous connection is dropped before the next hop is dialled.
//!
//! No retries happen here. Callers that need retry semantics go through a
//! [`DownloadQueue`](crate::download::DownloadQueue).

use crate::config::HttpOptions;
use crate::error::{EngineError, Result};
use crate::http::response::{body_error, read_head, BodyReader, ResponseHead};
use crate::http::transport::Transport;
use crate::http::url::ParsedUrl;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::io::{Read, Write};

/// Body of a small fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub bytes: Vec<u8>,

    /// Media type without parameters, if the server sent one
    pub content_type: Option<String>,

    /// The body was longer than `max_bytes` and was cut
    pub truncated: bool,

    /// URL that actually answered (after redirects)
    pub final_url: String,
}

impl FetchResult {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Decode the body as JSON (API responses)
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        if self.truncated {
            return Err(EngineError::protocol(format!(
                "JSON body from {} exceeded the buffer",
                self.final_url
            )));
        }
        Ok(serde_json::from_slice(&self.bytes)?)
    }
}

/// A response whose head has been read and whose body is ready to stream
pub struct OpenResponse {
    pub url: ParsedUrl,
    pub head: ResponseHead,
    pub body: BodyReader<Transport>,
}

impl OpenResponse {
    /// Fail unless the final status is 2xx
    pub fn require_success(self) -> Result<Self> {
        if self.head.is_success() {
            Ok(self)
        } else {
            Err(EngineError::HttpStatus {
                status: self.head.status,
                url: self.url.to_string(),
            })
        }
    }
}

/// Connect, send the GET and read the head, following redirects.
///
/// At most `opts.max_redirects` requests are made, so a chain of N
/// redirects resolves only when N is below the limit.
pub fn open(url: &str, opts: &HttpOptions) -> Result<OpenResponse> {
    let mut current = url.trim().to_string();
    let mut redirects_left = opts.max_redirects;

    while redirects_left > 0 {
        redirects_left -= 1;

        let parsed = ParsedUrl::parse(&current);
        if !parsed.is_valid() {
            return Err(EngineError::InvalidUrl(current));
        }

        let mut transport = Transport::connect(&parsed, opts)?;
        send_get(&mut transport, &parsed, opts)?;
        let (head, leftover) = read_head(&mut transport, opts.max_header_bytes, opts.io_timeout_secs)?;

        if head.is_redirect() {
            let location = head.location().ok_or_else(|| {
                EngineError::protocol(format!("HTTP {} from {} without Location", head.status, parsed))
            })?;
            let next = resolve_location(&parsed, location)?;
            tracing::debug!(status = head.status, from = %parsed, to = %next, "following redirect");
            // Close this hop before dialling the next one
            drop(transport);
            current = next;
            continue;
        }

        tracing::debug!(url = %parsed, status = head.status, "response head received");
        let body = BodyReader::new(&head, leftover, transport);
        return Ok(OpenResponse {
            url: parsed,
            head,
            body,
        });
    }

    tracing::warn!(url, limit = opts.max_redirects, "redirect limit reached");
    Err(EngineError::TooManyRedirects {
        limit: opts.max_redirects,
    })
}

/// Fetch a small payload (JSON, artwork) into memory.
///
/// At most `max_bytes` of body are kept; size limiting is part of the
/// contract, so callers size the buffer to the content they expect.
/// Reading stops at end of body or when the peer closes.
pub fn fetch(url: &str, max_bytes: usize, opts: &HttpOptions) -> Result<FetchResult> {
    let response = open(url, opts)?.require_success()?;
    let content_type = response.head.content_type();
    let final_url = response.url.to_string();
    let mut body = response.body;

    let initial = response
        .head
        .content_length()
        .map(|len| (len as usize).min(max_bytes))
        .unwrap_or(8 * 1024)
        .min(max_bytes);
    let mut bytes = Vec::with_capacity(initial);

    (&mut body)
        .take(max_bytes as u64)
        .read_to_end(&mut bytes)
        .map_err(|e| body_error(e, opts.io_timeout_secs))?;

    let mut probe = [0u8; 1];
    let truncated = bytes.len() >= max_bytes
        && matches!(body.read(&mut probe), Ok(n) if n > 0);
    if truncated {
        tracing::debug!(url = %final_url, max_bytes, "body truncated to buffer size");
    }

    Ok(FetchResult {
        bytes,
        content_type,
        truncated,
        final_url,
    })
}

/// Expected size and type of a resource, without reading its body
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub final_url: String,
}

/// Metadata request: follow redirects, read the head, hang up.
pub fn probe(url: &str, opts: &HttpOptions) -> Result<ResourceInfo> {
    let response = open(url, opts)?.require_success()?;
    Ok(ResourceInfo {
        status: response.head.status,
        content_length: response.head.content_length(),
        content_type: response.head.content_type(),
        final_url: response.url.to_string(),
    })
}

fn send_get<W: Write>(stream: &mut W, url: &ParsedUrl, opts: &HttpOptions) -> Result<()> {
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nAccept-Encoding: identity\r\nConnection: close\r\n\r\n",
        url.path,
        url.host_header(),
        opts.user_agent
    );
    stream
        .write_all(request.as_bytes())
        .and_then(|_| stream.flush())
        .map_err(|e| EngineError::from_socket(e, opts.io_timeout_secs))
}

/// Resolve a `Location` value against the URL that produced it
pub fn resolve_location(base: &ParsedUrl, location: &str) -> Result<String> {
    let location = location.trim();
    if location.is_empty() {
        return Err(EngineError::protocol("empty Location header"));
    }
    let base = ::url::Url::parse(&base.to_string())?;
    let next = base.join(location)?;
    match next.scheme() {
        "http" | "https" => Ok(next.to_string()),
        other => Err(EngineError::protocol(format!(
            "redirect to unsupported scheme {:?}",
            other
        ))),
    }
}
