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


//! Plain TCP or TLS byte stream
//!
//! One `Transport` per request. Teardown happens in `Drop`, so every exit
//! path of the caller (success, error, redirect hop) closes the socket and
//! the TLS session without repeating cleanup code.
//!
//! # TLS
//! Certificate and hostname verification follow
//! [`HttpOptions::accept_invalid_certs`], which defaults to *off* for
//! compatibility with self-signed streaming endpoints.

use crate::config::HttpOptions;
use crate::error::{EngineError, Result};
use crate::http::url::ParsedUrl;
use native_tls::{TlsConnector, TlsStream};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

/// Connected stream, plain or encrypted
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// Resolve, connect and (for https) handshake
    pub fn connect(url: &ParsedUrl, opts: &HttpOptions) -> Result<Self> {
        if !url.is_valid() {
            return Err(EngineError::InvalidUrl(url.to_string()));
        }

        let tcp = connect_tcp(&url.host, url.port, opts)?;

        if !url.is_secure {
            tracing::debug!(host = %url.host, port = url.port, "connected (plain)");
            return Ok(Transport::Plain(tcp));
        }

        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(opts.accept_invalid_certs)
            .danger_accept_invalid_hostnames(opts.accept_invalid_certs)
            .build()
            .map_err(|e| EngineError::connect(&url.host, url.port, format!("TLS setup: {}", e)))?;

        let stream = connector.connect(&url.host, tcp).map_err(|e| {
            EngineError::connect(&url.host, url.port, format!("TLS handshake: {}", e))
        })?;

        tracing::debug!(host = %url.host, port = url.port, "connected (tls)");
        Ok(Transport::Tls(Box::new(stream)))
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }
}

fn connect_tcp(host: &str, port: u16, opts: &HttpOptions) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| EngineError::connect(host, port, format!("DNS lookup: {}", e)))?
        .collect();

    if addrs.is_empty() {
        return Err(EngineError::connect(host, port, "DNS lookup returned no addresses"));
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, opts.connect_timeout()) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(opts.io_timeout()))
                    .and_then(|_| stream.set_write_timeout(Some(opts.io_timeout())))
                    .map_err(|e| EngineError::connect(host, port, e.to_string()))?;
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    let message = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no address reachable".to_string());
    Err(EngineError::connect(host, port, message))
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(stream) => stream.read(buf),
            Transport::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(stream) => stream.write(buf),
            Transport::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.flush(),
            Transport::Tls(stream) => stream.flush(),
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        match self {
            Transport::Plain(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
            }
            Transport::Tls(stream) => {
                let _ = stream.shutdown();
                let _ = stream.get_ref().shutdown(Shutdown::Both);
            }
        }
        tracing::trace!("transport closed");
    }
}
