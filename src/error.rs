//! Error types for the fetch and download engine
//!
//! Errors are grouped by where they originate (URL parsing, transport,
//! protocol framing, artifact validation, filesystem) so the queue layer can
//! decide what counts as a failure and what is a user cancel.
//!
//! ## Taxonomy
//!
//! | Kind         | Variants                                              |
//! |--------------|-------------------------------------------------------|
//! | `Parse`      | `InvalidUrl`                                          |
//! | `Connect`    | `Connect`, `Network`, `Timeout`                       |
//! | `Protocol`   | `Protocol`, `TooManyRedirects`, `HttpStatus`          |
//! | `Validation` | `Validation`                                          |
//! | `Cancelled`  | `Cancelled`                                           |
//! | `Io`         | `Io`, `Helper`, `InvalidInput`, `Config`, `Json`      |
//!
//! Nothing in the transport layer retries. A failed queue item stays visible
//! as `Failed` and is retried the next time its queue is started.

use thiserror::Error;

/// Result type alias using our EngineError type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Coarse classification used for accounting and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Connect,
    Protocol,
    Validation,
    Cancelled,
    Io,
}

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== URL Errors =====

    /// URL could not be split into host/port/path
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // ===== Transport Errors =====

    /// DNS resolution, TCP connect or TLS handshake failed
    #[error("Connection to {host}:{port} failed: {message}")]
    Connect {
        host: String,
        port: u16,
        message: String,
    },

    /// Socket failure after the connection was established
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Operation timed out
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // ===== Protocol Errors =====

    /// Missing or garbled status line / header block
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Redirect chain exceeded the configured limit
    #[error("Too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    /// Final (post-redirect) response was not a 2xx
    #[error("Server responded with HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    // ===== Artifact Errors =====

    /// Downloaded artifact failed a size, magic-byte or checksum check
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Operation was cancelled by the user
    #[error("Operation cancelled")]
    Cancelled,

    /// External download helper failed
    #[error("Download helper failed: {0}")]
    Helper(String),

    // ===== Input/Configuration Errors =====

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ===== External Library Errors =====

    /// Filesystem I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<::url::ParseError> for EngineError {
    fn from(err: ::url::ParseError) -> Self {
        EngineError::InvalidUrl(err.to_string())
    }
}

impl EngineError {
    /// Create a Connect error for a host/port pair
    pub fn connect<S: Into<String>>(host: &str, port: u16, message: S) -> Self {
        EngineError::Connect {
            host: host.to_string(),
            port,
            message: message.into(),
        }
    }

    /// Create a Network error
    pub fn network<S: Into<String>>(message: S, is_transient: bool) -> Self {
        EngineError::Network {
            message: message.into(),
            is_transient,
        }
    }

    /// Create a Protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        EngineError::Protocol(message.into())
    }

    /// Create a Validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        EngineError::Validation(message.into())
    }

    /// Map a socket-level I/O error, keeping timeouts distinguishable.
    pub fn from_socket(err: std::io::Error, timeout_secs: u64) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                EngineError::Timeout(timeout_secs)
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => EngineError::network(err.to_string(), true),
            _ => EngineError::network(err.to_string(), false),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidUrl(_) => ErrorKind::Parse,
            EngineError::Connect { .. } | EngineError::Network { .. } | EngineError::Timeout(_) => {
                ErrorKind::Connect
            }
            EngineError::Protocol(_)
            | EngineError::TooManyRedirects { .. }
            | EngineError::HttpStatus { .. } => ErrorKind::Protocol,
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Helper(_)
            | EngineError::InvalidInput(_)
            | EngineError::Config(_)
            | EngineError::Io(_)
            | EngineError::Json(_) => ErrorKind::Io,
        }
    }

    /// Check if error is a user-initiated cancel (not a failure for accounting)
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }

    /// Check if error is worth retrying on the next queue start
    ///
    /// Returns `true` for transport trouble, 5xx responses and bad artifacts.
    /// Bad URLs, client errors and cancels are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Connect { .. }
                | EngineError::Network { is_transient: true, .. }
                | EngineError::Timeout(_)
                | EngineError::HttpStatus { status: 500..=599, .. }
                | EngineError::Validation(_)
                | EngineError::Helper(_)
        )
    }

    /// Short message suitable for a toast or the queue's `last_error`
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Connect { host, .. } => {
                format!("Could not reach {}. Check the Wi-Fi connection.", host)
            }
            EngineError::Timeout(secs) => {
                format!("Network timed out after {}s.", secs)
            }
            EngineError::HttpStatus { status: 404, .. } => "File not found on server.".to_string(),
            EngineError::HttpStatus { status, .. } => format!("Server error (HTTP {}).", status),
            EngineError::TooManyRedirects { .. } => "Too many redirects.".to_string(),
            EngineError::Validation(reason) => format!("Downloaded file is invalid: {}", reason),
            EngineError::Cancelled => "Cancelled.".to_string(),
            EngineError::Io(err) => format!("Storage error: {}", err),
            _ => self.to_string(),
        }
    }
}
