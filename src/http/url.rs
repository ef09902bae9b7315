//! Structural URL splitting
//!
//! Only what a GET needs: secure flag, host, port, request path. No
//! percent-decoding and no validation beyond structure. Malformed input
//! produces an empty host, which the fetcher refuses to connect to.

use std::fmt;

const HTTP_PREFIX: &str = "http://";
const HTTPS_PREFIX: &str = "https://";

/// A URL split into the pieces a request needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// `https://` scheme
    pub is_secure: bool,

    /// Host name or IP literal, without IPv6 brackets
    pub host: String,

    /// Explicit port, or 80/443 by scheme
    pub port: u16,

    /// Request target; always starts with `/`, query included, fragment dropped
    pub path: String,
}

impl ParsedUrl {
    /// Split `url` into its parts. Never fails; check [`ParsedUrl::is_valid`].
    pub fn parse(url: &str) -> Self {
        let url = url.trim();
        let (is_secure, rest) = if let Some(rest) = strip_prefix_ci(url, HTTPS_PREFIX) {
            (true, rest)
        } else if let Some(rest) = strip_prefix_ci(url, HTTP_PREFIX) {
            (false, rest)
        } else {
            return Self::malformed(false);
        };
        let default_port = if is_secure { 443 } else { 80 };

        let authority_end = rest.find(|c: char| c == '/' || c == '?' || c == '#').unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);

        let tail = match tail.find('#') {
            Some(idx) => &tail[..idx],
            None => tail,
        };
        let path = if tail.is_empty() {
            "/".to_string()
        } else if tail.starts_with('/') {
            tail.to_string()
        } else {
            format!("/{}", tail)
        };

        // userinfo is not supported; drop it rather than treat it as host
        let authority = match authority.rfind('@') {
            Some(idx) => &authority[idx + 1..],
            None => authority,
        };

        let (host, port) = match split_host_port(authority) {
            Some((host, Some(port))) => match port.parse::<u16>() {
                Ok(port) if port != 0 => (host, port),
                _ => return Self::malformed(is_secure),
            },
            Some((host, None)) => (host, default_port),
            None => return Self::malformed(is_secure),
        };

        Self {
            is_secure,
            host: host.to_string(),
            port,
            path,
        }
    }

    fn malformed(is_secure: bool) -> Self {
        Self {
            is_secure,
            host: String::new(),
            port: if is_secure { 443 } else { 80 },
            path: "/".to_string(),
        }
    }

    /// Structurally usable (non-empty host)
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty()
    }

    pub fn default_port(&self) -> u16 {
        if self.is_secure {
            443
        } else {
            80
        }
    }

    /// Value for the `Host` header; port only when non-default
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.default_port() {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_secure {
            "https"
        } else {
            "http"
        }
    }
}

impl fmt::Display for ParsedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme(), self.host_header(), self.path)
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s.is_char_boundary(prefix.len()) {
        let (head, tail) = s.split_at(prefix.len());
        if head.eq_ignore_ascii_case(prefix) {
            return Some(tail);
        }
    }
    None
}

/// `host`, `host:port`, `[v6]`, `[v6]:port`. None when the host part is empty.
fn split_host_port(authority: &str) -> Option<(&str, Option<&str>)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let close = rest.find(']')?;
        let host = &rest[..close];
        let after = &rest[close + 1..];
        if host.is_empty() {
            return None;
        }
        return match after.strip_prefix(':') {
            Some(port) => Some((host, Some(port))),
            None if after.is_empty() => Some((host, None)),
            None => None,
        };
    }

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    };
    if host.is_empty() || host.contains(':') {
        return None;
    }
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_port_and_path() {
        let parsed = ParsedUrl::parse("http://example.com");
        assert!(!parsed.is_secure);
        assert_eq!(parsed.host, "example.com");
        assert_eq!(parsed.port, 80);
        assert_eq!(parsed.path, "/");

        let parsed = ParsedUrl::parse("https://example.com/feeds/show.xml");
        assert!(parsed.is_secure);
        assert_eq!(parsed.port, 443);
        assert_eq!(parsed.path, "/feeds/show.xml");
    }

    #[test]
    fn test_explicit_port_overrides_default() {
        let parsed = ParsedUrl::parse("https://radio.local:8443/stream");
        assert_eq!(parsed.host, "radio.local");
        assert_eq!(parsed.port, 8443);
        assert_eq!(parsed.path, "/stream");
        assert_eq!(parsed.host_header(), "radio.local:8443");
    }

    #[test]
    fn test_query_without_path() {
        let parsed = ParsedUrl::parse("http://api.example.com?q=news#top");
        assert_eq!(parsed.host, "api.example.com");
        assert_eq!(parsed.path, "/?q=news");
    }

    #[test]
    fn test_ipv6_literal() {
        let parsed = ParsedUrl::parse("http://[::1]:8080/x");
        assert_eq!(parsed.host, "::1");
        assert_eq!(parsed.port, 8080);
        assert_eq!(parsed.host_header(), "[::1]:8080");
    }

    #[test]
    fn test_malformed_yields_empty_host() {
        assert!(!ParsedUrl::parse("ftp://example.com/file").is_valid());
        assert!(!ParsedUrl::parse("http://").is_valid());
        assert!(!ParsedUrl::parse("http:///path").is_valid());
        assert!(!ParsedUrl::parse("http://host:99999/").is_valid());
        assert!(!ParsedUrl::parse("http://host:abc/").is_valid());
        assert!(!ParsedUrl::parse("example.com/x").is_valid());
    }

    #[test]
    fn test_roundtrip_for_common_shapes() {
        for (url, host, port, path) in [
            ("http://a.b/c", "a.b", 80, "/c"),
            ("https://a.b:1/", "a.b", 1, "/"),
            ("HTTPS://Cdn.Example.com/ep%201.mp3", "Cdn.Example.com", 443, "/ep%201.mp3"),
            ("http://10.0.0.2:8000/live?x=1", "10.0.0.2", 8000, "/live?x=1"),
        ] {
            let parsed = ParsedUrl::parse(url);
            assert_eq!(parsed.host, host, "{}", url);
            assert_eq!(parsed.port, port, "{}", url);
            assert_eq!(parsed.path, path, "{}", url);
            assert!(parsed.path.starts_with('/'));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ParsedUrl::parse("http://h:81/p").to_string(), "http://h:81/p");
        assert_eq!(ParsedUrl::parse("https://h/p").to_string(), "https://h/p");
    }
}
