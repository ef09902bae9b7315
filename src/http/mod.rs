//! Hand-framed HTTP/1.1 GET client
//!
//! - [`url`] splits a URL into host/port/path
//! - [`transport`] opens a plain or TLS stream and closes it on drop
//! - [`response`] parses the head and frames the body
//! - [`fetch`] ties them together with bounded redirect following

pub mod url;
pub mod transport;
pub mod response;
pub mod fetch;

pub use fetch::{fetch, open, probe, FetchResult, OpenResponse, ResourceInfo};
pub use response::ResponseHead;
pub use url::ParsedUrl;
