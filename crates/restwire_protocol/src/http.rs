//! HTTP request and response descriptions.
//!
//! These types describe a wire exchange without performing it. The
//! transport implementor (behind the `Transport` trait in
//! `restwire_client`) turns a [`WireRequest`] into an actual HTTP call.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known header names.
pub mod headers {
    /// `Accept`.
    pub const ACCEPT: &str = "Accept";
    /// `Accept-Charset`.
    pub const ACCEPT_CHARSET: &str = "Accept-Charset";
    /// `User-Agent`.
    pub const USER_AGENT: &str = "User-Agent";
    /// `Content-Type`.
    pub const CONTENT_TYPE: &str = "Content-Type";
    /// `If-Match` (etag precondition).
    pub const IF_MATCH: &str = "If-Match";
    /// `ETag`.
    pub const ETAG: &str = "ETag";
    /// `Location` (identity of a created resource).
    pub const LOCATION: &str = "Location";
    /// `DataServiceVersion` (negotiated protocol version).
    pub const DATA_SERVICE_VERSION: &str = "DataServiceVersion";
}

/// HTTP method of a wire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    /// Read.
    Get,
    /// Insert (also the `$batch` envelope).
    Post,
    /// Partial update.
    Patch,
    /// Full replace (and link setting via `$ref`).
    Put,
    /// Delete.
    Delete,
}

impl Method {
    /// Returns the wire token for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Returns true if requests with this method carry a body.
    pub fn has_body(&self) -> bool {
        matches!(self, Method::Post | Method::Patch | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, case-insensitive header collection.
///
/// Insertion order is preserved; lookups and replacement compare names
/// case-insensitively, as HTTP requires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header, replacing an existing value with the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Returns the value of a header, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes a header. Returns the previous value, if any.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(idx).1)
    }

    /// Returns true if the header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no headers are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A fully described outbound request.
#[derive(Debug, Clone)]
pub struct WireRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URI.
    pub uri: String,
    /// Request headers.
    pub headers: Headers,
    /// Request body, if the operation carries one.
    pub body: Option<Bytes>,
}

impl WireRequest {
    /// Creates a bodyless request.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Attaches a body.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Returns the body length in bytes.
    pub fn body_len(&self) -> usize {
        self.body.as_ref().map(|b| b.len()).unwrap_or(0)
    }
}

/// A received response.
#[derive(Debug, Clone)]
pub struct WireResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// Response body.
    pub body: Bytes,
}

impl WireResponse {
    /// Creates a response with the given status and no headers or body.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Sets a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Attaches a body.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns the `ETag` header, if present.
    pub fn etag(&self) -> Option<&str> {
        self.headers.get(headers::ETAG)
    }

    /// Returns the `Location` header, if present.
    pub fn location(&self) -> Option<&str> {
        self.headers.get(headers::LOCATION)
    }
}
