//! Wire-level request and response types.
//!
//! # Design
//! `WireRequest` is what the materializer produces and what a `Transport`
//! sends: method, parsed URI, headers in insertion order (duplicates kept)
//! and an optional outbound entity. `RawResponse` is what a transport hands
//! back before the response adapter normalizes it. Both keep headers as
//! owned `(name, value)` pairs so ordering is never lost to a map.

use std::fmt;
use std::io::{self, Read};

use ureq::http::Uri;

use crate::to_server::ToServer;

/// HTTP verb of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Only POST and PUT carry a request entity.
    pub fn allows_body(self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }

    pub(crate) fn to_http(self) -> ureq::http::Method {
        match self {
            Method::Get => ureq::http::Method::GET,
            Method::Head => ureq::http::Method::HEAD,
            Method::Post => ureq::http::Method::POST,
            Method::Put => ureq::http::Method::PUT,
            Method::Delete => ureq::http::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a response to `method` with `status` can carry an entity.
///
/// HEAD responses and 1xx/204/304 statuses never do; any other response has
/// an entity even when it is empty.
pub fn can_have_entity(method: Method, status: u16) -> bool {
    if method == Method::Head {
        return false;
    }
    !((100..200).contains(&status) || status == 204 || status == 304)
}

/// Case-insensitive lookup of the first header named `name`.
pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// A request ready to be sent by a `Transport`.
pub struct WireRequest {
    method: Method,
    uri: Uri,
    headers: Vec<(String, String)>,
    entity: Option<ToServer>,
}

impl WireRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: Vec::new(),
            entity: None,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Headers in the order they were added.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Appends a header; existing headers with the same name are kept.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Replaces every header named `name` with a single value. It takes the
    /// position of the first existing one, or is appended when there is none.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let entry = (name.to_string(), value.into());
        match self.headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(first) => {
                self.headers[first] = entry;
                let mut idx = 0;
                self.headers.retain(|(k, _)| {
                    let keep = idx == first || !k.eq_ignore_ascii_case(name);
                    idx += 1;
                    keep
                });
            }
            None => self.headers.push(entry),
        }
    }

    pub fn entity(&self) -> Option<&ToServer> {
        self.entity.as_ref()
    }

    pub fn entity_mut(&mut self) -> Option<&mut ToServer> {
        self.entity.as_mut()
    }

    pub fn set_entity(&mut self, entity: ToServer) {
        self.entity = Some(entity);
    }

    /// A request without an entity can always be sent again.
    pub fn is_repeatable(&self) -> bool {
        self.entity.as_ref().map_or(true, ToServer::is_repeatable)
    }

    /// Request target as it appears on the request line.
    pub fn request_target(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }
}

impl fmt::Debug for WireRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("entity", &self.entity.is_some())
            .finish()
    }
}

type OpenEntity = Box<dyn FnOnce() -> io::Result<Box<dyn Read>>>;

/// Response entity as produced by a transport; its content stream is
/// obtained once, when the response adapter is built.
pub struct RawEntity(OpenEntity);

impl RawEntity {
    pub fn from_reader(reader: impl Read + 'static) -> Self {
        RawEntity(Box::new(move || Ok(Box::new(reader) as Box<dyn Read>)))
    }

    /// Entity whose stream is produced on demand and may fail to open.
    pub fn deferred(open: impl FnOnce() -> io::Result<Box<dyn Read>> + 'static) -> Self {
        RawEntity(Box::new(open))
    }

    pub(crate) fn open(self) -> io::Result<Box<dyn Read>> {
        (self.0)()
    }
}

/// Response as returned by a transport, before normalization.
pub struct RawResponse {
    pub status: u16,
    pub reason: Option<String>,
    pub headers: Vec<(String, String)>,
    pub entity: Option<RawEntity>,
}

impl RawResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: None,
            headers: Vec::new(),
            entity: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_entity(mut self, entity: RawEntity) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Shorthand for a response whose entity is the given bytes.
    pub fn with_body(self, body: impl Into<Vec<u8>>) -> Self {
        self.with_entity(RawEntity::from_reader(io::Cursor::new(body.into())))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// All values of `name` (case-insensitive), in order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Reads and discards whatever entity content remains.
    pub(crate) fn discard(self) {
        if let Some(entity) = self.entity {
            if let Ok(mut reader) = entity.open() {
                let _ = io::copy(&mut reader, &mut io::sink());
            }
        }
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("entity", &self.entity.is_some())
            .finish()
    }
}
