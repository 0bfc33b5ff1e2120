//! Inbound response adapter.
//!
//! # Design
//! `FromServer` normalizes a `RawResponse`: status, reason, ordered headers,
//! the URI of the request it answers and a single-use body stream. The stream is
//! opened eagerly when the adapter is built. `finish` drains whatever is
//! left so the connection can go back to the pool; it runs at most once,
//! and `Drop` runs it if nobody did.

use std::fmt;
use std::io::{self, Read};

use ureq::http::Uri;

use crate::dispatch::content_type_key;
use crate::error::{Error, Result};
use crate::http::{find_header, Method, RawResponse};

/// Response view handed to parsers and actions.
pub struct FromServer {
    method: Method,
    status: u16,
    message: String,
    headers: Vec<(String, String)>,
    uri: Uri,
    has_body: bool,
    body: Option<Box<dyn Read>>,
    finished: bool,
}

impl FromServer {
    /// Captures the response and opens its entity stream, if any.
    pub fn new(method: Method, uri: Uri, raw: RawResponse) -> Result<Self> {
        let RawResponse {
            status,
            reason,
            headers,
            entity,
        } = raw;

        let body = match entity {
            Some(entity) => Some(entity.open().map_err(Error::transport)?),
            None => None,
        };

        let message = reason.unwrap_or_else(|| {
            ureq::http::StatusCode::from_u16(status)
                .ok()
                .and_then(|code| code.canonical_reason())
                .unwrap_or_default()
                .to_string()
        });

        Ok(Self {
            method,
            status,
            message,
            headers,
            uri,
            has_body: body.is_some(),
            body,
            finished: false,
        })
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Reason phrase, or the canonical one for the status.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Normalized media type, without parameters.
    pub fn media_type(&self) -> Option<String> {
        self.content_type().map(content_type_key)
    }

    /// `charset` parameter of the content type, if declared.
    pub fn charset(&self) -> Option<&str> {
        self.content_type()?
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"'))
    }

    /// URI of the request this response answers.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Whether the response carried an entity, even an empty one.
    pub fn has_body(&self) -> bool {
        self.has_body
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Discards remaining entity content and releases the stream. Never
    /// fails; repeated calls do nothing.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(mut body) = self.body.take() {
            let _ = io::copy(&mut body, &mut io::sink());
        }
    }
}

/// Reads the entity; yields nothing once finished or when there is none.
impl Read for FromServer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.body.as_mut() {
            Some(body) => body.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for FromServer {
    fn drop(&mut self) {
        self.finish();
    }
}

impl fmt::Debug for FromServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FromServer")
            .field("status", &self.status)
            .field("message", &self.message)
            .field("headers", &self.headers)
            .field("uri", &self.uri)
            .field("has_body", &self.has_body)
            .field("finished", &self.finished)
            .finish()
    }
}
