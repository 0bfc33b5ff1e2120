//! Native encoders and parsers.
//!
//! Ready-made handlers for the common content types: raw bytes, text and
//! JSON. Parsers produce [`Content`]; encoders work for any request type
//! since they only read the request body.

use std::io::{self, Read, Write};

use serde_json::Value;

use crate::dispatch::{EncoderTable, ParserTable};
use crate::error::{Error, Result};
use crate::from_server::FromServer;
use crate::request::{Body, ResolvedRequest};
use crate::to_server::ToServer;

/// Copies `input` to `output` in chunks. `output` is left open.
pub fn transfer(input: &mut dyn Read, output: &mut dyn Write) -> io::Result<u64> {
    io::copy(input, output)
}

/// Parsed value produced by the native parsers.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Json(Value),
    Bytes(Vec<u8>),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Content::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Text(text) => text.into_bytes(),
            Content::Json(value) => value.to_string().into_bytes(),
            Content::Bytes(bytes) => bytes,
        }
    }
}

/// Sends bytes, text or a stream as-is.
pub fn binary<T, R>(request: &ResolvedRequest<T, R>, to: &mut ToServer) -> Result<()> {
    match request.body() {
        None => Ok(()),
        Some(Body::Bytes(bytes)) => {
            to.to_server_bytes(bytes.clone());
            Ok(())
        }
        Some(Body::Text(text)) => {
            to.to_server_bytes(text.clone().into_bytes());
            Ok(())
        }
        Some(body @ Body::Stream(_)) => Ok(to.to_server(body.reader()?)?),
        Some(Body::Json(_)) => Err(Error::handler(
            "binary encoder cannot send a JSON value; use a JSON content type",
        )),
    }
}

/// Sends text; byte bodies must be valid UTF-8.
pub fn text<T, R>(request: &ResolvedRequest<T, R>, to: &mut ToServer) -> Result<()> {
    match request.body() {
        None => Ok(()),
        Some(Body::Text(text)) => {
            to.to_server_bytes(text.clone().into_bytes());
            Ok(())
        }
        Some(Body::Bytes(bytes)) => {
            std::str::from_utf8(bytes).map_err(Error::handler)?;
            to.to_server_bytes(bytes.clone());
            Ok(())
        }
        Some(Body::Json(Value::String(text))) => {
            to.to_server_bytes(text.clone().into_bytes());
            Ok(())
        }
        Some(Body::Json(value)) => {
            to.to_server_bytes(value.to_string().into_bytes());
            Ok(())
        }
        Some(body @ Body::Stream(_)) => Ok(to.to_server(body.reader()?)?),
    }
}

/// Serializes JSON values; text and bytes are taken as already-encoded JSON.
pub fn json<T, R>(request: &ResolvedRequest<T, R>, to: &mut ToServer) -> Result<()> {
    match request.body() {
        None => Ok(()),
        Some(Body::Json(value)) => {
            to.to_server_bytes(serde_json::to_vec(value).map_err(Error::handler)?);
            Ok(())
        }
        Some(Body::Text(text)) => {
            to.to_server_bytes(text.clone().into_bytes());
            Ok(())
        }
        Some(Body::Bytes(bytes)) => {
            to.to_server_bytes(bytes.clone());
            Ok(())
        }
        Some(body @ Body::Stream(_)) => Ok(to.to_server(body.reader()?)?),
    }
}

impl<T: 'static, R: 'static> EncoderTable<T, R> {
    /// JSON and text content types get their encoders, anything else is
    /// sent as binary.
    pub fn native() -> Self {
        let mut table = Self::new();
        for ct in ["application/json", "text/json", "application/problem+json"] {
            table.insert(ct, json::<T, R>);
        }
        for ct in ["text/plain", "text/html", "text/xml", "text/csv", "application/xml"] {
            table.insert(ct, text::<T, R>);
        }
        table.set_default(binary::<T, R>);
        table
    }
}

/// Reads the entity as UTF-8 text.
pub fn parse_text<R>(_: &ResolvedRequest<Content, R>, from: &mut FromServer) -> Result<Content> {
    let mut buf = Vec::new();
    from.read_to_end(&mut buf)?;
    String::from_utf8(buf).map(Content::Text).map_err(Error::handler)
}

/// Reads the entity as JSON. An empty entity parses as `null`.
pub fn parse_json<R>(_: &ResolvedRequest<Content, R>, from: &mut FromServer) -> Result<Content> {
    let mut buf = Vec::new();
    from.read_to_end(&mut buf)?;
    if buf.iter().all(u8::is_ascii_whitespace) {
        return Ok(Content::Json(Value::Null));
    }
    serde_json::from_slice(&buf).map(Content::Json).map_err(Error::handler)
}

/// Reads the raw entity bytes.
pub fn parse_bytes<R>(_: &ResolvedRequest<Content, R>, from: &mut FromServer) -> Result<Content> {
    let mut buf = Vec::new();
    from.read_to_end(&mut buf)?;
    Ok(Content::Bytes(buf))
}

impl<R: 'static> ParserTable<Content, R> {
    /// Text and JSON content types get their parsers; the default returns
    /// raw bytes.
    pub fn native() -> Self {
        let mut table = Self::new();
        for ct in ["text/plain", "text/html", "text/xml", "text/csv", "application/xml"] {
            table.insert(ct, parse_text::<R>);
        }
        for ct in ["application/json", "text/json", "application/problem+json"] {
            table.insert(ct, parse_json::<R>);
        }
        table.set_default(parse_bytes::<R>);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use ureq::http::Uri;

    use crate::http::{Method, RawResponse};

    type Req = ResolvedRequest<Content, Content>;

    fn encode(req: &Req) -> Result<Vec<u8>> {
        let mut to = ToServer::new(req.content_type().map(str::to_owned), 1024);
        (req.encoder().unwrap())(req, &mut to)?;
        let mut out = Vec::new();
        to.write_to(&mut out)?;
        Ok(out)
    }

    fn response(content_type: &str, body: &str) -> FromServer {
        let uri: Uri = "http://localhost/".parse().unwrap();
        let raw = RawResponse::new(200)
            .with_header("Content-Type", content_type)
            .with_body(body);
        FromServer::new(Method::Get, uri, raw).unwrap()
    }

    fn parse(content_type: &str, body: &str) -> Result<Content> {
        let req = Req::builder().parsers(ParserTable::native()).build();
        let mut from = response(content_type, body);
        let parser = req.parser_for(from.content_type().map(str::to_owned).as_deref()).unwrap().clone();
        parser(&req, &mut from)
    }

    #[test]
    fn transfer_copies_everything() {
        let mut out = Vec::new();
        let n = transfer(&mut Cursor::new(b"abc".to_vec()), &mut out).unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn json_encoder_serializes_values() {
        let req = Req::builder()
            .content_type("application/json")
            .body(serde_json::json!({"a": 1}))
            .build();
        assert_eq!(encode(&req).unwrap(), br#"{"a":1}"#);
    }

    #[test]
    fn text_encoder_rejects_invalid_utf8() {
        let req = Req::builder()
            .content_type("text/plain; charset=utf-8")
            .body(vec![0xff, 0xfe])
            .build();
        assert!(matches!(encode(&req), Err(Error::Handler(_))));
    }

    #[test]
    fn default_encoder_is_binary() {
        let req = Req::builder()
            .content_type("application/octet-stream")
            .body(vec![1u8, 2, 3])
            .build();
        assert_eq!(encode(&req).unwrap(), vec![1, 2, 3]);

        let json = Req::builder()
            .content_type("application/octet-stream")
            .body(serde_json::json!(1))
            .build();
        assert!(encode(&json).is_err());
    }

    #[test]
    fn stream_bodies_pass_through() {
        let req = Req::builder()
            .content_type("text/plain")
            .body(Body::stream(Cursor::new(b"streamed".to_vec())))
            .build();
        assert_eq!(encode(&req).unwrap(), b"streamed");
        assert!(encode(&req).unwrap_err().is_configuration());
    }

    #[test]
    fn native_parsers_by_content_type() {
        assert_eq!(
            parse("application/json; charset=utf-8", r#"{"ok":true}"#).unwrap(),
            Content::Json(serde_json::json!({"ok": true}))
        );
        assert_eq!(
            parse("text/plain", "hello").unwrap(),
            Content::Text("hello".to_string())
        );
        assert_eq!(
            parse("image/png", "\u{1}\u{2}").unwrap(),
            Content::Bytes(vec![1, 2])
        );
    }

    #[test]
    fn empty_json_entity_is_null() {
        assert_eq!(parse("application/json", "").unwrap(), Content::Json(Value::Null));
    }

    #[test]
    fn malformed_json_is_a_handler_error() {
        assert!(matches!(parse("application/json", "{nope"), Err(Error::Handler(_))));
    }
}
