//! Outbound body adapter.
//!
//! # Design
//! `ToServer` wraps an arbitrary byte source as the request entity. It reports
//! itself as streaming, not chunked, with an unknown content length. Sources
//! are read into memory only up to `buffer_limit` bytes: a body that fits is
//! kept as `Bytes` and can be sent any number of times (needed when a Digest
//! challenge forces a second round trip). A larger body is streamed from the
//! buffered prefix chained with the rest of the source and is reported as not
//! repeatable; opening it a second time fails.

use std::fmt;
use std::io::{self, Cursor, Read, Write};

use bytes::Bytes;

/// Byte source accepted by the adapter.
pub type Source = Box<dyn Read + Send + Sync + 'static>;

enum Entity {
    Empty,
    Buffered(Bytes),
    Streaming(Source),
    Consumed,
}

/// Request entity handed to the encoder and then to the transport.
pub struct ToServer {
    content_type: Option<String>,
    buffer_limit: usize,
    entity: Entity,
}

impl ToServer {
    pub fn new(content_type: Option<String>, buffer_limit: usize) -> Self {
        Self {
            content_type,
            buffer_limit,
            entity: Entity::Empty,
        }
    }

    /// Installs `source` as the entity content, buffering at most
    /// `buffer_limit` bytes of it.
    pub fn to_server(&mut self, source: impl Read + Send + Sync + 'static) -> io::Result<()> {
        let mut source = source;
        let mut prefix = Vec::new();
        let limit = self.buffer_limit as u64;
        (&mut source).take(limit.saturating_add(1)).read_to_end(&mut prefix)?;

        self.entity = if prefix.len() as u64 <= limit {
            Entity::Buffered(Bytes::from(prefix))
        } else {
            Entity::Streaming(Box::new(Cursor::new(prefix).chain(source)))
        };
        Ok(())
    }

    /// Installs already-materialized bytes; always repeatable.
    pub fn to_server_bytes(&mut self, bytes: impl Into<Bytes>) {
        self.entity = Entity::Buffered(bytes.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Always unknown; the transport determines framing from the stream.
    pub fn content_length(&self) -> Option<u64> {
        None
    }

    pub fn is_streaming(&self) -> bool {
        true
    }

    pub fn is_chunked(&self) -> bool {
        false
    }

    /// True only when the content can really be produced again.
    pub fn is_repeatable(&self) -> bool {
        matches!(self.entity, Entity::Empty | Entity::Buffered(_))
    }

    /// In-memory content of a repeatable entity; `None` once it streams.
    pub fn buffered(&self) -> Option<Bytes> {
        match &self.entity {
            Entity::Empty => Some(Bytes::new()),
            Entity::Buffered(bytes) => Some(bytes.clone()),
            Entity::Streaming(_) | Entity::Consumed => None,
        }
    }

    /// Returns a reader over the content for one send.
    pub fn open(&mut self) -> io::Result<Source> {
        match std::mem::replace(&mut self.entity, Entity::Consumed) {
            Entity::Empty => {
                self.entity = Entity::Empty;
                Ok(Box::new(io::empty()))
            }
            Entity::Buffered(bytes) => {
                self.entity = Entity::Buffered(bytes.clone());
                Ok(Box::new(Cursor::new(bytes)))
            }
            Entity::Streaming(source) => Ok(source),
            Entity::Consumed => Err(io::Error::other(
                "request entity is not repeatable and was already sent",
            )),
        }
    }

    /// Transfers the content to `output`. `output` is neither flushed nor
    /// closed.
    pub fn write_to(&mut self, output: &mut dyn Write) -> io::Result<u64> {
        let mut reader = self.open()?;
        crate::handlers::transfer(&mut reader, output)
    }

    /// Releases the wrapped source without sending it.
    pub fn consume(&mut self) {
        if let Entity::Streaming(_) = self.entity {
            self.entity = Entity::Consumed;
        }
    }
}

impl fmt::Debug for ToServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.entity {
            Entity::Empty => "empty",
            Entity::Buffered(_) => "buffered",
            Entity::Streaming(_) => "streaming",
            Entity::Consumed => "consumed",
        };
        f.debug_struct("ToServer")
            .field("content_type", &self.content_type)
            .field("buffer_limit", &self.buffer_limit)
            .field("entity", &state)
            .finish()
    }
}
