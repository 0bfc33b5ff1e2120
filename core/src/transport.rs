//! Network engine seam.
//!
//! # Design
//! The engine talks to the network only through [`Transport`]: send one
//! request, get one raw response, and release pooled resources on close.
//! [`UreqTransport`] is the production implementation. Connection pooling,
//! TLS, redirects and timeouts are the ureq agent's business; it is built
//! with `http_status_as_error(false)` so every status reaches dispatch.
//! Repeatable entities are sent with a known length; only bodies too large
//! to buffer are streamed chunked.

use std::sync::{PoisonError, RwLock};

use ureq::http::Request;
use ureq::{Agent, SendBody};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::http::{can_have_entity, Method, RawEntity, RawResponse, WireRequest};

/// Performs blocking round trips for the engine.
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the response with its entity unread.
    fn send(&self, request: &mut WireRequest) -> Result<RawResponse>;

    /// Releases pooled connections. Called once by `Engine::close`.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// [`Transport`] backed by a pooled `ureq::Agent`.
pub struct UreqTransport {
    agent: RwLock<Option<Agent>>,
}

impl UreqTransport {
    pub fn new(config: &EngineConfig) -> Self {
        let capacity = config.pool_capacity();
        let mut builder = Agent::config_builder()
            .http_status_as_error(false)
            .max_idle_connections(capacity)
            .max_idle_connections_per_host(capacity)
            .max_redirects(config.max_redirects)
            .timeout_global(config.timeout());
        if let Some(tls) = &config.tls {
            builder = builder.tls_config(tls.clone());
        }
        Self::from_agent(builder.build().new_agent())
    }

    pub fn from_agent(agent: Agent) -> Self {
        Self {
            agent: RwLock::new(Some(agent)),
        }
    }

    fn agent(&self) -> Result<Agent> {
        self.agent
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::Closed)
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &mut WireRequest) -> Result<RawResponse> {
        let agent = self.agent()?;
        let method = request.method();

        let mut builder = Request::builder()
            .method(method.to_http())
            .uri(request.uri().clone());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // Buffered entities go out with a Content-Length so a server that
        // answers early (a 401 challenge) keeps the connection usable.
        let response = match request.entity_mut() {
            Some(entity) if entity.is_repeatable() => {
                let bytes = entity.buffered().unwrap_or_default();
                let http_request = builder
                    .body(bytes.to_vec())
                    .map_err(|e| Error::configuration(e.to_string()))?;
                agent.run(http_request)?
            }
            Some(entity) => {
                let reader = entity.open()?;
                let http_request = builder
                    .body(SendBody::from_owned_reader(reader))
                    .map_err(|e| Error::configuration(e.to_string()))?;
                agent.run(http_request)?
            }
            None => {
                let http_request = builder
                    .body(())
                    .map_err(|e| Error::configuration(e.to_string()))?;
                agent.run(http_request)?
            }
        };

        Ok(raw_response(method, response))
    }

    fn close(&self) -> Result<()> {
        // Dropping the last agent handle tears down its idle pool.
        self.agent
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

fn raw_response(method: Method, response: ureq::http::Response<ureq::Body>) -> RawResponse {
    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let mut raw = RawResponse::new(status.as_u16());
    raw.reason = status.canonical_reason().map(str::to_string);
    raw.headers = headers;
    if can_have_entity(method, status.as_u16()) {
        raw.entity = Some(RawEntity::from_reader(response.into_body().into_reader()));
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    use crate::to_server::ToServer;

    /// Serves one request and returns its head, lowercased.
    fn capture_one_request() -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                head.push_str(&line.to_ascii_lowercase());
            }
            if head.contains("transfer-encoding: chunked") {
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "0\r\n" {
                        break;
                    }
                }
                reader.read_line(&mut String::new()).unwrap();
            } else if let Some(len) = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|len| len.trim().parse::<usize>().ok())
            {
                let mut body = vec![0u8; len];
                reader.read_exact(&mut body).unwrap();
            }
            let mut stream = stream;
            stream
                .write_all(b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n")
                .unwrap();
            head
        });
        (format!("http://{addr}/upload"), handle)
    }

    fn post_with(uri: &str, buffer_limit: usize) -> WireRequest {
        let mut entity = ToServer::new(Some("text/plain".to_string()), buffer_limit);
        entity
            .to_server(std::io::Cursor::new(b"hello".to_vec()))
            .unwrap();
        let mut request = WireRequest::new(Method::Post, uri.parse().unwrap());
        request.add_header("Content-Type", "text/plain");
        request.set_entity(entity);
        request
    }

    #[test]
    fn buffered_entity_is_sent_with_a_length() {
        let (uri, server) = capture_one_request();
        let transport = UreqTransport::new(&EngineConfig::default());
        let mut request = post_with(&uri, 1024);

        let response = transport.send(&mut request).unwrap();
        assert_eq!(response.status, 204);

        let head = server.join().unwrap();
        assert!(head.contains("content-length: 5"), "{head}");
        assert!(!head.contains("transfer-encoding: chunked"), "{head}");
        assert!(request.is_repeatable());
    }

    #[test]
    fn oversized_entity_is_streamed_chunked() {
        let (uri, server) = capture_one_request();
        let transport = UreqTransport::new(&EngineConfig::default());
        let mut request = post_with(&uri, 2);

        transport.send(&mut request).unwrap();

        let head = server.join().unwrap();
        assert!(head.contains("transfer-encoding: chunked"), "{head}");
        assert!(!request.is_repeatable());
    }

    #[test]
    fn closed_transport_refuses_to_send() {
        let transport = UreqTransport::new(&EngineConfig::default());
        transport.close().unwrap();
        transport.close().unwrap();

        let mut request = WireRequest::new(Method::Get, "http://127.0.0.1:9/".parse().unwrap());
        assert!(matches!(transport.send(&mut request), Err(Error::Closed)));
    }
}
