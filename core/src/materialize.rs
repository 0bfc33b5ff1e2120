//! Request materializer.
//!
//! # Design
//! Turns a verb and a `ResolvedRequest` into a `WireRequest`: configured
//! headers first (in order, duplicates kept), then `Content-Type` when one
//! is resolved. POST and PUT get an outbound entity when a body is present;
//! GET, HEAD and DELETE never carry one. Configured cookies are written into
//! the engine's shared jar last, once nothing else can fail. Header names and values are
//! validated here so a bad description fails before any network activity.

use std::sync::Arc;

use ureq::http::{HeaderName, HeaderValue};

use crate::cookie::CookieJar;
use crate::error::{Error, Result};
use crate::http::{Method, WireRequest};
use crate::request::ResolvedRequest;
use crate::to_server::ToServer;

/// Builds wire requests and feeds configured cookies into the shared jar.
#[derive(Debug, Clone)]
pub struct Materializer {
    jar: Arc<CookieJar>,
    body_buffer_limit: usize,
}

impl Materializer {
    pub fn new(jar: Arc<CookieJar>, body_buffer_limit: usize) -> Self {
        Self {
            jar,
            body_buffer_limit,
        }
    }

    pub fn materialize<T, R>(
        &self,
        method: Method,
        request: &ResolvedRequest<T, R>,
    ) -> Result<WireRequest> {
        let uri = request.resolved_uri()?;
        let mut wire = WireRequest::new(method, uri);

        for (name, value) in request.ordered_headers() {
            validate_header(name, value)?;
            wire.add_header(name.as_str(), value.as_str());
        }

        if let Some(content_type) = request.content_type() {
            validate_header("Content-Type", content_type)?;
            wire.add_header("Content-Type", content_type);
        }

        if method.allows_body() && request.body().is_some() {
            wire.set_entity(self.entity(request)?);
        }

        for cookie in request.cookies() {
            self.jar.add(wire.uri(), cookie);
        }

        Ok(wire)
    }

    fn entity<T, R>(&self, request: &ResolvedRequest<T, R>) -> Result<ToServer> {
        let mut to_server = ToServer::new(
            request.content_type().map(str::to_owned),
            self.body_buffer_limit,
        );
        let encoder = request.encoder().ok_or_else(|| {
            Error::configuration(format!(
                "no encoder configured for content type {:?}",
                request.content_type().unwrap_or("<none>")
            ))
        })?;
        encoder(request, &mut to_server)?;
        Ok(to_server)
    }
}

fn validate_header(name: &str, value: &str) -> Result<()> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| Error::configuration(format!("invalid header name {name:?}")))?;
    HeaderValue::from_str(value)
        .map_err(|_| Error::configuration(format!("invalid value for header {name:?}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use crate::dispatch::EncoderTable;
    use crate::request::Cookie;

    type Req = ResolvedRequest<String, String>;

    fn materializer() -> (Materializer, Arc<CookieJar>) {
        let jar = Arc::new(CookieJar::new());
        (Materializer::new(jar.clone(), 1024), jar)
    }

    fn body_of(wire: &mut WireRequest) -> String {
        let mut out = String::new();
        wire.entity_mut().unwrap().open().unwrap().read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn headers_then_content_type_in_order() {
        let (m, _) = materializer();
        let req = Req::builder()
            .uri("https://api.example.com/items")
            .header("Accept", "application/json")
            .header("X-Tag", "one")
            .header("X-Tag", "two")
            .content_type("application/json")
            .build();
        let wire = m.materialize(Method::Get, &req).unwrap();
        let names: Vec<(&str, &str)> = wire
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Accept", "application/json"),
                ("X-Tag", "one"),
                ("X-Tag", "two"),
                ("Content-Type", "application/json"),
            ]
        );
    }

    #[test]
    fn missing_uri_fails_before_anything_else() {
        let (m, jar) = materializer();
        let req = Req::builder().cookie(Cookie::new("a", "1")).build();
        assert!(m.materialize(Method::Get, &req).unwrap_err().is_configuration());
        assert!(jar.is_empty());
    }

    #[test]
    fn invalid_header_is_a_configuration_error() {
        let (m, _) = materializer();
        let req = Req::builder()
            .uri("http://localhost/")
            .header("Bad Header", "x")
            .build();
        assert!(m.materialize(Method::Get, &req).unwrap_err().is_configuration());

        let req = Req::builder()
            .uri("http://localhost/")
            .header("X-Ok", "line\nbreak")
            .build();
        assert!(m.materialize(Method::Get, &req).unwrap_err().is_configuration());
    }

    #[test]
    fn cookies_land_in_the_jar_scoped_to_the_request() {
        let (m, jar) = materializer();
        let req = Req::builder()
            .uri("https://api.example.com/items")
            .cookie(Cookie::new("session", "abc"))
            .build();
        m.materialize(Method::Get, &req).unwrap();
        let items: ureq::http::Uri = "https://api.example.com/items".parse().unwrap();
        assert_eq!(jar.header_value(&items), Some("session=abc".to_string()));
    }

    #[test]
    fn post_and_put_carry_the_body() {
        let (m, _) = materializer();
        let req = Req::builder()
            .uri("http://localhost/items")
            .content_type("text/plain")
            .body("payload")
            .build();
        for method in [Method::Post, Method::Put] {
            let mut wire = m.materialize(method, &req).unwrap();
            assert_eq!(body_of(&mut wire), "payload");
            assert_eq!(wire.entity().unwrap().content_type(), Some("text/plain"));
        }
    }

    #[test]
    fn other_verbs_never_carry_a_body() {
        let (m, _) = materializer();
        let req = Req::builder()
            .uri("http://localhost/items")
            .body("ignored")
            .build();
        for method in [Method::Get, Method::Head, Method::Delete] {
            assert!(m.materialize(method, &req).unwrap().entity().is_none());
        }
    }

    #[test]
    fn post_without_body_has_no_entity() {
        let (m, _) = materializer();
        let req = Req::builder().uri("http://localhost/items").build();
        assert!(m.materialize(Method::Post, &req).unwrap().entity().is_none());
    }

    #[test]
    fn missing_encoder_is_a_configuration_error() {
        let (m, _) = materializer();
        let req = Req::builder()
            .uri("http://localhost/items")
            .encoders(EncoderTable::new())
            .body("x")
            .build();
        assert!(m.materialize(Method::Post, &req).unwrap_err().is_configuration());
    }

    #[test]
    fn failed_encoding_leaves_the_jar_untouched() {
        let (m, jar) = materializer();
        let req = Req::builder()
            .uri("http://localhost/items")
            .cookie(Cookie::new("session", "abc"))
            .encoders(EncoderTable::new())
            .body("x")
            .build();
        assert!(m.materialize(Method::Post, &req).unwrap_err().is_configuration());
        assert!(jar.is_empty());
    }

    #[test]
    fn custom_encoder_writes_the_entity() {
        let (m, _) = materializer();
        let req = Req::builder()
            .uri("http://localhost/items")
            .content_type("application/x-upper")
            .encoder("application/x-upper", |req: &Req, to: &mut ToServer| {
                let text = match req.body() {
                    Some(crate::request::Body::Text(t)) => t.to_uppercase(),
                    _ => String::new(),
                };
                to.to_server_bytes(text.into_bytes());
                Ok(())
            })
            .body("shout")
            .build();
        let mut wire = m.materialize(Method::Put, &req).unwrap();
        assert_eq!(body_of(&mut wire), "SHOUT");
    }
}
