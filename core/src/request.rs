//! Resolved request description.
//!
//! # Design
//! `ResolvedRequest` is the fully merged, read-only configuration of a call:
//! target URI, ordered headers, cookies, credential, body and the
//! content-type/status keyed dispatch tables. It is `Send + Sync` and meant
//! to be built once and shared (usually behind `Arc`) by every call that
//! uses it. `T` is the parsed value produced by parsers, `R` is the result
//! produced by actions.

use std::fmt;
use std::io::{Cursor, Read};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use ureq::http::Uri;

use crate::dispatch::{
    Action, ActionTable, Encoder, EncoderTable, Parser, ParserTable, StatusClass,
};
use crate::error::{Error, Result};
use crate::from_server::FromServer;
use crate::to_server::{Source, ToServer};

/// A cookie configured on the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Defaults to the request host.
    pub domain: Option<String>,
    /// Defaults to the request path.
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            secure: false,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }
}

/// Authentication scheme of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Basic,
    Digest,
}

/// Where a credential may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialScope {
    /// Only the host and port of the request URI.
    #[default]
    Target,
    /// Any host, any port. Opt-in only.
    Any,
}

/// Username/password credential attached to a request.
#[derive(Debug)]
pub struct AuthCredential {
    kind: AuthType,
    user: String,
    password: SecretString,
    scope: CredentialScope,
}

impl AuthCredential {
    pub fn new(kind: AuthType, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            kind,
            user: user.into(),
            password: SecretString::from(password.into()),
            scope: CredentialScope::Target,
        }
    }

    pub fn basic(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(AuthType::Basic, user, password)
    }

    pub fn digest(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(AuthType::Digest, user, password)
    }

    /// Relaxes the scope so the credential is offered to any host and port.
    pub fn for_any_host(mut self) -> Self {
        self.scope = CredentialScope::Any;
        self
    }

    pub fn kind(&self) -> AuthType {
        self.kind
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    pub fn scope(&self) -> CredentialScope {
        self.scope
    }
}

/// Request body as configured; turned into bytes by an encoder.
pub enum Body {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
    /// Single-use stream; the first call that encodes it takes it.
    Stream(Mutex<Option<Source>>),
}

impl Body {
    pub fn stream(reader: impl Read + Send + Sync + 'static) -> Self {
        Body::Stream(Mutex::new(Some(Box::new(reader))))
    }

    /// Raw byte source for this body. Json is serialized compactly.
    pub fn reader(&self) -> Result<Source> {
        match self {
            Body::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            Body::Text(text) => Ok(Box::new(Cursor::new(text.clone().into_bytes()))),
            Body::Json(value) => {
                let encoded = serde_json::to_vec(value).map_err(Error::handler)?;
                Ok(Box::new(Cursor::new(encoded)))
            }
            Body::Stream(slot) => slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or_else(|| Error::configuration("request body stream was already consumed")),
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Json(value) => f.debug_tuple("Json").field(value).finish(),
            Body::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Read-only description of one call.
pub struct ResolvedRequest<T, R> {
    uri: Option<String>,
    headers: Vec<(String, String)>,
    cookies: Vec<Cookie>,
    auth: Option<AuthCredential>,
    content_type: Option<String>,
    body: Option<Body>,
    encoders: EncoderTable<T, R>,
    parsers: ParserTable<T, R>,
    actions: ActionTable<T, R>,
}

impl<T: 'static, R: 'static> ResolvedRequest<T, R> {
    pub fn builder() -> RequestBuilder<T, R> {
        RequestBuilder::new()
    }
}

impl<T, R> ResolvedRequest<T, R> {
    /// Parsed target URI. Only absolute http and https URIs are accepted.
    pub fn resolved_uri(&self) -> Result<Uri> {
        let raw = self
            .uri
            .as_deref()
            .ok_or_else(|| Error::configuration("request URI is not set"))?;
        let uri: Uri = raw
            .parse()
            .map_err(|e| Error::configuration(format!("invalid request URI {raw:?}: {e}")))?;
        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(Error::configuration(format!(
                    "request URI {raw:?} must be absolute http or https"
                )))
            }
        }
        if uri.host().map_or(true, str::is_empty) {
            return Err(Error::configuration(format!("request URI {raw:?} has no host")));
        }
        Ok(uri)
    }

    /// Headers in configuration order; repeated names are kept.
    pub fn ordered_headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn auth(&self) -> Option<&AuthCredential> {
        self.auth.as_ref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Encoder for the resolved content type, falling back to the default.
    pub fn encoder(&self) -> Option<&Encoder<T, R>> {
        self.encoders.find(self.content_type())
    }

    pub fn parser_for(&self, content_type: Option<&str>) -> Option<&Parser<T, R>> {
        self.parsers.find(content_type)
    }

    pub fn action_for(&self, status: u16) -> Option<&Action<T, R>> {
        self.actions.find(status)
    }
}

impl<T, R> fmt::Debug for ResolvedRequest<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedRequest")
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies)
            .field("auth", &self.auth)
            .field("content_type", &self.content_type)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ResolvedRequest`].
pub struct RequestBuilder<T, R> {
    inner: ResolvedRequest<T, R>,
}

impl<T: 'static, R: 'static> Default for RequestBuilder<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static, R: 'static> RequestBuilder<T, R> {
    pub fn new() -> Self {
        Self {
            inner: ResolvedRequest {
                uri: None,
                headers: Vec::new(),
                cookies: Vec::new(),
                auth: None,
                content_type: None,
                body: None,
                encoders: EncoderTable::native(),
                parsers: ParserTable::new(),
                actions: ActionTable::new(),
            },
        }
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.inner.uri = Some(uri.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, cookie: Cookie) -> Self {
        self.inner.cookies.push(cookie);
        self
    }

    pub fn auth(mut self, credential: AuthCredential) -> Self {
        self.inner.auth = Some(credential);
        self
    }

    pub fn basic_auth(self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth(AuthCredential::basic(user, password))
    }

    pub fn digest_auth(self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth(AuthCredential::digest(user, password))
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.inner.content_type = Some(content_type.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.inner.body = Some(body.into());
        self
    }

    pub fn encoders(mut self, encoders: EncoderTable<T, R>) -> Self {
        self.inner.encoders = encoders;
        self
    }

    pub fn encoder<F>(mut self, content_type: &str, encoder: F) -> Self
    where
        F: Fn(&ResolvedRequest<T, R>, &mut ToServer) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.encoders.insert(content_type, encoder);
        self
    }

    pub fn parsers(mut self, parsers: ParserTable<T, R>) -> Self {
        self.inner.parsers = parsers;
        self
    }

    pub fn parser<F>(mut self, content_type: &str, parser: F) -> Self
    where
        F: Fn(&ResolvedRequest<T, R>, &mut FromServer) -> Result<T> + Send + Sync + 'static,
    {
        self.inner.parsers.insert(content_type, parser);
        self
    }

    pub fn default_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&ResolvedRequest<T, R>, &mut FromServer) -> Result<T> + Send + Sync + 'static,
    {
        self.inner.parsers.set_default(parser);
        self
    }

    pub fn actions(mut self, actions: ActionTable<T, R>) -> Self {
        self.inner.actions = actions;
        self
    }

    pub fn action<F>(mut self, status: u16, action: F) -> Self
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        self.inner.actions.insert(status, action);
        self
    }

    pub fn on_class<F>(mut self, class: StatusClass, action: F) -> Self
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        self.inner.actions.insert_class(class, action);
        self
    }

    pub fn on_success<F>(mut self, action: F) -> Self
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        self.inner.actions.on_success(action);
        self
    }

    pub fn on_failure<F>(mut self, action: F) -> Self
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        self.inner.actions.on_failure(action);
        self
    }

    pub fn default_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        self.inner.actions.set_default(action);
        self
    }

    pub fn build(self) -> ResolvedRequest<T, R> {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    type Request = ResolvedRequest<String, String>;

    #[test]
    fn missing_uri_is_a_configuration_error() {
        let err = Request::builder().build().resolved_uri().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn relative_or_foreign_uris_are_rejected() {
        for bad in ["/items", "ftp://example.com/file", "not a uri", "http:///nohost"] {
            let err = Request::builder().uri(bad).build().resolved_uri().unwrap_err();
            assert!(err.is_configuration(), "{bad} should be rejected");
        }
    }

    #[test]
    fn absolute_uri_resolves() {
        let uri = Request::builder()
            .uri("https://api.example.com/items")
            .build()
            .resolved_uri()
            .unwrap();
        assert_eq!(uri.host(), Some("api.example.com"));
        assert_eq!(uri.path(), "/items");
    }

    #[test]
    fn builder_preserves_header_order() {
        let req = Request::builder()
            .header("X-A", "1")
            .header("X-B", "2")
            .header("X-A", "3")
            .build();
        let keys: Vec<&str> = req.ordered_headers().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["X-A", "X-B", "X-A"]);
    }

    #[test]
    fn stream_body_is_single_use() {
        let body = Body::stream(Cursor::new(b"once".to_vec()));
        let mut buf = Vec::new();
        body.reader().unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"once");
        assert!(body.reader().err().unwrap().is_configuration());
    }

    #[test]
    fn json_body_serializes() {
        let body = Body::from(serde_json::json!({"name": "widget"}));
        let mut buf = String::new();
        body.reader().unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, r#"{"name":"widget"}"#);
    }

    #[test]
    fn credential_defaults_to_target_scope() {
        let cred = AuthCredential::basic("u", "p");
        assert_eq!(cred.scope(), CredentialScope::Target);
        assert_eq!(cred.password().expose_secret(), "p");
        assert_eq!(cred.for_any_host().scope(), CredentialScope::Any);
    }

    #[test]
    fn credential_debug_hides_password() {
        let cred = AuthCredential::digest("u", "hunter2");
        assert!(!format!("{cred:?}").contains("hunter2"));
    }

    #[test]
    fn description_is_shareable_across_threads() {
        fn assert_send_sync<S: Send + Sync>() {}
        assert_send_sync::<Request>();
    }
}
