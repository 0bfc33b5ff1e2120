//! Parser/action selection and invocation.
//!
//! # Design
//! Selection is table driven. Parsers and encoders are keyed by the
//! normalized content type (lowercased, parameters such as `charset`
//! dropped) with an optional default. Actions are keyed by exact status,
//! then by status class, then by an optional default. A lookup that finds
//! nothing surfaces as `Error::Dispatch`.
//!
//! `Dispatcher::dispatch` owns the response adapter for the whole
//! parse/act sequence and finishes it on every exit path.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;
use ureq::http::Uri;

use crate::error::{Error, Result};
use crate::from_server::FromServer;
use crate::http::{Method, RawResponse};
use crate::request::ResolvedRequest;
use crate::to_server::ToServer;

/// Writes the request body into the outbound adapter.
pub type Encoder<T, R> =
    Arc<dyn Fn(&ResolvedRequest<T, R>, &mut ToServer) -> Result<()> + Send + Sync>;

/// Turns the response entity into a parsed value.
pub type Parser<T, R> =
    Arc<dyn Fn(&ResolvedRequest<T, R>, &mut FromServer) -> Result<T> + Send + Sync>;

/// Produces the call result from the response and its parsed value, if any.
pub type Action<T, R> = Arc<dyn Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync>;

/// Lookup key for a content type: `"Application/JSON; charset=UTF-8"`
/// becomes `"application/json"`.
pub fn content_type_key(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Content-type keyed table with a default fallback.
pub struct ContentTable<F: ?Sized> {
    entries: HashMap<String, Arc<F>>,
    default: Option<Arc<F>>,
}

impl<F: ?Sized> ContentTable<F> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            default: None,
        }
    }

    pub fn insert_arc(&mut self, content_type: &str, handler: Arc<F>) {
        self.entries.insert(content_type_key(content_type), handler);
    }

    pub fn set_default_arc(&mut self, handler: Arc<F>) {
        self.default = Some(handler);
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Exact match on the normalized key, otherwise the default.
    pub fn find(&self, content_type: Option<&str>) -> Option<&Arc<F>> {
        content_type
            .and_then(|ct| self.entries.get(&content_type_key(ct)))
            .or(self.default.as_ref())
    }
}

impl<F: ?Sized> Default for ContentTable<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> Clone for ContentTable<F> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            default: self.default.clone(),
        }
    }
}

impl<F: ?Sized> fmt::Debug for ContentTable<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("ContentTable")
            .field("keys", &keys)
            .field("default", &self.default.is_some())
            .finish()
    }
}

pub type EncoderTable<T, R> =
    ContentTable<dyn Fn(&ResolvedRequest<T, R>, &mut ToServer) -> Result<()> + Send + Sync>;

pub type ParserTable<T, R> =
    ContentTable<dyn Fn(&ResolvedRequest<T, R>, &mut FromServer) -> Result<T> + Send + Sync>;

impl<T, R> EncoderTable<T, R> {
    pub fn insert<F>(&mut self, content_type: &str, encoder: F)
    where
        F: Fn(&ResolvedRequest<T, R>, &mut ToServer) -> Result<()> + Send + Sync + 'static,
    {
        self.insert_arc(content_type, Arc::new(encoder));
    }

    pub fn set_default<F>(&mut self, encoder: F)
    where
        F: Fn(&ResolvedRequest<T, R>, &mut ToServer) -> Result<()> + Send + Sync + 'static,
    {
        self.set_default_arc(Arc::new(encoder));
    }
}

impl<T, R> ParserTable<T, R> {
    pub fn insert<F>(&mut self, content_type: &str, parser: F)
    where
        F: Fn(&ResolvedRequest<T, R>, &mut FromServer) -> Result<T> + Send + Sync + 'static,
    {
        self.insert_arc(content_type, Arc::new(parser));
    }

    pub fn set_default<F>(&mut self, parser: F)
    where
        F: Fn(&ResolvedRequest<T, R>, &mut FromServer) -> Result<T> + Send + Sync + 'static,
    {
        self.set_default_arc(Arc::new(parser));
    }
}

/// Status code family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
}

impl StatusClass {
    pub fn of(status: u16) -> Option<StatusClass> {
        match status {
            100..=199 => Some(StatusClass::Informational),
            200..=299 => Some(StatusClass::Success),
            300..=399 => Some(StatusClass::Redirection),
            400..=499 => Some(StatusClass::ClientError),
            500..=599 => Some(StatusClass::ServerError),
            _ => None,
        }
    }
}

/// Status keyed action table: exact code, then class, then default.
pub struct ActionTable<T, R> {
    exact: HashMap<u16, Action<T, R>>,
    classes: HashMap<StatusClass, Action<T, R>>,
    default: Option<Action<T, R>>,
}

impl<T, R> ActionTable<T, R> {
    pub fn new() -> Self {
        Self {
            exact: HashMap::new(),
            classes: HashMap::new(),
            default: None,
        }
    }

    pub fn insert<F>(&mut self, status: u16, action: F)
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        self.exact.insert(status, Arc::new(action));
    }

    pub fn insert_class<F>(&mut self, class: StatusClass, action: F)
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        self.classes.insert(class, Arc::new(action));
    }

    /// Registers `action` for every status below 400.
    pub fn on_success<F>(&mut self, action: F)
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        let action: Action<T, R> = Arc::new(action);
        for class in [
            StatusClass::Informational,
            StatusClass::Success,
            StatusClass::Redirection,
        ] {
            self.classes.insert(class, action.clone());
        }
    }

    /// Registers `action` for every status from 400 up.
    pub fn on_failure<F>(&mut self, action: F)
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        let action: Action<T, R> = Arc::new(action);
        for class in [StatusClass::ClientError, StatusClass::ServerError] {
            self.classes.insert(class, action.clone());
        }
    }

    pub fn set_default<F>(&mut self, action: F)
    where
        F: Fn(&FromServer, Option<T>) -> Result<R> + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(action));
    }

    pub fn find(&self, status: u16) -> Option<&Action<T, R>> {
        self.exact
            .get(&status)
            .or_else(|| StatusClass::of(status).and_then(|class| self.classes.get(&class)))
            .or(self.default.as_ref())
    }
}

impl<T, R> Default for ActionTable<T, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> fmt::Debug for ActionTable<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<&u16> = self.exact.keys().collect();
        codes.sort();
        f.debug_struct("ActionTable")
            .field("exact", &codes)
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("default", &self.default.is_some())
            .finish()
    }
}

/// Response handling callback run inside a round trip.
pub struct Dispatcher<'a, T, R> {
    request: &'a ResolvedRequest<T, R>,
}

impl<'a, T, R> Dispatcher<'a, T, R> {
    pub fn new(request: &'a ResolvedRequest<T, R>) -> Self {
        Self { request }
    }

    /// Adapts `raw`, parses its entity when present and runs the action
    /// selected by status. The adapter is finished before returning, whether
    /// or not parsing or the action failed.
    pub fn dispatch(&self, method: Method, uri: &Uri, raw: RawResponse) -> Result<R> {
        let mut response = FromServer::new(method, uri.clone(), raw)?;
        let result = self.parse_and_act(&mut response);
        response.finish();
        result
    }

    fn parse_and_act(&self, response: &mut FromServer) -> Result<R> {
        let status = response.status_code();
        let content_type = response.content_type().map(str::to_owned);

        let parser = self.request.parser_for(content_type.as_deref()).cloned();
        let action = self
            .request
            .action_for(status)
            .cloned()
            .ok_or_else(|| Error::dispatch(format!("no action configured for status {status}")))?;

        let parsed = if response.has_body() {
            let parser = parser.ok_or_else(|| {
                Error::dispatch(format!(
                    "no parser configured for content type {:?}",
                    content_type.as_deref().unwrap_or("<none>")
                ))
            })?;
            debug!(status, content_type = ?content_type, "parsing response entity");
            Some(parser(self.request, response)?)
        } else {
            None
        };

        action(response, parsed)
    }
}
