//! Execution engine.
//!
//! # Design
//! `Engine` owns the network resources of one client: the transport (and
//! with it the connection pool and TLS context) and the cookie jar shared
//! with the materializer. A call is one blocking round trip on the calling
//! thread; concurrency comes from callers running calls on their own
//! threads or task pool against a shared `Engine`.
//!
//! Per call: materialize the request, derive the auth context, merge jar
//! cookies into a single `Cookie` header, send, store `Set-Cookie` headers, answer one Digest challenge
//! when possible, then dispatch. The response is always finished by the
//! dispatcher before `execute` returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, debug_span, warn};

use crate::auth::AuthContext;
use crate::config::EngineConfig;
use crate::cookie::CookieJar;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::http::{Method, RawResponse, WireRequest};
use crate::materialize::Materializer;
use crate::request::ResolvedRequest;
use crate::transport::{Transport, UreqTransport};

pub struct Engine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    cookies: Arc<CookieJar>,
    materializer: Materializer,
    closed: AtomicBool,
}

impl Engine {
    /// Engine backed by a pooled ureq agent.
    pub fn new(config: EngineConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(&config));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: EngineConfig, transport: Arc<dyn Transport>) -> Self {
        let cookies = Arc::new(CookieJar::new());
        let materializer = Materializer::new(cookies.clone(), config.body_buffer_limit);
        Self {
            config,
            transport,
            cookies,
            materializer,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Jar shared by every call issued through this engine.
    pub fn cookie_jar(&self) -> &Arc<CookieJar> {
        &self.cookies
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn get<T, R>(&self, request: &ResolvedRequest<T, R>) -> Result<R> {
        self.call(Method::Get, request)
    }

    pub fn head<T, R>(&self, request: &ResolvedRequest<T, R>) -> Result<R> {
        self.call(Method::Head, request)
    }

    pub fn post<T, R>(&self, request: &ResolvedRequest<T, R>) -> Result<R> {
        self.call(Method::Post, request)
    }

    pub fn put<T, R>(&self, request: &ResolvedRequest<T, R>) -> Result<R> {
        self.call(Method::Put, request)
    }

    pub fn delete<T, R>(&self, request: &ResolvedRequest<T, R>) -> Result<R> {
        self.call(Method::Delete, request)
    }

    /// Materializes `request` for `method` and executes it.
    pub fn call<T, R>(&self, method: Method, request: &ResolvedRequest<T, R>) -> Result<R> {
        self.ensure_open()?;
        let wire = self.materializer.materialize(method, request)?;
        let auth = AuthContext::for_request(request.auth(), wire.uri());
        self.execute(wire, &Dispatcher::new(request), auth)
    }

    /// Runs one round trip for an already materialized request and returns
    /// whatever the selected action produced.
    pub fn execute<T, R>(
        &self,
        mut request: WireRequest,
        dispatcher: &Dispatcher<'_, T, R>,
        auth: AuthContext,
    ) -> Result<R> {
        self.ensure_open()?;
        let span = debug_span!("http_call", method = %request.method(), uri = %request.uri());
        let _entered = span.enter();

        let configured_cookies: Vec<String> = request
            .headers()
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("cookie"))
            .map(|(_, value)| value.clone())
            .collect();
        self.attach_cookies(&mut request, &configured_cookies);
        auth.authorize(&mut request);

        let mut raw = self.round_trip(&mut request)?;
        if let Some(authorization) = auth.answer_challenge(&request, &raw) {
            if request.is_repeatable() {
                debug!("answering digest challenge");
                raw.discard();
                request.set_header("Authorization", authorization);
                self.attach_cookies(&mut request, &configured_cookies);
                raw = self.round_trip(&mut request)?;
            } else {
                warn!("digest challenge left unanswered: request entity is not repeatable");
            }
        }

        debug!(status = raw.status, "dispatching response");
        dispatcher.dispatch(request.method(), request.uri(), raw)
    }

    /// Sends a single `Cookie` header: values the caller configured come
    /// first, then whatever the jar holds for the URI.
    fn attach_cookies(&self, request: &mut WireRequest, configured: &[String]) {
        let mut values = configured.to_vec();
        values.extend(self.cookies.header_value(request.uri()));
        if !values.is_empty() {
            request.set_header("Cookie", values.join("; "));
        }
    }

    fn round_trip(&self, request: &mut WireRequest) -> Result<RawResponse> {
        let raw = self.transport.send(request)?;
        for value in raw.header_values("set-cookie") {
            if !self.cookies.store_set_cookie(request.uri(), value) {
                warn!(cookie = value, "ignoring unusable Set-Cookie header");
            }
        }
        Ok(raw)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Releases the transport. Failures are logged, never returned; later
    /// calls do nothing.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = self.transport.close() {
            warn!(error = %err, "error closing http transport");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("cookies", &self.cookies.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
