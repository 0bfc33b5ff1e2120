//! Execution backend for declarative HTTP calls.
//!
//! # Overview
//! A caller describes a call once as a [`ResolvedRequest`]: target URI,
//! ordered headers, cookies, credentials, an optional body, and the
//! encoder, parser and action tables that decide how the body is written
//! and how the response is turned into a result. The [`Engine`] issues that
//! description with any of GET, HEAD, POST, PUT or DELETE and returns what
//! the selected action produced.
//!
//! # Design
//! - Pipeline per call: [`Materializer`] builds a [`WireRequest`],
//!   [`AuthContext`] attaches credentials, the [`Transport`] performs the
//!   round trip, and the [`Dispatcher`] picks a parser by content type and
//!   an action by status.
//! - The response is wrapped in a [`FromServer`] that is finished exactly
//!   once, whatever the parser or action did.
//! - Calls are blocking. An `Engine` is `Send + Sync`; run calls on your own
//!   threads to get concurrency.
//! - `ureq` is the default transport; tests swap in scripted ones.

pub mod auth;
pub mod config;
pub mod cookie;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod from_server;
pub mod handlers;
pub mod http;
pub mod materialize;
pub mod request;
pub mod to_server;
pub mod transport;

pub use auth::{AuthContext, AuthScope};
pub use config::EngineConfig;
pub use cookie::CookieJar;
pub use dispatch::{ActionTable, Dispatcher, EncoderTable, ParserTable, StatusClass};
pub use engine::Engine;
pub use error::{Error, Result};
pub use from_server::FromServer;
pub use handlers::Content;
pub use http::{Method, RawEntity, RawResponse, WireRequest};
pub use materialize::Materializer;
pub use request::{
    AuthCredential, AuthType, Body, Cookie, CredentialScope, RequestBuilder, ResolvedRequest,
};
pub use to_server::ToServer;
pub use transport::{Transport, UreqTransport};
