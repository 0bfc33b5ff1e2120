//! Error types for the call pipeline.
//!
//! # Design
//! Every failure of a call surfaces synchronously to the caller that issued
//! it. `Configuration` aborts before any network activity, `Transport` wraps
//! the I/O cause, and `Dispatch` is raised after the response arrived (the
//! response is still released). Failures raised by caller-supplied encoders,
//! parsers and actions travel unchanged inside `Handler`.

/// Boxed error used as the source of wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by the engine and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The resolved request is missing a required field or holds an invalid
    /// one (URI, header, consumed body stream).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O failure while sending the request or obtaining the response.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// No parser or action resolves for the response and no default exists.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// A caller-supplied encoder, parser or action failed.
    #[error("handler error: {0}")]
    Handler(#[source] BoxError),

    /// The engine was closed before the call was issued.
    #[error("engine is closed")]
    Closed,
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn transport(cause: impl Into<BoxError>) -> Self {
        Error::Transport(cause.into())
    }

    pub fn dispatch(msg: impl Into<String>) -> Self {
        Error::Dispatch(msg.into())
    }

    pub fn handler(cause: impl Into<BoxError>) -> Self {
        Error::Handler(cause.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn is_dispatch(&self) -> bool {
        matches!(self, Error::Dispatch(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(Box::new(err))
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Error::Transport(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn transport_keeps_the_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = Error::from(io);
        assert!(err.is_transport());
        assert_eq!(err.source().unwrap().to_string(), "reset by peer");
        assert_eq!(err.to_string(), "transport error: reset by peer");
    }

    #[test]
    fn handler_accepts_plain_strings() {
        let err = Error::handler("parser exploded");
        assert!(matches!(err, Error::Handler(_)));
        assert_eq!(err.to_string(), "handler error: parser exploded");
    }

    #[test]
    fn configuration_message() {
        let err = Error::configuration("request URI is not set");
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "configuration error: request URI is not set");
    }
}
