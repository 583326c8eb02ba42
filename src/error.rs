//! Unified error types.
//!
//! Three layers of failure exist and each has its own type:
//!
//! - [`Error`]: anything the crate itself reports, such as setup mistakes
//!   (duplicate routes, mutation after sealing), schema failures, and a failed
//!   error handler surfacing out of [`Route::run`](crate::Route::run).
//! - [`ValidationError`]: produced by a [`Validator`](crate::Validator) when a
//!   value does not match its schema descriptor.
//! - [`DispatchError`]: the type-erased, cloneable error that error handlers
//!   receive. Whatever a middleware or handler returned is wrapped in one.

use std::fmt;
use std::sync::Arc;

use http::Method;

/// Boxed error accepted from user handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by sabre's fallible operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A route with the same method and normalized path is already registered.
    #[error("route {method} {path} already exists")]
    DuplicateRoute { method: Method, path: String },

    /// The registry was sealed (explicitly or by the first dispatch) and can
    /// no longer be changed.
    #[error("registry is sealed: routes, middleware and error handlers can no longer be added")]
    RegistryMutationAfterSeal,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A schema descriptor could not be compiled.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// [`App::openapi`](crate::App::openapi) was called without a document
    /// header object in the [`Config`](crate::Config).
    #[error("no API document header configured")]
    MissingDocument,

    /// The transport adapter could not place a route in its lookup tree.
    #[error("route `{path}` conflicts with an existing route: {reason}")]
    RouteConflict { path: String, reason: String },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The transport failed while the request body was being buffered.
    #[error("reading request body: {0}")]
    Body(#[source] BoxError),

    /// An error handler failed while handling another error. Nothing in this
    /// crate catches it; the transport decides what to do with the request.
    #[error("error handler failed: {0}")]
    Handler(#[source] DispatchError),
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(e: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(e.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(e.to_string())
    }
}

// ── ValidationError ───────────────────────────────────────────────────────────

/// A value failed to validate against its schema descriptor.
///
/// `location` names where the value came from, e.g. `query.page`,
/// `body.application/json` or `response.201.headers.x-request-id`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("validation failed at {location}: {message}")]
pub struct ValidationError {
    location: String,
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { location: String::new(), message: message.into() }
    }

    /// Prefixes the location. Nested callers add the outer segment last.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        let outer = location.into();
        self.location = if self.location.is_empty() {
            outer
        } else {
            format!("{outer}.{}", self.location)
        };
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

// ── DispatchError ─────────────────────────────────────────────────────────────

/// An error raised while a request was being dispatched.
///
/// Error handlers receive this. It is cheap to clone (one `Arc`) and can be
/// inspected with [`downcast_ref`](Self::downcast_ref) or the
/// [`validation`](Self::validation) shortcut.
#[derive(Clone)]
pub struct DispatchError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl DispatchError {
    /// Wraps a boxed error, unwrapping it first if it already is a
    /// `DispatchError` (a middleware propagating `next.run()` with `?`).
    pub(crate) fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<DispatchError>() {
            Ok(inner) => *inner,
            Err(err) => Self(Arc::from(err)),
        }
    }

    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns the validation failure behind this error, if it is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        if let Some(e) = self.downcast_ref::<ValidationError>() {
            return Some(e);
        }
        match self.downcast_ref::<Error>() {
            Some(Error::Validation(e)) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Debug for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<Error> for DispatchError {
    fn from(e: Error) -> Self {
        Self(Arc::new(e))
    }
}

impl From<ValidationError> for DispatchError {
    fn from(e: ValidationError) -> Self {
        Self(Arc::new(e))
    }
}
