//! Middleware layer.
//!
//! Middleware wraps every route registered after it. It is the right place
//! for cross-cutting concerns: authentication, request ids, tracing, shared
//! validation of a tenant header.
//!
//! A middleware is an async function receiving the [`Context`], the
//! [`ResponseBuilder`] and a [`Next`]. Awaiting [`Next::run`] runs the rest
//! of the chain (later middleware, then the route handler). Not calling it
//! short-circuits: the handler never runs and whatever the middleware
//! committed or returned is the response.
//!
//! ```rust,ignore
//! async fn require_token(
//!     ctx: Context,
//!     res: ResponseBuilder,
//!     next: Next,
//! ) -> Result<(), DispatchError> {
//!     if ctx.header("authorization").is_none() {
//!         res.status(StatusCode::UNAUTHORIZED).text("missing token")?;
//!         return Ok(());
//!     }
//!     next.run().await
//! }
//! ```
//!
//! A middleware registered with [`MiddlewareOptions`] also contributes request
//! schemas and documentation to the routes it wraps, underneath the routes'
//! own.

use std::future::Future;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{BoxError, DispatchError};
use crate::handler::{BoxFuture, BoxedHandler, Outcome, private, settle};
use crate::openapi::DocMetadata;
use crate::response::{IntoResponse, ResponseBuilder};
use crate::schema::RequestSchema;

// ── Type erasure ──────────────────────────────────────────────────────────────

#[doc(hidden)]
pub trait ErasedMiddleware {
    fn call(&self, ctx: Context, res: ResponseBuilder, next: Next) -> BoxFuture<'static, Outcome>;
}

#[doc(hidden)]
pub type BoxedMiddleware = Arc<dyn ErasedMiddleware + Send + Sync + 'static>;

/// Implemented for every valid middleware function:
///
/// ```text
/// async fn name(ctx: Context, res: ResponseBuilder, next: Next) -> Result<impl IntoResponse, E>
/// ```
pub trait Middleware: private::SealedMiddleware + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_middleware(self) -> BoxedMiddleware;
}

impl<F, Fut, R, E> private::SealedMiddleware for F
where
    F: Fn(Context, ResponseBuilder, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + 'static,
{
}

impl<F, Fut, R, E> Middleware for F
where
    F: Fn(Context, ResponseBuilder, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn into_boxed_middleware(self) -> BoxedMiddleware {
        Arc::new(FnMiddleware(self))
    }
}

struct FnMiddleware<F>(F);

impl<F, Fut, R, E> ErasedMiddleware for FnMiddleware<F>
where
    F: Fn(Context, ResponseBuilder, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn call(&self, ctx: Context, res: ResponseBuilder, next: Next) -> BoxFuture<'static, Outcome> {
        let fut = (self.0)(ctx, res, next);
        Box::pin(async move { settle(fut.await) })
    }
}

// ── Entries ───────────────────────────────────────────────────────────────────

/// Schema and documentation a middleware contributes to the routes it wraps.
#[derive(Clone, Debug, Default)]
pub struct MiddlewareOptions {
    pub schema: RequestSchema,
    pub docs: DocMetadata,
}

impl MiddlewareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: RequestSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn docs(mut self, docs: DocMetadata) -> Self {
        self.docs = docs;
        self
    }
}

/// A middleware as stored on a registry stack and captured by routes.
/// Immutable once pushed.
pub(crate) struct MiddlewareEntry {
    pub(crate) handler: BoxedMiddleware,
    pub(crate) options: MiddlewareOptions,
}

/// What a route runs: its middleware snapshot, then its handler.
pub(crate) struct Chain {
    pub(crate) middleware: Vec<Arc<MiddlewareEntry>>,
    pub(crate) handler: BoxedHandler,
}

// ── Next ──────────────────────────────────────────────────────────────────────

/// The rest of the chain.
///
/// `run` consumes `self`, so the downstream chain can run at most once per
/// middleware.
pub struct Next {
    chain: Arc<Chain>,
    index: usize,
    ctx: Context,
    res: ResponseBuilder,
}

impl Next {
    pub(crate) fn new(chain: Arc<Chain>, ctx: Context, res: ResponseBuilder) -> Self {
        Self { chain, index: 0, ctx, res }
    }

    /// Runs the next middleware, or the route handler once the middleware
    /// snapshot is exhausted.
    ///
    /// A response returned by the callee is committed on the builder unless
    /// one was committed already.
    pub async fn run(self) -> Result<(), DispatchError> {
        let Self { chain, index, ctx, res } = self;

        let outcome = match chain.middleware.get(index) {
            Some(entry) => {
                let handler = Arc::clone(&entry.handler);
                let next = Self {
                    chain: Arc::clone(&chain),
                    index: index + 1,
                    ctx: ctx.clone(),
                    res: res.clone(),
                };
                handler.call(ctx, res.clone(), next).await
            }
            None => chain.handler.call(ctx, res.clone()).await,
        };

        match outcome {
            Ok(Some(response)) => {
                res.commit(response);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(DispatchError::from_boxed(e)),
        }
    }
}
