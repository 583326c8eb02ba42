//! Handler traits and type erasure.
//!
//! # How async handlers are stored
//!
//! A route holds handlers of *different* closure types, and a registry holds
//! many routes. Rust collections can only hold one concrete type, so each
//! handler is hidden behind a trait object (`dyn ErasedHandler`):
//!
//! ```text
//! async fn get_user(ctx: Context, res: ResponseBuilder) -> Result<Response, Error> { … }
//!        ↓ app.get("/users/:id", get_user)
//! get_user.into_boxed_handler()                    ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_user))                    ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(ctx, res)  at request time          ← one vtable dispatch
//!        ↓
//! Box::pin(async { get_user(ctx, res).await … })   ← BoxFuture
//! ```
//!
//! Error handlers go through the same machinery with their own trait,
//! [`ErrorHandler`]. Middleware lives in [`crate::middleware`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{BoxError, DispatchError};
use crate::response::{IntoResponse, Response, ResponseBuilder};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every erased handler resolves to: an optional returned response, or
/// the error it raised.
pub(crate) type Outcome = Result<Option<Response>, BoxError>;

/// Internal dispatch interface for route handlers.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: Context, res: ResponseBuilder) -> BoxFuture<'static, Outcome>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Internal dispatch interface for error handlers.
#[doc(hidden)]
pub trait ErasedErrorHandler {
    fn call(
        &self,
        error: DispatchError,
        ctx: Context,
        res: ResponseBuilder,
    ) -> BoxFuture<'static, Outcome>;
}

#[doc(hidden)]
pub type BoxedErrorHandler = Arc<dyn ErasedErrorHandler + Send + Sync + 'static>;

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any `async fn` or
/// closure with the shape:
///
/// ```text
/// async fn name(ctx: Context, res: ResponseBuilder) -> Result<impl IntoResponse, E>
/// ```
///
/// where `E` converts into a boxed error (any `std::error::Error`, sabre's
/// [`Error`](crate::Error), or [`DispatchError`]).
pub trait Handler: private::SealedHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every valid error handler:
///
/// ```text
/// async fn name(err: DispatchError, ctx: Context, res: ResponseBuilder)
///     -> Result<impl IntoResponse, E>
/// ```
///
/// An error handler "handles" the error by committing a response, either
/// through `res` or by returning one. Returning `Ok(())` passes the error on
/// to the next error handler.
pub trait ErrorHandler: private::SealedErrorHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_error_handler(self) -> BoxedErrorHandler;
}

/// Because the `Sealed*` traits are private, external crates cannot
/// implement the public handler traits on their own types.
pub(crate) mod private {
    pub trait SealedHandler {}
    pub trait SealedErrorHandler {}
    pub trait SealedMiddleware {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R, E> private::SealedHandler for F
where
    F: Fn(Context, ResponseBuilder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + 'static,
{
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Context, ResponseBuilder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut, R, E> private::SealedErrorHandler for F
where
    F: Fn(DispatchError, Context, ResponseBuilder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + 'static,
{
}

impl<F, Fut, R, E> ErrorHandler for F
where
    F: Fn(DispatchError, Context, ResponseBuilder) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn into_boxed_error_handler(self) -> BoxedErrorHandler {
        Arc::new(FnErrorHandler(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R, E> ErasedHandler for FnHandler<F>
where
    F: Fn(Context, ResponseBuilder) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn call(&self, ctx: Context, res: ResponseBuilder) -> BoxFuture<'static, Outcome> {
        let fut = (self.0)(ctx, res);
        Box::pin(async move { settle(fut.await) })
    }
}

struct FnErrorHandler<F>(F);

impl<F, Fut, R, E> ErasedErrorHandler for FnErrorHandler<F>
where
    F: Fn(DispatchError, Context, ResponseBuilder) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<BoxError> + 'static,
{
    fn call(
        &self,
        error: DispatchError,
        ctx: Context,
        res: ResponseBuilder,
    ) -> BoxFuture<'static, Outcome> {
        let fut = (self.0)(error, ctx, res);
        Box::pin(async move { settle(fut.await) })
    }
}

pub(crate) fn settle<R: IntoResponse, E: Into<BoxError>>(result: Result<R, E>) -> Outcome {
    result.map(IntoResponse::into_response).map_err(Into::into)
}
