//! # sabre
//!
//! Route registration, middleware composition and request dispatch for HTTP
//! services, with schema-driven validation and API description output.
//!
//! ## The model
//!
//! - An [`App`] is a registry. Routes capture the middleware and error
//!   handlers registered *before* them. Groups nest registries under a path
//!   prefix.
//! - Each request gets a [`Context`] (the request, parsed and validated
//!   lazily, section by section) and a [`ResponseBuilder`] (status, headers,
//!   cookies, then a committed payload).
//! - Middleware runs in registration order and decides whether to call
//!   [`Next::run`]. Failures go to the route's error handlers in order; the
//!   first one to commit a response wins, otherwise the client gets a `500`.
//! - Schemas are opaque [`Schema`] values. A [`Validator`] checks values
//!   against them and describes them for [`App::openapi`]. The default
//!   [`validation::Engines`] understands JSON Schema documents
//!   ([`validation::JsonSchema`]) and parser closures ([`validation::Parser`]).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use sabre::http::{Method, Request, StatusCode};
//! use sabre::validation::JsonSchema;
//! use sabre::{App, Config, Context, Error, ResponseBuilder, Response, Validation, ResponseSchema};
//! use serde_json::json;
//!
//! async fn get_user(ctx: Context, res: ResponseBuilder) -> Result<Response, Error> {
//!     let id = ctx.params()?.get("id").cloned().unwrap_or_default();
//!     res.json(&json!({ "id": id }))
//! }
//!
//! async fn create_user(ctx: Context, res: ResponseBuilder) -> Result<Response, Error> {
//!     let user = ctx.body()?.clone();
//!     res.status(StatusCode::CREATED).header("location", "/users/99")?.json(&user)
//! }
//!
//! # async fn run() -> Result<(), Error> {
//! let mut app = App::with_config(Config::new().with_document(json!({
//!     "openapi": "3.1.0",
//!     "info": { "title": "Users", "version": "1.0.0" },
//! })));
//!
//! let user = JsonSchema::new(json!({ "type": "object", "required": ["name"] }))?;
//! app.get("/users/:id", get_user)?
//!    .route(
//!        Method::POST,
//!        "/users",
//!        create_user,
//!        Validation::new().response(201, ResponseSchema::json(user)),
//!    )?;
//!
//! let document = app.openapi()?;
//! let router = app.into_router()?;
//! let response = router.handle(Request::get("/users/7").body(Default::default()).unwrap()).await?;
//! assert_eq!(response.status(), StatusCode::OK);
//! # let _ = document;
//! # Ok(())
//! # }
//! ```
//!
//! Transports are thin: [`Router`] looks routes up in a radix tree and
//! implements [`hyper::service::Service`], and [`Route::run`] is all an
//! adapter for any other server needs.

mod app;
mod config;
mod context;
mod error;
mod handler;
mod openapi;
mod response;
mod route;
mod router;
mod schema;

pub mod middleware;
pub mod validation;

pub use http;

pub use app::{App, RouteOptions};
pub use config::Config;
pub use context::Context;
pub use error::{BoxError, DispatchError, Error, ValidationError};
pub use handler::{ErrorHandler, Handler};
pub use middleware::{Middleware, MiddlewareOptions, Next};
pub use openapi::{DocMetadata, ExternalDocs};
pub use response::{ContentType, CookieOptions, IntoResponse, Response, ResponseBuilder, SameSite};
pub use route::Route;
pub use router::Router;
pub use schema::{
    BodySchema, RequestSchema, ResponseSchema, Schema, SchemaMap, Validation, Validator,
};
