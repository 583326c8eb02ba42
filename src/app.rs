//! The route registry.
//!
//! An [`App`] collects routes, middleware and error handlers. Registration
//! order matters: a route captures the middleware and error handlers that
//! were registered *before* it, and later registrations never reach back into
//! routes that already exist.
//!
//! ```rust,ignore
//! let mut app = App::new();
//! app.middleware(request_id)?
//!    .get("/health", health)?
//!    .group("/users", |users| {
//!        users.middleware(require_token)?
//!             .get("/:id", get_user)?
//!             .post("/", create_user)?;
//!        Ok(())
//!    })?;
//! let router = app.into_router()?;
//! ```
//!
//! The registry is open until it is sealed, either explicitly with
//! [`App::seal`] / [`App::into_router`] or implicitly when any of its routes
//! dispatches a request. Every mutation after that fails with
//! [`Error::RegistryMutationAfterSeal`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::Method;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::Error;
use crate::handler::{BoxedErrorHandler, BoxedHandler, ErrorHandler, Handler};
use crate::middleware::{Chain, Middleware, MiddlewareEntry, MiddlewareOptions};
use crate::openapi::{self, DocMetadata};
use crate::route::{Route, join_paths, normalize_path};
use crate::router::Router;
use crate::schema::{Validation, Validator};
use crate::validation::Engines;

/// Methods registered by [`App::all`].
const ALL_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
];

/// Validation and documentation attached at registration time, to a single
/// route or to every route of a group.
#[derive(Clone, Debug, Default)]
pub struct RouteOptions {
    pub validation: Validation,
    pub docs: DocMetadata,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    pub fn docs(mut self, docs: DocMetadata) -> Self {
        self.docs = docs;
        self
    }
}

impl From<Validation> for RouteOptions {
    fn from(validation: Validation) -> Self {
        Self { validation, docs: DocMetadata::default() }
    }
}

impl From<DocMetadata> for RouteOptions {
    fn from(docs: DocMetadata) -> Self {
        Self { validation: Validation::default(), docs }
    }
}

/// Route registry: routes plus the middleware and error-handler stacks new
/// routes will capture.
pub struct App {
    config: Config,
    validator: Arc<dyn Validator>,
    routes: Vec<Route>,
    middleware: Vec<Arc<MiddlewareEntry>>,
    error_handlers: Vec<BoxedErrorHandler>,
    sealed: Arc<AtomicBool>,
}

impl App {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            validator: Arc::new(Engines::default()),
            routes: Vec::new(),
            middleware: Vec::new(),
            error_handlers: Vec::new(),
            sealed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the validation capability, for routes already registered too.
    ///
    /// Fails with [`Error::RegistryMutationAfterSeal`] once any route has been
    /// dispatched.
    pub fn with_validator(mut self, validator: impl Validator) -> Result<Self, Error> {
        self.ensure_open()?;
        self.validator = Arc::new(validator);
        for route in &mut self.routes {
            route.validator = Arc::clone(&self.validator);
        }
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validator(&self) -> &dyn Validator {
        &*self.validator
    }

    /// Registered routes, in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Closes the registry. Idempotent.
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::AcqRel) {
            debug!(routes = self.routes.len(), "registry sealed");
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_sealed() {
            return Err(Error::RegistryMutationAfterSeal);
        }
        Ok(())
    }

    fn ensure_free(&self, method: &Method, path: &str) -> Result<(), Error> {
        if self.routes.iter().any(|r| r.method() == method && r.path() == path) {
            return Err(Error::DuplicateRoute { method: method.clone(), path: path.to_owned() });
        }
        Ok(())
    }

    // ── Stacks ────────────────────────────────────────────────────────────────

    /// Pushes a middleware. Only routes registered afterwards run it.
    pub fn middleware(&mut self, handler: impl Middleware) -> Result<&mut Self, Error> {
        self.middleware_with(handler, MiddlewareOptions::default())
    }

    /// Pushes a middleware that also contributes request schemas and
    /// documentation to the routes it wraps.
    pub fn middleware_with(
        &mut self,
        handler: impl Middleware,
        options: MiddlewareOptions,
    ) -> Result<&mut Self, Error> {
        self.ensure_open()?;
        let handler = handler.into_boxed_middleware();
        self.middleware.push(Arc::new(MiddlewareEntry { handler, options }));
        debug!(depth = self.middleware.len(), "middleware registered");
        Ok(self)
    }

    /// Pushes an error handler. Only routes registered afterwards consult it.
    pub fn on_error(&mut self, handler: impl ErrorHandler) -> Result<&mut Self, Error> {
        self.ensure_open()?;
        self.error_handlers.push(handler.into_boxed_error_handler());
        debug!(depth = self.error_handlers.len(), "error handler registered");
        Ok(self)
    }

    // ── Routes ────────────────────────────────────────────────────────────────

    /// Registers `handler` for `method` and `path`.
    ///
    /// `path` is normalized (leading `/`, no trailing `/`). Path parameters
    /// use `:name` segments. Fails on a duplicate method and path, leaving the
    /// registry unchanged.
    pub fn route(
        &mut self,
        method: Method,
        path: &str,
        handler: impl Handler,
        options: impl Into<RouteOptions>,
    ) -> Result<&mut Self, Error> {
        self.ensure_open()?;
        let path = normalize_path(path);
        self.ensure_free(&method, &path)?;
        self.push_route(method, path, handler.into_boxed_handler(), options.into());
        Ok(self)
    }

    pub fn get(&mut self, path: &str, handler: impl Handler) -> Result<&mut Self, Error> {
        self.route(Method::GET, path, handler, RouteOptions::default())
    }

    pub fn post(&mut self, path: &str, handler: impl Handler) -> Result<&mut Self, Error> {
        self.route(Method::POST, path, handler, RouteOptions::default())
    }

    pub fn put(&mut self, path: &str, handler: impl Handler) -> Result<&mut Self, Error> {
        self.route(Method::PUT, path, handler, RouteOptions::default())
    }

    pub fn delete(&mut self, path: &str, handler: impl Handler) -> Result<&mut Self, Error> {
        self.route(Method::DELETE, path, handler, RouteOptions::default())
    }

    pub fn patch(&mut self, path: &str, handler: impl Handler) -> Result<&mut Self, Error> {
        self.route(Method::PATCH, path, handler, RouteOptions::default())
    }

    pub fn options(&mut self, path: &str, handler: impl Handler) -> Result<&mut Self, Error> {
        self.route(Method::OPTIONS, path, handler, RouteOptions::default())
    }

    /// Registers one handler for GET, POST, PUT, DELETE, PATCH and OPTIONS.
    /// All six are checked before any is added.
    pub fn all(
        &mut self,
        path: &str,
        handler: impl Handler,
        options: impl Into<RouteOptions>,
    ) -> Result<&mut Self, Error> {
        self.ensure_open()?;
        let path = normalize_path(path);
        for method in &ALL_METHODS {
            self.ensure_free(method, &path)?;
        }
        let handler = handler.into_boxed_handler();
        let options = options.into();
        for method in ALL_METHODS {
            self.push_route(method, path.clone(), Arc::clone(&handler), options.clone());
        }
        Ok(self)
    }

    fn push_route(
        &mut self,
        method: Method,
        path: String,
        handler: BoxedHandler,
        options: RouteOptions,
    ) {
        let chain = Arc::new(Chain { middleware: self.middleware.clone(), handler });
        debug!(
            method = %method,
            path = %path,
            middleware = chain.middleware.len(),
            error_handlers = self.error_handlers.len(),
            "route registered"
        );
        self.routes.push(Route::new(
            method,
            path,
            chain,
            self.error_handlers.clone(),
            options.validation,
            options.docs,
            Arc::clone(&self.validator),
            Arc::clone(&self.sealed),
        ));
    }

    // ── Groups ────────────────────────────────────────────────────────────────

    /// Builds a nested registry under `prefix`.
    ///
    /// `build` receives an empty registry sharing this one's configuration
    /// and validator. Its routes are then mounted: paths are prefixed, this
    /// registry's current middleware and error handlers run before the
    /// group's own.
    pub fn group<F>(&mut self, prefix: &str, build: F) -> Result<&mut Self, Error>
    where
        F: FnOnce(&mut App) -> Result<(), Error>,
    {
        self.group_with(prefix, RouteOptions::default(), build)
    }

    /// Like [`group`](App::group), with a validation and documentation
    /// fragment applied underneath every route of the group.
    pub fn group_with<F>(
        &mut self,
        prefix: &str,
        options: impl Into<RouteOptions>,
        build: F,
    ) -> Result<&mut Self, Error>
    where
        F: FnOnce(&mut App) -> Result<(), Error>,
    {
        self.ensure_open()?;
        let mut child = self.child();
        build(&mut child)?;
        self.mount_with(prefix, child, options)
    }

    /// Mounts the routes of a separately built registry under `prefix`.
    pub fn mount(&mut self, prefix: &str, child: App) -> Result<&mut Self, Error> {
        self.mount_with(prefix, child, RouteOptions::default())
    }

    /// Mounts `child` with a group-level fragment. Every resulting path is
    /// checked before any route is added.
    pub fn mount_with(
        &mut self,
        prefix: &str,
        child: App,
        options: impl Into<RouteOptions>,
    ) -> Result<&mut Self, Error> {
        self.ensure_open()?;
        let prefix = normalize_path(prefix);
        let options = options.into();

        let adopted: Vec<Route> = child
            .routes
            .into_iter()
            .map(|route| self.adopt(route, &prefix, &options))
            .collect();
        for route in &adopted {
            self.ensure_free(route.method(), route.path())?;
        }

        debug!(prefix = %prefix, routes = adopted.len(), "group mounted");
        self.routes.extend(adopted);
        Ok(self)
    }

    fn child(&self) -> App {
        App {
            config: self.config.clone(),
            validator: Arc::clone(&self.validator),
            routes: Vec::new(),
            middleware: Vec::new(),
            error_handlers: Vec::new(),
            sealed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn adopt(&self, route: Route, prefix: &str, options: &RouteOptions) -> Route {
        let mut middleware = self.middleware.clone();
        middleware.extend(route.chain.middleware.iter().cloned());
        let chain = Arc::new(Chain { middleware, handler: Arc::clone(&route.chain.handler) });

        let mut error_handlers = self.error_handlers.clone();
        error_handlers.extend(route.error_handlers.iter().cloned());

        let mut validation = options.validation.clone();
        validation.overlay(route.validation());
        let mut docs = options.docs.clone();
        docs.overlay(route.docs());

        Route::new(
            route.method().clone(),
            join_paths(prefix, route.path()),
            chain,
            error_handlers,
            validation,
            docs,
            Arc::clone(&self.validator),
            Arc::clone(&self.sealed),
        )
    }

    // ── Outputs ───────────────────────────────────────────────────────────────

    /// The API description of every visible route.
    ///
    /// Requires [`Config::document`]; fails with [`Error::MissingDocument`]
    /// otherwise.
    pub fn openapi(&self) -> Result<Value, Error> {
        openapi::assemble(self)
    }

    pub(crate) fn into_parts(self) -> (Config, Vec<Route>) {
        (self.config, self.routes)
    }

    /// Seals the registry and builds the lookup tree.
    pub fn into_router(self) -> Result<Router, Error> {
        self.seal();
        Router::build(self)
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
