//! Registered routes and per-request dispatch.
//!
//! A [`Route`] is the unit of registration: method, normalized path,
//! handler, and the middleware and error-handler stacks that were active
//! when it was registered. Dispatch ([`Route::run`]) is:
//!
//! 1. build the [`Context`] and [`ResponseBuilder`] from the merged schemas;
//! 2. touch params, headers, query and cookies so malformed requests fail
//!    before any middleware runs;
//! 3. run the middleware chain and the handler;
//! 4. use the committed response, or an empty one at the builder's status;
//! 5. on failure, offer the error to each error handler in order until one
//!    commits a response, falling back to a plain `500`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::Method;
use tracing::{Instrument, debug, debug_span, error, warn};

use crate::context::Context;
use crate::error::{DispatchError, Error};
use crate::handler::BoxedErrorHandler;
use crate::middleware::{Chain, Next};
use crate::openapi::DocMetadata;
use crate::response::{Response, ResponseBuilder};
use crate::schema::{RequestSchema, ResponseSchema, Validation, Validator};

/// The merged views, shared with every request.
struct Merged {
    validation: Validation,
    docs: DocMetadata,
    request: Arc<RequestSchema>,
    responses: Arc<BTreeMap<u16, ResponseSchema>>,
}

/// A registered route.
pub struct Route {
    method: Method,
    path: String,
    pub(crate) chain: Arc<Chain>,
    pub(crate) error_handlers: Vec<BoxedErrorHandler>,
    validation: Validation,
    docs: DocMetadata,
    merged: OnceLock<Merged>,
    pub(crate) validator: Arc<dyn Validator>,
    sealed: Arc<AtomicBool>,
}

impl Route {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        method: Method,
        path: String,
        chain: Arc<Chain>,
        error_handlers: Vec<BoxedErrorHandler>,
        validation: Validation,
        docs: DocMetadata,
        validator: Arc<dyn Validator>,
        sealed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            method,
            path,
            chain,
            error_handlers,
            validation,
            docs,
            merged: OnceLock::new(),
            validator,
            sealed,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }

    /// The validation fragment attached to this route (including any group
    /// fragment it inherited), before middleware fragments are folded in.
    pub fn validation(&self) -> &Validation { &self.validation }
    pub fn docs(&self) -> &DocMetadata { &self.docs }

    pub fn middleware_count(&self) -> usize { self.chain.middleware.len() }
    pub fn error_handler_count(&self) -> usize { self.error_handlers.len() }

    /// Middleware fragments in order, then this route's own on top.
    pub fn merged_validation(&self) -> &Validation {
        &self.merged().validation
    }

    pub fn merged_docs(&self) -> &DocMetadata {
        &self.merged().docs
    }

    fn merged(&self) -> &Merged {
        self.merged.get_or_init(|| {
            let mut validation = Validation::new();
            let mut docs = DocMetadata::new();
            for entry in &self.chain.middleware {
                validation.request.overlay(&entry.options.schema);
                docs.overlay(&entry.options.docs);
            }
            validation.overlay(&self.validation);
            docs.overlay(&self.docs);
            Merged {
                request: Arc::new(validation.request.clone()),
                responses: Arc::new(validation.responses.clone()),
                validation,
                docs,
            }
        })
    }

    /// Dispatches one request.
    ///
    /// `path_params` are the values the transport matched for `:name`
    /// placeholders. The only `Err` is a failing error handler
    /// ([`Error::Handler`]); every other failure becomes a response.
    ///
    /// The first call seals the registry this route came from.
    pub async fn run(
        &self,
        request: http::Request<Bytes>,
        path_params: HashMap<String, String>,
    ) -> Result<Response, Error> {
        self.sealed.store(true, Ordering::Release);
        let span = debug_span!("dispatch", method = %self.method, path = %self.path);
        self.dispatch(request, path_params).instrument(span).await
    }

    async fn dispatch(
        &self,
        request: http::Request<Bytes>,
        path_params: HashMap<String, String>,
    ) -> Result<Response, Error> {
        let merged = self.merged();
        let ctx = Context::new(
            request,
            path_params,
            Arc::clone(&merged.request),
            Arc::clone(&self.validator),
        );
        let res = ResponseBuilder::new(Arc::clone(&merged.responses), Arc::clone(&self.validator));

        let failure = match self.drive(&ctx, &res).await {
            Ok(()) => return Ok(res.end()),
            Err(e) => e,
        };
        debug!(error = %failure, "request failed, running error handlers");

        // A response committed before the failure is not trusted.
        res.take_committed();

        for handler in &self.error_handlers {
            let outcome = handler
                .call(failure.clone(), ctx.clone(), res.clone())
                .await
                .map_err(|e| {
                    let e = DispatchError::from_boxed(e);
                    error!(error = %e, "error handler failed");
                    Error::Handler(e)
                })?;
            if let Some(response) = outcome {
                res.commit(response);
            }
            if let Some(response) = res.committed() {
                return Ok(response);
            }
        }

        warn!(error = %failure, "unhandled error, responding 500");
        Ok(Response::internal_server_error())
    }

    async fn drive(&self, ctx: &Context, res: &ResponseBuilder) -> Result<(), DispatchError> {
        ctx.params()?;
        ctx.headers()?;
        ctx.query()?;
        ctx.cookies()?;
        Next::new(Arc::clone(&self.chain), ctx.clone(), res.clone()).run().await
    }
}

// ── Paths ─────────────────────────────────────────────────────────────────────

/// Trims, forces a leading `/`, and strips a trailing `/` (except for the
/// root path). An empty path is the root.
pub(crate) fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let mut out = if trimmed.starts_with('/') { trimmed.to_owned() } else { format!("/{trimmed}") };
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Normalized `prefix + path`. A root prefix contributes nothing and a root
/// path adds nothing to the prefix.
pub(crate) fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = normalize_path(prefix);
    let path = normalize_path(path);
    match (prefix.as_str(), path.as_str()) {
        ("/", _) => path,
        (_, "/") => prefix,
        _ => normalize_path(&format!("{prefix}{path}")),
    }
}

/// Rewrites `:name` segments to `{name}`, the template form used by API
/// descriptions and the lookup tree.
pub(crate) fn template_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{name}}}"),
            _ => segment.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
