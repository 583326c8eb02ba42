//! Radix-tree lookup and the hyper adapter.
//!
//! One tree per HTTP method, built once from a sealed [`App`]. Lookup is
//! O(path-length). The [`Router`] is a cheap clone and implements
//! [`hyper::service::Service`], so it can be handed straight to a hyper
//! connection.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::app::App;
use crate::error::{BoxError, Error};
use crate::handler::BoxFuture;
use crate::response::Response;
use crate::route::{Route, template_path};

struct Inner {
    trees: HashMap<Method, MatchitRouter<Arc<Route>>>,
}

/// Dispatches requests to the routes of a sealed [`App`].
///
/// Paths are matched with the configured base path in front. A request that
/// matches no route gets a plain `404`.
#[derive(Clone)]
pub struct Router {
    inner: Arc<Inner>,
}

impl Router {
    pub(crate) fn build(app: App) -> Result<Self, Error> {
        let (config, routes) = app.into_parts();
        let mut trees: HashMap<Method, MatchitRouter<Arc<Route>>> = HashMap::new();

        for route in routes {
            let path = template_path(&config.full_path(route.path()));
            let method = route.method().clone();
            trees
                .entry(method)
                .or_default()
                .insert(path.as_str(), Arc::new(route))
                .map_err(|e| Error::RouteConflict { path: path.clone(), reason: e.to_string() })?;
        }

        Ok(Self { inner: Arc::new(Inner { trees }) })
    }

    pub(crate) fn lookup(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<(Arc<Route>, HashMap<String, String>)> {
        let tree = self.inner.trees.get(method)?;
        let matched = tree.at(path).ok()?;
        let route = Arc::clone(matched.value);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((route, params))
    }

    /// Dispatches a buffered request.
    pub async fn handle(&self, request: http::Request<Bytes>) -> Result<Response, Error> {
        let Some((route, params)) = self.lookup(request.method(), request.uri().path()) else {
            debug!(method = %request.method(), path = %request.uri().path(), "no route matched");
            return Ok(Response::text("Not Found").with_status(StatusCode::NOT_FOUND));
        };
        route.run(request, params).await
    }
}

impl<B> hyper::service::Service<http::Request<B>> for Router
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn call(&self, request: http::Request<B>) -> Self::Future {
        let router = self.clone();
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let bytes = body.collect().await.map_err(|e| Error::Body(e.into()))?.to_bytes();
            let response = router.handle(http::Request::from_parts(parts, bytes)).await?;
            Ok(response.into_inner())
        })
    }
}
