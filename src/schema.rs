//! Schema descriptors and the validation fragments attached to routes.
//!
//! sabre never looks inside a schema. A [`Schema`] is an opaque, type-erased
//! descriptor; only a [`Validator`] knows what it means. Routes, middleware
//! and groups carry *fragments* of schemas ([`RequestSchema`], [`Validation`])
//! that are folded together into the view a route validates against.
//!
//! # Merge rules
//!
//! Fragments are folded with [`Validation::overlay`]: the keyed maps
//! (`params`, `query`, `headers`, `cookies`, `responses`) merge key by key,
//! the overlay winning on collision. `body` is replaced wholesale.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ValidationError;

/// An opaque schema descriptor.
///
/// Cloning is one atomic increment. Build one from any descriptor type your
/// [`Validator`] understands, e.g. [`JsonSchema`](crate::validation::JsonSchema).
#[derive(Clone)]
pub struct Schema(Arc<dyn Any + Send + Sync>);

impl Schema {
    pub fn new<T: Any + Send + Sync>(descriptor: T) -> Self {
        Self(Arc::new(descriptor))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Schema(..)")
    }
}

/// The validation capability sabre calls out to.
///
/// `validate` returns the (possibly coerced) value or a [`ValidationError`];
/// `describe` turns a descriptor into an API-description schema object.
pub trait Validator: Send + Sync + 'static {
    fn validate(&self, schema: &Schema, value: Value) -> Result<Value, ValidationError>;

    fn describe(&self, schema: &Schema) -> Value;
}

/// Keyed schemas for one request section. Ordered so documentation output is
/// deterministic.
pub type SchemaMap = BTreeMap<String, Schema>;

// ── BodySchema ────────────────────────────────────────────────────────────────

/// Request body schema, one descriptor per accepted content type.
#[derive(Clone, Debug, Default)]
pub struct BodySchema {
    pub description: Option<String>,
    pub required: bool,
    pub content: SchemaMap,
}

impl BodySchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shortcut for a body accepted only as `application/json`.
    pub fn json(schema: impl Into<Schema>) -> Self {
        Self::new().content("application/json", schema)
    }

    pub fn content(mut self, content_type: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.content.insert(content_type.into(), schema.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }
}

// ── ResponseSchema ────────────────────────────────────────────────────────────

/// Schema for one response status: payload per content type plus headers.
#[derive(Clone, Debug, Default)]
pub struct ResponseSchema {
    pub description: Option<String>,
    pub content: SchemaMap,
    pub headers: SchemaMap,
}

impl ResponseSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(schema: impl Into<Schema>) -> Self {
        Self::new().content("application/json", schema)
    }

    pub fn content(mut self, content_type: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.content.insert(content_type.into(), schema.into());
        self
    }

    /// Header names are stored lowercase.
    pub fn header(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), schema.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ── RequestSchema ─────────────────────────────────────────────────────────────

/// The request half of a validation fragment.
///
/// This is all a middleware may contribute: middleware never describes
/// responses.
#[derive(Clone, Debug, Default)]
pub struct RequestSchema {
    pub params: SchemaMap,
    pub query: SchemaMap,
    pub headers: SchemaMap,
    pub cookies: SchemaMap,
    pub body: Option<BodySchema>,
}

impl RequestSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.params.insert(name.into(), schema.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.query.insert(name.into(), schema.into());
        self
    }

    /// Header names are stored lowercase to match the request header map.
    pub fn header(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), schema.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.cookies.insert(name.into(), schema.into());
        self
    }

    pub fn body(mut self, body: BodySchema) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
            && self.query.is_empty()
            && self.headers.is_empty()
            && self.cookies.is_empty()
            && self.body.is_none()
    }

    /// Folds `other` on top of `self`; `other` wins on collision.
    pub fn overlay(&mut self, other: &RequestSchema) {
        overlay_map(&mut self.params, &other.params);
        overlay_map(&mut self.query, &other.query);
        overlay_map(&mut self.headers, &other.headers);
        overlay_map(&mut self.cookies, &other.cookies);
        if let Some(body) = &other.body {
            self.body = Some(body.clone());
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// A full validation fragment: request sections plus responses keyed by
/// status code.
#[derive(Clone, Debug, Default)]
pub struct Validation {
    pub request: RequestSchema,
    pub responses: BTreeMap<u16, ResponseSchema>,
}

impl Validation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.request = self.request.param(name, schema);
        self
    }

    pub fn query(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.request = self.request.query(name, schema);
        self
    }

    pub fn header(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.request = self.request.header(name, schema);
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, schema: impl Into<Schema>) -> Self {
        self.request = self.request.cookie(name, schema);
        self
    }

    pub fn body(mut self, body: BodySchema) -> Self {
        self.request = self.request.body(body);
        self
    }

    pub fn response(mut self, status: u16, schema: ResponseSchema) -> Self {
        self.responses.insert(status, schema);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.request.is_empty() && self.responses.is_empty()
    }

    /// Folds `other` on top of `self`; `other` wins on collision. A response
    /// entry for a given status is replaced as a whole.
    pub fn overlay(&mut self, other: &Validation) {
        self.request.overlay(&other.request);
        for (status, schema) in &other.responses {
            self.responses.insert(*status, schema.clone());
        }
    }
}

impl From<RequestSchema> for Validation {
    fn from(request: RequestSchema) -> Self {
        Self { request, responses: BTreeMap::new() }
    }
}

fn overlay_map(base: &mut SchemaMap, top: &SchemaMap) {
    for (key, schema) in top {
        base.insert(key.clone(), schema.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(tag: &'static str) -> Schema {
        Schema::new(tag)
    }

    fn tag(schema: &Schema) -> &'static str {
        schema.downcast_ref::<&'static str>().copied().unwrap_or("?")
    }

    #[test]
    fn keyed_maps_merge_with_overlay_winning() {
        let mut base = Validation::new()
            .query("page", tagged("mw-page"))
            .query("limit", tagged("mw-limit"))
            .header("X-Tenant", tagged("mw-tenant"));
        let own = Validation::new().query("page", tagged("route-page"));

        base.overlay(&own);

        assert_eq!(tag(&base.request.query["page"]), "route-page");
        assert_eq!(tag(&base.request.query["limit"]), "mw-limit");
        assert_eq!(tag(&base.request.headers["x-tenant"]), "mw-tenant");
    }

    #[test]
    fn body_is_replaced_not_merged() {
        let mut base = Validation::new().body(
            BodySchema::new()
                .content("application/json", tagged("mw-json"))
                .content("text/plain", tagged("mw-text")),
        );
        base.overlay(&Validation::new().body(BodySchema::json(tagged("route-json"))));

        let body = base.request.body.as_ref().map(|b| &b.content);
        assert_eq!(body.map(|c| c.len()), Some(1));
        assert_eq!(body.map(|c| tag(&c["application/json"])), Some("route-json"));
    }

    #[test]
    fn absent_body_keeps_base_body() {
        let mut base = Validation::new().body(BodySchema::json(tagged("mw-json")));
        base.overlay(&Validation::new().query("q", tagged("q")));
        assert!(base.request.body.is_some());
    }

    #[test]
    fn responses_merge_by_status() {
        let mut base = Validation::new()
            .response(200, ResponseSchema::json(tagged("group-200")))
            .response(404, ResponseSchema::json(tagged("group-404")));
        base.overlay(&Validation::new().response(200, ResponseSchema::json(tagged("route-200"))));

        assert_eq!(tag(&base.responses[&200].content["application/json"]), "route-200");
        assert_eq!(tag(&base.responses[&404].content["application/json"]), "group-404");
    }

    #[test]
    fn schema_downcasts_to_its_descriptor() {
        let schema = Schema::new(42_u32);
        assert!(schema.is::<u32>());
        assert_eq!(schema.downcast_ref::<u32>(), Some(&42));
        assert!(schema.downcast_ref::<String>().is_none());
    }
}
