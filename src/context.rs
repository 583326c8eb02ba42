//! Per-request context.
//!
//! A [`Context`] wraps the raw request and exposes its sections (path params,
//! query, headers, cookies, body) as JSON values validated against the
//! route's merged [`RequestSchema`]. Each section is parsed and validated on
//! first access and memoized for the rest of the request, failures included.
//! Clones share the same memo cells and state map; nothing outlives the
//! request.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use http::{Method, Uri};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::error::{Error, ValidationError};
use crate::response::media_type;
use crate::schema::{RequestSchema, SchemaMap, Validator};

type Section = OnceLock<Result<Map<String, Value>, ValidationError>>;

struct Inner {
    raw: http::Request<Bytes>,
    path_params: HashMap<String, String>,
    schema: Arc<RequestSchema>,
    validator: Arc<dyn Validator>,
    state: Mutex<HashMap<String, Value>>,
    params: Section,
    query: Section,
    headers: Section,
    cookies: Section,
    body: OnceLock<Result<Value, ValidationError>>,
}

/// The request as seen by middleware, handlers and error handlers.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub(crate) fn new(
        raw: http::Request<Bytes>,
        path_params: HashMap<String, String>,
        schema: Arc<RequestSchema>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                raw,
                path_params,
                schema,
                validator,
                state: Mutex::new(HashMap::new()),
                params: OnceLock::new(),
                query: OnceLock::new(),
                headers: OnceLock::new(),
                cookies: OnceLock::new(),
                body: OnceLock::new(),
            }),
        }
    }

    pub fn raw(&self) -> &http::Request<Bytes> { &self.inner.raw }
    pub fn method(&self) -> &Method { self.inner.raw.method() }
    pub fn uri(&self) -> &Uri { self.inner.raw.uri() }
    pub fn path(&self) -> &str { self.inner.raw.uri().path() }
    pub fn bytes(&self) -> &Bytes { self.inner.raw.body() }

    /// The body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.inner.raw.body())
    }

    /// Raw path parameter, before validation.
    ///
    /// For a route `/users/:id`, `ctx.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.path_params.get(name).map(String::as_str)
    }

    /// Raw header value (case-insensitive), before validation.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.raw.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the request body: `content-type` without parameters.
    pub fn content_type(&self) -> &str {
        self.header("content-type").map(media_type).unwrap_or("")
    }

    // ── Validated sections ────────────────────────────────────────────────────

    /// Path parameters, validated against the `params` schemas.
    pub fn params(&self) -> Result<&Map<String, Value>, Error> {
        section(&self.inner.params, || {
            let values = self
                .inner
                .path_params
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            self.validate_fields("params", values, &self.inner.schema.params)
        })
    }

    /// Query string, validated against the `query` schemas. A key that
    /// appears more than once maps to an array of its values in order.
    pub fn query(&self) -> Result<&Map<String, Value>, Error> {
        section(&self.inner.query, || {
            let raw = self.inner.raw.uri().query().unwrap_or("");
            let values = collect_pairs(form_urlencoded::parse(raw.as_bytes()));
            self.validate_fields("query", values, &self.inner.schema.query)
        })
    }

    /// Headers with lowercase names, validated against the `headers` schemas.
    /// Repeated headers are joined with `", "`.
    pub fn headers(&self) -> Result<&Map<String, Value>, Error> {
        section(&self.inner.headers, || {
            let mut values = Map::new();
            for (name, value) in self.inner.raw.headers() {
                let value = String::from_utf8_lossy(value.as_bytes());
                match values.get_mut(name.as_str()) {
                    Some(Value::String(existing)) => {
                        existing.push_str(", ");
                        existing.push_str(&value);
                    }
                    _ => {
                        values.insert(name.as_str().to_owned(), Value::String(value.into_owned()));
                    }
                }
            }
            self.validate_fields("headers", values, &self.inner.schema.headers)
        })
    }

    /// Cookies from the `cookie` header, validated against the `cookies`
    /// schemas. Values are percent-decoded. The first occurrence of a name
    /// wins.
    pub fn cookies(&self) -> Result<&Map<String, Value>, Error> {
        section(&self.inner.cookies, || {
            let mut values = Map::new();
            for header in self.inner.raw.headers().get_all(http::header::COOKIE) {
                let header = String::from_utf8_lossy(header.as_bytes());
                for (name, value) in header.split(';').filter_map(|pair| pair.split_once('=')) {
                    let name = name.trim();
                    if name.is_empty() || values.contains_key(name) {
                        continue;
                    }
                    let value = value.trim().trim_matches('"');
                    let value = percent_decode_str(value).decode_utf8_lossy();
                    values.insert(name.to_owned(), Value::String(value.into_owned()));
                }
            }
            self.validate_fields("cookies", values, &self.inner.schema.cookies)
        })
    }

    /// The parsed body, validated against the body schema for the request's
    /// content type.
    ///
    /// `application/json` is parsed as JSON, `application/x-www-form-urlencoded`
    /// as an object; anything else is JSON if it parses and the raw text
    /// otherwise. An empty body is `null`.
    pub fn body(&self) -> Result<&Value, Error> {
        self.inner
            .body
            .get_or_init(|| self.parse_body())
            .as_ref()
            .map_err(|e| Error::Validation(e.clone()))
    }

    /// Deserializes the validated body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_value(self.body()?.clone())?)
    }

    /// One validated query value.
    pub fn query_value(&self, name: &str) -> Result<Option<&Value>, Error> {
        Ok(self.query()?.get(name))
    }

    /// One validated cookie value.
    pub fn cookie(&self, name: &str) -> Result<Option<&Value>, Error> {
        Ok(self.cookies()?.get(name))
    }

    // ── State ─────────────────────────────────────────────────────────────────

    /// Reads a value stored by an earlier middleware.
    pub fn state(&self, key: &str) -> Option<Value> {
        self.inner.state.lock().get(key).cloned()
    }

    pub fn set_state(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.state.lock().insert(key.into(), value.into());
    }

    pub fn remove_state(&self, key: &str) -> Option<Value> {
        self.inner.state.lock().remove(key)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    /// Validates every declared key. Keys without a schema pass through;
    /// declared keys that are absent are validated as `null` and only kept
    /// if the validator turns them into something else.
    fn validate_fields(
        &self,
        section: &str,
        mut values: Map<String, Value>,
        schemas: &SchemaMap,
    ) -> Result<Map<String, Value>, ValidationError> {
        for (key, schema) in schemas {
            let present = values.remove(key);
            let was_present = present.is_some();
            let validated = self
                .inner
                .validator
                .validate(schema, present.unwrap_or(Value::Null))
                .map_err(|e| e.at(format!("{section}.{key}")))?;
            if was_present || !validated.is_null() {
                values.insert(key.clone(), validated);
            }
        }
        Ok(values)
    }

    fn parse_body(&self) -> Result<Value, ValidationError> {
        let bytes = self.inner.raw.body();
        let media = self.content_type();

        let value = if bytes.is_empty() {
            Value::Null
        } else {
            match media {
                "application/json" => serde_json::from_slice(bytes)
                    .map_err(|e| ValidationError::new(format!("invalid JSON: {e}")).at("body"))?,
                "application/x-www-form-urlencoded" => {
                    Value::Object(collect_pairs(form_urlencoded::parse(bytes)))
                }
                _ => serde_json::from_slice(bytes)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
            }
        };

        let Some(body) = &self.inner.schema.body else {
            return Ok(value);
        };
        if value.is_null() && body.required {
            return Err(ValidationError::new("body is required").at("body"));
        }
        if body.content.is_empty() {
            return Ok(value);
        }
        match body.content.get(media) {
            Some(schema) => self
                .inner
                .validator
                .validate(schema, value)
                .map_err(|e| e.at(format!("body.{media}"))),
            None if value.is_null() => Ok(value),
            None => {
                Err(ValidationError::new(format!("unsupported content type `{media}`")).at("body"))
            }
        }
    }
}

fn section<'a>(
    cell: &'a Section,
    init: impl FnOnce() -> Result<Map<String, Value>, ValidationError>,
) -> Result<&'a Map<String, Value>, Error> {
    cell.get_or_init(init).as_ref().map_err(|e| Error::Validation(e.clone()))
}

/// Collects `key=value` pairs; repeated keys become arrays in order.
fn collect_pairs<'a>(
    pairs: impl Iterator<Item = (Cow<'a, str>, Cow<'a, str>)>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.into_owned());
        match out.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                out.insert(key.into_owned(), value);
            }
        }
    }
    out
}
