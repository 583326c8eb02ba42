//! Outgoing responses: the immutable [`Response`], the per-request
//! [`ResponseBuilder`], and the [`IntoResponse`] conversion trait.
//!
//! Handlers either send through the builder they are given or return a
//! value. When both happen, the builder wins: a returned response is only
//! used if nothing was committed on the builder first.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue, LOCATION, SET_COOKIE};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::schema::{ResponseSchema, Validator};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`ResponseBuilder::send`].
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

impl AsRef<str> for ContentType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// `text/plain; charset=utf-8` → `text/plain`.
pub(crate) fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or("").trim()
}

// ── Response ─────────────────────────────────────────────────────────────────

/// A finished, immutable HTTP response.
///
/// ```rust
/// use http::StatusCode;
/// use sabre::Response;
///
/// let ok = Response::text("hello");
/// let gone = Response::empty(StatusCode::GONE);
/// assert_eq!(gone.status(), StatusCode::GONE);
/// # let _ = ok;
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Response with no body and no headers.
    pub fn empty(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), body: Bytes::new() }
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::typed(ContentType::Text.as_str(), Bytes::from(body.into()))
    }

    /// `200 OK`, `application/json`.
    pub fn json<T: Serialize + ?Sized>(data: &T) -> Result<Self, Error> {
        Ok(Self::typed(ContentType::Json.as_str(), Bytes::from(serde_json::to_vec(data)?)))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Converts into the `http` representation a hyper server writes out.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// The fixed fallback used when no error handler produced a response.
    pub(crate) fn internal_server_error() -> Self {
        Self::text("Internal Server Error").with_status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn typed(content_type: &'static str, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self { status: StatusCode::OK, headers, body }
    }
}

// ── Cookies ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax    => "Lax",
            Self::None   => "None",
        }
    }
}

/// Attributes for [`ResponseBuilder::set_cookie`] and
/// [`ResponseBuilder::clear_cookie`].
#[derive(Clone, Debug, Default)]
pub struct CookieOptions {
    path: Option<String>,
    domain: Option<String>,
    expires: Option<DateTime<Utc>>,
    max_age: Option<i64>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
    signed: bool,
}

impl CookieOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    /// Lifetime in seconds.
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Adds the `Signed` marker attribute. The value is written as given.
    pub fn signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    fn write_attributes(&self, out: &mut String, lifetime: bool) {
        if let Some(path) = &self.path {
            out.push_str(&format!("; Path={path}"));
        }
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={domain}"));
        }
        if lifetime {
            if let Some(expires) = &self.expires {
                out.push_str(&format!("; Expires={}", expires.format("%a, %d %b %Y %H:%M:%S GMT")));
            }
            if let Some(max_age) = self.max_age {
                out.push_str(&format!("; Max-Age={max_age}"));
            }
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if let Some(same_site) = self.same_site {
            out.push_str(&format!("; SameSite={}", same_site.as_str()));
        }
        if self.signed {
            out.push_str("; Signed");
        }
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

struct State {
    status: StatusCode,
    headers: HeaderMap,
    committed: Option<Response>,
}

/// Per-request response builder handed to middleware, handlers and error
/// handlers.
///
/// Clones share one state. Mutators return `&Self` so calls chain; the
/// terminal senders ([`send`](Self::send), [`json`](Self::json),
/// [`text`](Self::text), [`html`](Self::html), [`redirect`](Self::redirect))
/// validate against the response schema for the current status and return a
/// new [`Response`]. The first one sent is the committed response; later
/// sends still return a response but do not replace it.
///
/// ```rust,ignore
/// res.status(StatusCode::CREATED)
///     .header("x-powered-by", "sabre")?
///     .json(&user)
/// ```
#[derive(Clone)]
pub struct ResponseBuilder {
    state: Arc<Mutex<State>>,
    schemas: Arc<BTreeMap<u16, ResponseSchema>>,
    validator: Arc<dyn Validator>,
}

impl ResponseBuilder {
    pub(crate) fn new(
        schemas: Arc<BTreeMap<u16, ResponseSchema>>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        let state = State { status: StatusCode::OK, headers: HeaderMap::new(), committed: None };
        Self { state: Arc::new(Mutex::new(state)), schemas, validator }
    }

    pub fn status(&self, code: StatusCode) -> &Self {
        self.state.lock().status = code;
        self
    }

    pub fn current_status(&self) -> StatusCode {
        self.state.lock().status
    }

    /// Sets a header, replacing any previous values for the name.
    pub fn header(&self, name: &str, value: &str) -> Result<&Self, Error> {
        let (name, value) = header_pair(name, value)?;
        self.state.lock().headers.insert(name, value);
        Ok(self)
    }

    /// Adds a header value, keeping existing ones.
    pub fn append_header(&self, name: &str, value: &str) -> Result<&Self, Error> {
        let (name, value) = header_pair(name, value)?;
        self.state.lock().headers.append(name, value);
        Ok(self)
    }

    /// Appends a `set-cookie` header.
    pub fn set_cookie(
        &self,
        name: &str,
        value: &str,
        options: &CookieOptions,
    ) -> Result<&Self, Error> {
        let mut cookie = format!("{name}={value}");
        options.write_attributes(&mut cookie, true);
        self.append_cookie(cookie)
    }

    /// Appends a `set-cookie` header that expires `name` immediately.
    pub fn clear_cookie(&self, name: &str, options: &CookieOptions) -> Result<&Self, Error> {
        let mut cookie = format!("{name}=; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        options.write_attributes(&mut cookie, false);
        self.append_cookie(cookie)
    }

    fn append_cookie(&self, cookie: String) -> Result<&Self, Error> {
        let value = HeaderValue::try_from(cookie)?;
        self.state.lock().headers.append(SET_COOKIE, value);
        Ok(self)
    }

    /// Sets the status and `location`, then commits an empty response.
    pub fn redirect(&self, code: StatusCode, location: &str) -> Result<Response, Error> {
        let location = HeaderValue::from_str(location)?;
        let response = {
            let mut state = self.state.lock();
            state.status = code;
            state.headers.insert(LOCATION, location);
            Response { status: code, headers: state.headers.clone(), body: Bytes::new() }
        };
        self.commit(response.clone());
        Ok(response)
    }

    /// Sends raw bytes with the given content type.
    ///
    /// JSON media types are validated as the parsed document; anything else,
    /// and JSON that does not parse, is validated as a string.
    pub fn send(
        &self,
        content_type: impl AsRef<str>,
        body: impl Into<Bytes>,
    ) -> Result<Response, Error> {
        let content_type = content_type.as_ref();
        let body = body.into();
        let payload = outgoing_payload(media_type(content_type), &body);
        self.finish(content_type, payload, body)
    }

    /// Serializes `data` as `application/json`.
    pub fn json<T: Serialize + ?Sized>(&self, data: &T) -> Result<Response, Error> {
        let payload = serde_json::to_value(data)?;
        let body = Bytes::from(serde_json::to_vec(&payload)?);
        self.finish(ContentType::Json.as_str(), payload, body)
    }

    pub fn text(&self, body: impl Into<String>) -> Result<Response, Error> {
        let body = body.into();
        self.finish(ContentType::Text.as_str(), Value::String(body.clone()), Bytes::from(body))
    }

    pub fn html(&self, body: impl Into<String>) -> Result<Response, Error> {
        let body = body.into();
        self.finish(ContentType::Html.as_str(), Value::String(body.clone()), Bytes::from(body))
    }

    /// Returns the committed response, or commits an empty one at the current
    /// status and headers.
    pub fn end(&self) -> Response {
        let mut state = self.state.lock();
        if let Some(committed) = &state.committed {
            return committed.clone();
        }
        let response =
            Response { status: state.status, headers: state.headers.clone(), body: Bytes::new() };
        state.committed = Some(response.clone());
        response
    }

    pub fn committed(&self) -> Option<Response> {
        self.state.lock().committed.clone()
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed.is_some()
    }

    /// Records `response` unless one is already committed. Returns whether it
    /// was recorded.
    pub(crate) fn commit(&self, response: Response) -> bool {
        let mut state = self.state.lock();
        if state.committed.is_some() {
            return false;
        }
        state.committed = Some(response);
        true
    }

    pub(crate) fn take_committed(&self) -> Option<Response> {
        self.state.lock().committed.take()
    }

    fn finish(&self, content_type: &str, payload: Value, body: Bytes) -> Result<Response, Error> {
        let content_type_value = HeaderValue::from_str(content_type)?;
        let (status, mut headers) = {
            let state = self.state.lock();
            (state.status, state.headers.clone())
        };
        headers.insert(CONTENT_TYPE, content_type_value.clone());

        // Validation runs with the lock released: validators are user code.
        if let Some(schema) = self.schemas.get(&status.as_u16()) {
            self.check(status, schema, media_type(content_type), payload, &headers)?;
        }

        self.state.lock().headers.insert(CONTENT_TYPE, content_type_value);
        let response = Response { status, headers, body };
        self.commit(response.clone());
        Ok(response)
    }

    fn check(
        &self,
        status: StatusCode,
        schema: &ResponseSchema,
        media: &str,
        payload: Value,
        headers: &HeaderMap,
    ) -> Result<(), Error> {
        let code = status.as_u16();
        if let Some(content) = schema.content.get(media) {
            self.validator
                .validate(content, payload)
                .map_err(|e| e.at(format!("response.{code}.{media}")))?;
        }
        for (name, header_schema) in &schema.headers {
            let current = headers
                .get(name.as_str())
                .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .unwrap_or(Value::Null);
            self.validator
                .validate(header_schema, current)
                .map_err(|e| e.at(format!("response.{code}.headers.{name}")))?;
        }
        Ok(())
    }
}

fn is_json(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}

fn outgoing_payload(media: &str, body: &Bytes) -> Value {
    let as_string = || Value::String(String::from_utf8_lossy(body).into_owned());
    if is_json(media) {
        serde_json::from_slice(body).unwrap_or_else(|_| as_string())
    } else {
        as_string()
    }
}

fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), Error> {
    Ok((HeaderName::try_from(name)?, HeaderValue::try_from(value)?))
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion of a handler's return value.
///
/// `None` means "nothing returned": the dispatcher falls back to whatever is
/// on the [`ResponseBuilder`].
pub trait IntoResponse {
    fn into_response(self) -> Option<Response>;
}

impl IntoResponse for () {
    fn into_response(self) -> Option<Response> { None }
}

impl IntoResponse for Response {
    fn into_response(self) -> Option<Response> { Some(self) }
}

impl IntoResponse for Option<Response> {
    fn into_response(self) -> Option<Response> { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Option<Response> { Some(Response::text(self)) }
}

impl IntoResponse for String {
    fn into_response(self) -> Option<Response> { Some(Response::text(self)) }
}

/// Return a bare status: `return Ok(StatusCode::NO_CONTENT)`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Option<Response> { Some(Response::empty(self)) }
}
