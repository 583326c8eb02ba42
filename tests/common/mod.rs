//! Shared utilities for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use sabre::http::{self, Method};
use sabre::{
    Context, DispatchError, ErrorHandler, Handler, Middleware, Next, Response, ResponseBuilder,
    Schema, ValidationError, Validator,
};
use serde_json::{Value, json};

/// Ordered record of which middleware and handlers ran.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

/// Schema kinds understood by [`Counting`].
#[derive(Clone, Copy, Debug)]
pub enum Rule {
    Any,
    Integer,
    Reject,
}

impl From<Rule> for Schema {
    fn from(rule: Rule) -> Self {
        Schema::new(rule)
    }
}

/// Validator that counts how often it is asked to validate.
#[derive(Clone, Default)]
pub struct Counting {
    calls: Arc<AtomicUsize>,
}

impl Counting {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Validator for Counting {
    fn validate(&self, schema: &Schema, value: Value) -> Result<Value, ValidationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match schema.downcast_ref::<Rule>() {
            Some(Rule::Any) => Ok(value),
            Some(Rule::Integer) => match &value {
                Value::Number(_) => Ok(value),
                Value::String(s) => s
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| ValidationError::new("expected an integer")),
                _ => Err(ValidationError::new("expected an integer")),
            },
            Some(Rule::Reject) | None => Err(ValidationError::new("rejected")),
        }
    }

    fn describe(&self, schema: &Schema) -> Value {
        match schema.downcast_ref::<Rule>() {
            Some(Rule::Integer) => json!({ "type": "integer" }),
            _ => json!({}),
        }
    }
}

pub fn request(method: Method, uri: &str) -> http::Request<Bytes> {
    http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap()
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> http::Request<Bytes> {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Bytes::from(body.to_string()))
        .unwrap()
}

pub fn text(response: &Response) -> String {
    String::from_utf8_lossy(response.body()).into_owned()
}

/// Middleware that records `name` and continues.
pub fn tracer(log: &Log, name: &'static str) -> impl Middleware {
    let log = Arc::clone(log);
    move |_: Context, _: ResponseBuilder, next: Next| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(name.to_owned());
            next.run().await
        }
    }
}

/// Handler that records `name` and answers with it as text.
pub fn recorder(log: &Log, name: &'static str) -> impl Handler {
    let log = Arc::clone(log);
    move |_: Context, res: ResponseBuilder| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(name.to_owned());
            res.text(name)
        }
    }
}

/// Error handler that records `name` and passes the error on.
pub fn bystander(log: &Log, name: &'static str) -> impl ErrorHandler {
    let log = Arc::clone(log);
    move |_: DispatchError, _: Context, _: ResponseBuilder| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(name.to_owned());
            Ok::<_, DispatchError>(())
        }
    }
}

pub async fn fail(_: Context, _: ResponseBuilder) -> Result<(), std::io::Error> {
    Err(std::io::Error::other("boom"))
}

/// Turns validation failures into `400` with the failing location as body.
pub async fn bad_request(
    err: DispatchError,
    _: Context,
    res: ResponseBuilder,
) -> Result<(), sabre::Error> {
    if let Some(invalid) = err.validation() {
        res.status(http::StatusCode::BAD_REQUEST).text(invalid.location())?;
    }
    Ok(())
}
