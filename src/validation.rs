//! Built-in validation engines.
//!
//! A [`Validator`] has to handle every schema family an application mixes.
//! [`Engines`] is the stock implementation: an ordered list of [`Engine`]s,
//! each with a detection predicate. The first engine that accepts a schema
//! validates and describes it.
//!
//! Two families ship with the crate:
//!
//! | Family | Descriptor | Validates with | Describes as |
//! |---|---|---|---|
//! | declarative | [`JsonSchema`] | the `jsonschema` crate | the schema document |
//! | programmatic | [`Parser`] | your closure (may coerce) | an attached document |
//!
//! ```rust
//! use sabre::validation::{JsonSchema, Parser};
//! use serde_json::{json, Value};
//!
//! let page = Parser::new(|v| match v {
//!     Value::String(s) => s.parse::<u64>().map(Value::from).map_err(|e| e.to_string()),
//!     other => Err(format!("expected a string, got {other}")),
//! })
//! .documented(json!({"type": "integer", "minimum": 0}));
//!
//! let user = JsonSchema::new(json!({
//!     "type": "object",
//!     "required": ["name"],
//!     "properties": {"name": {"type": "string", "minLength": 2}}
//! }))
//! .unwrap();
//! # let _ = (page, user);
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::error::{Error, ValidationError};
use crate::schema::{Schema, Validator};

/// One schema family.
pub trait Engine: Send + Sync + 'static {
    /// Detection predicate: does this engine understand `schema`?
    fn accepts(&self, schema: &Schema) -> bool;

    fn validate(&self, schema: &Schema, value: Value) -> Result<Value, ValidationError>;

    fn describe(&self, schema: &Schema) -> Value;
}

/// Ordered engine list implementing [`Validator`].
///
/// `Engines::default()` holds the [`JsonSchema`] and [`Parser`] engines.
/// A schema no engine accepts fails validation and is described as a plain
/// object.
pub struct Engines {
    engines: Vec<Box<dyn Engine>>,
}

impl Engines {
    /// An empty list. Every schema is unsupported until an engine is added.
    pub fn new() -> Self {
        Self { engines: Vec::new() }
    }

    pub fn with(mut self, engine: impl Engine) -> Self {
        self.engines.push(Box::new(engine));
        self
    }

    fn find(&self, schema: &Schema) -> Option<&dyn Engine> {
        self.engines.iter().find(|e| e.accepts(schema)).map(|e| &**e)
    }
}

impl Default for Engines {
    fn default() -> Self {
        Self::new().with(JsonSchemaEngine).with(ParserEngine)
    }
}

impl Validator for Engines {
    fn validate(&self, schema: &Schema, value: Value) -> Result<Value, ValidationError> {
        match self.find(schema) {
            Some(engine) => engine.validate(schema, value),
            None => Err(ValidationError::new("unsupported validation schema")),
        }
    }

    fn describe(&self, schema: &Schema) -> Value {
        match self.find(schema) {
            Some(engine) => engine.describe(schema),
            None => json!({ "type": "object" }),
        }
    }
}

// ── JSON Schema ───────────────────────────────────────────────────────────────

/// A JSON Schema document, compiled once at construction.
#[derive(Clone)]
pub struct JsonSchema {
    document: Arc<Value>,
    compiled: Arc<jsonschema::Validator>,
}

impl JsonSchema {
    /// Compiles `document`. Fails with [`Error::InvalidSchema`] if it is not a
    /// valid schema.
    pub fn new(document: Value) -> Result<Self, Error> {
        let compiled = jsonschema::validator_for(&document)
            .map_err(|e| Error::InvalidSchema(e.to_string()))?;
        Ok(Self { document: Arc::new(document), compiled: Arc::new(compiled) })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JsonSchema").field(&self.document).finish()
    }
}

impl From<JsonSchema> for Schema {
    fn from(schema: JsonSchema) -> Self {
        Schema::new(schema)
    }
}

struct JsonSchemaEngine;

impl Engine for JsonSchemaEngine {
    fn accepts(&self, schema: &Schema) -> bool {
        schema.is::<JsonSchema>()
    }

    fn validate(&self, schema: &Schema, value: Value) -> Result<Value, ValidationError> {
        let Some(schema) = schema.downcast_ref::<JsonSchema>() else {
            return Err(ValidationError::new("unsupported validation schema"));
        };
        let violations: Vec<String> = schema
            .compiled
            .iter_errors(&value)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() { e.to_string() } else { format!("{path}: {e}") }
            })
            .collect();
        if violations.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError::new(violations.join("; ")))
        }
    }

    fn describe(&self, schema: &Schema) -> Value {
        schema
            .downcast_ref::<JsonSchema>()
            .map(|s| s.document().clone())
            .unwrap_or_else(|| json!({ "type": "object" }))
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

type ParseFn = dyn Fn(Value) -> Result<Value, String> + Send + Sync;

/// A programmatic schema: a closure that checks and may transform a value.
#[derive(Clone)]
pub struct Parser {
    parse: Arc<ParseFn>,
    document: Value,
}

impl Parser {
    pub fn new<F>(parse: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self { parse: Arc::new(parse), document: json!({ "type": "object" }) }
    }

    /// Attaches the schema object used in API descriptions.
    pub fn documented(mut self, document: Value) -> Self {
        self.document = document;
        self
    }

    pub fn parse(&self, value: Value) -> Result<Value, String> {
        (self.parse)(value)
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser").field("document", &self.document).finish_non_exhaustive()
    }
}

impl From<Parser> for Schema {
    fn from(parser: Parser) -> Self {
        Schema::new(parser)
    }
}

struct ParserEngine;

impl Engine for ParserEngine {
    fn accepts(&self, schema: &Schema) -> bool {
        schema.is::<Parser>()
    }

    fn validate(&self, schema: &Schema, value: Value) -> Result<Value, ValidationError> {
        match schema.downcast_ref::<Parser>() {
            Some(parser) => parser.parse(value).map_err(ValidationError::new),
            None => Err(ValidationError::new("unsupported validation schema")),
        }
    }

    fn describe(&self, schema: &Schema) -> Value {
        schema
            .downcast_ref::<Parser>()
            .map(|p| p.document.clone())
            .unwrap_or_else(|| json!({ "type": "object" }))
    }
}
