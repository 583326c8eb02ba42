//! API description output.
//!
//! [`DocMetadata`] is the documentation fragment carried by routes,
//! middleware and groups. [`App::openapi`](crate::App::openapi) walks the
//! registered routes and assembles an OpenAPI 3.1 shaped document from their
//! merged documentation and validation fragments. Every schema goes through
//! [`Validator::describe`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::app::App;
use crate::error::Error;
use crate::route::{Route, template_path};
use crate::schema::{SchemaMap, Validator};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalDocs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
}

/// Documentation fragment. Every field is optional; when fragments are
/// folded, a set field in the later fragment wins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocMetadata {
    /// Leave the route out of the API description.
    #[serde(skip)]
    pub hide: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Request body content type documented when the body schema names none.
    #[serde(skip)]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<ExternalDocs>,
}

impl DocMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hidden(mut self) -> Self {
        self.hide = Some(true);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds one tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.get_or_insert_with(Vec::new).push(tag.into());
        self
    }

    pub fn deprecated(mut self, deprecated: bool) -> Self {
        self.deprecated = Some(deprecated);
        self
    }

    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn external_docs(mut self, url: impl Into<String>, description: Option<String>) -> Self {
        self.external_docs = Some(ExternalDocs { description, url: url.into() });
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.hide == Some(true)
    }

    /// Folds `other` on top of `self`; set fields in `other` win. Tags are
    /// replaced, not concatenated.
    pub fn overlay(&mut self, other: &DocMetadata) {
        fn take<T: Clone>(slot: &mut Option<T>, top: &Option<T>) {
            if top.is_some() {
                slot.clone_from(top);
            }
        }
        take(&mut self.hide, &other.hide);
        take(&mut self.summary, &other.summary);
        take(&mut self.description, &other.description);
        take(&mut self.tags, &other.tags);
        take(&mut self.deprecated, &other.deprecated);
        take(&mut self.operation_id, &other.operation_id);
        take(&mut self.content_type, &other.content_type);
        take(&mut self.external_docs, &other.external_docs);
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────────

pub(crate) fn assemble(app: &App) -> Result<Value, Error> {
    let Some(Value::Object(header)) = &app.config().document else {
        return Err(Error::MissingDocument);
    };
    let validator = app.validator();

    let mut document = header.clone();
    let mut paths = Map::new();

    for route in app.routes() {
        if route.merged_docs().is_hidden() {
            continue;
        }
        let path = template_path(&app.config().full_path(route.path()));
        let operation = operation(route, validator)?;
        let item = paths.entry(path).or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(item) = item {
            item.insert(route.method().as_str().to_ascii_lowercase(), operation);
        }
    }

    document.insert("paths".to_owned(), Value::Object(paths));
    Ok(Value::Object(document))
}

fn operation(route: &Route, validator: &dyn Validator) -> Result<Value, Error> {
    let docs = route.merged_docs();
    let validation = route.merged_validation();
    let request = &validation.request;

    let mut op = match serde_json::to_value(docs)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let mut parameters = Vec::new();
    for (location, schemas) in [
        ("query", &request.query),
        ("path", &request.params),
        ("header", &request.headers),
        ("cookie", &request.cookies),
    ] {
        for (name, schema) in schemas {
            parameters.push(json!({
                "name": name,
                "in": location,
                "required": location == "path",
                "schema": validator.describe(schema),
            }));
        }
    }
    op.insert("parameters".to_owned(), Value::Array(parameters));

    if let Some(body) = &request.body {
        let content = if body.content.is_empty() {
            let content_type =
                docs.content_type.clone().unwrap_or_else(|| "application/json".to_owned());
            let mut content = Map::new();
            content.insert(content_type, json!({ "schema": { "type": "object" } }));
            content
        } else {
            describe_content(&body.content, validator)
        };
        let mut request_body = Map::new();
        if let Some(description) = &body.description {
            request_body.insert("description".to_owned(), json!(description));
        }
        request_body.insert("required".to_owned(), json!(body.required));
        request_body.insert("content".to_owned(), Value::Object(content));
        op.insert("requestBody".to_owned(), Value::Object(request_body));
    }

    let mut responses = Map::new();
    for (status, schema) in &validation.responses {
        let headers: Map<String, Value> = schema
            .headers
            .iter()
            .map(|(name, s)| (name.clone(), json!({ "schema": validator.describe(s) })))
            .collect();
        responses.insert(
            status.to_string(),
            json!({
                "description": schema.description.clone().unwrap_or_default(),
                "content": describe_content(&schema.content, validator),
                "headers": headers,
            }),
        );
    }
    op.insert("responses".to_owned(), Value::Object(responses));

    Ok(Value::Object(op))
}

fn describe_content(content: &SchemaMap, validator: &dyn Validator) -> Map<String, Value> {
    content
        .iter()
        .map(|(content_type, schema)| {
            (content_type.clone(), json!({ "schema": validator.describe(schema) }))
        })
        .collect()
}
