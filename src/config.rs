//! Application configuration.

use serde::Deserialize;
use serde_json::Value;

use crate::route::join_paths;

/// Settings supplied when the [`App`](crate::App) is created.
///
/// ```rust
/// use sabre::Config;
/// use serde_json::json;
///
/// let config = Config::new()
///     .with_base_path("/api/v1")
///     .with_document(json!({
///         "openapi": "3.1.0",
///         "info": {"title": "Users", "version": "1.0.0"}
///     }));
/// assert_eq!(config.full_path("/users"), "/api/v1/users");
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix applied to every route path by the transport adapter and the
    /// API description. Empty means no prefix.
    pub base_path: String,
    /// Header of the API description (`openapi`, `info`, `servers`, ...).
    /// Must be a JSON object; `paths` is generated.
    pub document: Option<Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_document(mut self, document: Value) -> Self {
        self.document = Some(document);
        self
    }

    /// `path` with the base path in front.
    pub fn full_path(&self, path: &str) -> String {
        join_paths(&self.base_path, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_base_path_adds_nothing() {
        assert_eq!(Config::new().full_path("/users/:id"), "/users/:id");
        assert_eq!(Config::new().with_base_path("/").full_path("/users"), "/users");
        assert_eq!(Config::new().with_base_path("/api/").full_path("/"), "/api");
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: Config = serde_json::from_value(json!({"base_path": "/v2"})).unwrap();
        assert_eq!(config.base_path, "/v2");
        assert!(config.document.is_none());
    }
}
