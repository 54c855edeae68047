//! Transport-neutral view of an incoming blueprint request

use serde_json::{Map, Value};

/// Parameters of one request, split by where they came from
///
/// The HTTP layer fills this from the path, the query string and the JSON
/// body; tests build it directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlueprintRequest {
    /// Path parameters (`id`, `parentid`, `childid`)
    pub path: Map<String, Value>,
    /// Query string parameters, as strings
    pub query: Map<String, Value>,
    /// Parsed JSON body
    pub body: Option<Value>,
    /// Request id of the caller, used to exclude it from broadcasts
    pub origin: Option<String>,
}

impl BlueprintRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.path.insert(name.to_string(), value.into());
        self
    }

    pub fn with_query(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    fn body_object(&self) -> Option<&Map<String, Value>> {
        self.body.as_ref().and_then(Value::as_object)
    }

    /// Look up one parameter: path first, then body, then query
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.path
            .get(name)
            .or_else(|| self.body_object().and_then(|b| b.get(name)))
            .or_else(|| self.query.get(name))
    }

    /// Every parameter, merged so that path beats body beats query
    pub fn all_params(&self) -> Map<String, Value> {
        let mut params = self.query.clone();
        if let Some(body) = self.body_object() {
            for (key, value) in body {
                params.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &self.path {
            params.insert(key.clone(), value.clone());
        }
        params
    }
}
