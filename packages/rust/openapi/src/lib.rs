//! OpenAPI document walking for docsync.
//!
//! Flattens each `(path, method)` operation into a structured [`Endpoint`]
//! record with all references resolved, and renders endpoint markdown.

pub mod render;
pub mod resolver;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

pub use render::{render_api_section, render_endpoint};
pub use resolver::{MAX_REF_DEPTH, resolve_refs};

// ---------------------------------------------------------------------------
// Endpoint records
// ---------------------------------------------------------------------------

/// HTTP methods recognized under the spec's path section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl HttpMethod {
    /// Parse a path-item key (`"get"`, `"post"`, …).
    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "get" => Some(Self::Get),
            "post" => Some(Self::Post),
            "put" => Some(Self::Put),
            "patch" => Some(Self::Patch),
            "delete" => Some(Self::Delete),
            "options" => Some(Self::Options),
            "head" => Some(Self::Head),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a parameter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Query,
    Path,
    Header,
    Cookie,
    Body,
}

impl ParamLocation {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "query" => Some(Self::Query),
            "path" => Some(Self::Path),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            "body" => Some(Self::Body),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Path => "path",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Body => "body",
        }
    }
}

/// A single operation parameter, spec order preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointParam {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Resolved schema for the parameter.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub schema: Value,
}

/// Request body: media type → resolved schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointBody {
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: BTreeMap<String, Value>,
}

/// One response entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointResponse {
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content: BTreeMap<String, Value>,
}

/// A flattened `(path, method)` operation with all references resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<EndpointParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<EndpointBody>,
    /// Status code → response, ascending.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub responses: BTreeMap<String, EndpointResponse>,
    /// `x-*` extension keys preserved from the operation object.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

impl Endpoint {
    /// Display title: summary, else operation id, else `METHOD path`.
    pub fn title(&self) -> String {
        self.summary
            .clone()
            .or_else(|| self.operation_id.clone())
            .unwrap_or_else(|| format!("{} {}", self.method, self.path))
    }

    /// The endpoint path slugified for page matching: `/` and `_` → `-`.
    pub fn slug(&self) -> String {
        self.path
            .trim_matches('/')
            .replace(['/', '_'], "-")
            .replace("--", "-")
            .to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Walk the spec's `paths` section and flatten every recognized operation.
#[instrument(skip_all)]
pub fn parse_endpoints(spec: &Value) -> Vec<Endpoint> {
    let Some(paths) = spec.get("paths").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut endpoints = Vec::new();

    for (path, item) in paths {
        let Some(item_map) = item.as_object() else {
            continue;
        };

        // Path-level parameters are inherited by every operation.
        let path_params = item_map
            .get("parameters")
            .map(|p| parse_parameters(spec, p))
            .unwrap_or_default();

        for (key, op) in item_map {
            let Some(method) = HttpMethod::from_key(key) else {
                continue;
            };
            endpoints.push(parse_operation(spec, method, path, op, &path_params));
        }
    }

    debug!(endpoint_count = endpoints.len(), "parsed endpoints from spec");
    endpoints
}

fn parse_operation(
    spec: &Value,
    method: HttpMethod,
    path: &str,
    op: &Value,
    inherited: &[EndpointParam],
) -> Endpoint {
    let mut parameters = inherited.to_vec();
    if let Some(own) = op.get("parameters") {
        parameters.extend(parse_parameters(spec, own));
    }

    let request_body = op.get("requestBody").map(|rb| {
        let rb = resolve_refs(spec, rb);
        let mut content = BTreeMap::new();
        if let Some(media_map) = rb.get("content").and_then(Value::as_object) {
            for (media_type, media) in media_map {
                content.insert(media_type.clone(), media_schema(media));
            }
        }
        EndpointBody {
            required: rb.get("required").and_then(Value::as_bool).unwrap_or(false),
            description: string_field(&rb, "description"),
            content,
        }
    });

    let mut responses = BTreeMap::new();
    if let Some(resp_map) = op.get("responses").and_then(Value::as_object) {
        for (status, resp) in resp_map {
            let resp = resolve_refs(spec, resp);
            let mut content = BTreeMap::new();
            if let Some(media_map) = resp.get("content").and_then(Value::as_object) {
                for (media_type, media) in media_map {
                    content.insert(media_type.clone(), media_schema(media));
                }
            }
            responses.insert(
                status.clone(),
                EndpointResponse {
                    description: string_field(&resp, "description").unwrap_or_default(),
                    content,
                },
            );
        }
    }

    let mut extensions = BTreeMap::new();
    if let Some(op_map) = op.as_object() {
        for (key, value) in op_map {
            if key.starts_with("x-") {
                extensions.insert(key.clone(), value.clone());
            }
        }
    }

    let tags = op
        .get("tags")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Endpoint {
        method,
        path: path.to_string(),
        summary: string_field(op, "summary"),
        description: string_field(op, "description"),
        operation_id: string_field(op, "operationId"),
        tags,
        deprecated: op.get("deprecated").and_then(Value::as_bool).unwrap_or(false),
        parameters,
        request_body,
        responses,
        extensions,
    }
}

fn parse_parameters(spec: &Value, params: &Value) -> Vec<EndpointParam> {
    let Some(arr) = params.as_array() else {
        return Vec::new();
    };

    arr.iter()
        .filter_map(|raw| {
            let param = resolve_refs(spec, raw);
            let name = string_field(&param, "name")?;
            let location = param
                .get("in")
                .and_then(Value::as_str)
                .and_then(ParamLocation::from_key)?;

            // Path parameters are always required.
            let required = location == ParamLocation::Path
                || param.get("required").and_then(Value::as_bool).unwrap_or(false);

            Some(EndpointParam {
                name,
                location,
                required,
                description: string_field(&param, "description"),
                schema: param.get("schema").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

/// Pull the schema out of a media object, folding a media-level `example`
/// into the schema copy so rendering sees it first.
fn media_schema(media: &Value) -> Value {
    let mut schema = media.get("schema").cloned().unwrap_or(Value::Null);
    if let Some(example) = media.get("example") {
        if let Value::Object(ref mut map) = schema {
            map.entry("example".to_string())
                .or_insert_with(|| example.clone());
        } else if schema.is_null() {
            schema = serde_json::json!({ "example": example });
        }
    }
    schema
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_spec() -> Value {
        json!({
            "openapi": "3.0.0",
            "paths": {
                "/chat/completions": {
                    "post": {
                        "summary": "Create a chat completion",
                        "operationId": "createChatCompletion",
                        "tags": ["chat"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/ChatRequest" }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "Completion created",
                                "content": {
                                    "application/json": {
                                        "schema": { "type": "object" }
                                    }
                                }
                            },
                            "429": { "description": "Rate limited" }
                        },
                        "x-beta": true
                    }
                },
                "/models": {
                    "parameters": [
                        { "name": "type", "in": "query", "schema": { "type": "string" } }
                    ],
                    "get": {
                        "summary": "List models",
                        "deprecated": true,
                        "responses": { "200": { "description": "OK" } }
                    }
                }
            },
            "components": {
                "schemas": {
                    "ChatRequest": {
                        "type": "object",
                        "required": ["model"],
                        "properties": {
                            "model": { "type": "string", "enum": ["default", "large"] }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn parses_all_operations() {
        let endpoints = parse_endpoints(&sample_spec());
        assert_eq!(endpoints.len(), 2);
    }

    #[test]
    fn resolves_request_body_refs() {
        let endpoints = parse_endpoints(&sample_spec());
        let chat = endpoints
            .iter()
            .find(|e| e.path == "/chat/completions")
            .unwrap();

        let body = chat.request_body.as_ref().expect("request body");
        assert!(body.required);
        let schema = &body.content["application/json"];
        assert_eq!(schema["properties"]["model"]["type"], "string");
    }

    #[test]
    fn inherits_path_level_parameters() {
        let endpoints = parse_endpoints(&sample_spec());
        let models = endpoints.iter().find(|e| e.path == "/models").unwrap();

        assert_eq!(models.parameters.len(), 1);
        assert_eq!(models.parameters[0].name, "type");
        assert_eq!(models.parameters[0].location, ParamLocation::Query);
        assert!(models.deprecated);
    }

    #[test]
    fn preserves_extensions() {
        let endpoints = parse_endpoints(&sample_spec());
        let chat = endpoints
            .iter()
            .find(|e| e.path == "/chat/completions")
            .unwrap();
        assert_eq!(chat.extensions.get("x-beta"), Some(&json!(true)));
    }

    #[test]
    fn responses_sorted_ascending() {
        let endpoints = parse_endpoints(&sample_spec());
        let chat = endpoints
            .iter()
            .find(|e| e.path == "/chat/completions")
            .unwrap();
        let statuses: Vec<_> = chat.responses.keys().cloned().collect();
        assert_eq!(statuses, vec!["200", "429"]);
    }

    #[test]
    fn path_params_forced_required() {
        let spec = json!({
            "paths": {
                "/images/{id}": {
                    "get": {
                        "parameters": [
                            { "name": "id", "in": "path", "schema": { "type": "string" } }
                        ],
                        "responses": {}
                    }
                }
            }
        });
        let endpoints = parse_endpoints(&spec);
        assert!(endpoints[0].parameters[0].required);
    }

    #[test]
    fn unknown_methods_skipped() {
        let spec = json!({
            "paths": { "/x": { "trace": { "responses": {} }, "summary": "not a method" } }
        });
        assert!(parse_endpoints(&spec).is_empty());
    }

    #[test]
    fn slug_replaces_separators() {
        let endpoints = parse_endpoints(&sample_spec());
        let chat = endpoints
            .iter()
            .find(|e| e.path == "/chat/completions")
            .unwrap();
        assert_eq!(chat.slug(), "chat-completions");
    }

    #[test]
    fn title_falls_back() {
        let spec = json!({
            "paths": { "/a": { "get": { "responses": {} } } }
        });
        let endpoints = parse_endpoints(&spec);
        assert_eq!(endpoints[0].title(), "GET /a");
    }

    #[test]
    fn yaml_spec_parses_identically() {
        let yaml = r#"
paths:
  /audio/speech:
    post:
      summary: Generate speech
      responses:
        "200":
          description: Audio stream
"#;
        let spec: Value = serde_yaml::from_str(yaml).expect("yaml");
        let endpoints = parse_endpoints(&spec);
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].summary.as_deref(), Some("Generate speech"));
    }
}
