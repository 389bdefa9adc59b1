//! Endpoint markdown rendering.
//!
//! Pure functions of the endpoint record: the same record always renders to
//! the same markdown.

use serde_json::Value;

use crate::{Endpoint, EndpointParam};

/// Maximum depth when synthesizing example values from a schema.
const MAX_EXAMPLE_DEPTH: usize = 6;

/// Render the full markdown page for an endpoint.
pub fn render_endpoint(endpoint: &Endpoint) -> String {
    let mut out = String::new();

    out.push_str(&format!("# {}\n\n", endpoint.title()));
    out.push_str(&format!(
        "```http\n{} {}\n```\n\n",
        endpoint.method, endpoint.path
    ));

    if let Some(ref description) = endpoint.description {
        out.push_str(description.trim());
        out.push_str("\n\n");
    }

    if endpoint.deprecated {
        out.push_str(
            "> ⚠️ **Deprecated** — this operation may be removed in a future release.\n\n",
        );
    }

    if !endpoint.parameters.is_empty() {
        out.push_str("## Parameters\n\n");
        out.push_str(&render_params_table(&endpoint.parameters));
        out.push('\n');
    }

    if let Some(ref body) = endpoint.request_body {
        out.push_str("## Request Body\n\n");
        if body.required {
            out.push_str("_Required._\n\n");
        }
        if let Some(ref description) = body.description {
            out.push_str(description.trim());
            out.push_str("\n\n");
        }
        for (media_type, schema) in &body.content {
            out.push_str(&format!("**{media_type}**\n\n"));
            out.push_str(&render_json_example(schema));
        }
    }

    if !endpoint.responses.is_empty() {
        out.push_str("## Responses\n\n");
        for (status, response) in &endpoint.responses {
            out.push_str(&format!("### {status}\n\n"));
            if !response.description.is_empty() {
                out.push_str(response.description.trim());
                out.push_str("\n\n");
            }
            for (media_type, schema) in &response.content {
                out.push_str(&format!("**{media_type}**\n\n"));
                out.push_str(&render_json_example(schema));
            }
        }
    }

    if !endpoint.extensions.is_empty() {
        out.push_str("## Extensions\n\n");
        for (key, value) in &endpoint.extensions {
            out.push_str(&format!("- `{key}`: {value}\n"));
        }
        out.push('\n');
    }

    format!("{}\n", out.trim_end())
}

/// Render only the parameter/response tables, for injection under
/// `## API Specification` by the merger.
pub fn render_api_section(endpoint: &Endpoint) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "```http\n{} {}\n```\n\n",
        endpoint.method, endpoint.path
    ));

    if endpoint.deprecated {
        out.push_str("> ⚠️ **Deprecated**\n\n");
    }

    if !endpoint.parameters.is_empty() {
        out.push_str("### Parameters\n\n");
        out.push_str(&render_params_table(&endpoint.parameters));
        out.push('\n');
    }

    if !endpoint.responses.is_empty() {
        out.push_str("### Responses\n\n");
        out.push_str("| Status | Description |\n|---|---|\n");
        for (status, response) in &endpoint.responses {
            out.push_str(&format!(
                "| {} | {} |\n",
                status,
                cell(&response.description)
            ));
        }
        out.push('\n');
    }

    format!("{}\n", out.trim_end())
}

fn render_params_table(params: &[EndpointParam]) -> String {
    let mut out = String::from("| Name | In | Type | Required | Description |\n|---|---|---|---|---|\n");
    for param in params {
        out.push_str(&format!(
            "| `{}` | {} | {} | {} | {} |\n",
            param.name,
            param.location.as_str(),
            schema_type_label(&param.schema),
            if param.required { "yes" } else { "no" },
            cell(param.description.as_deref().unwrap_or("")),
        ));
    }
    out
}

/// Short type label for the parameters table.
fn schema_type_label(schema: &Value) -> String {
    match schema.get("type").and_then(Value::as_str) {
        Some("array") => {
            let item = schema
                .get("items")
                .and_then(|i| i.get("type"))
                .and_then(Value::as_str)
                .unwrap_or("object");
            format!("array<{item}>")
        }
        Some(t) => t.to_string(),
        None if schema.get("$ref").is_some() => "object".to_string(),
        None => "string".to_string(),
    }
}

/// One fenced JSON example synthesized from a schema.
fn render_json_example(schema: &Value) -> String {
    let example = example_from_schema(schema, 0);
    let pretty = serde_json::to_string_pretty(&example).unwrap_or_else(|_| "{}".to_string());
    format!("```json\n{pretty}\n```\n\n")
}

/// Synthesize an example value: prefer `example`, then the first `enum`
/// value, then a per-type default. Depth-bounded for cyclic leftovers.
fn example_from_schema(schema: &Value, depth: usize) -> Value {
    if depth >= MAX_EXAMPLE_DEPTH {
        return Value::Null;
    }

    if let Some(example) = schema.get("example") {
        return example.clone();
    }
    if let Some(first) = schema
        .get("enum")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
    {
        return first.clone();
    }

    match schema.get("type").and_then(Value::as_str) {
        Some("object") | None => {
            let mut map = serde_json::Map::new();
            if let Some(props) = schema.get("properties").and_then(Value::as_object) {
                for (name, prop) in props {
                    map.insert(name.clone(), example_from_schema(prop, depth + 1));
                }
            }
            Value::Object(map)
        }
        Some("array") => {
            let item = schema
                .get("items")
                .map(|items| example_from_schema(items, depth + 1))
                .unwrap_or(Value::Null);
            Value::Array(vec![item])
        }
        Some("string") => Value::String("string".into()),
        Some("integer") => Value::from(0),
        Some("number") => Value::from(0.0),
        Some("boolean") => Value::Bool(false),
        Some(_) => Value::Null,
    }
}

/// Escape table cell content and flatten to one line.
fn cell(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', r"\|")
}
