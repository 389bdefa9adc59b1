//! `$ref` resolution against the whole OpenAPI document.
//!
//! References use JSON-pointer syntax (`#/components/schemas/Model`).
//! The reference graph may cycle, so expansion is depth-bounded and keeps a
//! visited set keyed by pointer string; at the bound the unresolved `$ref`
//! node is returned as-is.

use std::collections::HashSet;

use serde_json::Value;
use tracing::warn;

/// Recursion cap for reference expansion.
pub const MAX_REF_DEPTH: usize = 10;

/// Deep-resolve every `$ref` reachable from `node`.
pub fn resolve_refs(root: &Value, node: &Value) -> Value {
    let mut visiting = HashSet::new();
    resolve_inner(root, node, 0, &mut visiting)
}

fn resolve_inner(root: &Value, node: &Value, depth: usize, visiting: &mut HashSet<String>) -> Value {
    if depth >= MAX_REF_DEPTH {
        return node.clone();
    }

    match node {
        Value::Object(map) => {
            if let Some(Value::String(pointer)) = map.get("$ref") {
                // Cycle: leave the reference unresolved.
                if visiting.contains(pointer) {
                    return node.clone();
                }

                match lookup_pointer(root, pointer) {
                    Some(target) => {
                        visiting.insert(pointer.clone());
                        let resolved = resolve_inner(root, target, depth + 1, visiting);
                        visiting.remove(pointer);
                        return resolved;
                    }
                    None => {
                        warn!(pointer = %pointer, "dangling $ref, leaving unresolved");
                        return node.clone();
                    }
                }
            }

            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key.clone(), resolve_inner(root, value, depth + 1, visiting));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_inner(root, v, depth + 1, visiting))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Look up `#/a/b/c` style pointers in the document.
fn lookup_pointer<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    let pointer = pointer.strip_prefix('#')?;
    root.pointer(pointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_simple_ref() {
        let root = json!({
            "components": { "schemas": { "Model": { "type": "string" } } }
        });
        let node = json!({ "$ref": "#/components/schemas/Model" });

        assert_eq!(resolve_refs(&root, &node), json!({ "type": "string" }));
    }

    #[test]
    fn resolves_nested_refs() {
        let root = json!({
            "components": { "schemas": {
                "Inner": { "type": "integer" },
                "Outer": {
                    "type": "object",
                    "properties": { "n": { "$ref": "#/components/schemas/Inner" } }
                }
            }}
        });
        let node = json!({ "$ref": "#/components/schemas/Outer" });
        let resolved = resolve_refs(&root, &node);

        assert_eq!(resolved["properties"]["n"], json!({ "type": "integer" }));
    }

    #[test]
    fn cycle_stops_at_bound() {
        let root = json!({
            "components": { "schemas": {
                "Node": {
                    "type": "object",
                    "properties": { "next": { "$ref": "#/components/schemas/Node" } }
                }
            }}
        });
        let node = json!({ "$ref": "#/components/schemas/Node" });

        // Must terminate; the innermost occurrence stays an unresolved $ref.
        let resolved = resolve_refs(&root, &node);
        let as_text = resolved.to_string();
        assert!(as_text.contains("$ref"));
    }

    #[test]
    fn dangling_ref_left_in_place() {
        let root = json!({});
        let node = json!({ "$ref": "#/components/schemas/Missing" });
        assert_eq!(resolve_refs(&root, &node), node);
    }

    #[test]
    fn non_ref_values_pass_through() {
        let root = json!({});
        let node = json!({ "type": "array", "items": { "type": "string" } });
        assert_eq!(resolve_refs(&root, &node), node);
    }
}
