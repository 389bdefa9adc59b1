//! Live model-catalog fetcher.
//!
//! One bearer-authenticated `GET /models` against the running service.
//! Missing key or 401 yields an empty catalog; other non-2xx responses are
//! logged and yield empty. The response is `{"data": [...]}` or a bare
//! array.

use serde_json::Value;
use tracing::{info, instrument, warn};

/// Fetch the live model catalog. Always total: failures yield empty.
#[instrument(skip(client, api_key))]
pub async fn fetch_models(
    client: &reqwest::Client,
    api_base: &str,
    api_key: Option<&str>,
) -> Vec<Value> {
    let Some(api_key) = api_key else {
        warn!("no API key configured, skipping live model catalog");
        return Vec::new();
    };

    let url = format!("{}/models", api_base.trim_end_matches('/'));

    let response = match client.get(&url).bearer_auth(api_key).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "live endpoint unreachable");
            return Vec::new();
        }
    };

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        warn!("live endpoint rejected the API key");
        return Vec::new();
    }
    if !status.is_success() {
        warn!(status = status.as_u16(), "live endpoint returned an error");
        return Vec::new();
    }

    let body: Value = match response.json().await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "live endpoint returned unparseable JSON");
            return Vec::new();
        }
    };

    let models = match body {
        Value::Array(models) => models,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(models)) => models,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    info!(model_count = models.len(), "fetched live model catalog");
    models
}

/// Render the catalog as a markdown page. `None` when the catalog is empty
/// so an absent source never produces a page.
pub fn catalog_markdown(models: &[Value]) -> Option<String> {
    if models.is_empty() {
        return None;
    }

    let mut out = String::from("# Model Catalog\n\nLive model list as reported by the API.\n\n");
    out.push_str("| ID | Type | Owner |\n|---|---|---|\n");

    for model in models {
        let id = model.get("id").and_then(Value::as_str).unwrap_or("?");
        let kind = model
            .get("type")
            .or_else(|| model.get("object"))
            .and_then(Value::as_str)
            .unwrap_or("model");
        let owner = model
            .get("owned_by")
            .and_then(Value::as_str)
            .unwrap_or("—");
        out.push_str(&format!("| `{id}` | {kind} | {owner} |\n"));
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_data_wrapped_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "default", "type": "text", "owned_by": "upstream" },
                    { "id": "large", "type": "text" }
                ]
            })))
            .mount(&server)
            .await;

        let client = crate::http_client(5).unwrap();
        let models = fetch_models(&client, &server.uri(), Some("sk-test")).await;
        assert_eq!(models.len(), 2);
        assert_eq!(models[0]["id"], "default");
    }

    #[tokio::test]
    async fn accepts_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "id": "only" }])),
            )
            .mount(&server)
            .await;

        let client = crate::http_client(5).unwrap();
        let models = fetch_models(&client, &server.uri(), Some("k")).await;
        assert_eq!(models.len(), 1);
    }

    #[tokio::test]
    async fn missing_key_yields_empty() {
        let client = crate::http_client(5).unwrap();
        let models = fetch_models(&client, "http://127.0.0.1:1", None).await;
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = crate::http_client(5).unwrap();
        let models = fetch_models(&client, &server.uri(), Some("bad-key")).await;
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn server_error_yields_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = crate::http_client(5).unwrap();
        let models = fetch_models(&client, &server.uri(), Some("k")).await;
        assert!(models.is_empty());
    }

    #[test]
    fn markdown_table_lists_models() {
        let models = vec![
            json!({ "id": "default", "type": "text", "owned_by": "upstream" }),
            json!({ "id": "tts", "object": "model" }),
        ];
        let md = catalog_markdown(&models).unwrap();
        assert!(md.starts_with("# Model Catalog"));
        assert!(md.contains("| `default` | text | upstream |"));
        assert!(md.contains("| `tts` | model | — |"));
    }

    #[test]
    fn empty_catalog_renders_nothing() {
        assert!(catalog_markdown(&[]).is_none());
    }
}
