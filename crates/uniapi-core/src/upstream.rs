use anyhow::Context;
use serde_json::Value;

use uniapi_provider_core::{Engine, Headers};

use crate::config::ProviderConfig;
use crate::endpoints::EndpointBundle;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A fully addressed upstream exchange: where to POST, with which auth
/// headers, and the JSON body to send.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub url: String,
    pub headers: Headers,
    pub payload: Value,
}

/// Address the upstream call for `engine`. The inbound body passes through;
/// only the model and stream fields are rewritten to the upstream's naming
/// (Gemini-style APIs carry both in the URL instead).
pub fn build_upstream(
    provider: &ProviderConfig,
    engine: Engine,
    api_key: &str,
    model: &str,
    mut payload: Value,
    stream: bool,
    region: Option<&str>,
) -> anyhow::Result<UpstreamRequest> {
    set_field(&mut payload, "model", Value::String(model.to_string()));
    set_field(&mut payload, "stream", Value::Bool(stream));

    let (url, headers) = match engine {
        Engine::Gpt | Engine::OpenRouter => {
            let bundle = EndpointBundle::parse(&provider.base_url)?;
            (bundle.chat, bearer(api_key))
        }
        Engine::Azure => {
            let bundle = EndpointBundle::parse(&provider.base_url)?;
            (bundle.chat, vec![("api-key".to_string(), api_key.to_string())])
        }
        Engine::Claude => {
            let base = provider.base_url.trim_end_matches('/');
            let url = if base.ends_with("/v1/messages") {
                base.to_string()
            } else {
                format!("{base}/v1/messages")
            };
            (
                url,
                vec![
                    ("x-api-key".to_string(), api_key.to_string()),
                    ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
                ],
            )
        }
        Engine::Gemini => {
            strip_field(&mut payload, "model");
            strip_field(&mut payload, "stream");
            let base = provider.base_url.trim_end_matches('/');
            let operation = if stream { "streamGenerateContent" } else { "generateContent" };
            (
                format!("{base}/v1beta/models/{model}:{operation}?key={api_key}"),
                Vec::new(),
            )
        }
        Engine::VertexGemini => {
            strip_field(&mut payload, "model");
            strip_field(&mut payload, "stream");
            let project_id = provider
                .project_id
                .as_deref()
                .context("vertex provider is missing project_id")?;
            let region = region.context("vertex request is missing a region")?;
            let operation = if stream { "streamGenerateContent" } else { "generateContent" };
            (
                format!(
                    "https://{region}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{region}/publishers/google/models/{model}:{operation}"
                ),
                bearer(api_key),
            )
        }
        Engine::VertexClaude => {
            strip_field(&mut payload, "model");
            let project_id = provider
                .project_id
                .as_deref()
                .context("vertex provider is missing project_id")?;
            let region = region.context("vertex request is missing a region")?;
            let operation = if stream { "streamRawPredict" } else { "rawPredict" };
            set_field(
                &mut payload,
                "anthropic_version",
                Value::String("vertex-2023-10-16".to_string()),
            );
            (
                format!(
                    "https://{region}-aiplatform.googleapis.com/v1/projects/{project_id}/locations/{region}/publishers/anthropic/models/{model}:{operation}"
                ),
                bearer(api_key),
            )
        }
        Engine::Cloudflare => {
            let account = provider
                .cf_account_id
                .as_deref()
                .context("cloudflare provider is missing cf_account_id")?;
            strip_field(&mut payload, "model");
            (
                format!(
                    "https://api.cloudflare.com/client/v4/accounts/{account}/ai/run/{model}"
                ),
                bearer(api_key),
            )
        }
        Engine::Cohere => (provider.base_url.clone(), bearer(api_key)),
        Engine::Tts => {
            strip_field(&mut payload, "stream");
            let bundle = EndpointBundle::parse(&provider.base_url)?;
            (bundle.audio_speech, bearer(api_key))
        }
    };

    Ok(UpstreamRequest { url, headers, payload })
}

fn bearer(api_key: &str) -> Headers {
    vec![("authorization".to_string(), format!("Bearer {api_key}"))]
}

fn set_field(payload: &mut Value, field: &str, value: Value) {
    if let Some(map) = payload.as_object_mut() {
        map.insert(field.to_string(), value);
    }
}

fn strip_field(payload: &mut Value, field: &str) {
    if let Some(map) = payload.as_object_mut() {
        map.remove(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(base_url: &str) -> ProviderConfig {
        let yaml = format!("provider: p\nbase_url: {base_url}\n");
        serde_yaml::from_str(&yaml).unwrap()
    }

    #[test]
    fn openai_request_uses_chat_endpoint_and_bearer() {
        let req = build_upstream(
            &provider("https://api.openai.com/v1/chat/completions"),
            Engine::Gpt,
            "sk-1",
            "gpt-4o",
            json!({"messages": []}),
            true,
            None,
        )
        .unwrap();
        assert_eq!(req.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(req.headers[0].1, "Bearer sk-1");
        assert_eq!(req.payload["model"], "gpt-4o");
        assert_eq!(req.payload["stream"], true);
    }

    #[test]
    fn gemini_request_addresses_model_in_url() {
        let req = build_upstream(
            &provider("https://generativelanguage.googleapis.com"),
            Engine::Gemini,
            "g-key",
            "gemini-1.5-pro",
            json!({"contents": []}),
            true,
            None,
        )
        .unwrap();
        assert_eq!(
            req.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:streamGenerateContent?key=g-key"
        );
        assert!(req.payload.get("model").is_none());
        assert!(req.payload.get("stream").is_none());
    }

    #[test]
    fn vertex_claude_request_uses_region_and_raw_predict() {
        let mut p = provider("https://aiplatform.googleapis.com/");
        p.project_id = Some("proj".to_string());
        let req = build_upstream(
            &p,
            Engine::VertexClaude,
            "token",
            "claude-3-5-sonnet@20240620",
            json!({"messages": []}),
            true,
            Some("us-east5"),
        )
        .unwrap();
        assert_eq!(
            req.url,
            "https://us-east5-aiplatform.googleapis.com/v1/projects/proj/locations/us-east5/publishers/anthropic/models/claude-3-5-sonnet@20240620:streamRawPredict"
        );
        assert_eq!(req.payload["anthropic_version"], "vertex-2023-10-16");
    }

    #[test]
    fn cloudflare_request_addresses_account_and_model() {
        let mut p = provider("https://api.cloudflare.com/");
        p.cf_account_id = Some("acct".to_string());
        let req = build_upstream(
            &p,
            Engine::Cloudflare,
            "cf-key",
            "@cf/meta/llama-3",
            json!({"messages": []}),
            true,
            None,
        )
        .unwrap();
        assert_eq!(
            req.url,
            "https://api.cloudflare.com/client/v4/accounts/acct/ai/run/@cf/meta/llama-3"
        );
    }
}
