use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, State};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use uniapi_core::{AppState, GatewayConfig};

use crate::ApiKeyIndex;

/// Stable `created` stamp carried by every model entry.
const MODELS_CREATED: i64 = 1_720_524_448_858;

pub(crate) async fn list_models(
    State(state): State<Arc<AppState>>,
    Extension(ApiKeyIndex(api_index)): Extension<ApiKeyIndex>,
) -> Response {
    let config = state.config.load_full();
    let data: Vec<Value> = visible_models(&config, api_index)
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": MODELS_CREATED,
                "owned_by": "uni-api",
            })
        })
        .collect();
    Json(json!({"object": "list", "data": data})).into_response()
}

/// The deduplicated union of models this key's grants expose, in grant order.
fn visible_models(config: &GatewayConfig, api_index: usize) -> Vec<String> {
    let Some(key) = config.api_keys.get(api_index) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let push = |model: String, out: &mut Vec<String>, seen: &mut HashSet<String>| {
        if seen.insert(model.clone()) {
            out.push(model);
        }
    };

    for grant in key.grants() {
        if grant == "all" {
            // Every model of every provider; short-circuits remaining grants.
            let mut all = Vec::new();
            let mut all_seen = HashSet::new();
            for provider in &config.providers {
                for (inbound, _) in provider.model_pairs() {
                    push(inbound, &mut all, &mut all_seen);
                }
            }
            return all;
        }
        match grant.split_once('/') {
            Some((provider_name, "*")) => {
                for provider in &config.providers {
                    if provider.provider != provider_name {
                        continue;
                    }
                    for (inbound, _) in provider.model_pairs() {
                        push(inbound, &mut out, &mut seen);
                    }
                }
            }
            Some((provider_name, model_name)) => {
                for provider in &config.providers {
                    if provider.provider != provider_name {
                        continue;
                    }
                    for (inbound, _) in provider.model_pairs() {
                        if inbound == model_name {
                            push(inbound, &mut out, &mut seen);
                        }
                    }
                }
            }
            None => push(grant, &mut out, &mut seen),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uniapi_core::config::normalize;

    fn config(yaml: &str) -> GatewayConfig {
        let mut config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        normalize(&mut config);
        config
    }

    const YAML: &str = r#"
providers:
  - provider: a
    base_url: https://api.openai.com/v1/chat/completions
    api: sk-1
    model:
      - gpt-4o
      - o1-mini
  - provider: b
    base_url: https://api.anthropic.com/v1/messages
    api: sk-2
    model:
      - claude-3-5-sonnet
api_keys:
  - api: key-all
  - api: key-scoped
    model:
      - a/gpt-4o
      - b/*
  - api: key-plain
    model:
      - o1-mini
"#;

    #[test]
    fn all_grant_lists_everything_once() {
        let models = visible_models(&config(YAML), 0);
        assert_eq!(models, vec!["gpt-4o", "o1-mini", "claude-3-5-sonnet"]);
    }

    #[test]
    fn scoped_grants_union_in_order() {
        let models = visible_models(&config(YAML), 1);
        assert_eq!(models, vec!["gpt-4o", "claude-3-5-sonnet"]);
    }

    #[test]
    fn plain_grant_passes_through() {
        let models = visible_models(&config(YAML), 2);
        assert_eq!(models, vec!["o1-mini"]);
    }
}
