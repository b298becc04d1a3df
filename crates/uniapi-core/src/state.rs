use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{error, info};

use uniapi_provider_core::{
    CredentialPool, RateLimit, ScheduleAlgorithm, VertexRegions, parse_rate_limit,
};
use uniapi_provider_impl::build_upstream_client;

use crate::config::{DEFAULT_ERROR_TRIGGERS, GatewayConfig, RateLimitField};

/// Process-scoped registry: the loaded config, one credential pool per
/// provider, the shared upstream client and the Vertex region rings.
///
/// Pools are rebuilt wholesale on config (re)load; in-flight requests keep
/// using the pool instance they resolved.
pub struct AppState {
    pub config: ArcSwap<GatewayConfig>,
    pub pools: ArcSwap<HashMap<String, Arc<CredentialPool>>>,
    pub regions: VertexRegions,
    pub client: wreq::Client,
    pub error_triggers: Vec<String>,
}

impl AppState {
    pub fn from_config(config: GatewayConfig) -> anyhow::Result<Self> {
        let client = build_upstream_client()?;
        let pools = build_pools(&config);
        Ok(Self {
            config: ArcSwap::from_pointee(config),
            pools: ArcSwap::from_pointee(pools),
            regions: VertexRegions::new(),
            client,
            error_triggers: DEFAULT_ERROR_TRIGGERS
                .iter()
                .map(|trigger| trigger.to_string())
                .collect(),
        })
    }

    pub fn apply_config(&self, config: GatewayConfig) {
        let pools = build_pools(&config);
        self.pools.store(Arc::new(pools));
        self.config.store(Arc::new(config));
        info!(event = "config_applied");
    }

    pub fn pool_for(&self, provider: &str) -> Option<Arc<CredentialPool>> {
        self.pools.load().get(provider).cloned()
    }

    /// Whether `key` is one of the configured inbound API keys; returns its
    /// index into `api_keys` for grant lookups.
    pub fn authenticate(&self, key: &str) -> Option<usize> {
        self.config
            .load()
            .api_keys
            .iter()
            .position(|entry| entry.api == key)
    }
}

fn build_pools(config: &GatewayConfig) -> HashMap<String, Arc<CredentialPool>> {
    let mut pools = HashMap::new();
    for provider in &config.providers {
        let keys = provider.api_keys();
        if keys.is_empty() {
            continue;
        }
        let rate_limits = match &provider.preferences.api_key_rate_limit {
            Some(field) => parse_rate_limit_field(&provider.provider, field),
            None => default_rate_limits(),
        };
        let algorithm = provider
            .preferences
            .api_key_schedule_algorithm
            .as_deref()
            .map(ScheduleAlgorithm::parse)
            .unwrap_or_default();
        pools.insert(
            provider.provider.clone(),
            Arc::new(CredentialPool::new(keys, rate_limits, algorithm)),
        );
    }
    pools
}

fn default_rate_limits() -> Vec<(String, Vec<RateLimit>)> {
    vec![(
        "default".to_string(),
        vec![RateLimit { count: 999_999, period_secs: 60 }],
    )]
}

/// Pattern order is kept as declared: the pool resolves overlapping model
/// patterns by taking the first match.
fn parse_rate_limit_field(
    provider: &str,
    field: &RateLimitField,
) -> Vec<(String, Vec<RateLimit>)> {
    let entries: Vec<(String, String)> = match field {
        RateLimitField::Single(spec) => vec![("default".to_string(), spec.clone())],
        RateLimitField::PerModel(map) => map.0.clone(),
    };

    let mut rate_limits = Vec::new();
    for (model, spec) in entries {
        match parse_rate_limit(&spec) {
            Ok(limits) => {
                rate_limits.push((model, limits));
            }
            Err(err) => {
                error!(
                    event = "invalid_rate_limit",
                    provider = %provider,
                    model = %model,
                    spec = %spec,
                    error = %err
                );
            }
        }
    }
    if rate_limits.is_empty() {
        return default_rate_limits();
    }
    rate_limits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::normalize;

    fn state_from(yaml: &str) -> AppState {
        let mut config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        normalize(&mut config);
        AppState::from_config(config).unwrap()
    }

    #[tokio::test]
    async fn pools_are_built_per_provider() {
        let state = state_from(
            r#"
providers:
  - provider: a
    base_url: https://api.openai.com/v1/chat/completions
    api: [sk-1, sk-2]
  - provider: b
    base_url: https://api.openai.com/v1/chat/completions
api_keys:
  - api: sk-user
"#,
        );
        let pool = state.pool_for("a").expect("pool for provider a");
        assert_eq!(pool.len(), 2);
        // Provider b has no upstream keys, so no pool is registered.
        assert!(state.pool_for("b").is_none());
    }

    #[tokio::test]
    async fn rate_limit_spec_is_honored() {
        let state = state_from(
            r#"
providers:
  - provider: a
    base_url: https://api.openai.com/v1/chat/completions
    api: sk-1
    preferences:
      api_key_rate_limit: 1/min
api_keys:
  - api: sk-user
"#,
        );
        let pool = state.pool_for("a").unwrap();
        assert!(pool.next(Some("gpt-4o")).await.is_ok());
        assert!(pool.next(Some("gpt-4o")).await.is_err());
    }

    #[tokio::test]
    async fn inbound_key_authentication() {
        let state = state_from("api_keys:\n  - api: sk-user\n");
        assert_eq!(state.authenticate("sk-user"), Some(0));
        assert_eq!(state.authenticate("sk-wrong"), None);
    }
}
