use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, warn};

const VERTEX_BASE_URL: &str = "https://aiplatform.googleapis.com/";
const CLOUDFLARE_BASE_URL: &str = "https://api.cloudflare.com/";

/// Substrings that mark a first chunk as a provider-side refusal even when
/// the body is otherwise well-formed.
pub const DEFAULT_ERROR_TRIGGERS: &[&str] = &[
    "The bot's usage is covered by the developer",
    "process this request due to overload or policy",
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(deserialize_with = "de_coerce_string")]
    pub provider: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api: Option<OneOrMany>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub cf_account_id: Option<String>,
    #[serde(default)]
    pub model: Vec<ModelEntry>,
    #[serde(default)]
    pub tools: Option<bool>,
    #[serde(default)]
    pub preferences: Preferences,
}

impl ProviderConfig {
    /// API keys as a plain list, numbers coerced to strings.
    pub fn api_keys(&self) -> Vec<String> {
        match &self.api {
            Some(OneOrMany::One(value)) => vec![value.coerce()],
            Some(OneOrMany::Many(values)) => values.iter().map(Scalar::coerce).collect(),
            None => Vec::new(),
        }
    }

    /// `(inbound_name, upstream_name)` pairs, in declaration order. A plain
    /// entry maps to itself; an alias entry `{upstream: inbound}` is exposed
    /// under the inbound name.
    pub fn model_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for entry in &self.model {
            match entry {
                ModelEntry::Name(name) => pairs.push((name.clone(), name.clone())),
                ModelEntry::Alias(map) => {
                    for (upstream, inbound) in map {
                        pairs.push((inbound.clone(), upstream.clone()));
                    }
                }
            }
        }
        pairs
    }

    /// The upstream name serving the inbound `model`, if this provider lists it.
    pub fn upstream_model(&self, model: &str) -> Option<String> {
        self.model_pairs()
            .into_iter()
            .find(|(inbound, _)| inbound == model)
            .map(|(_, upstream)| upstream)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(Scalar),
    Many(Vec<Scalar>),
}

/// YAML scalars that should all read as strings (keys are often numeric).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn coerce(&self) -> String {
        match self {
            Scalar::Text(text) => text.clone(),
            Scalar::Int(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModelEntry {
    Name(String),
    Alias(BTreeMap<String, String>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub api_key_rate_limit: Option<RateLimitField>,
    #[serde(default)]
    pub api_key_schedule_algorithm: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RateLimitField {
    Single(String),
    PerModel(OrderedStringMap),
}

/// A YAML mapping kept as `(key, value)` pairs in declaration order.
/// Order is semantic for rate limits: when several model patterns match,
/// the first-declared one wins.
#[derive(Debug, Clone, Default)]
pub struct OrderedStringMap(pub Vec<(String, String)>);

impl<'de> serde::Deserialize<'de> for OrderedStringMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct MapVisitor;

        impl<'de> serde::de::Visitor<'de> for MapVisitor {
            type Value = OrderedStringMap;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a mapping of strings")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    entries.push((key, value));
                }
                Ok(OrderedStringMap(entries))
            }
        }

        deserializer.deserialize_map(MapVisitor)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    pub api: String,
    #[serde(default)]
    pub model: Vec<ApiKeyModelEntry>,
    /// Filled during normalization from weighted model entries.
    #[serde(skip)]
    pub weights: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiKeyModelEntry {
    Name(String),
    Weight(BTreeMap<String, i64>),
}

impl ApiKeyConfig {
    /// Grant names as written (`all`, `provider/model`, `provider/*`, plain).
    pub fn grants(&self) -> Vec<String> {
        self.model
            .iter()
            .flat_map(|entry| match entry {
                ApiKeyModelEntry::Name(name) => vec![name.clone()],
                ApiKeyModelEntry::Weight(map) => map.keys().cloned().collect(),
            })
            .collect()
    }

    /// Whether this key may use `model` as served by `provider`.
    pub fn allows(&self, provider: &str, model: &str) -> bool {
        self.grants().iter().any(|grant| {
            if grant == "all" {
                return true;
            }
            match grant.split_once('/') {
                Some((grant_provider, grant_model)) => {
                    grant_provider == provider && (grant_model == "*" || grant_model == model)
                }
                None => grant == model,
            }
        })
    }
}

fn de_coerce_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Scalar::deserialize(deserializer)?.coerce())
}

/// Apply the in-place rewrites a raw config needs before use: forced base
/// URLs, default tools flag, default key grants and weight extraction.
pub fn normalize(config: &mut GatewayConfig) {
    for provider in &mut config.providers {
        if provider.project_id.is_some() {
            provider.base_url = VERTEX_BASE_URL.to_string();
        }
        if provider.cf_account_id.is_some() {
            provider.base_url = CLOUDFLARE_BASE_URL.to_string();
        }
        if provider.tools.is_none() {
            provider.tools = Some(true);
        }
    }

    let providers = config.providers.clone();
    for api_key in &mut config.api_keys {
        if api_key.model.is_empty() {
            api_key.model = vec![ApiKeyModelEntry::Name("all".to_string())];
            continue;
        }
        let mut weights = BTreeMap::new();
        for entry in &api_key.model {
            let ApiKeyModelEntry::Weight(map) = entry else {
                continue;
            };
            for (grant, weight) in map {
                let Some((provider_name, model_name)) = grant.split_once('/') else {
                    continue;
                };
                let Some(provider) = providers.iter().find(|p| p.provider == provider_name)
                else {
                    continue;
                };
                let listed = model_name == "*"
                    || provider
                        .model_pairs()
                        .iter()
                        .any(|(inbound, _)| inbound == model_name);
                if listed {
                    weights.insert(grant.clone(), *weight);
                } else {
                    warn!(
                        event = "unknown_weighted_model",
                        grant = %grant,
                        "weighted model is not served by its provider"
                    );
                }
            }
        }
        api_key.weights = weights;
    }
}

/// Load the YAML config from `path`; when the file is missing and
/// `CONFIG_URL` is set, fetch it over HTTPS instead.
pub async fn load_config(path: &Path) -> anyhow::Result<GatewayConfig> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let Ok(config_url) = std::env::var("CONFIG_URL") else {
                anyhow::bail!("config file {} not found and CONFIG_URL is not set", path.display());
            };
            info!(event = "config_fetch", url = %config_url);
            fetch_config(&config_url).await?
        }
        Err(err) => {
            error!(event = "config_read_error", path = %path.display(), error = %err);
            return Err(err.into());
        }
    };

    let mut config: GatewayConfig = serde_yaml::from_str(&text)?;
    normalize(&mut config);
    Ok(config)
}

async fn fetch_config(url: &str) -> anyhow::Result<String> {
    let client = wreq::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(15))
        .read_timeout(std::time::Duration::from_secs(100))
        .build()?;
    let response = client
        .request(wreq::Method::GET, url)
        .header("user-agent", "curl/7.68.0")
        .header("accept", "*/*")
        .send()
        .await?;
    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        anyhow::bail!("config fetch from {url} failed with HTTP {status}");
    }
    Ok(String::from_utf8_lossy(&response.bytes().await?).into_owned())
}
