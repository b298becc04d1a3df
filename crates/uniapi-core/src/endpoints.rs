use thiserror::Error;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("base URL has no scheme: {0}")]
    MissingScheme(String),
}

/// Per-capability endpoints derived from one configured base URL.
///
/// Everything up to (but excluding) a trailing `chat/completions` path
/// segment is the v1 prefix; each capability appends its own suffix to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointBundle {
    pub base_url: String,
    pub v1_url: String,
    pub models: String,
    pub chat: String,
    pub images: String,
    pub audio_transcriptions: String,
    pub audio_speech: String,
    pub moderations: String,
    pub embeddings: String,
}

impl EndpointBundle {
    pub fn parse(api_url: &str) -> Result<Self, EndpointError> {
        let api_url = if api_url.is_empty() { DEFAULT_API_URL } else { api_url };
        let Some((scheme, rest)) = api_url.split_once("://") else {
            return Err(EndpointError::MissingScheme(api_url.to_string()));
        };
        let (host, path) = match rest.split_once('/') {
            Some((host, path)) => (host, format!("/{path}")),
            None => (rest, String::new()),
        };
        // Drop any query string; endpoints are path-derived only.
        let path = path.split('?').next().unwrap_or_default();

        let prefix = if path.is_empty() || path == "/" {
            String::new()
        } else {
            path.split("chat/completions").next().unwrap_or_default().to_string()
        };

        let origin = format!("{scheme}://{host}");
        let at = |suffix: &str| {
            let path = format!("{prefix}{suffix}");
            if path.starts_with('/') {
                format!("{origin}{path}")
            } else {
                format!("{origin}/{path}")
            }
        };
        Ok(Self {
            base_url: origin.clone(),
            v1_url: format!("{origin}{prefix}"),
            models: at("models"),
            chat: at("chat/completions"),
            images: at("images/generations"),
            audio_transcriptions: at("audio/transcriptions"),
            audio_speech: at("audio/speech"),
            moderations: at("moderations"),
            embeddings: at("embeddings"),
        })
    }
}
