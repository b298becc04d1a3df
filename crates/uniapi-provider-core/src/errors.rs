use thiserror::Error;

/// Failures surfaced to the inbound HTTP layer.
///
/// Malformed upstream JSON lines are not represented here: the adapters log
/// and skip them, and the stream continues.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Non-2xx from the provider, or a decoded error object in the first
    /// chunk. `details` is pre-truncated for the response body.
    #[error("upstream HTTP {status}: {details}")]
    UpstreamHttp { status: u16, details: String },

    /// The first chunk matched a configured error-trigger substring.
    #[error("upstream content matched an error trigger")]
    UpstreamContent,

    /// A non-streaming completion arrived with no content.
    #[error("upstream returned an empty completion")]
    EmptyCompletion,

    /// The upstream stream ended before producing any usable data.
    #[error("no data returned")]
    NoData,

    /// Every credential of the selected provider is limited or cooling.
    #[error("all credentials are rate limited")]
    RateLimited,

    /// The client went away; logged at debug level only.
    #[error("client cancelled the request")]
    ClientCancelled,
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::UpstreamHttp { status, .. } => *status,
            GatewayError::RateLimited => 429,
            GatewayError::UpstreamContent
            | GatewayError::EmptyCompletion
            | GatewayError::NoData => 400,
            GatewayError::ClientCancelled => 499,
        }
    }
}
