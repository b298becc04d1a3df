//! Configuration, endpoint derivation and the process-scoped registry tying
//! provider credential pools to the loaded config.

pub mod config;
pub mod endpoints;
pub mod state;
pub mod upstream;

pub use config::{ApiKeyConfig, GatewayConfig, ProviderConfig, load_config};
pub use endpoints::EndpointBundle;
pub use state::AppState;
pub use upstream::{UpstreamRequest, build_upstream};
