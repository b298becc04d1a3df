//! Core abstractions for upstream providers.
//!
//! This crate intentionally does **not** depend on axum or any concrete HTTP
//! client. It owns credential scheduling and rate limiting, the closed set of
//! upstream engines, and the frame model produced by the stream adapters.

pub mod engine;
pub mod errors;
pub mod frame;
pub mod pool;
pub mod rate_limit;
pub mod regions;

pub use engine::Engine;
pub use errors::GatewayError;
pub use frame::{StreamFrame, UpstreamErrorBody};
pub use pool::{CredentialPool, DEFAULT_COOLING, PoolExhausted, ScheduleAlgorithm};
pub use rate_limit::{RateLimit, RateLimitParseError, parse_rate_limit};
pub use regions::VertexRegions;

/// Header list as sent upstream; order-preserving, names as given.
pub type Headers = Vec<(String, String)>;
