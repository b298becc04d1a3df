use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::debug;

use uniapi_provider_core::GatewayError;

/// Map a failed exchange to the inbound HTTP response. Only failures that
/// happen before the first byte reach this point; later ones close the
/// stream silently.
pub(crate) fn error_response(err: GatewayError) -> Response {
    let status = StatusCode::from_u16(err.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let detail = match &err {
        GatewayError::UpstreamHttp { details, .. } => details.clone(),
        GatewayError::RateLimited => "Too many requests".to_string(),
        GatewayError::ClientCancelled => {
            debug!(event = "client_cancelled");
            "client disconnected".to_string()
        }
        GatewayError::UpstreamContent
        | GatewayError::EmptyCompletion
        | GatewayError::NoData => "data: {'error': 'No data returned'}".to_string(),
    };
    (status, Json(json!({"detail": detail}))).into_response()
}
