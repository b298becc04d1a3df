//! The inbound OpenAI-compatible HTTP surface.

mod chat;
mod models;
mod respond;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use uniapi_core::AppState;

/// Index of the authenticated inbound key in `config.api_keys`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ApiKeyIndex(pub usize);

#[derive(Debug, Clone)]
pub(crate) struct RequestTraceId(pub String);

pub fn gateway_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(models::list_models))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state)
}

async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: axum::http::Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let key = bearer_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;
    let api_index = state
        .authenticate(&key)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(ApiKeyIndex(api_index));
    req.extensions_mut()
        .insert(RequestTraceId(uuid::Uuid::now_v7().to_string()));
    Ok(next.run(req).await)
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let prefix = "Bearer ";
    if value.len() > prefix.len() && value[..prefix.len()].eq_ignore_ascii_case(prefix) {
        let token = value[prefix.len()..].trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }
    None
}
