use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tracing::{error, info};

use uniapi_core::{AppState, ProviderConfig, build_upstream};
use uniapi_provider_core::{DEFAULT_COOLING, Engine, GatewayError, StreamFrame};
use uniapi_provider_impl::{
    HEARTBEAT_INTERVAL, StreamHandle, error_handling_wrapper, fetch_response,
    fetch_response_stream, with_heartbeat,
};
use uniapi_protocol::strip_data_prefix;

use crate::respond::error_response;
use crate::{ApiKeyIndex, RequestTraceId};

pub(crate) async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Extension(ApiKeyIndex(api_index)): Extension<ApiKeyIndex>,
    Extension(trace_id): Extension<RequestTraceId>,
    Json(payload): Json<Value>,
) -> Response {
    let model = payload
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if model.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"detail": "model is required"})),
        )
            .into_response();
    }
    let stream = payload.get("stream").and_then(Value::as_bool).unwrap_or(false);

    match handle_chat(&state, api_index, &trace_id.0, &model, stream, payload).await {
        Ok(response) => response,
        Err(err) => error_response(err),
    }
}

async fn handle_chat(
    state: &AppState,
    api_index: usize,
    trace_id: &str,
    model: &str,
    stream: bool,
    payload: Value,
) -> Result<Response, GatewayError> {
    let config = state.config.load_full();
    let key = &config.api_keys[api_index];

    let Some(provider) = config.providers.iter().find(|provider| {
        provider.upstream_model(model).is_some() && key.allows(&provider.provider, model)
    }) else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"detail": "No matching model found"})),
        )
            .into_response());
    };
    let upstream_model = provider
        .upstream_model(model)
        .unwrap_or_else(|| model.to_string());
    let engine = Engine::detect(&provider.base_url, &upstream_model);

    let pool = state
        .pool_for(&provider.provider)
        .ok_or(GatewayError::RateLimited)?;
    let credential = pool
        .next(Some(model))
        .await
        .map_err(|_| GatewayError::RateLimited)?;

    let region = match engine {
        Engine::VertexGemini | Engine::VertexClaude => Some(
            state
                .regions
                .for_model(&upstream_model)
                .next(None)
                .await
                .map_err(|_| GatewayError::RateLimited)?,
        ),
        _ => None,
    };

    let request = build_upstream(
        provider,
        engine,
        &credential,
        &upstream_model,
        payload,
        stream,
        region.as_deref(),
    )
    .map_err(|err| {
        error!(event = "upstream_build_error", trace_id = %trace_id, error = %err);
        GatewayError::UpstreamHttp { status: 500, details: err.to_string() }
    })?;

    info!(
        event = "upstream_request",
        trace_id = %trace_id,
        provider = %provider.provider,
        engine = %engine,
        model = %upstream_model,
        is_stream = stream,
    );

    let use_stream_adapter = stream && !engine.is_media();
    let handle = if use_stream_adapter {
        let adapter = fetch_response_stream(
            state.client.clone(),
            engine,
            request.url,
            request.headers,
            request.payload,
            model.to_string(),
        );
        with_heartbeat(adapter, HEARTBEAT_INTERVAL)
    } else {
        fetch_response(
            state.client.clone(),
            engine,
            request.url,
            request.headers,
            request.payload,
            model.to_string(),
        )
    };

    let first = match error_handling_wrapper(
        handle,
        &provider.provider,
        engine,
        use_stream_adapter,
        &state.error_triggers,
    )
    .await
    {
        Ok(first) => first,
        Err(err) => {
            if matches!(
                err,
                GatewayError::UpstreamHttp { .. } | GatewayError::UpstreamContent
            ) {
                pool.set_cooling(&credential, DEFAULT_COOLING).await;
            }
            return Err(err);
        }
    };

    info!(
        event = "upstream_first_byte",
        trace_id = %trace_id,
        provider = %provider.provider,
        ttfb_ms = first.ttfb.as_millis() as u64,
    );

    if use_stream_adapter {
        Ok(sse_response(first.stream))
    } else {
        non_streaming_response(first.stream, provider).await
    }
}

fn sse_response(handle: StreamHandle) -> Response {
    let body_stream = futures_util::stream::unfold(handle, |mut handle| async move {
        handle
            .recv()
            .await
            .map(|frame| (Ok::<_, Infallible>(frame.into_bytes()), handle))
    });
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(HeaderName::from_static("x-accel-buffering"), "no")
        .body(Body::from_stream(body_stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn non_streaming_response(
    mut handle: StreamHandle,
    provider: &ProviderConfig,
) -> Result<Response, GatewayError> {
    let frame = handle.recv().await.ok_or(GatewayError::NoData)?;
    handle.close().await;
    match frame {
        StreamFrame::Audio(bytes) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "audio/mpeg")
            .body(Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())),
        StreamFrame::Data(text) => {
            let payload = if text.starts_with("data:") {
                strip_data_prefix(&text).to_string()
            } else {
                text
            };
            let value: Value = serde_json::from_str(payload.trim()).map_err(|err| {
                error!(
                    event = "response_decode_error",
                    provider = %provider.provider,
                    error = %err
                );
                GatewayError::NoData
            })?;
            Ok(Json(value).into_response())
        }
        StreamFrame::Error(body) => Err(GatewayError::UpstreamHttp {
            status: body.status_code,
            details: body.details.to_string().chars().take(300).collect(),
        }),
    }
}
