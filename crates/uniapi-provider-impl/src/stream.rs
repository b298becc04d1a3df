use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use uniapi_protocol::{HEARTBEAT_FRAME, LineScanner};
use uniapi_provider_core::{Engine, Headers, StreamFrame, UpstreamErrorBody};

use crate::providers;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

const CHANNEL_CAPACITY: usize = 16;

/// A producer task feeding frames through a bounded channel.
///
/// Dropping the handle aborts the producer; `close` additionally drains the
/// channel and awaits the task, so upstream cleanup runs exactly once.
#[derive(Debug)]
pub struct StreamHandle {
    rx: mpsc::Receiver<StreamFrame>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(mpsc::Sender<StreamFrame>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(producer(tx));
        Self { rx, task }
    }

    pub async fn recv(&mut self) -> Option<StreamFrame> {
        self.rx.recv().await
    }

    pub async fn close(mut self) {
        self.task.abort();
        while self.rx.recv().await.is_some() {}
        let _ = (&mut self.task).await;
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Interleave a keep-alive comment frame whenever `interval` elapses between
/// upstream frames. Adapter frames are never reordered; the multiplexer ends
/// after forwarding a frame containing `[DONE]` or when the adapter stops.
pub fn with_heartbeat(mut upstream: StreamHandle, interval: Duration) -> StreamHandle {
    StreamHandle::spawn(move |tx| async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the immediate tick; the first beat comes one interval in.
        ticker.tick().await;

        loop {
            tokio::select! {
                frame = upstream.recv() => {
                    let Some(frame) = frame else {
                        break;
                    };
                    let done = frame.as_data().is_some_and(|data| data.contains("[DONE]"));
                    if tx.send(frame).await.is_err() {
                        break;
                    }
                    if done {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if tx.send(StreamFrame::Data(HEARTBEAT_FRAME.to_string())).await.is_err() {
                        break;
                    }
                }
            }
        }
        upstream.close().await;
    })
}

/// Open the upstream streaming exchange for `engine` and return the adapter
/// stream of normalized frames.
pub fn fetch_response_stream(
    client: wreq::Client,
    engine: Engine,
    url: String,
    headers: Headers,
    payload: Value,
    model: String,
) -> StreamHandle {
    StreamHandle::spawn(move |tx| async move {
        let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
        match engine {
            Engine::Gpt | Engine::OpenRouter => {
                let parser = providers::openai::OpenAiParser::new(timestamp);
                run_lines(client, url, headers, payload, parser, tx).await;
            }
            Engine::Azure => {
                let parser = providers::azure::AzureParser::new(timestamp);
                run_lines(client, url, headers, payload, parser, tx).await;
            }
            Engine::Claude => {
                let parser = providers::claude::ClaudeParser::new(timestamp, model);
                run_lines(client, url, headers, payload, parser, tx).await;
            }
            Engine::Gemini | Engine::VertexGemini => {
                let parser = providers::gemini::GeminiParser::new(timestamp, model);
                run_lines(client, url, headers, payload, parser, tx).await;
            }
            Engine::VertexClaude => {
                let parser = providers::vertex_claude::VertexClaudeParser::new(timestamp, model);
                run_lines(client, url, headers, payload, parser, tx).await;
            }
            Engine::Cloudflare => {
                let parser = providers::cloudflare::CloudflareParser::new(timestamp, model);
                run_lines(client, url, headers, payload, parser, tx).await;
            }
            Engine::Cohere => {
                let parser = providers::cohere::CohereParser::new(timestamp, model);
                run_lines(client, url, headers, payload, parser, tx).await;
            }
            Engine::Tts => {
                let body = UpstreamErrorBody {
                    error: "fetch_response_stream Unknown engine".to_string(),
                    status_code: 500,
                    details: Value::String(engine.as_str().to_string()),
                };
                let _ = tx.send(StreamFrame::Error(body)).await;
            }
        }
    })
}

/// Incremental parser over upstream body lines. `push_line` may emit any
/// number of frames; `finish` runs once the body ends or `is_done` turns true.
pub trait LineParser: Send + 'static {
    const CONTEXT: &'static str;

    fn push_line(&mut self, line: &str) -> Vec<StreamFrame>;
    fn is_done(&self) -> bool;
    fn finish(&mut self) -> Vec<StreamFrame>;
}

pub(crate) async fn run_lines<P: LineParser>(
    client: wreq::Client,
    url: String,
    headers: Headers,
    payload: Value,
    mut parser: P,
    tx: mpsc::Sender<StreamFrame>,
) {
    let response = match post_json(&client, &url, &headers, &payload).await {
        Ok(response) => response,
        Err(body) => {
            let _ = tx.send(StreamFrame::Error(body)).await;
            return;
        }
    };
    let response = match check_response(response, P::CONTEXT).await {
        Ok(response) => response,
        Err(body) => {
            let _ = tx.send(StreamFrame::Error(body)).await;
            return;
        }
    };

    let mut scanner = LineScanner::new();
    let mut body = response.bytes_stream();
    'body: while let Some(item) = body.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(err) => {
                error!(event = "upstream_read_error", context = P::CONTEXT, error = %err);
                break;
            }
        };
        for line in scanner.push(&chunk) {
            for frame in parser.push_line(&line) {
                if tx.send(frame).await.is_err() {
                    debug!(event = "stream_cancelled", context = P::CONTEXT);
                    return;
                }
            }
            if parser.is_done() {
                break 'body;
            }
        }
    }

    for frame in parser.finish() {
        if tx.send(frame).await.is_err() {
            debug!(event = "stream_cancelled", context = P::CONTEXT);
            return;
        }
    }
}

pub(crate) async fn post_json(
    client: &wreq::Client,
    url: &str,
    headers: &Headers,
    payload: &Value,
) -> Result<wreq::Response, UpstreamErrorBody> {
    let body = bytes::Bytes::from(serde_json::to_vec(payload).unwrap_or_default());
    let mut builder = client
        .request(wreq::Method::POST, url)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder.body(body).send().await.map_err(|err| UpstreamErrorBody {
        error: "upstream request failed".to_string(),
        status_code: 500,
        details: Value::String(err.to_string()),
    })
}

/// Non-2xx responses become one terminal error frame carrying the decoded
/// body (JSON when possible, raw text otherwise).
pub(crate) async fn check_response(
    response: wreq::Response,
    context: &str,
) -> Result<wreq::Response, UpstreamErrorBody> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    Err(UpstreamErrorBody::from_status(context, status, &body))
}
