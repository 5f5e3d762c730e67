use crate::error::ApiError;
use crate::state::AppState;
use crate::tool_data::extract_search_data;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use intern::coordinator::{Coordinator, RunOutput};
use intern::models::run::{RunEvent, RunResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const CHAT_ERROR: &str = "An error occurred while processing your request";
const DONE_FRAME: &str = "data: [DONE]\n\n";

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: Option<String>,
    session_id: Option<String>,
    model: Option<String>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: String,
    response: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    search_results: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sources: Vec<String>,
}

// Server-sent events carrying OpenAI style completion chunks
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = axum::body::Body::from_stream(self);
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            body,
        )
            .into_response()
    }
}

fn delta_frame(text: &str) -> String {
    let chunk = json!({
        "choices": [{
            "delta": {"content": text},
            "finish_reason": null
        }]
    });
    format!("data: {}\n\n", chunk)
}

/// The final answer, or everything the assistant said when there is none
fn reply_text(result: &RunResult) -> Option<String> {
    result
        .content
        .clone()
        .filter(|text| !text.is_empty())
        .or_else(|| result.output_text.clone().filter(|text| !text.is_empty()))
}

fn preview(message: &str) -> String {
    message.chars().take(50).collect()
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let message = request
        .message
        .filter(|message| !message.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("message is required".to_string()))?;
    let session_id = request.session_id.filter(|id| !id.trim().is_empty());
    if state.require_session_id && session_id.is_none() {
        return Err(ApiError::BadRequest("session_id is required".to_string()));
    }

    let coordinator = state
        .coordinators
        .get(request.model.as_deref())
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unknown model '{}', expected one of: {}",
                request.model.as_deref().unwrap_or_default(),
                state.coordinators.models().join(", ")
            ))
        })?;

    tracing::info!(
        session_id = session_id.as_deref().unwrap_or("-"),
        stream = request.stream,
        "POST /api/chat - message: '{}...'",
        preview(&message)
    );

    if request.stream {
        Ok(stream_reply(coordinator, message, session_id).into_response())
    } else {
        Ok(complete(coordinator, &message, session_id)
            .await?
            .into_response())
    }
}

async fn complete(
    coordinator: Arc<dyn Coordinator>,
    message: &str,
    session_id: Option<String>,
) -> Result<Json<ChatResponse>, ApiError> {
    let output = coordinator
        .run(message, session_id, false)
        .await
        .map_err(|e| ApiError::internal(CHAT_ERROR, e))?;

    let result = match output {
        RunOutput::Completed(result) => result,
        RunOutput::Chunks(mut events) => {
            let mut last = None;
            while let Some(event) = events.next().await {
                last = Some(event.map_err(|e| ApiError::internal(CHAT_ERROR, e))?);
            }
            match last {
                Some(RunEvent::Completed(result)) => result,
                _ => return Err(ApiError::internal(CHAT_ERROR, "run ended without a result")),
            }
        }
    };

    let response = reply_text(&result).unwrap_or_else(|| result.to_string());
    let (search_results, sources) = extract_search_data(&result.messages);
    tracing::info!(
        session_id = %result.session_id,
        response_length = response.len(),
        sources = sources.len(),
        "POST /api/chat - done"
    );

    Ok(Json(ChatResponse {
        session_id: result.session_id,
        response,
        search_results,
        sources,
    }))
}

fn stream_reply(
    coordinator: Arc<dyn Coordinator>,
    message: String,
    session_id: Option<String>,
) -> SseResponse {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        tokio::select! {
            _ = forward_events(coordinator, &message, session_id, &tx) => {}
            // Dropping the run stream stops the run
            _ = tx.closed() => {
                tracing::info!("client disconnected, run cancelled");
                return;
            }
        }
        let _ = tx.send(DONE_FRAME.to_string()).await;
    });

    SseResponse::new(ReceiverStream::new(rx))
}

async fn forward_events(
    coordinator: Arc<dyn Coordinator>,
    message: &str,
    session_id: Option<String>,
    tx: &mpsc::Sender<String>,
) {
    let mut events = match coordinator.run(message, session_id, true).await {
        Ok(RunOutput::Chunks(events)) => events,
        Ok(RunOutput::Completed(result)) => {
            if let Some(text) = reply_text(&result) {
                let _ = tx.send(delta_frame(&text)).await;
            }
            return;
        }
        Err(e) => {
            tracing::error!("Error in streaming response: {}", e);
            return;
        }
    };

    let mut streamed = false;
    while let Some(event) = events.next().await {
        match event {
            Ok(RunEvent::Delta(text)) => {
                if text.is_empty() {
                    continue;
                }
                streamed = true;
                if tx.send(delta_frame(&text)).await.is_err() {
                    return;
                }
            }
            Ok(RunEvent::Completed(result)) => {
                tracing::info!(session_id = %result.session_id, "streaming run completed");
                if !streamed {
                    if let Some(text) = reply_text(&result) {
                        let _ = tx.send(delta_frame(&text)).await;
                    }
                }
            }
            Err(e) => {
                tracing::error!("Error in streaming response: {}", e);
                return;
            }
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handler))
        .with_state(state)
}
