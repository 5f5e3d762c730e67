use crate::error::ApiError;
use crate::state::AppState;
use crate::tool_data::{normalize, ToolCallRecord};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use intern::models::role::Role;
use serde::{Deserialize, Serialize};

const SESSION_ERROR: &str = "An error occurred while retrieving session messages";

#[derive(Debug, Deserialize)]
struct SessionQuery {
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionMessage {
    role: Role,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_data: Option<Vec<ToolCallRecord>>,
}

#[derive(Debug, Serialize)]
struct SessionMessagesResponse {
    messages: Vec<SessionMessage>,
}

async fn messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<SessionMessagesResponse>, ApiError> {
    tracing::info!("GET /api/sessions/{}/messages", session_id);

    let coordinator = state
        .coordinators
        .get(query.model.as_deref())
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unknown model '{}'",
                query.model.as_deref().unwrap_or_default()
            ))
        })?;

    let stored = coordinator
        .messages_for_session(&session_id)
        .await
        .map_err(|e| ApiError::internal(SESSION_ERROR, e))?;

    let messages: Vec<SessionMessage> = stored
        .into_iter()
        .filter(|message| message.role.is_conversational())
        .map(|message| SessionMessage {
            tool_data: (!message.tool_calls.is_empty())
                .then(|| message.tool_calls.iter().map(normalize).collect()),
            role: message.role,
            content: message.content,
        })
        .collect();

    tracing::info!(
        "GET /api/sessions/{}/messages - {} messages",
        session_id,
        messages.len()
    );
    Ok(Json(SessionMessagesResponse { messages }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions/:session_id/messages", get(messages))
        .with_state(state)
}
