//! Axum handlers for the SSE transport routes.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{
    future,
    stream::{self, Stream, StreamExt},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AppError;
use crate::mcp::rpc::Message;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub session_id: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.transport.session_count(),
    })
}

/// Opens a session that lasts as long as the event stream. The first event tells the
/// client where to post its messages.
pub async fn sse_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session = state.transport.stream_session();
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("{}?session_id={}", state.messages_path, session.id()));

    let messages = session.filter_map(|message| {
        let event = Event::default().event("message");
        let event = match &message.id {
            Some(id) => event.id(id.to_string()),
            None => event,
        };
        future::ready(match event.json_data(&message) {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                warn!(error = %err, "dropping message that cannot be written as an sse event");
                None
            }
        })
    });

    Sse::new(stream::once(future::ready(Ok(endpoint))).chain(messages))
        .keep_alive(KeepAlive::default())
}

pub async fn message_endpoint(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            AppError::bad_request("missing_session_id", "session_id query parameter is required")
        })?;

    if !state.transport.has_session(&session_id) {
        return Err(AppError::not_found("unknown_session", "session not found"));
    }

    let message: Message = serde_json::from_slice(&body).map_err(|err| {
        AppError::bad_request("invalid_message", format!("body is not a json-rpc message: {err}"))
    })?;

    state
        .transport
        .push(&session_id, message)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}
