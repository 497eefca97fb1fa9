//! Chat handlers
//!
//! `/v1/chat` streams the assistant's narration as SSE frames and always
//! terminates with the `[DONE]` sentinel, error or not. `/v1/chat/complete`
//! runs the same exchange to completion and returns the full reply.

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
    Json,
};
use claimforge_common::errors::{AppError, Result};
use claimforge_engine::orchestrator::ChatMessage;
use claimforge_engine::stream::{StreamEvent, DONE_MARKER};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 256))]
    pub user_id: String,

    #[validate(length(min = 1, max = 32768))]
    pub message: String,

    /// Prior visible turns, oldest first. Never contains tool scaffolding.
    #[serde(default)]
    pub conversation_history: Vec<ChatMessage>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

fn delta_event(text: String) -> Event {
    let payload = serde_json::to_string(&StreamEvent::Delta { text }).unwrap_or_default();
    Event::default().data(payload)
}

fn error_event(message: String) -> Event {
    let payload =
        serde_json::to_string(&StreamEvent::Error { error: message }).unwrap_or_default();
    Event::default().data(payload)
}

fn done_event() -> Event {
    Event::default().data(DONE_MARKER)
}

enum Phase {
    Streaming {
        rx: mpsc::Receiver<String>,
        handle: JoinHandle<Result<String>>,
    },
    Closing,
    Ended,
}

/// Streaming chat exchange
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let (tx, rx) = mpsc::channel::<String>(32);
    let orchestrator = state.orchestrator.clone();
    let handle = tokio::spawn(async move {
        orchestrator
            .run(
                &request.user_id,
                &request.message,
                &request.conversation_history,
                Some(tx),
            )
            .await
    });

    // Deltas flow through until the orchestrator drops its sender; the join
    // result then decides whether an error frame precedes the sentinel
    let stream = futures::stream::unfold(
        Phase::Streaming { rx, handle },
        |phase| async move {
            match phase {
                Phase::Streaming { mut rx, handle } => match rx.recv().await {
                    Some(text) => Some((
                        Ok(delta_event(text)),
                        Phase::Streaming { rx, handle },
                    )),
                    None => match handle.await {
                        Ok(Ok(_)) => Some((Ok(done_event()), Phase::Ended)),
                        Ok(Err(e)) => Some((Ok(error_event(e.to_string())), Phase::Closing)),
                        Err(e) => Some((
                            Ok(error_event(format!("exchange aborted: {e}"))),
                            Phase::Closing,
                        )),
                    },
                },
                Phase::Closing => Some((Ok(done_event()), Phase::Ended)),
                Phase::Ended => None,
            }
        },
    );

    Ok(Sse::new(stream))
}

/// Non-streaming chat exchange
pub async fn chat_complete(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let reply = state
        .orchestrator
        .run(
            &request.user_id,
            &request.message,
            &request.conversation_history,
            None,
        )
        .await?;

    Ok(Json(ChatResponse { reply }))
}
