//! Route handlers for the full HTTP surface in `spec.md` §6.
//!
//! Ported from `original_source/server.py`'s handful of `FastAPI` routes;
//! the two streaming routes are reshaped from a generator function plus
//! `StreamingResponse` into an `async-stream` NDJSON body, which is the
//! `axum` idiom for the same "yield one line per step" shape.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use memos_core::ChatMessage;
use memos_runtime::RuntimeStepOutcome;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitAgentRequest {
    pub agent_persona_name: String,
    pub human_persona_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ConvNameRequest {
    pub conv_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateHumanRequest {
    pub conv_name: String,
    pub human_persona_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conv_name: String,
    pub user_id: i64,
    pub message: String,
}

pub async fn conversation_ids(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let conv_ids = state.runtime.list_conv_ids().await?;
    Ok(Json(json!({ "conv_ids": conv_ids })))
}

pub async fn agent_personas(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let persona_names = state.runtime.list_agent_personas().await?;
    Ok(Json(json!({ "persona_names": persona_names })))
}

pub async fn human_personas(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let persona_names = state.runtime.list_human_personas().await?;
    Ok(Json(json!({ "persona_names": persona_names })))
}

pub async fn create_agent(
    State(state): State<AppState>,
    Json(req): Json<InitAgentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conv_name = state
        .runtime
        .create_conversation(&req.agent_persona_name, &req.human_persona_name)
        .await?;
    Ok(Json(json!({ "conv_name": conv_name })))
}

pub async fn delete_agent(State(state): State<AppState>, Json(req): Json<ConvNameRequest>) -> Json<serde_json::Value> {
    let success = state.runtime.delete_conversation(&req.conv_name).await.unwrap_or(false);
    Json(json!({ "success": success }))
}

pub async fn agent_humans(
    State(state): State<AppState>,
    Json(req): Json<ConvNameRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let human_ids = state.runtime.list_humans(&req.conv_name).await?;
    Ok(Json(json!({ "human_ids": human_ids })))
}

pub async fn create_human(
    State(state): State<AppState>,
    Json(req): Json<CreateHumanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let new_human_id = state
        .runtime
        .add_human(&req.conv_name, &req.human_persona_name)
        .await?;
    Ok(Json(json!({ "new_human_id": new_human_id })))
}

#[derive(Serialize)]
struct CtxInfo {
    current_ctx_token_count: usize,
    ctx_window: usize,
}

#[derive(Serialize)]
struct StepLine {
    server_message_stack: Vec<memos_core::ServerMessage>,
    ctx_info: CtxInfo,
    duration: String,
}

fn step_line(outcome: &RuntimeStepOutcome, elapsed: std::time::Duration) -> String {
    let line = StepLine {
        server_message_stack: outcome.server_message_stack.clone(),
        ctx_info: CtxInfo {
            current_ctx_token_count: outcome.current_ctx_token_count,
            ctx_window: outcome.ctx_window,
        },
        duration: format_duration(elapsed),
    };
    serde_json::to_string(&line).expect("StepLine serialization never fails") + "\n"
}

fn format_duration(d: std::time::Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    let fractional = d.subsec_millis();
    format!("{hours}:{minutes:02}:{seconds:02}.{fractional:03}")
}

fn ndjson_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(body)
        .expect("static headers always build a valid response")
}

/// Drives the heartbeat loop for `/messages/send` and
/// `/messages/send/first-message`: the same step loop, differing only in
/// whether `is_first_message` stays true for every iteration.
async fn stream_heartbeat_loop(
    state: AppState,
    conv_name: String,
    user_id: i64,
    trigger: Option<ChatMessage>,
    is_first_message: bool,
) -> Response {
    let body = Body::from_stream(async_stream::stream! {
        let total_start = Instant::now();
        let mut trigger = trigger;
        let mut heartbeat = true;

        while heartbeat {
            let step_start = Instant::now();
            let outcome = state.runtime.step(&conv_name, user_id, trigger.take(), is_first_message).await;
            let elapsed = step_start.elapsed();

            match outcome {
                Ok(outcome) => {
                    heartbeat = outcome.heartbeat;
                    yield Ok::<_, std::io::Error>(step_line(&outcome, elapsed).into_bytes());
                }
                Err(err) => {
                    tracing::error!(error = %err, conv_name = %conv_name, "step failed");
                    let error_line = json!({ "error": err.to_string() }).to_string() + "\n";
                    yield Ok(error_line.into_bytes());
                    break;
                }
            }
        }

        let total = json!({ "total_duration": format_duration(total_start.elapsed()) }).to_string() + "\n";
        yield Ok(total.into_bytes());
    });

    ndjson_response(body)
}

pub async fn send_message(State(state): State<AppState>, Json(req): Json<SendMessageRequest>) -> impl IntoResponse {
    let trigger = Some(ChatMessage::user(req.message));
    stream_heartbeat_loop(state, req.conv_name, req.user_id, trigger, false).await
}

pub async fn send_first_message(State(state): State<AppState>, Json(req): Json<SendMessageRequest>) -> impl IntoResponse {
    let trigger = Some(ChatMessage::system(req.message));
    stream_heartbeat_loop(state, req.conv_name, req.user_id, trigger, true).await
}

pub async fn send_no_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .runtime
        .send_no_heartbeat(&req.conv_name, req.user_id, req.message)
        .await?;
    Ok(Json(json!({
        "server_message_stack": outcome.server_message_stack,
        "ctx_info": CtxInfo {
            current_ctx_token_count: outcome.current_ctx_token_count,
            ctx_window: outcome.ctx_window,
        },
    })))
}
