//! Pipeline entry endpoints: text and audio requests.
//!
//! The response is returned synchronously and additionally mirrored to the
//! requester's WebSocket connection, keyed by remote address. The mirror is
//! fire-and-forget; a missing or broken socket never fails the HTTP
//! response.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Multipart, State},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ai/text", post(text))
        .route("/ai/audio", post(audio))
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
    #[serde(default)]
    pub room_path: String,
    #[serde(default)]
    pub chat_id: Option<String>,
}

async fn text(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<TextRequest>,
) -> Result<Json<lectern_core::PipelineResponse>, ApiError> {
    let _permit = state.acquire_permit().await;

    let response = state
        .pipeline
        .process_text(&req.text, &req.room_path, req.chat_id.as_deref())
        .await?;

    state.hub.send_to_addr(addr.ip(), &response).await;
    Ok(Json(response))
}

#[derive(Debug, Default)]
struct ParsedAudioRequest {
    audio: Bytes,
    filename: String,
    room_path: String,
    chat_id: Option<String>,
}

async fn audio(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    multipart: Multipart,
) -> Result<Json<lectern_core::PipelineResponse>, ApiError> {
    let req = parse_audio_request(multipart).await?;
    let _permit = state.acquire_permit().await;

    let response = state
        .pipeline
        .process_audio(req.audio, &req.filename, &req.room_path, req.chat_id.as_deref())
        .await?;

    state.hub.send_to_addr(addr.ip(), &response).await;
    Ok(Json(response))
}

async fn parse_audio_request(mut multipart: Multipart) -> Result<ParsedAudioRequest, ApiError> {
    let mut out = ParsedAudioRequest::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                out.filename = field
                    .file_name()
                    .unwrap_or("recording.wav")
                    .to_string();
                out.audio = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed reading 'file' bytes: {e}"))
                })?;
            }
            "room_path" => {
                out.room_path = field
                    .text()
                    .await
                    .map_err(|e| {
                        ApiError::bad_request(format!("Failed reading 'room_path' field: {e}"))
                    })?
                    .trim()
                    .to_string();
            }
            "chat_id" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed reading 'chat_id' field: {e}"))
                })?;
                if !text.trim().is_empty() {
                    out.chat_id = Some(text.trim().to_string());
                }
            }
            _ => {}
        }
    }

    if out.audio.is_empty() {
        return Err(ApiError::bad_request("Missing audio input (`file`)"));
    }
    Ok(out)
}
