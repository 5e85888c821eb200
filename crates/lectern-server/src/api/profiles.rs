//! Avatar profile media: voice-clone sample plus one face asset.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Router,
};
use bytes::Bytes;

use crate::api::principal::Caller;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/profiles/avatar", post(create_avatar))
}

async fn create_avatar(
    State(state): State<AppState>,
    Caller(principal): Caller,
    mut multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let mut voice = Bytes::new();
    let mut face_image: Option<Bytes> = None;
    let mut face_video: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed reading '{name}' bytes: {e}")))?;
        match name.as_str() {
            "voice" => voice = bytes,
            "face_image" if !bytes.is_empty() => face_image = Some(bytes),
            "face_video" if !bytes.is_empty() => face_video = Some(bytes),
            _ => {}
        }
    }

    if voice.is_empty() {
        return Err(ApiError::bad_request("Missing voice sample (`voice`)"));
    }

    state.pipeline.store_profile(
        &principal.subject,
        &voice,
        face_image.as_deref(),
        face_video.as_deref(),
    )?;
    Ok(StatusCode::OK)
}
