//! Video delivery: static pass-through of materialized HLS artifacts and
//! the live relay through the streaming proxy.

use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::ApiError;
use crate::proxy;
use crate::state::AppState;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";
const LIVE_CONTENT_TYPE: &str = "video/mp4";

pub fn router() -> Router<AppState> {
    // GET routes also answer HEAD; content-length comes from file metadata
    // so HEAD replies are accurate without opening the file body.
    Router::new()
        .route("/stream/:job/playlist.m3u8", get(playlist))
        .route("/stream/:job/live", get(live))
        .route("/stream/:job/:segment", get(segment))
}

async fn playlist(
    State(state): State<AppState>,
    Path(job): Path<Uuid>,
) -> Result<Response, ApiError> {
    serve_media(state.layout.playlist_path(job), PLAYLIST_CONTENT_TYPE).await
}

async fn segment(
    State(state): State<AppState>,
    Path((job, name)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let path = state.layout.segment_path(job, &name)?;
    let content_type = if name.ends_with(".m3u8") {
        PLAYLIST_CONTENT_TYPE
    } else {
        SEGMENT_CONTENT_TYPE
    };
    serve_media(path, content_type).await
}

/// Relay the generator's live render stream instead of waiting for
/// segments to land on shared storage.
async fn live(State(state): State<AppState>, Path(job): Path<Uuid>) -> Result<Response, ApiError> {
    let upstream = state.video.open_stream(job).await?;
    Ok(proxy::relay(upstream, LIVE_CONTENT_TYPE))
}

async fn serve_media(path: PathBuf, content_type: &'static str) -> Result<Response, ApiError> {
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => {
            return Err(ApiError::not_found(format!(
                "no such media artifact: {}",
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            )))
        }
    };

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|err| ApiError::from(lectern_core::PipelineError::from(err)))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, metadata.len())
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|_| ApiError::not_found("unrepresentable media response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn serves_playlist_with_manifest_content_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("playlist.m3u8");
        std::fs::write(&path, "#EXTM3U\n").expect("write");

        let response = serve_media(path, PLAYLIST_CONTENT_TYPE).await.expect("ok");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("ct"),
            PLAYLIST_CONTENT_TYPE
        );
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_LENGTH)
                .expect("len"),
            "8"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"#EXTM3U\n");
    }

    #[tokio::test]
    async fn missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = serve_media(dir.path().join("absent.ts"), SEGMENT_CONTENT_TYPE)
            .await
            .expect_err("missing");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
