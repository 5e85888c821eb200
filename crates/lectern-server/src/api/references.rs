//! Reference document upload/download, guarded per room.

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use bytes::Bytes;

use crate::api::principal::Caller;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/references/upload", post(upload))
        .route("/references/get/*path", get(download))
}

struct ParsedUpload {
    file: Bytes,
    filename: String,
    room_path: String,
}

async fn upload(
    State(state): State<AppState>,
    Caller(principal): Caller,
    multipart: Multipart,
) -> Result<StatusCode, ApiError> {
    let req = parse_upload(multipart).await?;
    require_room_path(&req.room_path)?;

    state
        .pipeline
        .store_reference(&principal, &req.room_path, &req.filename, &req.file)
        .await?;
    Ok(StatusCode::OK)
}

async fn download(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let (filename, bytes) = state.pipeline.load_reference(&principal, &path).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .header(header::CONTENT_LENGTH, bytes.len())
        .body(Body::from(bytes))
        .map_err(|_| ApiError::bad_request("unrepresentable response"))
}

/// A form without a room is malformed input, not an authorization failure;
/// 401 stays reserved for ownership/membership denials.
fn require_room_path(room_path: &str) -> Result<(), ApiError> {
    if room_path.is_empty() {
        return Err(ApiError::bad_request("missing room path"));
    }
    Ok(())
}

async fn parse_upload(mut multipart: Multipart) -> Result<ParsedUpload, ApiError> {
    let mut file = Bytes::new();
    let mut filename = String::new();
    let mut room_path = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                filename = field.file_name().unwrap_or("document.pdf").to_string();
                file = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("Failed reading 'file' bytes: {e}"))
                })?;
            }
            "room_path" => {
                room_path = field
                    .text()
                    .await
                    .map_err(|e| {
                        ApiError::bad_request(format!("Failed reading 'room_path' field: {e}"))
                    })?
                    .trim()
                    .to_string();
            }
            _ => {}
        }
    }

    if file.is_empty() {
        return Err(ApiError::bad_request("Missing document (`file`)"));
    }
    Ok(ParsedUpload {
        file,
        filename,
        room_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequest;
    use axum::http::Request;

    const BOUNDARY: &str = "reference-upload-test";

    fn form(parts: &[(&str, Option<&str>, &str)]) -> String {
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match filename {
                Some(file) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file}\"\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    async fn parse(body: String) -> Result<ParsedUpload, ApiError> {
        let request = Request::builder()
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request");
        let multipart = Multipart::from_request(request, &())
            .await
            .expect("multipart");
        parse_upload(multipart).await
    }

    #[tokio::test]
    async fn upload_without_room_path_is_a_bad_request() {
        let parsed = parse(form(&[("file", Some("notes.pdf"), "%PDF")]))
            .await
            .expect("parse");

        let err = require_room_path(&parsed.room_path).expect_err("missing room path");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_with_room_path_passes_validation() {
        let parsed = parse(form(&[
            ("file", Some("notes.pdf"), "%PDF"),
            ("room_path", None, "/2024/SoSe/Smith/Vision"),
        ]))
        .await
        .expect("parse");

        assert_eq!(parsed.room_path, "/2024/SoSe/Smith/Vision");
        assert!(require_room_path(&parsed.room_path).is_ok());
    }
}
