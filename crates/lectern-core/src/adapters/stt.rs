//! Speech-to-text adapter.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::error::{PipelineError, Stage};

#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe an uploaded audio file to text.
    async fn transcribe(&self, audio: Bytes, filename: &str) -> Result<String, PipelineError>;
}

pub struct SpeechToTextClient {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    transcription: String,
}

impl SpeechToTextClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl SpeechToText for SpeechToTextClient {
    async fn transcribe(&self, audio: Bytes, filename: &str) -> Result<String, PipelineError> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::upstream(Stage::SpeechToText, err.to_string()))?;

        let body: TranscriptionResponse = response.json().await.map_err(|err| {
            PipelineError::upstream(
                Stage::SpeechToText,
                format!("malformed transcription payload: {err}"),
            )
        })?;

        let transcript = body.transcription.trim().to_string();
        if transcript.is_empty() {
            return Err(PipelineError::upstream(
                Stage::SpeechToText,
                "empty transcription",
            ));
        }
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcription_payload_requires_the_field() {
        let ok: Result<TranscriptionResponse, _> =
            serde_json::from_str(r#"{"transcription": " hello "}"#);
        assert_eq!(ok.expect("parse").transcription, " hello ");

        let missing: Result<TranscriptionResponse, _> = serde_json::from_str(r#"{"text": "x"}"#);
        assert!(missing.is_err());
    }
}
