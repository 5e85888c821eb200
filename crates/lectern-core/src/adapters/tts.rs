//! Speech-synthesis adapter. Submission is asynchronous upstream: the call
//! returns a job handle and the synthesized chunks land on shared storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Stage};

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Submit text for synthesis with the owner's cloned voice. Returns the
    /// generation job handle.
    async fn synthesize(
        &self,
        text: &str,
        speaker: &str,
        language: &str,
    ) -> Result<Uuid, PipelineError>;
}

pub struct TextToSpeechClient {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    speaker_name: &'a str,
    language: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TtsSubmission {
    uuid: String,
}

impl TextToSpeechClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl SpeechSynthesizer for TextToSpeechClient {
    async fn synthesize(
        &self,
        text: &str,
        speaker: &str,
        language: &str,
    ) -> Result<Uuid, PipelineError> {
        let response = self
            .client
            .post(&self.url)
            .json(&TtsRequest {
                speaker_name: speaker,
                language,
                text,
            })
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::upstream(Stage::SpeechSynthesis, err.to_string()))?;

        let submission: TtsSubmission = response.json().await.map_err(|err| {
            PipelineError::upstream(
                Stage::SpeechSynthesis,
                format!("malformed submission payload: {err}"),
            )
        })?;

        Uuid::parse_str(&submission.uuid).map_err(|err| {
            PipelineError::upstream(
                Stage::SpeechSynthesis,
                format!("invalid job id '{}': {err}", submission.uuid),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_payload_requires_a_uuid() {
        let ok: TtsSubmission =
            serde_json::from_str(r#"{"uuid": "7f9c24e5-2f8a-4b3e-9c1d-0a6f5e4d3c2b"}"#)
                .expect("parse");
        assert!(Uuid::parse_str(&ok.uuid).is_ok());

        let missing: Result<TtsSubmission, _> = serde_json::from_str(r#"{"job": "x"}"#);
        assert!(missing.is_err());
    }
}
