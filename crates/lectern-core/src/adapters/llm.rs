//! Language-model adapter. The room path travels with every request so the
//! upstream can partition conversation memory and retrieval by room.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Stage};

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, text: &str, room_path: &str) -> Result<String, PipelineError>;
}

pub struct LanguageModelClient {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Serialize)]
struct LlmRequest<'a> {
    message: &'a str,
    room: &'a str,
}

#[derive(Debug, Deserialize)]
struct LlmResponse {
    response: String,
}

impl LanguageModelClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl ResponseGenerator for LanguageModelClient {
    async fn generate(&self, text: &str, room_path: &str) -> Result<String, PipelineError> {
        let response = self
            .client
            .post(&self.url)
            .json(&LlmRequest {
                message: text,
                room: room_path,
            })
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::upstream(Stage::LanguageModel, err.to_string()))?;

        let body: LlmResponse = response.json().await.map_err(|err| {
            PipelineError::upstream(
                Stage::LanguageModel,
                format!("malformed completion payload: {err}"),
            )
        })?;

        Ok(strip_think_blocks(&body.response))
    }
}

/// Remove complete `<think>…</think>` reasoning blocks from a reply and trim
/// the remainder. Unterminated blocks are left as-is.
pub fn strip_think_blocks(text: &str) -> String {
    const OPEN: &str = "<think>";
    const CLOSE: &str = "</think>";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let Some(end) = rest[start..].find(CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start + end + CLOSE.len()..];
    }
    out.push_str(rest);
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_think_block() {
        assert_eq!(
            strip_think_blocks("<think>hmm</think>The lecture starts at 13:00."),
            "The lecture starts at 13:00."
        );
    }

    #[test]
    fn strips_multiple_blocks_and_trims() {
        assert_eq!(
            strip_think_blocks("  <think>a</think>Hello<think>b\nc</think> world  "),
            "Hello world"
        );
    }

    #[test]
    fn leaves_unterminated_block_alone() {
        assert_eq!(
            strip_think_blocks("Answer <think>never closed"),
            "Answer <think>never closed"
        );
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(strip_think_blocks("just a reply"), "just a reply");
    }
}
