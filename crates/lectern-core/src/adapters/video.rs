//! Talking-head video generator adapter.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{PipelineError, Stage};

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Kick off lip-synced rendering for a synthesized-audio job. Rendering
    /// proceeds asynchronously; segments land under the job's video
    /// directory on shared storage.
    async fn animate(&self, speaker: &str, job: Uuid) -> Result<(), PipelineError>;
}

#[derive(Clone)]
pub struct VideoClient {
    client: reqwest::Client,
    url: String,
}

impl VideoClient {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    /// Open the generator's chunked live-render stream for a job. The
    /// response body is consumed incrementally by the streaming proxy.
    pub async fn open_stream(&self, job: Uuid) -> Result<reqwest::Response, PipelineError> {
        let url = format!("{}/{job}", self.url.trim_end_matches('/'));
        self.client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::upstream(Stage::VideoGeneration, err.to_string()))
    }
}

#[async_trait]
impl VideoGenerator for VideoClient {
    async fn animate(&self, speaker: &str, job: Uuid) -> Result<(), PipelineError> {
        self.client
            .post(&self.url)
            .form(&[("professor", speaker), ("uuid", &job.to_string())])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| PipelineError::upstream(Stage::VideoGeneration, err.to_string()))?;
        Ok(())
    }
}
