//! The request pipeline: text/audio in, synthesized speech and a video job
//! handle out.
//!
//! Both entry operations are pure compositions of the adapters. There is no
//! retry or resume logic here; the first failing stage short-circuits the
//! rest and propagates as a pipeline failure.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapters::{ResponseGenerator, SpeechSynthesizer, SpeechToText, VideoGenerator};
use crate::auth::{AccessGuard, Principal};
use crate::error::PipelineError;
use crate::layout::{write_atomically, StorageLayout};
use crate::readiness::{self, Readiness};

/// Partition used when the caller supplies no room, so conversation memory
/// still partitions deterministically.
pub const DEFAULT_PARTITION: &str = "0";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PipelineResponse {
    pub response_text: String,
    pub job_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub language: String,
    pub chunk_poll_interval: Duration,
    pub chunk_timeout: Duration,
}

pub struct Pipeline {
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn ResponseGenerator>,
    tts: Arc<dyn SpeechSynthesizer>,
    video: Arc<dyn VideoGenerator>,
    guard: AccessGuard,
    layout: StorageLayout,
    options: PipelineOptions,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn ResponseGenerator>,
        tts: Arc<dyn SpeechSynthesizer>,
        video: Arc<dyn VideoGenerator>,
        guard: AccessGuard,
        layout: StorageLayout,
        options: PipelineOptions,
    ) -> Self {
        Self {
            stt,
            llm,
            tts,
            video,
            guard,
            layout,
            options,
        }
    }

    /// Text request -> LLM reply -> synthesized speech -> video job handle.
    ///
    /// The room path is both the authorization unit and the upstream
    /// memory/retrieval partition key.
    pub async fn process_text(
        &self,
        text: &str,
        room_path: &str,
        _chat_id: Option<&str>,
    ) -> Result<PipelineResponse, PipelineError> {
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidRequest(
                "text input cannot be empty".to_string(),
            ));
        }
        let room = partition_for(room_path);

        let owner = self.guard.resolve_owner(&room).await?;
        let reply = self.llm.generate(text, &room).await?;
        let job = self
            .tts
            .synthesize(&reply, &owner, &self.options.language)
            .await?;

        let chunk = self.layout.first_chunk_path(job);
        debug!(%job, chunk = %chunk.display(), "waiting for first audio chunk");
        let waited = self.options.chunk_timeout;
        match readiness::await_file(&chunk, self.options.chunk_poll_interval, waited).await {
            Readiness::Ready => {}
            Readiness::TimedOut => {
                return Err(PipelineError::ReadinessTimeout {
                    artifact: format!("first audio chunk for job {job}"),
                    waited,
                })
            }
        }

        self.video.animate(&owner, job).await?;
        info!(%job, room = %room, "pipeline completed, video rendering started");

        Ok(PipelineResponse {
            response_text: reply,
            job_id: job,
            request_text: None,
        })
    }

    /// Audio request: transcribe, then a strict delegation to
    /// [`process_text`](Self::process_text) with the transcript reported
    /// back to the caller.
    pub async fn process_audio(
        &self,
        audio: Bytes,
        filename: &str,
        room_path: &str,
        chat_id: Option<&str>,
    ) -> Result<PipelineResponse, PipelineError> {
        let transcript = self.stt.transcribe(audio, filename).await?;
        let mut response = self.process_text(&transcript, room_path, chat_id).await?;
        response.request_text = Some(transcript);
        Ok(response)
    }

    /// Store a reference document in a room. Owner-only; a denied upload
    /// writes nothing.
    pub async fn store_reference(
        &self,
        principal: &Principal,
        room_path: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), PipelineError> {
        self.guard.check_publish(principal, room_path).await?;
        self.layout.persist_reference(room_path, filename, bytes)?;
        info!(room = room_path, file = filename, "reference stored");
        Ok(())
    }

    /// Fetch a reference document addressed as `room/path/filename`.
    /// Requires membership in the room.
    pub async fn load_reference(
        &self,
        principal: &Principal,
        path: &str,
    ) -> Result<(String, Vec<u8>), PipelineError> {
        let trimmed = path.trim_matches('/');
        let Some(split) = trimmed.rfind('/') else {
            return Err(PipelineError::InvalidRequest(format!(
                "reference path '{path}' has no room component"
            )));
        };
        let (room, filename) = (&trimmed[..split], &trimmed[split + 1..]);

        self.guard.check_read(principal, room)?;

        let full_path = self.layout.reference_path(trimmed)?;
        match std::fs::read(&full_path) {
            Ok(bytes) => Ok((filename.to_string(), bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(
                PipelineError::NotFound(format!("reference '{trimmed}' does not exist")),
            ),
            Err(err) => Err(err.into()),
        }
    }

    /// Store the caller's avatar assets: the voice-clone sample plus at most
    /// one face asset. Storing a face image clears a previously stored face
    /// video and vice versa, so the generator always finds exactly one.
    pub fn store_profile(
        &self,
        subject: &str,
        voice: &[u8],
        face_image: Option<&[u8]>,
        face_video: Option<&[u8]>,
    ) -> Result<(), PipelineError> {
        if voice.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "voice sample cannot be empty".to_string(),
            ));
        }
        write_atomically(&self.layout.voice_path(subject)?, voice)?;

        if let Some(image) = face_image {
            remove_if_present(&self.layout.face_video_path(subject)?)?;
            write_atomically(&self.layout.face_image_path(subject)?, image)?;
        }
        if let Some(video) = face_video {
            remove_if_present(&self.layout.face_image_path(subject)?)?;
            write_atomically(&self.layout.face_video_path(subject)?, video)?;
        }
        info!(owner = subject, "profile media stored");
        Ok(())
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }
}

fn remove_if_present(path: &std::path::Path) -> Result<(), PipelineError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn partition_for(room_path: &str) -> String {
    let trimmed = room_path.trim();
    if trimmed.is_empty() {
        DEFAULT_PARTITION.to_string()
    } else {
        trimmed.to_string()
    }
}
