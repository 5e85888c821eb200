//! Error taxonomy for the orchestration pipeline.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Identifies which upstream collaborator produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SpeechToText,
    LanguageModel,
    SpeechSynthesis,
    VideoGeneration,
    RoomDirectory,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SpeechToText => "speech-to-text",
            Self::LanguageModel => "language-model",
            Self::SpeechSynthesis => "speech-synthesis",
            Self::VideoGeneration => "video-generation",
            Self::RoomDirectory => "room-directory",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upstream call failed, returned non-success, or sent a payload
    /// missing required fields.
    #[error("{stage} upstream unavailable: {reason}")]
    UpstreamUnavailable { stage: Stage, reason: String },

    /// An expected artifact never appeared on shared storage within the
    /// configured bound. Distinct from `UpstreamUnavailable` so callers can
    /// tell "upstream rejected" apart from "upstream too slow".
    #[error("{artifact} not ready after {}ms", waited.as_millis())]
    ReadinessTimeout { artifact: String, waited: Duration },

    /// Ownership or membership check failed. Never downgraded to a
    /// not-found answer.
    #[error("access to room '{room_path}' denied for '{subject}'")]
    AuthorizationDenied { subject: String, room_path: String },

    /// Malformed caller input (bad path, empty payload).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A requested artifact does not exist (yet).
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl PipelineError {
    pub fn upstream(stage: Stage, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            stage,
            reason: reason.into(),
        }
    }

    pub fn denied(subject: impl Into<String>, room_path: impl Into<String>) -> Self {
        Self::AuthorizationDenied {
            subject: subject.into(),
            room_path: room_path.into(),
        }
    }
}
