//! Upstream adapters. Each wraps exactly one HTTP contract with typed
//! request/response structs; malformed payloads surface as
//! [`PipelineError::UpstreamUnavailable`](crate::error::PipelineError) at the
//! boundary instead of faulting downstream.

mod directory;
mod llm;
mod stt;
mod tts;
mod video;

pub use directory::KeycloakDirectory;
pub use llm::{LanguageModelClient, ResponseGenerator};
pub use stt::{SpeechToText, SpeechToTextClient};
pub use tts::{SpeechSynthesizer, TextToSpeechClient};
pub use video::{VideoClient, VideoGenerator};
