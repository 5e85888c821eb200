//! Core orchestration library for the Lectern avatar lecture gateway.
//!
//! Composes the upstream AI services (speech-to-text, language model,
//! speech synthesis, talking-head video) behind a single pipeline, with
//! per-room authorization and a shared-storage layout for generated media.

pub mod adapters;
pub mod auth;
pub mod config;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod readiness;

pub use auth::{AccessGuard, Principal, RoomDirectory};
pub use config::GatewayConfig;
pub use error::{PipelineError, Stage};
pub use layout::StorageLayout;
pub use pipeline::{Pipeline, PipelineOptions, PipelineResponse};
pub use readiness::Readiness;
