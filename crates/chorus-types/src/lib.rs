//! Shared types and constants for the chorus voice service.
//!
//! This crate provides the foundational types used across all chorus crates:
//! the voice catalog, pipeline request/response schemas, and the WebSocket
//! frame protocol.
//!
//! No crate in the workspace depends on anything *except* `chorus-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

pub mod pipeline;
pub mod voice;
pub mod ws;

pub use pipeline::{
    AudioProcessRequest, ErrorBody, PipelineBreakdown, PipelineResponse, TextProcessRequest,
};
pub use voice::{VoiceCatalog, VoiceGender, VoiceInfo, VoiceListing};
pub use ws::{ClientFrame, ServerFrame};
