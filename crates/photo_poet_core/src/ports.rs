//! crates/photo_poet_core/src/ports.rs
//!
//! Defines the service contract (trait) for the external generation service.
//! This trait is the boundary of the hexagonal architecture: the core and the
//! action layer only ever talk to the remote model through it, so the live
//! adapter can be swapped for a test double.

use crate::domain::Operation;
use crate::prompt::{MediaOutput, MediaRequest, TextRequest};
use async_trait::async_trait;
use bytes::Bytes;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the HTTP client and the remote API.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("remote service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("missing credential: {0}")]
    MissingCredential(String),
    #[error("Deadline exceeded: {0}")]
    Timeout(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("missing output: {0}")]
    MissingOutput(String),
    #[error("Failed to generate video: {0}")]
    OperationFailed(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl PortError {
    /// The HTTP status reported by the remote service, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            PortError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Port (Trait)
//=========================================================================================

#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generates a structured text response; the result is the JSON object
    /// matching the request's output schema.
    async fn generate_text(&self, request: &TextRequest) -> PortResult<serde_json::Value>;

    /// Generates media, either inline or as a long-running operation.
    async fn generate_media(&self, request: &MediaRequest) -> PortResult<MediaOutput>;

    /// Returns the current status of a long-running operation.
    async fn check_operation(&self, operation: &Operation) -> PortResult<Operation>;

    /// Downloads media referenced by a link in a generation result.
    async fn fetch_media(&self, url: &str) -> PortResult<Bytes>;
}
