//! Blocking client for the learning service REST API.
//!
//! Covers the knowledge graph (frontier, concepts, visualization), lessons,
//! mastery updates and the one-shot compile endpoint. It shares its base URL
//! with the streaming session but no state.

pub mod client;
pub mod types;

pub use client::LearningApi;
pub use types::{
    CompileOutput, CompileRequest, Concept, DeleteLessonResponse, FrontierConcept,
    GeneratedLesson, LessonResponse, MasteryUpdate, MasteryUpdateResult, NextLesson,
    RegeneratedLesson, UserProgress,
};

/// Failure of a REST call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearningApiError {
    /// The base URL cannot address the API.
    InvalidUrl { url: String, reason: String },
    /// The service could not be reached.
    Unavailable { reason: String },
    /// The service answered 404; the learning routes are not mounted.
    NotFound { endpoint: String },
    /// Any other non-success status.
    Request { status: u16, message: String },
    /// The body did not have the expected shape.
    Decode { endpoint: String, reason: String },
}

impl LearningApiError {
    /// True when the service should be treated as offline rather than
    /// as having rejected the request.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::NotFound { .. })
    }
}

impl std::fmt::Display for LearningApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidUrl { url, reason } => {
                write!(f, "Invalid learning server URL '{}': {}", url, reason)
            }
            Self::Unavailable { reason } => write!(
                f,
                "Cannot connect to learning server. Please ensure the backend is running. ({})",
                reason
            ),
            Self::NotFound { endpoint } => write!(
                f,
                "Endpoint not found: {}. Ensure the backend /learn plugin is running.",
                endpoint
            ),
            Self::Request { message, .. } => write!(f, "{}", message),
            Self::Decode { endpoint, reason } => {
                write!(f, "Unexpected response from {}: {}", endpoint, reason)
            }
        }
    }
}

impl std::error::Error for LearningApiError {}
