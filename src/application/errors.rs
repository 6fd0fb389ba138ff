//! Application layer error types

use crate::domain::DomainError;
use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Vulnerability lookup error: {0}")]
    Vulnerability(#[from] VulnerabilityError),

    #[error("Advisory error: {0}")]
    Advisory(#[from] AdvisoryError),

    #[error("Invalid input for field {field}: {message}")]
    InvalidInput { field: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Resource not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },
}

impl ApplicationError {
    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApplicationError::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while talking to the CVE registry
#[derive(Error, Debug)]
pub enum VulnerabilityError {
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout occurred after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Upstream unavailable after {attempts} attempts: {message}")]
    UpstreamUnavailable { attempts: u32, message: String },

    #[error("Rate limiter could not admit the call within {max_wait_ms}ms")]
    UpstreamRateLimited { max_wait_ms: u64 },

    #[error("Malformed upstream response: {message}")]
    MalformedUpstreamResponse { message: String },
}

impl VulnerabilityError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            VulnerabilityError::Http { status, .. } => *status >= 400,
            VulnerabilityError::Network(_) | VulnerabilityError::Timeout { .. } => true,
            VulnerabilityError::UpstreamUnavailable { .. }
            | VulnerabilityError::UpstreamRateLimited { .. }
            | VulnerabilityError::MalformedUpstreamResponse { .. } => false,
        }
    }

    /// Whether a component that hit this error should be flagged as failed
    pub fn marks_component_failed(&self) -> bool {
        !matches!(self, VulnerabilityError::MalformedUpstreamResponse { .. })
    }
}

/// Errors raised by the advisory store and the generative service
#[derive(Error, Debug)]
pub enum AdvisoryError {
    #[error("Advisory store error: {0}")]
    Store(#[from] sea_orm::DbErr),

    #[error("Advisory store is not configured")]
    StoreNotConfigured,

    #[error("Generation HTTP error {status}: {message}")]
    GenerationHttp { status: u16, message: String },

    #[error("Generation network error: {0}")]
    GenerationNetwork(#[from] reqwest::Error),

    #[error("Generation timed out after {seconds}s")]
    GenerationTimeout { seconds: u64 },

    #[error("Generative service is not configured")]
    GeneratorNotConfigured,

    #[error("Generative service returned no completion")]
    EmptyCompletion,
}
