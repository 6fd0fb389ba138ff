//! Domain-specific error types

use thiserror::Error;

/// Domain-level errors for SBOM triage
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid vulnerability ID: {id}")]
    InvalidVulnerabilityId { id: String },

    #[error("Invalid fix status: {status} (expected Pending, Applied or Rejected)")]
    InvalidFixStatus { status: String },

    #[error("Invalid input for field {field}: {message}")]
    InvalidInput { field: String, message: String },
}
