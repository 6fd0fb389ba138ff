//! Traits for outbound API clients

use crate::application::errors::{AdvisoryError, VulnerabilityError};
use crate::domain::{CpeName, RawRegistryRecord};
use async_trait::async_trait;

/// Client for the authoritative CVE registry
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn fetch_by_cpe(&self, cpe: &CpeName)
        -> Result<Vec<RawRegistryRecord>, VulnerabilityError>;

    async fn fetch_by_keyword(
        &self,
        keyword: &str,
    ) -> Result<Vec<RawRegistryRecord>, VulnerabilityError>;
}

/// One chat-style completion request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Client for a generative text service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, AdvisoryError>;
}
