//! Infrastructure Layer - External concerns and implementations
//!
//! This module handles external systems: the CVE registry, the generative text
//! service, the advisory database and the in-process lookup cache.

pub mod advisory_store;
pub mod api_clients;
pub mod cache;
pub mod repositories;
pub mod resilience;

pub use advisory_store::{AdvisoryStore, DisabledAdvisoryStore, PostgresAdvisoryStore};
pub use api_clients::{
    GenerationRequest, NvdClient, OpenAiClient, RegistryClient, TextGenerator,
};
pub use cache::*;
pub use repositories::*;
pub use resilience::*;
