//! sbomvex - SBOM vulnerability triage and VEX service
//!
//! Looks up the components of a Software Bill of Materials in the NVD CVE registry,
//! ranks the findings for remediation, produces fix plans and VEX documents, and
//! answers advisory questions from a local PostgreSQL store with a generative fallback.
//! Layered the Domain-Driven Design way: pure domain logic, application services,
//! infrastructure adapters and an axum presentation layer.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod presentation;

pub use config::Config;
pub use logging::init_tracing;
pub use presentation::{AppState, create_router};
