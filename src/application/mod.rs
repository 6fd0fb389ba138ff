//! Application Layer - Use cases and application services
//!
//! This module orchestrates the business logic and coordinates between
//! the domain and infrastructure layers.

pub mod errors;
pub mod services;

#[cfg(test)]
mod tests;

pub use errors::*;
pub use services::*;
