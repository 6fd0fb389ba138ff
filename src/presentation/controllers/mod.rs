//! HTTP controllers for handling requests

use axum::{extract::rejection::JsonRejection, response::Json, response::Response};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::{
    AdvisoryEngine, AnalysisService, AnalysisServiceImpl, FixService, FixServiceImpl,
    GenerationSettings,
};
use crate::config::Config;
use crate::infrastructure::{
    AdvisoryStore, CachingVulnerabilityRepository, LookupCache, RateLimiter, RegistryClient,
    TextGenerator, VulnerabilityRepository,
};
use crate::presentation::middleware::json_rejection;

pub mod advisory;
pub mod fixes;
pub mod health;
pub mod sbom;
pub mod vulnerability;

pub use advisory::*;
pub use fixes::*;
pub use health::*;
pub use sbom::*;
pub use vulnerability::*;

/// Application state containing services
#[derive(Clone)]
pub struct AppState {
    pub analysis_service: Arc<dyn AnalysisService>,
    pub fix_service: Arc<dyn FixService>,
    pub advisory_engine: Arc<AdvisoryEngine>,
    pub advisory_store: Arc<dyn AdvisoryStore>,
    pub cache: Arc<LookupCache>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the services around a registry client, an advisory store and a generator.
    /// Cache and rate limiter are created here and shared by every lookup.
    pub fn new(
        config: &Config,
        registry: Arc<dyn RegistryClient>,
        advisory_store: Arc<dyn AdvisoryStore>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let nvd = &config.apis.nvd;
        let cache = Arc::new(LookupCache::new(Duration::from_secs(config.cache.ttl_seconds)));
        let limiter = Arc::new(RateLimiter::new(
            Duration::from_millis(nvd.rate_limit_interval_ms),
            Duration::from_millis(nvd.max_rate_limit_wait_ms),
        ));
        let repository: Arc<dyn VulnerabilityRepository> =
            Arc::new(CachingVulnerabilityRepository::new(
                registry,
                cache.clone(),
                limiter,
                nvd.retry.to_retry_config(),
                Duration::from_secs(nvd.timeout_seconds),
            ));

        Self {
            analysis_service: Arc::new(AnalysisServiceImpl::new(
                repository.clone(),
                config.pipeline.max_concurrent_lookups,
            )),
            fix_service: Arc::new(FixServiceImpl::new(repository)),
            advisory_engine: Arc::new(AdvisoryEngine::new(
                advisory_store.clone(),
                generator,
                GenerationSettings::from(&config.apis.generative),
            )),
            advisory_store,
            cache,
            started_at: Instant::now(),
        }
    }
}

/// Unwrap an extracted JSON body, turning rejections into 400 responses
pub(crate) fn accept<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload.map(|Json(body)| body).map_err(json_rejection)
}
