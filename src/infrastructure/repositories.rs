//! Repository implementations

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::api_clients::traits::RegistryClient;
use super::cache::LookupCache;
use super::resilience::{RateLimiter, RetryConfig, retry_with_backoff};
use crate::application::errors::VulnerabilityError;
use crate::domain::{
    CpeName, RawRegistryRecord, ScoringEngine, VulnerabilityId, VulnerabilityRecord,
};

/// Repository trait for vulnerability data access
#[async_trait]
pub trait VulnerabilityRepository: Send + Sync {
    /// Findings for one component identifier
    async fn lookup(&self, cpe: &CpeName)
    -> Result<Arc<[VulnerabilityRecord]>, VulnerabilityError>;

    /// Findings matching a free-text keyword
    async fn lookup_keyword(
        &self,
        keyword: &str,
    ) -> Result<Arc<[VulnerabilityRecord]>, VulnerabilityError>;

    /// Resolve a single registry ID
    async fn find_by_id(
        &self,
        id: &VulnerabilityId,
    ) -> Result<Option<VulnerabilityRecord>, VulnerabilityError>;
}

#[derive(Debug, Clone, Copy)]
enum RegistryQuery<'a> {
    Cpe(&'a CpeName),
    Keyword(&'a str),
}

impl RegistryQuery<'_> {
    fn cache_key(&self) -> String {
        match self {
            RegistryQuery::Cpe(cpe) => LookupCache::cpe_key(cpe.as_str()),
            RegistryQuery::Keyword(keyword) => LookupCache::keyword_key(keyword),
        }
    }

    fn component(&self) -> Option<&CpeName> {
        match self {
            RegistryQuery::Cpe(cpe) => Some(cpe),
            RegistryQuery::Keyword(_) => None,
        }
    }
}

/// Registry-backed repository with TTL caching, per-key call coalescing, a shared
/// rate limiter and bounded retries
pub struct CachingVulnerabilityRepository {
    client: Arc<dyn RegistryClient>,
    cache: Arc<LookupCache>,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    call_timeout: Duration,
    scoring: ScoringEngine,
}

impl CachingVulnerabilityRepository {
    pub fn new(
        client: Arc<dyn RegistryClient>,
        cache: Arc<LookupCache>,
        limiter: Arc<RateLimiter>,
        retry: RetryConfig,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            cache,
            limiter,
            retry,
            call_timeout,
            scoring: ScoringEngine::new(),
        }
    }

    /// One attempt: limiter admission, then the registry call under the timeout
    async fn attempt(
        &self,
        query: RegistryQuery<'_>,
    ) -> Result<Vec<RawRegistryRecord>, VulnerabilityError> {
        self.limiter.acquire().await?;

        let call = async {
            match query {
                RegistryQuery::Cpe(cpe) => self.client.fetch_by_cpe(cpe).await,
                RegistryQuery::Keyword(keyword) => self.client.fetch_by_keyword(keyword).await,
            }
        };

        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| VulnerabilityError::Timeout {
                seconds: self.call_timeout.as_secs(),
            })?
    }

    async fn resolve(
        &self,
        query: RegistryQuery<'_>,
    ) -> Result<Arc<[VulnerabilityRecord]>, VulnerabilityError> {
        let key = query.cache_key();

        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let lock = self.cache.key_lock(&key).await;
        let result = {
            let _guard = lock.lock().await;
            self.fill(query, &key).await
        };
        self.cache.release_key_lock(&key, &lock).await;

        result
    }

    /// Fetch and cache `key` while holding its in-flight lock
    async fn fill(
        &self,
        query: RegistryQuery<'_>,
        key: &str,
    ) -> Result<Arc<[VulnerabilityRecord]>, VulnerabilityError> {
        // Another caller may have filled the entry while we waited on the lock
        if let Some(hit) = self.cache.peek(key).await {
            debug!(key = %key, "Coalesced onto in-flight lookup");
            return Ok(hit);
        }

        let raw = retry_with_backoff(&self.retry, || self.attempt(query))
            .await
            .inspect_err(|e| warn!(key = %key, error = %e, "Registry lookup failed"))?;

        let records: Arc<[VulnerabilityRecord]> =
            self.scoring.normalize_all(&raw, query.component()).into();

        info!(key = %key, findings = records.len(), "Registry lookup completed");

        self.cache.insert(key.to_string(), records.clone()).await;
        self.cache.index_by_id(&records).await;

        Ok(records)
    }
}

#[async_trait]
impl VulnerabilityRepository for CachingVulnerabilityRepository {
    async fn lookup(
        &self,
        cpe: &CpeName,
    ) -> Result<Arc<[VulnerabilityRecord]>, VulnerabilityError> {
        self.resolve(RegistryQuery::Cpe(cpe)).await
    }

    async fn lookup_keyword(
        &self,
        keyword: &str,
    ) -> Result<Arc<[VulnerabilityRecord]>, VulnerabilityError> {
        self.resolve(RegistryQuery::Keyword(keyword.trim())).await
    }

    async fn find_by_id(
        &self,
        id: &VulnerabilityId,
    ) -> Result<Option<VulnerabilityRecord>, VulnerabilityError> {
        if let Some(indexed) = self.cache.peek(&LookupCache::id_key(id.as_str())).await {
            debug!(id = %id, "Resolved from registry-ID index");
            return Ok(indexed.first().cloned());
        }

        let records = self.lookup_keyword(id.as_str()).await?;
        Ok(records.iter().find(|r| r.id.matches(id.as_str())).cloned())
    }
}
