//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::resilience::RetryConfig;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub apis: ApiConfig,
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Whether to expose interactive API docs (Swagger UI). Should be false in hardened production.
    pub enable_docs: bool,
    /// Global request timeout in seconds applied at the HTTP layer.
    pub request_timeout_seconds: u64,
    /// Allowed CORS origins. Use ["*"] to allow any (development only).
    /// Empty vector -> no external origins.
    pub allowed_origins: Vec<String>,
}

/// Lookup cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    /// Period of the background sweep removing expired entries
    pub cleanup_interval_seconds: u64,
}

/// External API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub nvd: NvdConfig,
    pub generative: GenerativeConfig,
}

/// NVD CVE API 2.0 configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvdConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Bound on a single registry call
    pub timeout_seconds: u64,
    /// Minimum spacing between two registry calls, process-wide
    pub rate_limit_interval_ms: u64,
    /// Callers that would wait longer than this for a slot are denied
    pub max_rate_limit_wait_ms: u64,
    pub retry: RetrySettings,
}

/// Backoff settings as they appear in configuration files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// OpenAI-compatible chat completions configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerativeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Model for query-scoped answers
    pub model: String,
    pub max_tokens: u32,
    /// Model for generic guidance when the scoped call fails
    pub fallback_model: String,
    pub fallback_max_tokens: u32,
    pub timeout_seconds: u64,
}

/// Advisory store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; the advisory store is disabled when absent
    pub url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

/// SBOM pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub max_concurrent_lookups: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                enable_docs: true,
                request_timeout_seconds: 120,
                allowed_origins: vec!["*".to_string()],
            },
            cache: CacheConfig {
                ttl_seconds: 3600,
                cleanup_interval_seconds: 300,
            },
            apis: ApiConfig {
                nvd: NvdConfig {
                    base_url: "https://services.nvd.nist.gov/rest/json".to_string(),
                    api_key: None,
                    timeout_seconds: 30,
                    rate_limit_interval_ms: 1000,
                    max_rate_limit_wait_ms: 60_000,
                    retry: RetrySettings {
                        max_attempts: 3,
                        initial_delay_ms: 1000,
                        max_delay_ms: 30_000,
                        backoff_multiplier: 2.0,
                    },
                },
                generative: GenerativeConfig {
                    base_url: "https://api.openai.com/v1".to_string(),
                    api_key: None,
                    model: "gpt-4-turbo".to_string(),
                    max_tokens: 300,
                    fallback_model: "gpt-3.5-turbo".to_string(),
                    fallback_max_tokens: 150,
                    timeout_seconds: 30,
                },
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                connect_timeout_seconds: 10,
            },
            pipeline: PipelineConfig {
                max_concurrent_lookups: 4,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from defaults, files and environment variables
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        // Override with environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        let mut config: Config = builder
            .add_source(config::Environment::with_prefix("SBOMVEX").separator("__"))
            .build()?
            .try_deserialize()?;

        config.apply_env_fallbacks(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fill unset credentials from the conventional DATABASE_URL, OPENAI_API_KEY and
    /// NVD_API_KEY variables
    pub fn apply_env_fallbacks<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |current: &mut Option<String>, name: &str| {
            if current.as_deref().is_none_or(str::is_empty) {
                *current = lookup(name).filter(|v| !v.trim().is_empty());
            }
        };

        pick(&mut self.database.url, "DATABASE_URL");
        pick(&mut self.apis.generative.api_key, "OPENAI_API_KEY");
        pick(&mut self.apis.nvd.api_key, "NVD_API_KEY");
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.pipeline.max_concurrent_lookups == 0 {
            return Err(config::ConfigError::Message(
                "pipeline.max_concurrent_lookups must be at least 1".to_string(),
            ));
        }
        if self.cache.cleanup_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "cache.cleanup_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.apis.nvd.retry.max_attempts == 0 {
            return Err(config::ConfigError::Message(
                "apis.nvd.retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
