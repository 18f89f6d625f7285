//! Centralized configuration management for docstream
//!
//! This crate provides a unified configuration system that eliminates
//! duplication across the codebase and provides type-safe, validated
//! configuration.
//!
//! Configuration follows a simple hierarchy:
//! 1. Safe defaults (defined as constants)
//! 2. Environment variable overrides (`DOCSTREAM_*`)
//! 3. Runtime validation

pub mod error;

pub use error::{ConfigError, ConfigResult};

use sqlx::postgres::{PgConnectOptions, PgSslMode};

// =============================================================================
// SAFE DEFAULTS - Work for any environment (dev, staging, prod, test)
// =============================================================================

// Chunking Configuration
const DEFAULT_CHUNK_SIZE: usize = 512; // Approximate tokens per chunk
const DEFAULT_CHUNK_OVERLAP: usize = 50;
const CHUNK_SIZE_MIN: usize = 128;
const CHUNK_SIZE_MAX: usize = 4096;

// Embedding Configuration
const DEFAULT_EMBEDDING_MODEL_ID: &str = "jinaai/jina-embeddings-v2-base-en";
const DEFAULT_EMBEDDING_ENDPOINT: &str = "http://localhost:8100/v1/embeddings";
const DEFAULT_VECTOR_DIMENSION: usize = 768;
const DEFAULT_EMBED_BATCH_SIZE: usize = 100;
const EMBED_BATCH_SIZE_MAX: usize = 1000;

// Pipeline Configuration
const DEFAULT_MAX_RETRIES: i32 = 3;
const DEFAULT_EXTRACT_WORKERS: usize = 2;
const DEFAULT_CHUNK_WORKERS: usize = 2;
const DEFAULT_EMBED_WORKERS: usize = 4;
const DEFAULT_EXTRACT_BUDGET_SECS: u64 = 300; // 5 minutes per document
const DEFAULT_CHUNK_BUDGET_SECS: u64 = 120;
const DEFAULT_EMBED_BUDGET_SECS: u64 = 600;
const DEFAULT_IDLE_POLL_MS: u64 = 100; // Initial idle backoff between scheduler polls
const DEFAULT_IDLE_POLL_CAP_MS: u64 = 2_000;
const DEFAULT_STALE_JOB_AFTER_SECS: u64 = 900; // Past the longest stage budget

// Rate limiting
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

// API Server Configuration
const DEFAULT_API_HOST: &str = "127.0.0.1"; // Localhost only for security
const DEFAULT_API_PORT: u16 = 3000;
const DEFAULT_MAX_FILE_SIZE_BYTES: usize = 100 * 1024 * 1024;
const DEFAULT_BULK_UPLOAD_LIMIT: usize = 100;

// Database Configuration (safe local defaults)
const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "docstream";
const DEFAULT_DB_USER: &str = "docstream";
const DEFAULT_DB_PASSWORD: &str = "localdev123";

// Vector Storage Configuration
const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
const DEFAULT_COLLECTION_NAME: &str = "docstream";

// Blob Storage Configuration
const DEFAULT_BLOB_ROOT: &str = "./data/blobs";

/// Core configuration for the entire docstream application
///
/// All settings have safe defaults and can be overridden via environment
/// variables. No profile/environment selection needed - same defaults work
/// everywhere.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApplicationConfig {
    /// Chunker parameters
    pub chunking: ChunkingConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Worker pipeline configuration
    pub pipeline: PipelineConfig,

    /// API admission rate limiting
    pub rate_limit: RateLimitConfig,

    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Vector index configuration
    pub vector: VectorConfig,

    /// Blob store configuration
    pub blob: BlobConfig,
}

/// Chunker parameters - control how extracted text is segmented
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChunkingConfig {
    /// Target chunk length in approximate tokens
    pub chunk_size: usize,

    /// Tokens of overlap between consecutive chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier sent to the embedding endpoint
    pub model_id: String,

    /// HTTP endpoint of the embedding service
    pub endpoint: String,

    /// Embedding dimensions produced by this model
    /// Must match vector index configuration for consistency
    pub dimension: usize,

    /// Number of chunks embedded per provider call
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_EMBEDDING_MODEL_ID.to_string(),
            endpoint: DEFAULT_EMBEDDING_ENDPOINT.to_string(),
            dimension: DEFAULT_VECTOR_DIMENSION,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
        }
    }
}

/// Worker pipeline configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Maximum retry attempts before a job is dead-lettered
    pub max_retries: i32,

    /// Worker instances per stage
    pub extract_workers: usize,
    pub chunk_workers: usize,
    pub embed_workers: usize,

    /// Wall-clock budget per stage, in seconds
    pub extract_budget_secs: u64,
    pub chunk_budget_secs: u64,
    pub embed_budget_secs: u64,

    /// Idle backoff between scheduler polls (initial and cap)
    pub idle_poll_ms: u64,
    pub idle_poll_cap_ms: u64,

    /// Age at which a `processing` job counts as stranded by a dead worker
    /// and is swept back to pending. Must exceed every stage budget so the
    /// sweep never steals a live lease from another replica.
    pub stale_job_after_secs: u64,

    /// Optional per-tenant in-flight caps, one per stage
    /// Throttles bulk uploaders so they cannot consume a whole pool
    #[serde(default)]
    pub per_tenant_concurrency_cap: PerStageCaps,
}

/// Per-stage values for the optional per-tenant concurrency cap
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct PerStageCaps {
    pub extract: Option<usize>,
    pub chunk: Option<usize>,
    pub embed: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            extract_workers: DEFAULT_EXTRACT_WORKERS,
            chunk_workers: DEFAULT_CHUNK_WORKERS,
            embed_workers: DEFAULT_EMBED_WORKERS,
            extract_budget_secs: DEFAULT_EXTRACT_BUDGET_SECS,
            chunk_budget_secs: DEFAULT_CHUNK_BUDGET_SECS,
            embed_budget_secs: DEFAULT_EMBED_BUDGET_SECS,
            idle_poll_ms: DEFAULT_IDLE_POLL_MS,
            idle_poll_cap_ms: DEFAULT_IDLE_POLL_CAP_MS,
            stale_job_after_secs: DEFAULT_STALE_JOB_AFTER_SECS,
            per_tenant_concurrency_cap: PerStageCaps::default(),
        }
    }
}

/// API admission rate limiting
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RateLimitConfig {
    /// Sliding window length in seconds
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
        }
    }
}

/// API server configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Uploads larger than this are rejected with 413
    pub max_file_size_bytes: usize,

    /// Maximum files per bulk upload request
    pub bulk_upload_limit: usize,

    /// Shared secret for `X-Internal-Token` admin access
    pub internal_token: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_API_HOST.to_string(),
            port: DEFAULT_API_PORT,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            bulk_upload_limit: DEFAULT_BULK_UPLOAD_LIMIT,
            internal_token: String::new(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            database: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: DEFAULT_DB_PASSWORD.to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Build sqlx connect options from this configuration
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
            .ssl_mode(PgSslMode::Prefer)
    }

    /// Connection string with the password elided, safe for logs
    pub fn safe_connection_string(&self) -> String {
        format!(
            "postgres://{}:***@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

/// Vector index configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct VectorConfig {
    /// Qdrant server URL
    pub url: String,

    /// Collection name
    pub collection: String,

    /// Vector dimension; must match the embedding model
    pub dimension: usize,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_QDRANT_URL.to_string(),
            collection: DEFAULT_COLLECTION_NAME.to_string(),
            dimension: DEFAULT_VECTOR_DIMENSION,
        }
    }
}

/// Blob store configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BlobConfig {
    /// Root directory for the local filesystem object store
    pub root: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: DEFAULT_BLOB_ROOT.to_string(),
        }
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            pipeline: PipelineConfig::default(),
            rate_limit: RateLimitConfig::default(),
            api: ApiConfig::default(),
            database: DatabaseConfig::default(),
            vector: VectorConfig::default(),
            blob: BlobConfig::default(),
        }
    }
}

impl ApplicationConfig {
    /// Load configuration: defaults layered with environment overrides,
    /// then validated.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment override cannot be parsed or a
    /// value falls outside its permitted range.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        override_usize(&mut config.chunking.chunk_size, "DOCSTREAM_CHUNK_SIZE")?;
        override_usize(&mut config.chunking.chunk_overlap, "DOCSTREAM_CHUNK_OVERLAP")?;
        override_string(&mut config.embedding.model_id, "DOCSTREAM_EMBEDDING_MODEL");
        override_string(&mut config.embedding.endpoint, "DOCSTREAM_EMBEDDING_ENDPOINT");
        override_usize(&mut config.embedding.dimension, "DOCSTREAM_VECTOR_DIMENSION")?;
        override_usize(&mut config.embedding.batch_size, "DOCSTREAM_EMBED_BATCH_SIZE")?;
        override_i32(&mut config.pipeline.max_retries, "DOCSTREAM_MAX_RETRIES")?;
        override_usize(&mut config.pipeline.extract_workers, "DOCSTREAM_EXTRACT_WORKERS")?;
        override_usize(&mut config.pipeline.chunk_workers, "DOCSTREAM_CHUNK_WORKERS")?;
        override_usize(&mut config.pipeline.embed_workers, "DOCSTREAM_EMBED_WORKERS")?;
        override_u64(
            &mut config.pipeline.stale_job_after_secs,
            "DOCSTREAM_STALE_JOB_AFTER_SECS",
        )?;
        override_opt_usize(
            &mut config.pipeline.per_tenant_concurrency_cap.extract,
            "DOCSTREAM_TENANT_CAP_EXTRACT",
        )?;
        override_opt_usize(
            &mut config.pipeline.per_tenant_concurrency_cap.chunk,
            "DOCSTREAM_TENANT_CAP_CHUNK",
        )?;
        override_opt_usize(
            &mut config.pipeline.per_tenant_concurrency_cap.embed,
            "DOCSTREAM_TENANT_CAP_EMBED",
        )?;
        override_u64(
            &mut config.rate_limit.window_seconds,
            "DOCSTREAM_RATE_LIMIT_WINDOW_SECONDS",
        )?;
        override_string(&mut config.api.host, "DOCSTREAM_API_HOST");
        override_u16(&mut config.api.port, "DOCSTREAM_API_PORT")?;
        override_usize(&mut config.api.max_file_size_bytes, "DOCSTREAM_MAX_FILE_SIZE_BYTES")?;
        override_string(&mut config.api.internal_token, "DOCSTREAM_INTERNAL_TOKEN");
        override_string(&mut config.database.host, "DOCSTREAM_DB_HOST");
        override_u16(&mut config.database.port, "DOCSTREAM_DB_PORT")?;
        override_string(&mut config.database.database, "DOCSTREAM_DB_NAME");
        override_string(&mut config.database.user, "DOCSTREAM_DB_USER");
        override_string(&mut config.database.password, "DOCSTREAM_DB_PASSWORD");
        override_string(&mut config.vector.url, "DOCSTREAM_QDRANT_URL");
        override_string(&mut config.vector.collection, "DOCSTREAM_COLLECTION");
        override_string(&mut config.blob.root, "DOCSTREAM_BLOB_ROOT");

        config.validate()?;
        Ok(config)
    }

    /// Validate ranges and cross-field consistency
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::OutOfRange` or `ConfigError::Inconsistent` on
    /// the first violated constraint.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(CHUNK_SIZE_MIN..=CHUNK_SIZE_MAX).contains(&self.chunking.chunk_size) {
            return Err(ConfigError::OutOfRange {
                field: "chunking.chunk_size",
                message: format!(
                    "{} not in {CHUNK_SIZE_MIN}..={CHUNK_SIZE_MAX}",
                    self.chunking.chunk_size
                ),
            });
        }
        if self.chunking.chunk_overlap > self.chunking.chunk_size / 2 {
            return Err(ConfigError::OutOfRange {
                field: "chunking.chunk_overlap",
                message: format!(
                    "{} exceeds chunk_size/2 ({})",
                    self.chunking.chunk_overlap,
                    self.chunking.chunk_size / 2
                ),
            });
        }
        if !(1..=EMBED_BATCH_SIZE_MAX).contains(&self.embedding.batch_size) {
            return Err(ConfigError::OutOfRange {
                field: "embedding.batch_size",
                message: format!("{} not in 1..={EMBED_BATCH_SIZE_MAX}", self.embedding.batch_size),
            });
        }
        if self.pipeline.max_retries < 0 {
            return Err(ConfigError::OutOfRange {
                field: "pipeline.max_retries",
                message: "must be non-negative".to_string(),
            });
        }
        if self.embedding.dimension == 0 {
            return Err(ConfigError::OutOfRange {
                field: "embedding.dimension",
                message: "must be positive".to_string(),
            });
        }
        if self.embedding.dimension != self.vector.dimension {
            return Err(ConfigError::Inconsistent(format!(
                "embedding.dimension ({}) != vector.dimension ({}); \
                 re-ingestion is required after a dimension change",
                self.embedding.dimension, self.vector.dimension
            )));
        }
        let caps = self.pipeline.per_tenant_concurrency_cap;
        for (field, cap) in [
            ("per_tenant_concurrency_cap.extract", caps.extract),
            ("per_tenant_concurrency_cap.chunk", caps.chunk),
            ("per_tenant_concurrency_cap.embed", caps.embed),
        ] {
            if cap == Some(0) {
                return Err(ConfigError::OutOfRange {
                    field,
                    message: "a cap of 0 would never schedule the tenant".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_usize(target: &mut usize, var: &str) -> ConfigResult<()> {
    parse_override(target, var)
}

fn override_u64(target: &mut u64, var: &str) -> ConfigResult<()> {
    parse_override(target, var)
}

fn override_u16(target: &mut u16, var: &str) -> ConfigResult<()> {
    parse_override(target, var)
}

fn override_i32(target: &mut i32, var: &str) -> ConfigResult<()> {
    parse_override(target, var)
}

fn override_opt_usize(target: &mut Option<usize>, var: &str) -> ConfigResult<()> {
    if let Ok(value) = std::env::var(var) {
        *target = Some(value.parse().map_err(
            |e: std::num::ParseIntError| ConfigError::BadEnvValue {
                var: var.to_string(),
                message: e.to_string(),
            },
        )?);
    }
    Ok(())
}

fn parse_override<T: std::str::FromStr>(target: &mut T, var: &str) -> ConfigResult<()>
where
    T::Err: std::fmt::Display,
{
    if let Ok(value) = std::env::var(var) {
        *target = value.parse().map_err(|e: T::Err| ConfigError::BadEnvValue {
            var: var.to_string(),
            message: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ApplicationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 512);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.embedding.batch_size, 100);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.api.max_file_size_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn rejects_chunk_size_out_of_range() {
        let mut config = ApplicationConfig::default();
        config.chunking.chunk_size = 64;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "chunking.chunk_size", .. })
        ));
    }

    #[test]
    fn rejects_overlap_larger_than_half_chunk() {
        let mut config = ApplicationConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size / 2 + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let mut config = ApplicationConfig::default();
        config.vector.dimension = 1024;
        assert!(matches!(config.validate(), Err(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn caps_are_per_stage_and_reject_zero() {
        let mut config = ApplicationConfig::default();
        config.pipeline.per_tenant_concurrency_cap.embed = Some(4);
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.per_tenant_concurrency_cap.extract, None);

        config.pipeline.per_tenant_concurrency_cap.chunk = Some(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "per_tenant_concurrency_cap.chunk", .. })
        ));
    }

    #[test]
    fn safe_connection_string_hides_password() {
        let config = DatabaseConfig::default();
        let safe = config.safe_connection_string();
        assert!(!safe.contains("localdev123"));
        assert!(safe.contains("docstream"));
    }
}
