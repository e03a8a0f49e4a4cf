//! Application configuration management

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Key/value store settings
    pub store: StoreConfig,

    /// Audio splitter settings
    pub splitter: SplitterConfig,

    /// Job pipeline settings
    pub pipeline: PipelineConfig,

    /// Worker pool settings
    pub workers: WorkerPoolConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,
}

/// Key/value store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL; an unreachable server falls back to the
    /// in-process store
    pub redis_url: String,
}

/// Audio splitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Minimum chunk length in milliseconds
    pub min_chunk_len_ms: u64,

    /// Silence threshold in dBFS (None derives it from average loudness)
    pub silence_thresh_dbfs: Option<f64>,

    /// Minimum silence length in milliseconds that separates speech
    pub min_silence_len_ms: u64,
}

/// Job pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory for uploaded source files
    pub upload_dir: PathBuf,

    /// Directory for chunk artifacts
    pub chunks_dir: PathBuf,

    /// Duration of the purifier stage in milliseconds
    pub purifier_delay_ms: u64,

    /// Settle delay after the purifier stage (also applied on bypass)
    pub stage_settle_ms: u64,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Initial worker URLs registered at startup
    pub initial: Vec<String>,

    /// Health probe timeout in seconds
    pub probe_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            store: StoreConfig {
                redis_url: "redis://127.0.0.1:6379/0".to_string(),
            },
            splitter: SplitterConfig {
                min_chunk_len_ms: 30_000,
                silence_thresh_dbfs: None,
                min_silence_len_ms: 700,
            },
            pipeline: PipelineConfig {
                upload_dir: PathBuf::from("uploads"),
                chunks_dir: PathBuf::from("uploads/chunks"),
                purifier_delay_ms: 5_000,
                stage_settle_ms: 500,
            },
            workers: WorkerPoolConfig {
                initial: Vec::new(),
                probe_timeout_secs: 2,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults plus environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("CHORUS_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("CHORUS_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| AppError::config(format!("Invalid CHORUS_PORT: {}", port)))?;
        }
        if let Ok(url) = std::env::var("CHORUS_REDIS_URL") {
            config.store.redis_url = url;
        }
        if let Ok(min_len) = std::env::var("CHORUS_CHUNK_MIN_LENGTH") {
            config.splitter.min_chunk_len_ms = min_len.parse().map_err(|_| {
                AppError::config(format!("Invalid CHORUS_CHUNK_MIN_LENGTH: {}", min_len))
            })?;
        }
        if let Ok(thresh) = std::env::var("CHORUS_SILENCE_THRESH") {
            config.splitter.silence_thresh_dbfs = Some(thresh.parse().map_err(|_| {
                AppError::config(format!("Invalid CHORUS_SILENCE_THRESH: {}", thresh))
            })?);
        }
        if let Ok(workers) = std::env::var("CHORUS_WORKERS") {
            config.workers.initial = workers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(dir) = std::env::var("CHORUS_UPLOAD_DIR") {
            config.pipeline.upload_dir = PathBuf::from(&dir);
            config.pipeline.chunks_dir = PathBuf::from(dir).join("chunks");
        }

        Ok(config)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        if self.splitter.min_chunk_len_ms == 0 {
            return Err(AppError::config(
                "Minimum chunk length must be greater than 0",
            ));
        }

        if self.splitter.min_silence_len_ms == 0 {
            return Err(AppError::config(
                "Minimum silence length must be greater than 0",
            ));
        }

        if let Some(thresh) = self.splitter.silence_thresh_dbfs {
            if !(-100.0..=0.0).contains(&thresh) {
                return Err(AppError::config(
                    "Silence threshold must be between -100 and 0 dBFS",
                ));
            }
        }

        if self.workers.probe_timeout_secs == 0 {
            return Err(AppError::config(
                "Probe timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}
