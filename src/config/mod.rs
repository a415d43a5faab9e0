//! Configuration

use crate::worker::{PollConfig, WorkerSource};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn, Level};

/// Configuration for the dispatch system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of workers (and per-worker queues)
    pub worker_count: usize,

    /// Queue store backend
    pub store_backend: StoreBackend,

    /// Connection URL for the Redis backend
    pub redis_url: String,

    /// Longest a worker waits on an empty queue per pop, in milliseconds
    pub pop_timeout_ms: u64,

    /// Pause between polls of an empty queue, in milliseconds
    pub idle_interval_ms: u64,

    /// Worker queue depth at which a worker is reported unhealthy
    pub health_threshold: usize,

    /// Time budget for a single handler call, in seconds
    pub handler_timeout_secs: u64,

    /// How long submitters wait for a result, in seconds
    pub result_timeout_secs: u64,

    /// Results kept for tasks nobody is waiting on yet
    pub result_stash_capacity: usize,

    /// Age after which an unclaimed result is dropped, in seconds
    pub result_stash_ttl_secs: u64,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_secs: u64,

    /// Which queue workers consume
    pub worker_source: WorkerSource,

    /// Maximum log level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// Queue store backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store; queues vanish with the process
    Memory,
    /// Redis lists (requires the `redis` feature and a server)
    Redis,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_count: 3,
            store_backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            pop_timeout_ms: 1000,
            idle_interval_ms: 100,
            health_threshold: crate::balancer::DEFAULT_HEALTH_THRESHOLD,
            handler_timeout_secs: 30,
            result_timeout_secs: 30,
            result_stash_capacity: crate::service::DEFAULT_STASH_CAPACITY,
            result_stash_ttl_secs: crate::service::DEFAULT_STASH_TTL.as_secs(),
            shutdown_timeout_secs: 30,
            worker_source: WorkerSource::Assigned,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Create a configuration with custom worker count
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Default::default()
        }
    }

    /// Load configuration from file, environment variables, or defaults
    pub fn load() -> crate::Result<Self> {
        if let Ok(config_path) = env::var("DISPATCH_CONFIG") {
            info!("Loading config from DISPATCH_CONFIG: {}", config_path);
            return Self::from_file(&config_path);
        }

        let default_paths = [
            "dispatch.yaml",
            "dispatch.toml",
            "config/dispatch.yaml",
            "config/dispatch.toml",
        ];

        for path in default_paths {
            if Path::new(path).exists() {
                info!("Loading config from: {}", path);
                return Self::from_file(path);
            }
        }

        if let Some(config) = Self::from_env()? {
            info!("Loaded config from environment variables");
            return Ok(config);
        }

        warn!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a file (YAML or TOML); the extension may be omitted
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .map_err(|e| crate::DispatchError::Config(format!("Failed to load config file: {}", e)))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| crate::DispatchError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `DISPATCH_*` environment variables.
    ///
    /// Returns `Ok(None)` when none are set.
    pub fn from_env() -> crate::Result<Option<Self>> {
        let mut config = Self::default();
        let mut found_any = false;

        if let Some(val) = read_env("WORKER_COUNT")? {
            config.worker_count = val;
            found_any = true;
        }
        if let Some(val) = read_env::<String>("STORE_BACKEND")? {
            config.store_backend = match val.to_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "redis" => StoreBackend::Redis,
                _ => {
                    return Err(crate::DispatchError::Config(format!(
                        "Invalid STORE_BACKEND: {}",
                        val
                    )))
                }
            };
            found_any = true;
        }
        if let Some(val) = read_env("REDIS_URL")? {
            config.redis_url = val;
            found_any = true;
        }
        if let Some(val) = read_env("POP_TIMEOUT_MS")? {
            config.pop_timeout_ms = val;
            found_any = true;
        }
        if let Some(val) = read_env("IDLE_INTERVAL_MS")? {
            config.idle_interval_ms = val;
            found_any = true;
        }
        if let Some(val) = read_env("HEALTH_THRESHOLD")? {
            config.health_threshold = val;
            found_any = true;
        }
        if let Some(val) = read_env("HANDLER_TIMEOUT_SECS")? {
            config.handler_timeout_secs = val;
            found_any = true;
        }
        if let Some(val) = read_env("RESULT_TIMEOUT_SECS")? {
            config.result_timeout_secs = val;
            found_any = true;
        }
        if let Some(val) = read_env("RESULT_STASH_CAPACITY")? {
            config.result_stash_capacity = val;
            found_any = true;
        }
        if let Some(val) = read_env("RESULT_STASH_TTL_SECS")? {
            config.result_stash_ttl_secs = val;
            found_any = true;
        }
        if let Some(val) = read_env("SHUTDOWN_TIMEOUT_SECS")? {
            config.shutdown_timeout_secs = val;
            found_any = true;
        }
        if let Some(val) = read_env::<String>("WORKER_SOURCE")? {
            config.worker_source = match val.to_lowercase().as_str() {
                "shared" => WorkerSource::Shared,
                "assigned" => WorkerSource::Assigned,
                _ => {
                    return Err(crate::DispatchError::Config(format!(
                        "Invalid WORKER_SOURCE: {}",
                        val
                    )))
                }
            };
            found_any = true;
        }
        if let Some(val) = read_env("LOG_LEVEL")? {
            config.log_level = val;
            found_any = true;
        }

        if !found_any {
            return Ok(None);
        }

        config.validate()?;
        Ok(Some(config))
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.worker_count == 0 {
            return Err(crate::DispatchError::Config(
                "Worker count must be greater than 0".to_string(),
            ));
        }

        if self.health_threshold == 0 {
            return Err(crate::DispatchError::Config(
                "Health threshold must be greater than 0".to_string(),
            ));
        }

        if self.handler_timeout_secs == 0 {
            return Err(crate::DispatchError::Config(
                "Handler timeout must be greater than 0".to_string(),
            ));
        }

        if self.result_stash_capacity == 0 {
            return Err(crate::DispatchError::Config(
                "Result stash capacity must be greater than 0".to_string(),
            ));
        }

        self.log_level()?;
        Ok(())
    }

    /// Check that the store is shared between processes.
    ///
    /// The memory backend lives and dies with one process, so a command that
    /// talks to workers in another process would only see its own queues.
    pub fn ensure_shared_store(&self) -> crate::Result<()> {
        match self.store_backend {
            StoreBackend::Redis => Ok(()),
            StoreBackend::Memory => Err(crate::DispatchError::Config(
                "The memory store is private to one process; set store_backend to redis"
                    .to_string(),
            )),
        }
    }

    /// Parsed log level
    pub fn log_level(&self) -> crate::Result<Level> {
        self.log_level
            .parse()
            .map_err(|_| crate::DispatchError::Config(format!("Invalid log level: {}", self.log_level)))
    }

    /// Worker polling behaviour
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            pop_timeout: Duration::from_millis(self.pop_timeout_ms),
            idle_interval: Duration::from_millis(self.idle_interval_ms),
        }
    }

    /// Handler time budget
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }

    /// Result wait budget
    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }

    /// Age limit for unclaimed results
    pub fn result_stash_ttl(&self) -> Duration {
        Duration::from_secs(self.result_stash_ttl_secs)
    }

    /// Shutdown budget
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn read_env<T>(key: &str) -> crate::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(format!("DISPATCH_{key}")) {
        Ok(val) => val
            .parse()
            .map(Some)
            .map_err(|e| crate::DispatchError::Config(format!("Invalid {}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
