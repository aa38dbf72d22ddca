//! Service configuration

use analytics_lib::{BaselinePolicy, PipelineConfig, RedisStoreConfig, RetryPolicy};
use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

/// Backing store for the counter and the rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Redis,
    Memory,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Redis => "redis",
            StoreKind::Memory => "memory",
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_store")]
    pub store: StoreKind,

    /// Redis address as `host:port`
    #[serde(default = "default_redis_addr")]
    pub redis_addr: String,

    #[serde(default)]
    pub redis_password: String,

    /// Window capacity W
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_window_key")]
    pub window_key: String,

    #[serde(default = "default_counter_key")]
    pub counter_key: String,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_counter_timeout_ms")]
    pub counter_timeout_ms: u64,

    /// Startup ping attempts before running degraded
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,

    #[serde(default)]
    pub baseline: BaselinePolicy,

    /// How long shutdown waits for queued observations to drain
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_store() -> StoreKind {
    StoreKind::Redis
}

fn default_redis_addr() -> String {
    "redis-master.default.svc.cluster.local:6379".to_string()
}

fn default_window_size() -> usize {
    50
}

fn default_window_key() -> String {
    "metrics".to_string()
}

fn default_counter_key() -> String {
    "request_count".to_string()
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_workers() -> usize {
    1
}

fn default_counter_timeout_ms() -> u64 {
    2000
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_connect_backoff_ms() -> u64 {
    500
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl AppConfig {
    /// Load configuration from an optional `analytics` file and the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("analytics").required(false))
            .add_source(config::Environment::with_prefix("ANALYTICS").try_parsing(true))
            .build()?;

        Self::from_config(config)
    }

    /// Deserialize and validate an already assembled configuration
    pub fn from_config(config: config::Config) -> Result<Self> {
        let app: AppConfig = config.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            bail!("window_size must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            window_size: self.window_size,
            queue_capacity: self.queue_capacity,
            workers: self.workers.max(1),
            counter_timeout: Duration::from_millis(self.counter_timeout_ms),
            baseline: self.baseline,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts.max(1),
            initial_backoff: Duration::from_millis(self.connect_backoff_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn redis(&self) -> RedisStoreConfig {
        RedisStoreConfig {
            addr: self.redis_addr.clone(),
            password: self.redis_password.clone(),
            counter_key: self.counter_key.clone(),
            window_key: self.window_key.clone(),
            ..RedisStoreConfig::default()
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(overrides: &[(&str, &str)]) -> Result<AppConfig> {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }
        AppConfig::from_config(builder.build()?)
    }

    #[test]
    fn test_defaults_when_nothing_is_set() {
        let config = build(&[]).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.store, StoreKind::Redis);
        assert_eq!(config.redis_addr, "redis-master.default.svc.cluster.local:6379");
        assert_eq!(config.window_size, 50);
        assert_eq!(config.window_key, "metrics");
        assert_eq!(config.counter_key, "request_count");
        assert_eq!(config.workers, 1);
        assert_eq!(config.baseline, BaselinePolicy::Include);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = build(&[
            ("store", "memory"),
            ("window_size", "6"),
            ("baseline", "exclude"),
            ("counter_timeout_ms", "250"),
        ])
        .unwrap();

        assert_eq!(config.store, StoreKind::Memory);
        let pipeline = config.pipeline();
        assert_eq!(pipeline.window_size, 6);
        assert_eq!(pipeline.baseline, BaselinePolicy::Exclude);
        assert_eq!(pipeline.counter_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_window_size_is_rejected() {
        let err = build(&[("window_size", "0")]).unwrap_err();
        assert!(err.to_string().contains("window_size"));
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = build(&[("connect_attempts", "3"), ("connect_backoff_ms", "100")]).unwrap();
        let policy = config.retry_policy();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
    }

    #[test]
    fn test_redis_settings_carry_keys() {
        let config = build(&[("counter_key", "hits"), ("redis_password", "secret")]).unwrap();
        let redis = config.redis();

        assert_eq!(redis.counter_key, "hits");
        assert_eq!(redis.window_key, "metrics");
        assert_eq!(redis.password, "secret");
    }
}
