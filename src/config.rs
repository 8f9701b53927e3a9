use config::{Config, ConfigError, Environment, File};
use relay_models::StartPosition;
use relay_stream::ConsumerConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub redis: RedisConfig,
    pub consumer: ConsumerSection,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Prefix for stream keys, `{namespace}.{stream_key}`.
    pub namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerSection {
    pub stream_key: String,
    pub start_position: StartPosition,
    pub max_batch: usize,
    /// 0 = return immediately; absent = wait indefinitely.
    pub block_timeout_ms: Option<u64>,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub handler_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Cursor file location; absent keeps the cursor in Redis instead.
    pub path: Option<String>,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Start with default values
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("redis.namespace", relay_stream::DEFAULT_NAMESPACE)?
            .set_default("consumer.stream_key", "default")?
            .set_default("consumer.start_position", "saved")?
            .set_default("consumer.max_batch", 100)?
            .set_default("consumer.backoff_initial_ms", 500)?
            .set_default("consumer.backoff_max_ms", 30_000)?
            // Add in settings from configuration file
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from environment variables
            .add_source(Environment::new().separator("_"))
            .build()?;

        config.try_deserialize()
    }

    pub fn redis_url(&self) -> &str {
        &self.redis.url
    }

    /// Redis key holding the saved cursor when no file path is set.
    pub fn cursor_key(&self) -> String {
        format!(
            "{}.{}.cursor",
            self.redis.namespace, self.consumer.stream_key
        )
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            stream_key: self.consumer.stream_key.clone(),
            start_position: self.consumer.start_position,
            max_batch: self.consumer.max_batch,
            block_timeout: relay_models::BlockTimeout::from_millis(self.consumer.block_timeout_ms),
            backoff_initial: Duration::from_millis(self.consumer.backoff_initial_ms),
            backoff_max: Duration::from_millis(self.consumer.backoff_max_ms),
            handler_timeout: self.consumer.handler_timeout_ms.map(Duration::from_millis),
        }
    }
}
