use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

use crate::connection::RetryPolicy;
use crate::cypher_generator::Capabilities;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Retry settings for reads and managed transactions
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first (1-100)
    #[validate(range(min = 1, max = 100, message = "Max attempts must be between 1 and 100"))]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds
    pub initial_delay_ms: u64,

    /// Growth factor between consecutive delays (1.0-10.0)
    #[validate(range(
        min = 1.0,
        max = 10.0,
        message = "Retry multiplier must be between 1.0 and 10.0"
    ))]
    pub multiplier: f64,

    /// Upper bound for a single delay, in milliseconds
    pub max_delay_ms: u64,

    /// Randomize delays by a factor in [0.5, 1.5]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            multiplier: 2.0,
            max_delay_ms: 5000,
            jitter: true,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }
}

/// Write batching
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// When false, every record is written with its own request
    pub enabled: bool,

    /// Records per request (1-100000)
    #[validate(range(
        min = 1,
        max = 100000,
        message = "Batch size must be between 1 and 100000"
    ))]
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 100,
        }
    }
}

/// Neo4j connection configuration with validation
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    /// Bolt host address
    #[validate(length(min = 1, message = "Neo4j host cannot be empty"))]
    pub host: String,

    /// Bolt port (1-65535)
    #[validate(range(
        min = 1,
        max = 65535,
        message = "Neo4j port must be between 1 and 65535"
    ))]
    pub port: u16,

    pub username: String,

    #[serde(skip_serializing)]
    pub password: String,

    /// Target database; the server default when unset
    pub database: Option<String>,

    /// Whether `apoc.convert.*` procedures may be emitted
    pub apoc_available: bool,

    /// Compile undecidable JSON length checks to `true` instead of failing
    pub lenient_json_length: bool,

    #[validate(nested)]
    pub retry: RetryConfig,

    #[validate(nested)]
    pub batch: BatchConfig,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7687,
            username: "neo4j".to_string(),
            password: String::new(),
            database: None,
            apoc_available: false,
            lenient_json_length: false,
            retry: RetryConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Neo4jConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            host: env::var("NEOQUENT_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: parse_env_var("NEOQUENT_PORT", "7687")?,
            username: env::var("NEOQUENT_USERNAME").unwrap_or_else(|_| "neo4j".to_string()),
            password: env::var("NEOQUENT_PASSWORD").unwrap_or_default(),
            database: env::var("NEOQUENT_DATABASE").ok().filter(|d| !d.is_empty()),
            apoc_available: parse_env_var("NEOQUENT_APOC", "false")?,
            lenient_json_length: parse_env_var("NEOQUENT_LENIENT_JSON_LENGTH", "false")?,
            retry: RetryConfig {
                max_attempts: parse_env_var("NEOQUENT_RETRY_MAX_ATTEMPTS", "3")?,
                initial_delay_ms: parse_env_var("NEOQUENT_RETRY_INITIAL_DELAY_MS", "100")?,
                multiplier: parse_env_var("NEOQUENT_RETRY_MULTIPLIER", "2.0")?,
                max_delay_ms: parse_env_var("NEOQUENT_RETRY_MAX_DELAY_MS", "5000")?,
                jitter: parse_env_var("NEOQUENT_RETRY_JITTER", "true")?,
            },
            batch: BatchConfig {
                enabled: parse_env_var("NEOQUENT_BATCH_ENABLED", "true")?,
                batch_size: parse_env_var("NEOQUENT_BATCH_SIZE", "100")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Compiler capabilities implied by this server
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            apoc: self.apoc_available,
            lenient_json_length: self.lenient_json_length,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
