//! Ingester Configuration Settings
//!
//! Configuration types for the vote ingester, loaded from environment
//! variables. Only the four stream credentials are required; everything
//! else has a default.

use std::time::Duration;

use url::Url;

use crate::infrastructure::mongo::MongoSettings;
use crate::infrastructure::nsq::DEFAULT_NSQD_ADDR;
use crate::infrastructure::nsq::codec::is_valid_topic;
use crate::infrastructure::stream::{
    DEFAULT_DIAL_TIMEOUT, DEFAULT_STREAM_ENDPOINT, OAuthCredentials, ReconnectConfig,
    RetryStrategy,
};

/// Consumer key variable.
pub const ENV_CONSUMER_KEY: &str = "SP_TWITTER_KEY";
/// Consumer secret variable.
pub const ENV_CONSUMER_SECRET: &str = "SP_TWITTER_SECRET";
/// Access token variable.
pub const ENV_ACCESS_TOKEN: &str = "SP_TWITTER_ACCESSTOKEN";
/// Access secret variable.
pub const ENV_ACCESS_SECRET: &str = "SP_TWITTER_ACCESSSECRET";

/// Streaming endpoint settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Filtered-stream endpoint.
    pub endpoint: Url,
    /// Bound on establishing a connection.
    pub dial_timeout: Duration,
}

/// Queue settings.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// nsqd TCP address.
    pub nsqd_addr: String,
    /// Topic votes are published to.
    pub topic: String,
    /// Attempts per vote before it is dropped.
    pub publish_max_attempts: u32,
    /// Pause between attempts.
    pub publish_retry_delay: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            nsqd_addr: DEFAULT_NSQD_ADDR.to_string(),
            topic: "votes".to_string(),
            publish_max_attempts: 3,
            publish_retry_delay: Duration::from_millis(250),
        }
    }
}

/// Shutdown settings.
#[derive(Debug, Clone)]
pub struct ShutdownSettings {
    /// Period of the connection-closing watchdog.
    pub watchdog_interval: Duration,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_secs(60),
        }
    }
}

/// Complete ingester configuration.
#[derive(Debug, Clone)]
pub struct IngesterConfig {
    /// Stream credentials.
    pub credentials: OAuthCredentials,
    /// Streaming endpoint settings.
    pub stream: StreamSettings,
    /// Delay policy between sessions.
    pub retry: ReconnectConfig,
    /// Poll storage settings.
    pub mongo: MongoSettings,
    /// Queue settings.
    pub queue: QueueSettings,
    /// Shutdown settings.
    pub shutdown: ShutdownSettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl IngesterConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a credential is missing or empty, or a value
    /// cannot be used.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`IngesterConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let credentials = OAuthCredentials::new(
            env.required(ENV_CONSUMER_KEY)?,
            env.required(ENV_CONSUMER_SECRET)?,
            env.required(ENV_ACCESS_TOKEN)?,
            env.required(ENV_ACCESS_SECRET)?,
        )
        .map_err(|e| ConfigError::InvalidValue {
            key: "credentials".to_string(),
            message: e.to_string(),
        })?;

        let endpoint_raw = env.string("VOTES_STREAM_ENDPOINT", DEFAULT_STREAM_ENDPOINT);
        let endpoint = Url::parse(&endpoint_raw).map_err(|e| ConfigError::InvalidValue {
            key: "VOTES_STREAM_ENDPOINT".to_string(),
            message: e.to_string(),
        })?;

        let stream = StreamSettings {
            endpoint,
            dial_timeout: env.duration_secs("VOTES_DIAL_TIMEOUT_SECS", DEFAULT_DIAL_TIMEOUT),
        };

        let retry_defaults = ReconnectConfig::default();
        let retry = ReconnectConfig {
            strategy: env
                .get("VOTES_RETRY_STRATEGY")
                .map(|s| RetryStrategy::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            delay: env.duration_secs("VOTES_RETRY_DELAY_SECS", retry_defaults.delay),
            max_delay: env.duration_secs("VOTES_RETRY_MAX_DELAY_SECS", retry_defaults.max_delay),
            max_attempts: env.parse("VOTES_RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts),
        };

        let mongo_defaults = MongoSettings::default();
        let mongo = MongoSettings {
            url: env.string("VOTES_MONGO_URL", &mongo_defaults.url),
            database: env.string("VOTES_MONGO_DATABASE", &mongo_defaults.database),
            collection: env.string("VOTES_MONGO_COLLECTION", &mongo_defaults.collection),
        };

        let queue_defaults = QueueSettings::default();
        let queue = QueueSettings {
            nsqd_addr: env.string("VOTES_NSQD_ADDR", &queue_defaults.nsqd_addr),
            topic: env.string("VOTES_NSQ_TOPIC", &queue_defaults.topic),
            publish_max_attempts: env
                .parse(
                    "VOTES_PUBLISH_MAX_ATTEMPTS",
                    queue_defaults.publish_max_attempts,
                )
                .max(1),
            publish_retry_delay: env.duration_millis(
                "VOTES_PUBLISH_RETRY_DELAY_MS",
                queue_defaults.publish_retry_delay,
            ),
        };
        if !is_valid_topic(&queue.topic) {
            return Err(ConfigError::InvalidValue {
                key: "VOTES_NSQ_TOPIC".to_string(),
                message: format!("{:?} is not a valid topic name", queue.topic),
            });
        }

        let shutdown = ShutdownSettings {
            watchdog_interval: env.duration_secs(
                "VOTES_WATCHDOG_INTERVAL_SECS",
                ShutdownSettings::default().watchdog_interval,
            ),
        };
        if shutdown.watchdog_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "VOTES_WATCHDOG_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            credentials,
            stream,
            retry,
            mongo,
            queue,
            shutdown,
            metrics_port: env.parse("VOTES_METRICS_PORT", 0),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value that cannot be used.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = self
            .get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
