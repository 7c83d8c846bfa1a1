//! Configuration Module
//!
//! Configuration loading for the ingester process.

mod settings;

pub use settings::{
    ConfigError, ENV_ACCESS_SECRET, ENV_ACCESS_TOKEN, ENV_CONSUMER_KEY, ENV_CONSUMER_SECRET,
    IngesterConfig, QueueSettings, ShutdownSettings, StreamSettings,
};
