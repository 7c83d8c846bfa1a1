//! Option Source Port (Driven Port)
//!
//! Interface for loading the keywords of every active poll.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

/// Poll storage error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// Storage could not be reached.
    #[error("storage connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// A stored poll could not be read.
    #[error("storage query failed: {message}")]
    Query {
        /// Error details.
        message: String,
    },
}

/// Port for loading tracked keywords.
#[async_trait]
pub trait OptionSource: Send + Sync {
    /// Load the options of all polls, concatenated in storage iteration order.
    ///
    /// An empty result is valid.
    async fn load(&self) -> Result<Vec<String>, StorageError>;
}

/// Option source backed by an in-memory list.
///
/// The list can be replaced while the pipeline runs; the next session picks
/// up the new keywords.
#[derive(Debug, Clone, Default)]
pub struct StaticOptionSource {
    options: Arc<RwLock<Vec<String>>>,
}

impl StaticOptionSource {
    /// Create a source returning the given keywords.
    #[must_use]
    pub fn new<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            options: Arc::new(RwLock::new(options.into_iter().map(Into::into).collect())),
        }
    }

    /// Replace the keywords returned by subsequent loads.
    pub fn replace<I, S>(&self, options: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.options.write() = options.into_iter().map(Into::into).collect();
    }
}

#[async_trait]
impl OptionSource for StaticOptionSource {
    async fn load(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.options.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_returns_options_in_order() {
        let source = StaticOptionSource::new(["happy", "sad"]);
        assert_eq!(source.load().await.unwrap(), vec!["happy", "sad"]);
    }

    #[tokio::test]
    async fn static_source_replace_is_visible_to_clones() {
        let source = StaticOptionSource::new(["a"]);
        let clone = source.clone();
        source.replace(["b", "c"]);
        assert_eq!(clone.load().await.unwrap(), vec!["b", "c"]);
    }

    #[test]
    fn storage_error_display() {
        let err = StorageError::Connection {
            message: "no reachable servers".to_string(),
        };
        assert_eq!(err.to_string(), "storage connection error: no reachable servers");
    }
}
