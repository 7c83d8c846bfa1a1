//! MongoDB Option Source
//!
//! Loads tracked keywords from the poll collection. Each poll document
//! carries an `options` array; documents without one contribute nothing.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde::Deserialize;

use crate::application::ports::{OptionSource, StorageError};

/// Default connection string.
pub const DEFAULT_MONGO_URL: &str = "mongodb://localhost";

/// Default database name.
pub const DEFAULT_DATABASE: &str = "ballots";

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "polls";

/// Bound on finding a usable server.
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Stored poll, reduced to what the ingester reads.
#[derive(Debug, Deserialize)]
struct PollDocument {
    #[serde(default)]
    options: Vec<String>,
}

/// Where polls are stored.
#[derive(Debug, Clone)]
pub struct MongoSettings {
    /// Connection string.
    pub url: String,
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
}

impl Default for MongoSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_MONGO_URL.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

fn connection_error(err: &mongodb::error::Error) -> StorageError {
    StorageError::Connection {
        message: err.to_string(),
    }
}

fn query_error(err: &mongodb::error::Error) -> StorageError {
    StorageError::Query {
        message: err.to_string(),
    }
}

/// [`OptionSource`] reading the poll collection.
#[derive(Debug, Clone)]
pub struct MongoOptionSource {
    client: Client,
    polls: Collection<PollDocument>,
}

impl MongoOptionSource {
    /// Connect and verify the server answers.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Connection`] if the connection string is
    /// invalid or no server responds to a ping.
    pub async fn connect(settings: &MongoSettings) -> Result<Self, StorageError> {
        tracing::info!(database = %settings.database, "Dialing MongoDB");

        let mut options = ClientOptions::parse(&settings.url)
            .await
            .map_err(|e| connection_error(&e))?;
        options.app_name = Some("vote-ingester".to_string());
        options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);

        let client = Client::with_options(options).map_err(|e| connection_error(&e))?;
        let database = client.database(&settings.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| connection_error(&e))?;

        tracing::info!(
            database = %settings.database,
            collection = %settings.collection,
            "Connected to MongoDB"
        );

        Ok(Self {
            polls: database.collection(&settings.collection),
            client,
        })
    }

    /// Close all pooled connections.
    pub async fn close(self) {
        self.client.shutdown().await;
        tracing::info!("MongoDB connection closed");
    }
}

#[async_trait]
impl OptionSource for MongoOptionSource {
    async fn load(&self) -> Result<Vec<String>, StorageError> {
        let mut cursor = self
            .polls
            .find(doc! {})
            .await
            .map_err(|e| query_error(&e))?;

        let mut options = Vec::new();
        let mut polls = 0_usize;
        while let Some(poll) = cursor.try_next().await.map_err(|e| query_error(&e))? {
            polls += 1;
            options.extend(poll.options);
        }

        tracing::debug!(polls, options = options.len(), "Loaded poll options");
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = MongoSettings::default();
        assert_eq!(settings.url, "mongodb://localhost");
        assert_eq!(settings.database, "ballots");
        assert_eq!(settings.collection, "polls");
    }

    #[test]
    fn poll_document_tolerates_missing_and_extra_fields() {
        let poll: PollDocument =
            mongodb::bson::from_document(doc! { "title": "langs", "options": ["rust", "go"] })
                .unwrap();
        assert_eq!(poll.options, vec!["rust", "go"]);

        let poll: PollDocument = mongodb::bson::from_document(doc! { "title": "empty" }).unwrap();
        assert!(poll.options.is_empty());
    }

    #[tokio::test]
    async fn invalid_connection_string_is_a_connection_error() {
        let settings = MongoSettings {
            url: "not-a-mongo-url".to_string(),
            ..MongoSettings::default()
        };
        let err = MongoOptionSource::connect(&settings).await.unwrap_err();
        assert!(matches!(err, StorageError::Connection { .. }));
    }
}
