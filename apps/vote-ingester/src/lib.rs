#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Vote Ingester - Streaming Poll Vote Collector
//!
//! Tracks the options of every active poll on a filtered public message
//! stream and publishes one vote per matched option to an NSQ topic.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core value types and matching
//!   - `poll`: Option sets, stream messages, votes
//!   - `matcher`: Case-insensitive keyword matching
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for poll storage, the message stream, the queue
//!   - `services`: Reconnect supervisor, vote publisher, shutdown coordination
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: OAuth signing, connection manager, stream reader, retry policies
//!   - `nsq`: NSQ TCP producer
//!   - `mongo`: MongoDB poll storage
//!   - `config`: Environment configuration
//!   - `metrics` / `telemetry`: Prometheus and tracing setup
//!
//! # Data Flow
//!
//! ```text
//!  MongoDB ──options──┐
//!                     ▼
//!             ┌──────────────┐   votes   ┌─────────────┐
//! Stream ────►│  Supervisor  │──────────►│  Publisher  │────► NSQ "votes"
//!             └──────────────┘  (mpsc 1) └─────────────┘
//!                     ▲
//!   signals/watchdog ─┘ force close
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Poll types and vote matching with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::matcher::VoteMatcher;
pub use domain::poll::{PollOptionSet, StreamMessage, Vote};

// Ports
pub use application::ports::{
    Connection, InMemoryVoteQueue, MessageSource, MessageStream, OptionSource, QueueError,
    StaticOptionSource, StorageError, StreamError, VoteQueue,
};

// Services
pub use application::services::{
    Pipeline, PipelineReport, PublishPolicy, PublisherReport, ReconnectSupervisor,
    ShutdownCoordinator, StopFlag, SupervisorReport, SupervisorState, VotePublisher,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, IngesterConfig, QueueSettings, ShutdownSettings, StreamSettings,
};

// Stream adapters
pub use infrastructure::stream::{
    ConnectionManager, OAuthCredentials, ReconnectConfig, RetryPolicy, RetryStrategy,
    StreamAuthenticator, StreamReader,
};

// Storage and queue adapters
pub use infrastructure::mongo::{MongoOptionSource, MongoSettings};
pub use infrastructure::nsq::NsqProducer;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
