//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Streaming endpoint adapters (auth, connection, reader, retry policy).
pub mod stream;

/// NSQ producer.
pub mod nsq;

/// MongoDB poll storage.
pub mod mongo;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing setup.
pub mod telemetry;
