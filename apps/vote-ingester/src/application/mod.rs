//! Application Layer - Ports and pipeline services.
//!
//! This layer defines the interfaces the pipeline needs from the outside
//! world and the services that drive stream sessions, publishing and
//! shutdown.

/// Port interfaces for external systems (poll storage, stream, queue).
pub mod ports;

/// Pipeline services: supervisor, publisher, shutdown coordination.
pub mod services;
