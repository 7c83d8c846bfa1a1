//! Domain Layer - Poll options, stream messages and vote matching.
//!
//! This layer holds the core value types of the ingester and the pure
//! matching logic. Nothing here performs I/O.

/// Poll option sets, decoded stream messages and votes.
pub mod poll;

/// Keyword matching of stream messages against poll options.
pub mod matcher;
