//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `OptionSource`: Loads the keywords of all active polls
//! - `MessageSource`: Opens a filtered message stream over a connection
//! - `VoteQueue`: Durable queue that receives published votes

mod message_source_port;
mod option_source_port;
mod vote_queue_port;

pub use message_source_port::{Connection, MessageSource, MessageStream, StreamError};
pub use option_source_port::{OptionSource, StaticOptionSource, StorageError};
pub use vote_queue_port::{InMemoryVoteQueue, QueueError, VoteQueue};
