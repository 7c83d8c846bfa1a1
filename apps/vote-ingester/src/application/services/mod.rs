//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ReconnectSupervisor`: runs stream sessions and feeds the vote channel
//! - `VotePublisher`: drains the vote channel into the queue
//! - `ShutdownCoordinator`: signals, watchdog and the stop flag
//! - `Pipeline`: wires the three together and runs them to completion

mod pipeline;
mod shutdown;
mod stop_flag;
mod supervisor;
mod vote_publisher;

pub use pipeline::{Pipeline, PipelineReport, VOTE_CHANNEL_CAPACITY};
pub use shutdown::{DEFAULT_WATCHDOG_INTERVAL, ShutdownCoordinator};
pub use stop_flag::StopFlag;
pub use supervisor::{ReconnectSupervisor, SupervisorReport, SupervisorState};
pub use vote_publisher::{PublishPolicy, PublisherReport, VotePublisher};
