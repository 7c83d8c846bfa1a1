//! NSQ Adapter
//!
//! A minimal producer for the nsqd TCP protocol: connect, send the `V2`
//! magic, `PUB` messages and answer heartbeats. Consumer commands are not
//! implemented.

pub mod codec;
pub mod producer;

pub use codec::{Command, Frame, NsqCodec, NsqCodecError};
pub use producer::{DEFAULT_NSQ_TIMEOUT, DEFAULT_NSQD_ADDR, NsqProducer};
