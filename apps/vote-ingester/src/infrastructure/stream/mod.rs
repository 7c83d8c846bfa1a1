//! Streaming Endpoint Adapters
//!
//! Everything needed to hold one long-lived, filtered HTTP stream open:
//!
//! - **auth**: OAuth 1.0a request signing
//! - **connection**: the single cancellable connection slot
//! - **codec**: incremental decoding of concatenated JSON records
//! - **reader**: the [`MessageSource`](crate::application::ports::MessageSource) implementation
//! - **reconnect**: delay policies between sessions

pub mod auth;
pub mod codec;
pub mod connection;
pub mod reader;
pub mod reconnect;

pub use auth::{AuthError, OAuthCredentials, StreamAuthenticator};
pub use codec::{CodecError, MAX_RECORD_SIZE, RecordDecoder};
pub use connection::ConnectionManager;
pub use reader::{ConnectionError, DEFAULT_DIAL_TIMEOUT, DEFAULT_STREAM_ENDPOINT, StreamReader};
pub use reconnect::{
    DEFAULT_RETRY_DELAY, ExponentialBackoff, FixedInterval, ReconnectConfig, RetryPolicy,
    RetryStrategy,
};
