//! Prometheus Metrics Module
//!
//! Exposes ingestion metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Stream**: Messages received, sessions started and how they ended
//! - **Votes**: Votes matched, published and dropped
//!
//! Options are user-created free text, so no metric is labelled by option.
//! - **Connection**: Whether a streaming connection is currently held
//!
//! # Integration
//!
//! When a port is configured, metrics are served at `/metrics` by the
//! exporter's own HTTP listener. Without a recorder installed every
//! recording function is a no-op.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// =============================================================================
// Installation
// =============================================================================

static INSTALLED: OnceLock<SocketAddr> = OnceLock::new();

/// Install the Prometheus recorder and start its HTTP listener on `port`.
///
/// Must be called from within a Tokio runtime. Calling it again after a
/// successful install is a no-op.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or a recorder is already
/// installed by someone else.
pub fn init_metrics(port: u16) -> Result<SocketAddr, BuildError> {
    if let Some(addr) = INSTALLED.get() {
        return Ok(*addr);
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_metrics();

    Ok(*INSTALLED.get_or_init(|| addr))
}

/// Address of the metrics listener, if installed.
#[must_use]
pub fn listen_addr() -> Option<SocketAddr> {
    INSTALLED.get().copied()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Stream
    describe_counter!(
        "vote_ingester_messages_received_total",
        "Total messages decoded from the stream"
    );
    describe_counter!(
        "vote_ingester_sessions_started_total",
        "Total stream sessions started"
    );
    describe_counter!(
        "vote_ingester_session_ends_total",
        "Total stream sessions ended, by cause"
    );

    // Votes
    describe_counter!(
        "vote_ingester_votes_matched_total",
        "Total votes matched across all options"
    );
    describe_counter!(
        "vote_ingester_votes_published_total",
        "Total votes accepted by the queue"
    );
    describe_counter!(
        "vote_ingester_votes_dropped_total",
        "Total votes dropped after exhausting publish attempts"
    );

    // Connection
    describe_gauge!(
        "vote_ingester_connection_open",
        "1 while a streaming connection is held"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a stream session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The body ended normally.
    EndOfStream,
    /// The request could not be sent or the body failed mid-read.
    Transport,
    /// The endpoint rejected the request.
    Status,
    /// A record could not be decoded.
    Decode,
    /// The connection was force-closed.
    ForceClosed,
    /// Options could not be loaded.
    Storage,
}

impl SessionEnd {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EndOfStream => "end_of_stream",
            Self::Transport => "transport",
            Self::Status => "status",
            Self::Decode => "decode",
            Self::ForceClosed => "force_closed",
            Self::Storage => "storage",
        }
    }
}

/// Record a message decoded from the stream.
pub fn record_message_received() {
    counter!("vote_ingester_messages_received_total").increment(1);
}

/// Record a matched vote.
pub fn record_vote_matched() {
    counter!("vote_ingester_votes_matched_total").increment(1);
}

/// Record a vote accepted by the queue.
pub fn record_vote_published() {
    counter!("vote_ingester_votes_published_total").increment(1);
}

/// Record a vote dropped after all publish attempts failed.
pub fn record_vote_dropped() {
    counter!("vote_ingester_votes_dropped_total").increment(1);
}

/// Record the start of a stream session.
pub fn record_session_started() {
    counter!("vote_ingester_sessions_started_total").increment(1);
}

/// Record the end of a stream session.
pub fn record_session_end(cause: SessionEnd) {
    counter!(
        "vote_ingester_session_ends_total",
        "cause" => cause.as_str()
    )
    .increment(1);
}

/// Update the connection-open gauge.
pub fn set_connection_open(open: bool) {
    gauge!("vote_ingester_connection_open").set(if open { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================
