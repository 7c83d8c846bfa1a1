//! NSQ TCP Protocol Codec
//!
//! Frames the producer side of the NSQ `V2` protocol for use with
//! [`tokio_util::codec::Framed`].
//!
//! # Wire Format
//!
//! After the 4-byte magic `"  V2"`, commands are newline-terminated text,
//! optionally followed by a size-prefixed body:
//!
//! ```text
//! PUB <topic>\n[ 4-byte size ][ N-byte body ]
//! NOP\n
//! ```
//!
//! The broker answers with frames:
//!
//! ```text
//! [ 4-byte size ][ 4-byte frame type ][ size - 4 bytes of data ]
//! ```
//!
//! All integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Protocol magic sent once after connecting.
pub const MAGIC_V2: &[u8; 4] = b"  V2";

/// Response data the broker sends as a heartbeat.
pub const HEARTBEAT: &[u8] = b"_heartbeat_";

/// Response data acknowledging a publish.
pub const OK: &[u8] = b"OK";

const FRAME_TYPE_RESPONSE: u32 = 0;
const FRAME_TYPE_ERROR: u32 = 1;
const FRAME_TYPE_MESSAGE: u32 = 2;

/// Upper bound on an inbound frame, matching nsqd's default max message size.
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Longest topic name nsqd accepts.
const MAX_TOPIC_LEN: usize = 64;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum NsqCodecError {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound frame exceeds the size limit.
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    /// Inbound frame size too small to hold a frame type.
    #[error("frame of {0} bytes is too short")]
    FrameTooShort(usize),

    /// Inbound frame type is not one the protocol defines.
    #[error("unknown frame type {0}")]
    UnknownFrameType(u32),

    /// Outbound topic name is not valid.
    #[error("invalid topic name {0:?}")]
    InvalidTopic(String),

    /// Outbound body does not fit in a frame.
    #[error("body of {0} bytes is too large")]
    BodyTooLarge(usize),
}

/// Commands a producer sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish one message to a topic.
    Pub {
        /// Destination topic.
        topic: String,
        /// Message body.
        body: Bytes,
    },
    /// Answer to a heartbeat.
    Nop,
}

impl Command {
    /// Build a publish command.
    #[must_use]
    pub fn publish(topic: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::Pub {
            topic: topic.into(),
            body: body.into(),
        }
    }
}

/// Frames received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Response frame (`OK`, `_heartbeat_`, ...).
    Response(Bytes),
    /// Error frame (`E_INVALID ...`, `E_PUB_FAILED ...`).
    Error(Bytes),
    /// Message frame. Producers never subscribe, so these are unexpected.
    Message(Bytes),
}

impl Frame {
    /// Whether this is a heartbeat.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Response(data) if data.as_ref() == HEARTBEAT)
    }

    /// Whether this acknowledges a command.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Response(data) if data.as_ref() == OK)
    }
}

/// Whether `topic` is a name nsqd accepts.
#[must_use]
pub fn is_valid_topic(topic: &str) -> bool {
    let name = topic.strip_suffix("#ephemeral").unwrap_or(topic);
    !topic.is_empty()
        && topic.len() <= MAX_TOPIC_LEN
        && !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// Producer-side NSQ codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct NsqCodec;

impl Encoder<Command> for NsqCodec {
    type Error = NsqCodecError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Command::Pub { topic, body } => {
                if !is_valid_topic(&topic) {
                    return Err(NsqCodecError::InvalidTopic(topic));
                }
                let size = u32::try_from(body.len())
                    .map_err(|_| NsqCodecError::BodyTooLarge(body.len()))?;

                dst.reserve(4 + topic.len() + 1 + 4 + body.len());
                dst.put_slice(b"PUB ");
                dst.put_slice(topic.as_bytes());
                dst.put_u8(b'\n');
                dst.put_u32(size);
                dst.put_slice(&body);
            }
            Command::Nop => dst.put_slice(b"NOP\n"),
        }
        Ok(())
    }
}

impl Decoder for NsqCodec {
    type Item = Frame;
    type Error = NsqCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let size = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if size > MAX_FRAME_SIZE {
            return Err(NsqCodecError::FrameTooLarge(size));
        }
        if size < 4 {
            return Err(NsqCodecError::FrameTooShort(size));
        }
        if src.len() < 4 + size {
            src.reserve(4 + size - src.len());
            return Ok(None);
        }

        src.advance(4);
        let frame_type = src.get_u32();
        let data = src.split_to(size - 4).freeze();

        match frame_type {
            FRAME_TYPE_RESPONSE => Ok(Some(Frame::Response(data))),
            FRAME_TYPE_ERROR => Ok(Some(Frame::Error(data))),
            FRAME_TYPE_MESSAGE => Ok(Some(Frame::Message(data))),
            other => Err(NsqCodecError::UnknownFrameType(other)),
        }
    }
}
