//! Stream Record Codec
//!
//! The streaming response body is a continuous sequence of JSON objects,
//! optionally separated by whitespace or blank keep-alive lines. Chunks from
//! the transport do not respect record boundaries, so [`RecordDecoder`]
//! buffers bytes and yields a record only once it is complete.

use bytes::{Buf, BytesMut};

use crate::domain::poll::StreamMessage;

/// Initial capacity of the decode buffer.
const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Largest incomplete record the decoder will buffer.
pub const MAX_RECORD_SIZE: usize = 1024 * 1024;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A record was not valid JSON or not an object.
    #[error("malformed stream record: {0}")]
    Json(#[from] serde_json::Error),

    /// An unfinished record outgrew the buffer limit.
    #[error("stream record exceeds {max} bytes ({buffered} buffered)")]
    RecordTooLarge {
        /// Bytes buffered without completing a record.
        buffered: usize,
        /// Configured limit.
        max: usize,
    },
}

/// Incremental decoder for a body of concatenated JSON records.
#[derive(Debug)]
pub struct RecordDecoder {
    buf: BytesMut,
    max_record_size: usize,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_record_size(MAX_RECORD_SIZE)
    }

    /// Create an empty decoder that gives up on records longer than `max`.
    #[must_use]
    pub fn with_max_record_size(max: usize) -> Self {
        Self {
            max_record_size: max,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY.min(max)),
        }
    }

    /// Append a chunk of body bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of buffered bytes not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete record.
    ///
    /// Returns `Ok(None)` when the buffer holds only whitespace or an
    /// incomplete record; more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered bytes cannot form a record. The
    /// decoder should be discarded afterwards.
    pub fn next_record(&mut self) -> Result<Option<StreamMessage>, CodecError> {
        let mut records =
            serde_json::Deserializer::from_slice(&self.buf).into_iter::<StreamMessage>();

        match records.next() {
            Some(Ok(message)) => {
                let consumed = records.byte_offset();
                self.buf.advance(consumed);
                Ok(Some(message))
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buf.len() > self.max_record_size {
                    return Err(CodecError::RecordTooLarge {
                        buffered: self.buf.len(),
                        max: self.max_record_size,
                    });
                }
                Ok(None)
            }
            Some(Err(e)) => Err(e.into()),
            None => {
                // Only whitespace left.
                let consumed = records.byte_offset();
                self.buf.advance(consumed);
                Ok(None)
            }
        }
    }
}
