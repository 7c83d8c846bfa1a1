//! Stream Reader
//!
//! Opens the filtered streaming endpoint over a managed [`Connection`] and
//! turns the response body into a stream of [`StreamMessage`]s. The reader
//! owns the HTTP client; idle pooling is disabled so a dropped body never
//! leaves a second socket open.
//!
//! # Request
//!
//! `POST <endpoint>` with a form body `track=<comma-joined keywords>`, an
//! OAuth 1.0a `Authorization` header signed over the same parameter, and
//! explicit `Content-Type` and `Content-Length` headers.
//!
//! # Termination
//!
//! The message stream ends on end of body, on the first transport or decode
//! error, or as soon as the connection is force-closed.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::auth::StreamAuthenticator;
use super::codec::RecordDecoder;
use crate::application::ports::{Connection, MessageSource, MessageStream, StreamError};
use crate::domain::poll::{PollOptionSet, StreamMessage};

/// Default filtered-stream endpoint.
pub const DEFAULT_STREAM_ENDPOINT: &str = "https://stream.twitter.com/1.1/statuses/filter.json";

/// Default bound on establishing the TCP/TLS connection.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Form parameter carrying the tracked keywords.
const TRACK_PARAM: &str = "track";

/// Longest error body kept in a status error.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Stream reader construction errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// [`MessageSource`] backed by the HTTP streaming endpoint.
#[derive(Debug, Clone)]
pub struct StreamReader {
    endpoint: Url,
    authenticator: StreamAuthenticator,
    client: reqwest::Client,
    dial_timeout: Duration,
}

impl StreamReader {
    /// Create a reader for `endpoint` that dials with `dial_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: Url,
        authenticator: StreamAuthenticator,
        dial_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(dial_timeout)
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            endpoint,
            authenticator,
            client,
            dial_timeout,
        })
    }

    /// Bound on establishing a connection.
    #[must_use]
    pub const fn dial_timeout(&self) -> Duration {
        self.dial_timeout
    }

    /// Endpoint this reader posts to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn build_request(&self, options: &PollOptionSet) -> Result<reqwest::RequestBuilder, StreamError> {
        let filter = options.track_filter();
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair(TRACK_PARAM, &filter)
            .finish();

        let authorization = self
            .authenticator
            .authorization_header("POST", &self.endpoint, &[(TRACK_PARAM, &filter)])
            .map_err(|e| StreamError::Request(e.to_string()))?;

        Ok(self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(CONTENT_LENGTH, body.len())
            .header(AUTHORIZATION, authorization)
            .body(body))
    }
}

#[async_trait]
impl MessageSource for StreamReader {
    async fn open(
        &self,
        options: &PollOptionSet,
        connection: &Connection,
    ) -> Result<MessageStream, StreamError> {
        let request = self.build_request(options)?;

        tracing::debug!(
            connection_id = connection.id(),
            endpoint = %self.endpoint,
            keywords = options.len(),
            "Opening stream"
        );

        let response = tokio::select! {
            biased;
            () = connection.closed() => return Err(StreamError::Closed),
            result = request.send() => result.map_err(|e| StreamError::Transport(e.to_string()))?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                () = connection.closed() => String::new(),
                text = response.text() => text.unwrap_or_default(),
            };
            return Err(StreamError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        tracing::info!(connection_id = connection.id(), "Stream opened");

        Ok(records(response.bytes_stream(), connection.close_token()))
    }
}

// =============================================================================
// Body Decoding
// =============================================================================

struct BodyState {
    body: BoxStream<'static, Result<Bytes, String>>,
    decoder: RecordDecoder,
    cancel: CancellationToken,
    finished: bool,
}

enum Next {
    Chunk(Option<Result<Bytes, String>>),
    Closed,
}

/// Decode a chunked body into messages, stopping when `cancel` fires.
pub fn records<S, E>(body: S, cancel: CancellationToken) -> MessageStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + 'static,
{
    let state = BodyState {
        body: body.map(|chunk| chunk.map_err(|e| e.to_string())).boxed(),
        decoder: RecordDecoder::new(),
        cancel,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        loop {
            match state.decoder.next_record() {
                Ok(Some(message)) => return Some((Ok::<StreamMessage, _>(message), state)),
                Ok(None) => {}
                Err(e) => {
                    state.finished = true;
                    return Some((Err(StreamError::Decode(e.to_string())), state));
                }
            }

            let next = tokio::select! {
                biased;
                () = state.cancel.cancelled() => Next::Closed,
                chunk = state.body.next() => Next::Chunk(chunk),
            };

            match next {
                Next::Chunk(Some(Ok(bytes))) => state.decoder.extend(&bytes),
                Next::Chunk(Some(Err(e))) => {
                    state.finished = true;
                    return Some((Err(StreamError::Transport(e)), state));
                }
                Next::Chunk(None) => {
                    if state.decoder.buffered() > 0 {
                        tracing::debug!(
                            trailing_bytes = state.decoder.buffered(),
                            "Stream ended mid-record"
                        );
                    }
                    return None;
                }
                Next::Closed => {
                    state.finished = true;
                    return Some((Err(StreamError::Closed), state));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> {
        stream::iter(
            parts
                .iter()
                .copied()
                .map(|p: &'static str| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn yields_records_across_chunk_boundaries() {
        let body = chunks(&[r#"{"text":"I lo"#, r#"ve rust"}"#, "\r\n", r#"{"text":"go"}"#]);
        let messages: Vec<_> = records(body, CancellationToken::new()).collect().await;

        let texts: Vec<_> = messages.into_iter().map(|m| m.unwrap().text).collect();
        assert_eq!(texts, vec!["I love rust", "go"]);
    }

    #[tokio::test]
    async fn ends_after_first_decode_error() {
        let body = chunks(&[r#"{"text":"ok"}"#, "not json", r#"{"text":"never"}"#]);
        let messages: Vec<_> = records(body, CancellationToken::new()).collect().await;

        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_ok());
        assert!(matches!(messages[1], Err(StreamError::Decode(_))));
    }

    #[tokio::test]
    async fn decode_error_carries_codec_message() {
        let body = chunks(&["{\"text\":1}\r\n"]);
        let messages: Vec<_> = records(body, CancellationToken::new()).collect().await;

        match &messages[..] {
            [Err(StreamError::Decode(message))] => assert!(!message.is_empty()),
            other => panic!("expected one decode error, got {other:?}"),
        }
    }

    #[test]
    fn reader_keeps_configured_dial_timeout() {
        let endpoint = Url::parse(DEFAULT_STREAM_ENDPOINT).unwrap();
        let credentials =
            crate::infrastructure::stream::OAuthCredentials::new("k", "s", "t", "ts").unwrap();
        let reader = StreamReader::new(
            endpoint,
            StreamAuthenticator::new(credentials),
            Duration::from_secs(2),
        )
        .unwrap();

        assert_eq!(reader.dial_timeout(), Duration::from_secs(2));
        assert_eq!(reader.endpoint().as_str(), DEFAULT_STREAM_ENDPOINT);
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(br#"{"text":"a"}"#)),
            Err(std::io::Error::other("reset")),
        ]);
        let messages: Vec<_> = records(body, CancellationToken::new()).collect().await;

        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[1], Err(StreamError::Transport(m)) if m == "reset"));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_body() {
        let cancel = CancellationToken::new();
        let body = stream::pending::<Result<Bytes, std::io::Error>>();
        let mut messages = records(body, cancel.clone());

        cancel.cancel();
        let first = messages.next().await;
        assert!(matches!(first, Some(Err(StreamError::Closed))));
        assert!(messages.next().await.is_none());
    }
}
