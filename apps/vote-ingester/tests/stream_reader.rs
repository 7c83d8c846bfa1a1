//! Stream Reader Integration Tests
//!
//! Drives the HTTP stream reader against a mock streaming endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures::StreamExt;
use url::Url;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use vote_ingester::infrastructure::stream::DEFAULT_DIAL_TIMEOUT;
use vote_ingester::{
    ConnectionManager, MessageSource, OAuthCredentials, PollOptionSet, StreamAuthenticator,
    StreamError, StreamMessage, StreamReader, VoteMatcher,
};

const FILTER_PATH: &str = "/1.1/statuses/filter.json";

/// Matches requests carrying an OAuth 1.0a header for the test consumer key.
struct OAuthHeader;

impl Match for OAuthHeader {
    fn matches(&self, request: &Request) -> bool {
        request
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| {
                value.starts_with("OAuth ")
                    && value.contains("oauth_consumer_key=\"test-key\"")
                    && value.contains("oauth_signature_method=\"HMAC-SHA1\"")
                    && value.contains("oauth_signature=\"")
            })
    }
}

fn reader(server: &MockServer) -> StreamReader {
    let endpoint = Url::parse(&format!("{}{FILTER_PATH}", server.uri())).unwrap();
    let credentials =
        OAuthCredentials::new("test-key", "test-secret", "test-token", "test-token-secret")
            .unwrap();
    StreamReader::new(
        endpoint,
        StreamAuthenticator::new(credentials),
        DEFAULT_DIAL_TIMEOUT,
    )
    .unwrap()
}

fn manager() -> ConnectionManager {
    ConnectionManager::new()
}

#[tokio::test]
async fn posts_signed_track_filter_and_decodes_records() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"id\":1,\"text\":\"I love rust\"}\r\n",
        "\r\n",
        "{\"id\":2,\"text\":\"go and rust are great\",\"lang\":\"en\"}\r\n",
        "{\"delete\":{\"status\":{\"id\":3}}}\r\n",
        "{\"id\":4,\"text\":\"python is fine\"}\r\n",
    );

    Mock::given(method("POST"))
        .and(path(FILTER_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header("content-length", "15"))
        .and(body_string("track=rust%2Cgo"))
        .and(OAuthHeader)
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let options = PollOptionSet::new(["rust", "go"]);
    let mgr = manager();
    let conn = mgr.connect();

    let messages: Vec<StreamMessage> = reader(&server)
        .open(&options, &conn)
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;

    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["I love rust", "go and rust are great", "", "python is fine"]
    );

    let matcher = VoteMatcher::new();
    let votes: Vec<String> = messages
        .iter()
        .flat_map(|m| matcher.votes(&options, m))
        .map(|v| v.into_inner())
        .collect();
    assert_eq!(votes, vec!["rust", "go", "rust"]);
}

#[tokio::test]
async fn empty_option_set_posts_empty_filter() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(FILTER_PATH))
        .and(body_string("track="))
        .and(OAuthHeader)
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mgr = manager();
    let conn = mgr.connect();
    let mut messages = reader(&server)
        .open(&PollOptionSet::empty(), &conn)
        .await
        .unwrap();

    assert!(messages.next().await.is_none());
}

#[tokio::test]
async fn non_success_status_is_reported_with_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(FILTER_PATH))
        .respond_with(ResponseTemplate::new(420).set_body_string("Enhance Your Calm"))
        .mount(&server)
        .await;

    let mgr = manager();
    let conn = mgr.connect();
    let Err(err) = reader(&server)
        .open(&PollOptionSet::new(["rust"]), &conn)
        .await
    else {
        panic!("expected status error");
    };

    match err {
        StreamError::Status { status, body } => {
            assert_eq!(status, 420);
            assert_eq!(body, "Enhance Your Calm");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn malformed_record_ends_stream_with_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(FILTER_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("{\"text\":\"rust\"}\r\n{not json}\r\n"),
        )
        .mount(&server)
        .await;

    let mgr = manager();
    let conn = mgr.connect();
    let mut messages = reader(&server)
        .open(&PollOptionSet::new(["rust"]), &conn)
        .await
        .unwrap();

    assert_eq!(messages.next().await.unwrap().unwrap().text, "rust");
    assert!(matches!(
        messages.next().await,
        Some(Err(StreamError::Decode(_)))
    ));
    assert!(messages.next().await.is_none());
}

#[tokio::test]
async fn force_close_interrupts_pending_open() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(FILTER_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let reader = reader(&server);
    let mgr = manager();
    let conn = mgr.connect();

    let pending = tokio::spawn(async move {
        reader
            .open(&PollOptionSet::new(["rust"]), &conn)
            .await
            .map(|_| ())
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(mgr.force_close());

    let result = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("open should return once the connection is closed")
        .unwrap();
    assert!(matches!(result, Err(StreamError::Closed)));
    assert!(!mgr.is_open());
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_error() {
    let endpoint = Url::parse("http://127.0.0.1:1/1.1/statuses/filter.json").unwrap();
    let credentials = OAuthCredentials::new("k", "s", "t", "ts").unwrap();
    let reader = StreamReader::new(
        endpoint,
        StreamAuthenticator::new(credentials),
        DEFAULT_DIAL_TIMEOUT,
    )
    .unwrap();

    let mgr = manager();
    let conn = mgr.connect();
    let result = reader.open(&PollOptionSet::new(["rust"]), &conn).await;

    assert!(matches!(result, Err(StreamError::Transport(_))));
}
