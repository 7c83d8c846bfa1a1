//! Poll Domain Types
//!
//! - [`PollOptionSet`]: the ordered keywords tracked during one stream session
//! - [`StreamMessage`]: a decoded record from the message stream
//! - [`Vote`]: one matched keyword on its way to the queue

use std::fmt;

use serde::Deserialize;

// =============================================================================
// Poll Options
// =============================================================================

/// A single tracked keyword together with its lowercased form.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PollOption {
    keyword: String,
    folded: String,
}

/// Ordered, duplicate-free set of tracked keywords.
///
/// Loaded fresh at the start of every stream session. May be empty, in which
/// case the stream is opened with an empty filter and nothing matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOptionSet {
    options: Vec<PollOption>,
}

impl PollOptionSet {
    /// Build a set from keywords in source order.
    ///
    /// Empty keywords and exact duplicates are skipped; the first occurrence
    /// of each keyword keeps its position.
    #[must_use]
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut options: Vec<PollOption> = Vec::new();

        for keyword in keywords {
            let keyword = keyword.into();
            if keyword.is_empty() || options.iter().any(|o| o.keyword == keyword) {
                continue;
            }
            let folded = keyword.to_lowercase();
            options.push(PollOption { keyword, folded });
        }

        Self { options }
    }

    /// An empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            options: Vec::new(),
        }
    }

    /// Number of tracked keywords.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.options.len()
    }

    /// Whether no keywords are tracked.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Keywords in source order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|o| o.keyword.as_str())
    }

    /// Keywords paired with their lowercased form, in source order.
    pub(crate) fn folded(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options
            .iter()
            .map(|o| (o.keyword.as_str(), o.folded.as_str()))
    }

    /// The value of the stream's `track` filter parameter.
    ///
    /// Keywords joined by commas in source order; empty when the set is empty.
    #[must_use]
    pub fn track_filter(&self) -> String {
        self.keywords().collect::<Vec<_>>().join(",")
    }
}

impl<S: Into<String>> FromIterator<S> for PollOptionSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

// =============================================================================
// Stream Messages
// =============================================================================

/// A record decoded from the message stream.
///
/// Only `text` is used; every other field of the record is ignored. Records
/// without a `text` field (delete notices, limit notices) decode with empty
/// text and never match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamMessage {
    /// Message body.
    #[serde(default)]
    pub text: String,
}

impl StreamMessage {
    /// Create a message with the given text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

// =============================================================================
// Votes
// =============================================================================

/// One attributed match of a tracked keyword within one message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vote(String);

impl Vote {
    /// Create a vote for the given keyword.
    #[must_use]
    pub fn new(option: impl Into<String>) -> Self {
        Self(option.into())
    }

    /// The keyword this vote is for.
    #[must_use]
    pub fn option(&self) -> &str {
        &self.0
    }

    /// Raw queue payload: the keyword bytes, no envelope.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Consume the vote, returning the keyword.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_set_has_empty_filter() {
        let set = PollOptionSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.track_filter(), "");
    }

    #[test]
    fn filter_preserves_source_order() {
        let set = PollOptionSet::new(["happy", "sad", "fail", "win"]);
        assert_eq!(set.track_filter(), "happy,sad,fail,win");
    }

    #[test]
    fn duplicates_and_empty_keywords_are_dropped() {
        let set = PollOptionSet::new(["go", "", "rust", "go", "Go"]);
        assert_eq!(set.keywords().collect::<Vec<_>>(), vec!["go", "rust", "Go"]);
    }

    #[test]
    fn option_shared_by_two_polls_is_tracked_once() {
        // Two polls both offering "go", concatenated in storage order.
        let set = PollOptionSet::new(["rust", "go", "go", "zig"]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.track_filter(), "rust,go,zig");
    }

    #[test]
    fn message_without_text_decodes_empty() {
        let msg: StreamMessage =
            serde_json::from_str(r#"{"delete":{"status":{"id":1}}}"#).unwrap();
        assert_eq!(msg.text, "");
    }

    #[test]
    fn message_ignores_unknown_fields() {
        let msg: StreamMessage =
            serde_json::from_str(r#"{"id":42,"text":"hello","user":{"name":"x"}}"#).unwrap();
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn vote_payload_is_raw_keyword() {
        let vote = Vote::new("Cats");
        assert_eq!(vote.as_bytes(), b"Cats");
        assert_eq!(vote.to_string(), "Cats");
    }

    proptest! {
        #[test]
        fn filter_is_comma_join_of_distinct_keywords(
            keywords in proptest::collection::hash_set("[a-zA-Z0-9 ]{1,12}", 0..8)
        ) {
            let keywords: Vec<String> = keywords.into_iter().collect();
            let set = PollOptionSet::new(keywords.clone());
            prop_assert_eq!(set.len(), keywords.len());
            prop_assert_eq!(set.track_filter(), keywords.join(","));
        }

        #[test]
        fn filter_keeps_first_occurrence_of_repeated_keywords(
            keywords in proptest::collection::vec("[a-c]{1,2}", 0..12)
        ) {
            let mut expected: Vec<&str> = Vec::new();
            for k in &keywords {
                if !expected.contains(&k.as_str()) {
                    expected.push(k.as_str());
                }
            }
            let set = PollOptionSet::new(keywords.clone());
            prop_assert_eq!(set.len(), expected.len());
            prop_assert_eq!(set.track_filter(), expected.join(","));
        }
    }
}
