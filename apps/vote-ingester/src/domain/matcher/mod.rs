//! Vote Matcher
//!
//! Case-insensitive substring matching of message text against the tracked
//! poll options. A message votes once for every option it mentions, in
//! option order; repeated mentions of the same option count once.

use super::poll::{PollOptionSet, StreamMessage, Vote};

/// Matches stream messages against a session's poll options.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoteMatcher;

impl VoteMatcher {
    /// Create a new matcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Votes cast by `message`, in option order.
    #[must_use]
    pub fn votes(&self, options: &PollOptionSet, message: &StreamMessage) -> Vec<Vote> {
        self.votes_for_text(options, &message.text)
    }

    /// Votes cast by a raw message text, in option order.
    #[must_use]
    pub fn votes_for_text(&self, options: &PollOptionSet, text: &str) -> Vec<Vote> {
        if options.is_empty() || text.is_empty() {
            return Vec::new();
        }

        let text = text.to_lowercase();
        options
            .folded()
            .filter(|(_, folded)| text.contains(*folded))
            .map(|(keyword, _)| Vote::new(keyword))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn options(keywords: &[&str]) -> PollOptionSet {
        PollOptionSet::new(keywords.iter().copied())
    }

    fn vote_names(votes: &[Vote]) -> Vec<&str> {
        votes.iter().map(Vote::option).collect()
    }

    #[test]
    fn matches_regardless_of_case() {
        let opts = options(&["Cats", "Dogs"]);
        let matcher = VoteMatcher::new();

        for text in ["I like cats", "CATS rule", "cAtS"] {
            let votes = matcher.votes_for_text(&opts, text);
            assert_eq!(vote_names(&votes), vec!["Cats"], "text: {text}");
        }
    }

    #[test]
    fn multiple_options_vote_in_option_order() {
        let opts = options(&["Cats", "Dogs"]);
        let votes = VoteMatcher::new().votes_for_text(&opts, "dogs are better than cats");
        assert_eq!(vote_names(&votes), vec!["Cats", "Dogs"]);
    }

    #[test]
    fn unmatched_message_casts_no_votes() {
        let opts = options(&["Cats", "Dogs"]);
        let votes = VoteMatcher::new().votes_for_text(&opts, "python is fine");
        assert!(votes.is_empty());
    }

    #[test]
    fn repeated_mentions_count_once() {
        let opts = options(&["rust"]);
        let votes = VoteMatcher::new().votes_for_text(&opts, "rust rust RUST");
        assert_eq!(vote_names(&votes), vec!["rust"]);
    }

    #[test]
    fn empty_options_match_nothing() {
        let votes = VoteMatcher::new().votes_for_text(&PollOptionSet::empty(), "anything");
        assert!(votes.is_empty());
    }

    #[test]
    fn substring_matches_inside_words() {
        let opts = options(&["go"]);
        let votes = VoteMatcher::new().votes_for_text(&opts, "Let's GOOO");
        assert_eq!(vote_names(&votes), vec!["go"]);
    }

    #[test]
    fn message_sequence_yields_votes_in_emission_order() {
        let opts = options(&["rust", "go"]);
        let matcher = VoteMatcher::new();
        let messages = ["I love rust", "go and rust are great", "python is fine"];

        let votes: Vec<Vote> = messages
            .iter()
            .flat_map(|text| matcher.votes(&opts, &StreamMessage::new(*text)))
            .collect();

        assert_eq!(vote_names(&votes), vec!["rust", "go", "rust"]);
    }

    proptest! {
        #[test]
        fn every_vote_is_a_mentioned_option(text in "[a-zA-Z ]{0,40}") {
            let opts = options(&["ab", "Cd", "xyz"]);
            let votes = VoteMatcher::new().votes_for_text(&opts, &text);
            let lower = text.to_lowercase();
            for vote in &votes {
                prop_assert!(lower.contains(&vote.option().to_lowercase()));
            }
            prop_assert!(votes.len() <= opts.len());
        }
    }
}
