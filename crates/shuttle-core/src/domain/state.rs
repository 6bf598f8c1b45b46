//! Posting lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a posting.
///
/// State transitions:
/// - Pending -> Claimed (dispatcher)
/// - Claimed -> Applied | Skipped | Deferred (worker terminal outcome)
/// - Claimed -> Pending (abandonment, reaper)
/// - Deferred -> Pending (defer window elapsed, reaper)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostingState {
    /// Eligible for claiming.
    Pending,

    /// Owned by exactly one worker run.
    Claimed,

    /// Submitted with positive confirmation.
    Applied,

    /// Dropped (unreachable or filtered out).
    Skipped,

    /// Postponed; requeued later or parked for an operator.
    Deferred,
}

impl PostingState {
    pub const ALL: [PostingState; 5] = [
        PostingState::Pending,
        PostingState::Claimed,
        PostingState::Applied,
        PostingState::Skipped,
        PostingState::Deferred,
    ];

    /// Is this posting eligible for claiming?
    pub fn is_claimable(self) -> bool {
        matches!(self, PostingState::Pending)
    }

    /// Final states: the dedup index treats these as a hard stop.
    pub fn is_final(self) -> bool {
        matches!(self, PostingState::Applied | PostingState::Skipped)
    }

    /// Is `self -> to` an edge of the lifecycle graph?
    pub fn can_transition_to(self, to: PostingState) -> bool {
        use PostingState::*;
        matches!(
            (self, to),
            (Pending, Claimed)
                | (Claimed, Applied)
                | (Claimed, Skipped)
                | (Claimed, Deferred)
                | (Claimed, Pending)
                | (Deferred, Pending)
        )
    }
}

impl fmt::Display for PostingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PostingState::Pending => "PENDING",
            PostingState::Claimed => "CLAIMED",
            PostingState::Applied => "APPLIED",
            PostingState::Skipped => "SKIPPED",
            PostingState::Deferred => "DEFERRED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::claim(PostingState::Pending, PostingState::Claimed)]
    #[case::apply(PostingState::Claimed, PostingState::Applied)]
    #[case::skip(PostingState::Claimed, PostingState::Skipped)]
    #[case::defer(PostingState::Claimed, PostingState::Deferred)]
    #[case::abandon(PostingState::Claimed, PostingState::Pending)]
    #[case::requeue(PostingState::Deferred, PostingState::Pending)]
    fn legal_edges(#[case] from: PostingState, #[case] to: PostingState) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case::skip_claim(PostingState::Pending, PostingState::Applied)]
    #[case::reopen_applied(PostingState::Applied, PostingState::Pending)]
    #[case::reopen_skipped(PostingState::Skipped, PostingState::Claimed)]
    #[case::claim_deferred(PostingState::Deferred, PostingState::Claimed)]
    fn illegal_edges(#[case] from: PostingState, #[case] to: PostingState) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn only_pending_is_claimable() {
        let claimable: Vec<_> = PostingState::ALL
            .into_iter()
            .filter(|s| s.is_claimable())
            .collect();
        assert_eq!(claimable, vec![PostingState::Pending]);
    }

    #[test]
    fn state_serializes_screaming() {
        let s = serde_json::to_string(&PostingState::Deferred).unwrap();
        assert_eq!(s, "\"DEFERRED\"");
    }
}
