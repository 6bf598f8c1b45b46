//! Posting - キューの一要素（求人一件）とそのライフサイクル遷移

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dedup::DedupKey;
use super::errors::{Result, ShuttleError};
use super::ids::{HolderId, PostingId};
use super::outcome::Evidence;
use super::partition::Partition;
use super::state::PostingState;

/// Descriptive metadata carried from discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<String>,

    /// Name of the discovery source that produced the candidate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Ownership marker of a CLAIMED posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub holder: HolderId,
    pub claimed_at: DateTime<Utc>,
}

/// One job posting and its lifecycle state.
///
/// Invariants (Store が保証する):
/// - `state == Claimed` ⇔ `claim.is_some()`
/// - `state == Applied` ⇒ `evidence.is_some()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,

    /// Normalized company+title key, when both are known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_key: Option<DedupKey>,

    pub url: String,
    pub partition: Partition,
    pub score: u32,
    pub discovered_at: DateTime<Utc>,

    pub state: PostingState,
    pub state_changed_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<Claim>,

    /// Bumped by every successful transition.
    pub version: u64,

    #[serde(default)]
    pub meta: PostingMeta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reason: Option<String>,

    #[serde(default)]
    pub defer_count: u32,

    /// When a DEFERRED posting becomes eligible again. `None` means parked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defer_until: Option<DateTime<Utc>>,
}

impl Posting {
    /// A fresh PENDING posting.
    pub fn new(
        id: PostingId,
        url: impl Into<String>,
        partition: Partition,
        score: u32,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            secondary_key: None,
            url: url.into(),
            partition,
            score,
            discovered_at,
            state: PostingState::Pending,
            state_changed_at: discovered_at,
            claim: None,
            version: 0,
            meta: PostingMeta::default(),
            evidence: None,
            last_reason: None,
            defer_count: 0,
            defer_until: None,
        }
    }

    pub fn with_meta(mut self, meta: PostingMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_secondary_key(mut self, key: Option<DedupKey>) -> Self {
        self.secondary_key = key;
        self
    }

    /// Apply a transition in place, checking the lifecycle rules.
    ///
    /// Store 実装はロックの内側でこれを呼ぶ。失敗時は何も変更しない。
    pub fn apply(&mut self, t: &Transition, now: DateTime<Utc>) -> Result<()> {
        if self.state != t.from {
            return Err(ShuttleError::StateConflict {
                id: self.id.clone(),
                expected: t.from,
                actual: self.state,
            });
        }
        if !t.from.can_transition_to(t.to) {
            return Err(self.invalid(t.to, "not a lifecycle edge"));
        }
        if let (Some(claim), Actor::Worker(holder)) = (&self.claim, &t.actor)
            && claim.holder != *holder
        {
            return Err(ShuttleError::ClaimLost {
                id: self.id.clone(),
                holder: holder.clone(),
            });
        }

        match t.to {
            PostingState::Claimed => {
                let Some(holder) = t.actor.holder() else {
                    return Err(self.invalid(t.to, "claim requires a holder"));
                };
                self.claim = Some(Claim {
                    holder: holder.clone(),
                    claimed_at: now,
                });
                self.defer_until = None;
            }
            PostingState::Applied => {
                let Some(evidence) = t.evidence.as_ref().filter(|e| e.is_substantive()) else {
                    return Err(self.invalid(t.to, "applied requires evidence"));
                };
                self.evidence = Some(evidence.clone());
                self.claim = None;
            }
            PostingState::Deferred => {
                self.claim = None;
                self.defer_count = self.defer_count.saturating_add(1);
                self.defer_until = t.defer_until;
            }
            PostingState::Skipped | PostingState::Pending => {
                self.claim = None;
                self.defer_until = None;
            }
        }

        if let Some(reason) = &t.reason {
            self.last_reason = Some(reason.clone());
        }
        self.state = t.to;
        self.state_changed_at = now;
        self.version += 1;
        Ok(())
    }

    /// Operator override: set any state except CLAIMED, bypassing the edge check.
    pub fn force(
        &mut self,
        to: PostingState,
        evidence: Option<Evidence>,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match to {
            PostingState::Claimed => {
                return Err(self.invalid(to, "cannot force a claim; use the dispatcher"));
            }
            PostingState::Applied => {
                let Some(evidence) = evidence.filter(|e| e.is_substantive()) else {
                    return Err(self.invalid(to, "applied requires evidence"));
                };
                self.evidence = Some(evidence);
            }
            PostingState::Pending => {
                self.defer_count = 0;
            }
            _ => {}
        }
        self.claim = None;
        self.defer_until = None;
        self.last_reason = Some(reason);
        self.state = to;
        self.state_changed_at = now;
        self.version += 1;
        Ok(())
    }

    fn invalid(&self, to: PostingState, reason: &str) -> ShuttleError {
        ShuttleError::InvalidTransition {
            id: self.id.clone(),
            from: self.state,
            to,
            reason: reason.to_string(),
        }
    }
}

/// Who performed a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Dispatcher(HolderId),
    Worker(HolderId),
    Reaper,
    Operator(String),
    Producer,
}

impl Actor {
    pub fn holder(&self) -> Option<&HolderId> {
        match self {
            Actor::Dispatcher(h) | Actor::Worker(h) => Some(h),
            _ => None,
        }
    }
}

/// A requested compare-and-set state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: PostingId,
    pub from: PostingState,
    pub to: PostingState,
    pub actor: Actor,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Evidence>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defer_until: Option<DateTime<Utc>>,
}

impl Transition {
    pub fn new(id: PostingId, from: PostingState, to: PostingState, actor: Actor) -> Self {
        Self {
            id,
            from,
            to,
            actor,
            evidence: None,
            reason: None,
            defer_until: None,
        }
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_defer_until(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.defer_until = at;
        self
    }
}
