//! Domain model (postings, keys, locks, outcomes, decisions, ...).
//!
//! ここにある型はすべて純粋で、I/O も時刻取得もしない。
//! 時刻は呼び出し側（ports::Clock）から渡す。

pub mod audit;
pub mod candidate;
pub mod decision;
pub mod dedup;
pub mod dispatch;
pub mod errors;
pub mod ids;
pub mod lock;
pub mod outcome;
pub mod partition;
pub mod posting;
pub mod queue;
pub mod retry;
pub mod score;
pub mod state;

pub use audit::{AuditAction, AuditEntry};
pub use candidate::Candidate;
pub use decision::{Decider, Decision, DefaultDecider};
pub use dedup::{CandidateKeys, DedupEntry, DedupKey, DedupLookup, DedupOutcome};
pub use dispatch::{PartitionSnapshot, PartitionStatus, QueueTop, TickReport, TickResult};
pub use errors::{ErrorKind, Result, ShuttleError};
pub use ids::{AuditId, HolderId, LockName, PostingId, RunId};
pub use lock::LockRecord;
pub use outcome::{
    Artifact, Evidence, Liveness, Phase, PhaseOutcome, PhaseRecord, SubmissionResult,
    TerminalOutcome,
};
pub use partition::{DISPATCH_LOCK, Partition, PartitionOrder};
pub use posting::{Actor, Claim, Posting, PostingMeta, Transition};
pub use retry::RetryPolicy;
pub use score::{BucketScorer, ScoreBreakdown, ScoreInputs, Scorer};
pub use state::PostingState;
