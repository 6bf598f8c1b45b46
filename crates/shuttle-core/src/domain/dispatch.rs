//! Dispatch decision - どのパーティションを起動するかの純粋関数
//!
//! 永続化しない。per-partition のスナップショットと静的な優先順位だけから決まる。

use serde::Serialize;

use super::ids::{PostingId, RunId};
use super::partition::{Partition, PartitionOrder};

/// Top of a partition's queue at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueTop {
    pub id: PostingId,
    pub score: u32,
}

/// Snapshot of one partition during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PartitionStatus {
    Disabled,
    /// The partition lock is live.
    Busy,
    /// Nothing actionable.
    Idle,
    Ready { top: QueueTop },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSnapshot {
    pub partition: Partition,
    pub status: PartitionStatus,
}

/// Pick at most one READY partition: highest top score, ties by static order.
pub fn decide<'a>(
    snapshots: &'a [PartitionSnapshot],
    order: &PartitionOrder,
) -> Option<(&'a Partition, &'a QueueTop)> {
    snapshots
        .iter()
        .filter_map(|s| match &s.status {
            PartitionStatus::Ready { top } => Some((&s.partition, top)),
            _ => None,
        })
        .min_by(|(pa, ta), (pb, tb)| {
            tb.score
                .cmp(&ta.score)
                .then_with(|| order.rank(pa).cmp(&order.rank(pb)))
        })
}

/// How a tick ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TickResult {
    /// A worker run was launched.
    Dispatched {
        partition: Partition,
        posting: PostingId,
        run_id: String,
    },
    /// No partition was READY.
    Nothing,
    /// Another dispatcher holds the global dispatch lock.
    DispatchLockHeld,
    /// The chosen partition lock was taken between snapshot and acquire.
    LockContention { partition: Partition },
    /// The claim conflicted twice.
    ClaimConflict { partition: Partition },
    /// Store or Lock Manager failed.
    Aborted { error: String },
}

/// Record of one dispatcher tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub reaped: usize,
    pub requeued: usize,
    pub snapshots: Vec<PartitionSnapshot>,
    pub result: TickResult,
}

impl TickReport {
    pub fn aborted(error: impl ToString) -> Self {
        Self {
            reaped: 0,
            requeued: 0,
            snapshots: Vec::new(),
            result: TickResult::Aborted {
                error: error.to_string(),
            },
        }
    }

    pub fn dispatched_run(&self) -> Option<&str> {
        match &self.result {
            TickResult::Dispatched { run_id, .. } => Some(run_id),
            _ => None,
        }
    }
}

impl TickResult {
    pub fn dispatched(partition: Partition, posting: PostingId, run_id: RunId) -> Self {
        TickResult::Dispatched {
            partition,
            posting,
            run_id: run_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn ready(p: &str, score: u32) -> PartitionSnapshot {
        PartitionSnapshot {
            partition: p.into(),
            status: PartitionStatus::Ready {
                top: QueueTop {
                    id: format!("{p}-top").as_str().into(),
                    score,
                },
            },
        }
    }

    fn with(p: &str, status: PartitionStatus) -> PartitionSnapshot {
        PartitionSnapshot {
            partition: p.into(),
            status,
        }
    }

    fn order() -> PartitionOrder {
        PartitionOrder::new(vec!["ashby".into(), "greenhouse".into(), "lever".into()])
    }

    #[rstest]
    #[case::highest_score(vec![ready("ashby", 200), ready("lever", 260)], Some("lever"))]
    #[case::tie_goes_to_order(vec![ready("lever", 200), ready("greenhouse", 200)], Some("greenhouse"))]
    #[case::busy_is_skipped(
        vec![with("ashby", PartitionStatus::Busy), ready("lever", 10)],
        Some("lever")
    )]
    #[case::nothing_ready(
        vec![with("ashby", PartitionStatus::Idle), with("lever", PartitionStatus::Disabled)],
        None
    )]
    fn decide_picks_one(#[case] snaps: Vec<PartitionSnapshot>, #[case] expected: Option<&str>) {
        let got = decide(&snaps, &order()).map(|(p, _)| p.as_str().to_string());
        assert_eq!(got.as_deref(), expected);
    }
}
