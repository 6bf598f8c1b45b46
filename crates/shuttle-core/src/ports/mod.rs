//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部のもの（永続化、時刻、提出手順、発見ソース）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - Posting Store が source of truth（正本）
//! - Lock Manager は期限付きの排他のみを担い、正本を持たない
//! - 提出・発見の中身は黒箱（SubmissionStrategy, CandidateSource）

pub mod audit_log;
pub mod clock;
pub mod dedup_index;
pub mod id_generator;
pub mod link_checker;
pub mod lock_manager;
pub mod posting_store;
pub mod source;
pub mod submission;
pub mod tracker;

pub use self::audit_log::AuditLog;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::dedup_index::DedupIndex;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::link_checker::LinkChecker;
pub use self::lock_manager::LockManager;
pub use self::posting_store::{PostingStore, StateCounts, UpsertResult};
pub use self::source::CandidateSource;
pub use self::submission::{SubmissionStrategy, TargetHandle};
pub use self::tracker::{ApplicationTracker, TrackerEntry};
