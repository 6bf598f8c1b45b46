//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **Memory***: 単一プロセス内で完結する実装（テスト・開発用）
//! - **File***: JSON Lines journal による永続化実装（daemon 用）
//!
//! Lock Manager はメモリ実装のみ。プロセスが落ちればロックも消え、
//! 孤立した claim は reaper が回収する。

pub mod file_dedup;
pub mod file_log;
pub mod file_store;
pub mod journal;
pub mod memory_dedup;
pub mod memory_lock;
pub mod memory_log;
pub mod memory_store;
mod posting_table;

pub use self::file_dedup::FileDedupIndex;
pub use self::file_log::{FileAuditLog, FileLog, FileTracker};
pub use self::file_store::{CompactionReport, FilePostingStore};
pub use self::journal::{Journal, JournalError};
pub use self::memory_dedup::MemoryDedupIndex;
pub use self::memory_lock::MemoryLockManager;
pub use self::memory_log::{MemoryAuditLog, MemoryLog, MemoryTracker};
pub use self::memory_store::MemoryPostingStore;
