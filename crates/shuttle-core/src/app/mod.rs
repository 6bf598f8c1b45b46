//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Producer**: 候補の重複判定・スコアリング・投入
//! - **Dispatcher**: tick ごとに高々 1 パーティションを起動（Reaper を含む）
//! - **WorkerRun / SubmissionSession**: 1 件の claim を終端状態まで運ぶ
//! - **TickLoop / DiscoveryLoop**: 周期実行
//! - **StatusQuery / Admin / StaleLinkSweep**: オペレータ向け

pub mod admin;
pub mod builder;
pub mod cadence;
pub mod cleanup;
pub mod context;
pub mod discovery;
pub mod dispatcher;
pub mod launcher;
pub mod producer;
pub mod reaper;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod status;
pub mod worker;

// 主要な型を再エクスポート
pub use self::admin::Admin;
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::cadence::{CadenceTier, DiscoveryCadence};
pub use self::cleanup::{StaleLinkSweep, SweepReport};
pub use self::context::{AppContext, FileBacked};
pub use self::discovery::DiscoveryLoop;
pub use self::dispatcher::Dispatcher;
pub use self::launcher::{TokioLauncher, WorkerLauncher};
pub use self::producer::{BatchReport, Producer, RejectReason, SubmitOutcome};
pub use self::reaper::{ReapReport, Reaper};
pub use self::registry::{RegistryError, StrategyRegistry};
pub use self::scheduler::TickLoop;
pub use self::session::SubmissionSession;
pub use self::status::{BacklogTier, PartitionView, QueueEntry, StatusQuery, StatusReport};
pub use self::worker::{RunOutcome, RunReport, WorkerRun, WorkerTicket};
