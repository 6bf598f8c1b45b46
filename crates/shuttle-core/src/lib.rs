//! shuttle-core
//!
//! Core building blocks of the shuttle discovery-to-submission runtime.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, partition, state, posting, dedup, score, outcome, decision, errors）
//! - **ports**: 抽象化レイヤー（PostingStore, DedupIndex, LockManager, SubmissionStrategy, Clock, など）
//! - **impls**: 実装（in-memory と journal ファイル）
//! - **app**: アプリケーションロジック（producer, dispatcher, worker, reaper, status, admin, など）
//! - **config**: YAML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
