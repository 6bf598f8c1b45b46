//! LinkChecker port - PENDING posting のリンク切れ判定

use async_trait::async_trait;

use crate::domain::{Liveness, Result};

/// Checks whether a posting URL still points at an open posting.
///
/// `Dead` must mean confirmed closed (404, redirect to a listing page, ...).
/// Anything uncertain is `Alive` or an error; the sweep never deletes on doubt.
#[async_trait]
pub trait LinkChecker: Send + Sync {
    async fn check(&self, url: &str) -> Result<Liveness>;
}
