//! CandidateSource port - 発見側の黒箱

use async_trait::async_trait;

use crate::domain::{Candidate, Result};

#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;

    /// Candidates found since the previous call.
    async fn fetch(&self) -> Result<Vec<Candidate>>;
}
