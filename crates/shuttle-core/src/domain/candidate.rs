//! Candidate - 発見側（source）から渡される未加工の求人

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::posting::PostingMeta;

/// A posting as reported by a discovery source, before dedup and scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,

    /// Explicit partition; detected from the URL when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Free-text compensation ("$180K - $240K").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Candidate {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn with_company_title(mut self, company: impl Into<String>, title: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self.title = Some(title.into());
        self
    }

    pub fn with_compensation(mut self, compensation: impl Into<String>) -> Self {
        self.compensation = Some(compensation.into());
        self
    }

    pub fn with_posted_at(mut self, posted_at: DateTime<Utc>) -> Self {
        self.posted_at = Some(posted_at);
        self
    }

    pub fn meta(&self) -> PostingMeta {
        PostingMeta {
            company: self.company.clone(),
            title: self.title.clone(),
            location: self.location.clone(),
            compensation: self.compensation.clone(),
            source: self.source.clone(),
        }
    }
}
