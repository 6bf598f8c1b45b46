//! Score - 挿入時に一度だけ計算される優先度スコア
//!
//! recency / compensation / source / role の四項目をそれぞれバケット化し、
//! 重み付きで合計する。挿入後に再計算はしない。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inputs extracted from a candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreInputs {
    pub posted_at: Option<DateTime<Utc>>,
    /// Upper end of the advertised annual compensation (USD).
    pub compensation: Option<u32>,
    /// Desirability of the source/company (0..=100).
    pub source_rating: Option<u32>,
    pub title: Option<String>,
}

/// Per-component scores and their weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub recency: u32,
    pub compensation: u32,
    pub source: u32,
    pub role: u32,
    pub total: u32,
}

impl fmt::Display for ScoreBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "recency={} compensation={} source={} role={} total={}",
            self.recency, self.compensation, self.source, self.role, self.total
        )
    }
}

/// Pluggable scoring function.
pub trait Scorer: Send + Sync {
    fn score(&self, inputs: &ScoreInputs, now: DateTime<Utc>) -> ScoreBreakdown;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub recency: f64,
    pub compensation: f64,
    pub source: f64,
    pub role: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            recency: 1.0,
            compensation: 1.0,
            source: 1.0,
            role: 1.0,
        }
    }
}

/// Title keyword tiers (matched case-insensitively as substrings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleKeywords {
    pub exact: Vec<String>,
    pub strong: Vec<String>,
    pub partial: Vec<String>,
}

impl Default for RoleKeywords {
    fn default() -> Self {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        Self {
            exact: owned(&[
                "research scientist",
                "research engineer",
                "founding engineer",
                "ai team lead",
            ]),
            strong: owned(&[
                "ml engineer",
                "machine learning engineer",
                "ai engineer",
                "applied scientist",
                "post-training",
                "pre-training",
                "rlhf",
                "alignment",
                "member of technical staff",
            ]),
            partial: owned(&["software engineer", "data scientist", "inference engineer"]),
        }
    }
}

/// The default bucketed scorer.
#[derive(Debug, Clone, Default)]
pub struct BucketScorer {
    weights: ScoreWeights,
    keywords: RoleKeywords,
}

impl BucketScorer {
    pub fn new(weights: ScoreWeights, keywords: RoleKeywords) -> Self {
        Self { weights, keywords }
    }

    pub fn recency(posted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u32 {
        let Some(posted_at) = posted_at else {
            return 30;
        };
        match (now - posted_at).num_days() {
            d if d <= 0 => 100,
            d if d <= 3 => 70,
            d if d <= 7 => 50,
            d if d <= 14 => 30,
            _ => 10,
        }
    }

    pub fn compensation(annual_usd: Option<u32>) -> u32 {
        match annual_usd {
            Some(v) if v >= 300_000 => 100,
            Some(v) if v >= 200_000 => 80,
            Some(v) if v >= 150_000 => 60,
            _ => 30,
        }
    }

    pub fn source(rating: Option<u32>) -> u32 {
        rating.map(|r| r.min(100)).unwrap_or(70)
    }

    pub fn role(&self, title: Option<&str>) -> u32 {
        let Some(title) = title else {
            return 40;
        };
        let title = title.to_lowercase();
        let hit = |tier: &[String]| tier.iter().any(|kw| title.contains(&kw.to_lowercase()));
        if hit(&self.keywords.exact) {
            100
        } else if hit(&self.keywords.strong) {
            80
        } else if hit(&self.keywords.partial) {
            60
        } else {
            40
        }
    }
}

impl Scorer for BucketScorer {
    fn score(&self, inputs: &ScoreInputs, now: DateTime<Utc>) -> ScoreBreakdown {
        let recency = Self::recency(inputs.posted_at, now);
        let compensation = Self::compensation(inputs.compensation);
        let source = Self::source(inputs.source_rating);
        let role = self.role(inputs.title.as_deref());

        let w = &self.weights;
        let total = f64::from(recency) * w.recency
            + f64::from(compensation) * w.compensation
            + f64::from(source) * w.source
            + f64::from(role) * w.role;

        ScoreBreakdown {
            recency,
            compensation,
            source,
            role,
            total: total.round().clamp(0.0, f64::from(u32::MAX)) as u32,
        }
    }
}

/// Parse free-text compensation ("$180K - $240K base", "200,000+") into the
/// largest annual figure it mentions.
///
/// Figures below 1000 without a `k` suffix are ignored (hourly rates, years).
pub fn parse_compensation(text: &str) -> Option<u32> {
    let cleaned = text.replace(',', "");
    let chars: Vec<char> = cleaned.chars().collect();
    let mut best: Option<u64> = None;
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        let number: String = chars[start..i].iter().collect();
        let Ok(value) = number.parse::<f64>() else {
            continue;
        };
        let value = match chars.get(i) {
            Some('k') | Some('K') => value * 1_000.0,
            Some('m') | Some('M') => value * 1_000_000.0,
            _ if value < 1_000.0 => continue,
            _ => value,
        };
        let value = value as u64;
        best = Some(best.map_or(value, |b| b.max(value)));
    }

    best.map(|v| v.min(u64::from(u32::MAX)) as u32)
}
