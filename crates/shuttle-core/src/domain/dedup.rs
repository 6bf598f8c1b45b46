//! Dedup - 正規化キーの導出と重複判定の型
//!
//! 同じ求人はトラッキングパラメータ違い・末尾スラッシュ違い・`/application`
//! 付きなど複数の URL で現れる。ここで canonical key に畳み込む。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use super::errors::{Result, ShuttleError};
use super::ids::PostingId;
use super::state::PostingState;

/// Query parameters that only track where a click came from.
const TRACKING_PARAMS: &[&str] = &[
    "gh_src",
    "ref",
    "refs",
    "source",
    "src",
    "lever-source",
    "lever-origin",
    "gclid",
    "fbclid",
    "mc_cid",
    "mc_eid",
    "_hsenc",
    "_hsmi",
    "trk",
    "trackingid",
];

/// Path tails that denote a listing page rather than one posting.
const LISTING_SEGMENTS: &[&str] = &["jobs", "careers"];

/// Hosts whose first path segment is a company board root.
const BOARD_HOSTS: &[&str] = &["greenhouse.io", "lever.co", "ashbyhq.com"];

/// A canonical identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_company_title(&self) -> bool {
        self.0.starts_with("ct:")
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<DedupKey> for PostingId {
    fn from(key: DedupKey) -> Self {
        PostingId::new(key.0)
    }
}

impl From<&PostingId> for DedupKey {
    fn from(id: &PostingId) -> Self {
        DedupKey(id.as_str().to_string())
    }
}

/// Last known outcome recorded for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DedupOutcome {
    Pending,
    Applied,
    Skipped,
}

impl DedupOutcome {
    /// `Applied` / `Skipped` mean the producer must never re-insert.
    pub fn is_hard_stop(self) -> bool {
        !matches!(self, DedupOutcome::Pending)
    }
}

impl From<PostingState> for DedupOutcome {
    fn from(state: PostingState) -> Self {
        match state {
            PostingState::Applied => DedupOutcome::Applied,
            PostingState::Skipped => DedupOutcome::Skipped,
            _ => DedupOutcome::Pending,
        }
    }
}

impl fmt::Display for DedupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupOutcome::Pending => f.write_str("PENDING"),
            DedupOutcome::Applied => f.write_str("APPLIED"),
            DedupOutcome::Skipped => f.write_str("SKIPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupEntry {
    pub key: DedupKey,
    /// The stored posting this key resolves to.
    pub posting: PostingId,
    pub outcome: DedupOutcome,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupLookup {
    New,
    Seen(DedupEntry),
}

/// A normalized URL plus whether it identifies a single posting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    pub key: String,
    pub ambiguous: bool,
}

/// Normalize a posting URL.
///
/// - scheme/host are lowercased (the `url` parser does this), fragment dropped
/// - tracking parameters removed, remaining parameters sorted
/// - trailing `/application` and trailing slash removed
pub fn normalize_url(raw: &str) -> Result<NormalizedUrl> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ShuttleError::InvalidCandidate(format!("unparseable url '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ShuttleError::InvalidCandidate(format!(
            "unsupported url scheme '{}'",
            url.scheme()
        )));
    }
    let Some(host) = url.host_str() else {
        return Err(ShuttleError::InvalidCandidate(format!("url without host '{raw}'")));
    };
    let host = host.to_lowercase();

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_tracking_param(name))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    let mut path = url.path().trim_end_matches('/').to_string();
    if let Some(stripped) = path.strip_suffix("/application") {
        path = stripped.trim_end_matches('/').to_string();
    }

    let mut key = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        key.push_str(&format!(":{port}"));
    }
    key.push_str(&path);
    if !params.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        key.push('?');
        key.push_str(&query);
    }

    let ambiguous = params.is_empty() && is_listing_path(&host, &path);
    Ok(NormalizedUrl { key, ambiguous })
}

fn is_tracking_param(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("utm_") || TRACKING_PARAMS.contains(&name.as_str())
}

fn is_listing_path(host: &str, path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => true,
        [.., last] if LISTING_SEGMENTS.contains(&last.to_ascii_lowercase().as_str()) => true,
        [_board] => BOARD_HOSTS
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{h}"))),
        _ => false,
    }
}

/// `ct:{company}|{title}`, lowercased with whitespace collapsed.
///
/// Returns `None` unless both parts are non-blank.
pub fn company_title_key(company: Option<&str>, title: Option<&str>) -> Option<DedupKey> {
    let company = collapse(company?);
    let title = collapse(title?);
    if company.is_empty() || title.is_empty() {
        return None;
    }
    Some(DedupKey(format!("ct:{company}|{title}")))
}

fn collapse(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Primary and secondary keys of a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateKeys {
    pub primary: DedupKey,
    pub secondary: Option<DedupKey>,
    /// Normalized URL (also when it is not the primary key).
    pub url: String,
}

impl CandidateKeys {
    pub fn iter(&self) -> impl Iterator<Item = &DedupKey> {
        std::iter::once(&self.primary).chain(
            self.secondary
                .iter()
                .filter(move |k| **k != self.primary),
        )
    }
}

/// Derive the identity keys of a candidate.
///
/// An ambiguous URL falls back to the company+title key as primary identity;
/// without company and title such a candidate cannot be identified.
pub fn derive_keys(url: &str, company: Option<&str>, title: Option<&str>) -> Result<CandidateKeys> {
    let normalized = normalize_url(url)?;
    let secondary = company_title_key(company, title);

    let primary = if normalized.ambiguous {
        secondary.clone().ok_or_else(|| {
            ShuttleError::InvalidCandidate(format!(
                "listing url '{}' needs company and title",
                normalized.key
            ))
        })?
    } else {
        DedupKey(normalized.key.clone())
    };

    Ok(CandidateKeys {
        primary,
        secondary,
        url: normalized.key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::utm(
        "https://boards.greenhouse.io/acme/jobs/123?utm_source=linkedin&utm_medium=x",
        "https://boards.greenhouse.io/acme/jobs/123"
    )]
    #[case::trailing_slash(
        "https://jobs.lever.co/acme/abc-def/",
        "https://jobs.lever.co/acme/abc-def"
    )]
    #[case::application_suffix(
        "https://jobs.lever.co/acme/abc-def/application?lever-source=LinkedIn",
        "https://jobs.lever.co/acme/abc-def"
    )]
    #[case::host_case_and_fragment(
        "HTTPS://Jobs.AshbyHQ.com/acme/42#apply",
        "https://jobs.ashbyhq.com/acme/42"
    )]
    #[case::sorted_query(
        "https://acme.com/careers?gh_jid=9&b=2&gh_src=abc",
        "https://acme.com/careers?b=2&gh_jid=9"
    )]
    fn normalizes_variants(#[case] raw: &str, #[case] expected: &str) {
        let n = normalize_url(raw).unwrap();
        assert_eq!(n.key, expected);
        assert!(!n.ambiguous);
    }

    #[rstest]
    #[case::root("https://acme.com/")]
    #[case::jobs_page("https://acme.com/about/jobs")]
    #[case::careers_page("https://acme.com/careers/?utm_campaign=x")]
    #[case::board_root("https://boards.greenhouse.io/acme")]
    fn listing_pages_are_ambiguous(#[case] raw: &str) {
        assert!(normalize_url(raw).unwrap().ambiguous);
    }

    #[rstest]
    #[case::mailto("mailto:jobs@acme.com")]
    #[case::ftp("ftp://acme.com/jobs/1")]
    #[case::garbage("not a url")]
    fn rejects_non_http(#[case] raw: &str) {
        assert!(matches!(
            normalize_url(raw),
            Err(ShuttleError::InvalidCandidate(_))
        ));
    }

    #[test]
    fn company_title_key_collapses_whitespace() {
        let k = company_title_key(Some("  Acme   Corp "), Some("Senior\tEngineer")).unwrap();
        assert_eq!(k.as_str(), "ct:acme corp|senior engineer");
        assert!(k.is_company_title());
        assert!(company_title_key(Some("Acme"), Some("  ")).is_none());
        assert!(company_title_key(None, Some("Engineer")).is_none());
    }

    #[test]
    fn ambiguous_url_falls_back_to_company_title() {
        let keys = derive_keys("https://acme.com/careers", Some("Acme"), Some("SRE")).unwrap();
        assert_eq!(keys.primary.as_str(), "ct:acme|sre");
        assert_eq!(keys.iter().count(), 1);

        let err = derive_keys("https://acme.com/careers", None, Some("SRE")).unwrap_err();
        assert!(matches!(err, ShuttleError::InvalidCandidate(_)));
    }

    #[test]
    fn specific_url_keeps_both_keys() {
        let keys =
            derive_keys("https://jobs.lever.co/acme/1?ref=hn", Some("Acme"), Some("SRE")).unwrap();
        assert_eq!(keys.primary.as_str(), "https://jobs.lever.co/acme/1");
        let all: Vec<_> = keys.iter().map(|k| k.as_str().to_string()).collect();
        assert_eq!(all, vec!["https://jobs.lever.co/acme/1", "ct:acme|sre"]);
    }

    #[test]
    fn final_states_are_hard_stops() {
        assert!(DedupOutcome::from(PostingState::Applied).is_hard_stop());
        assert!(DedupOutcome::from(PostingState::Skipped).is_hard_stop());
        assert!(!DedupOutcome::from(PostingState::Deferred).is_hard_stop());
    }
}
