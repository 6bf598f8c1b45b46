//! Priority order of actionable postings.

use std::cmp::Ordering;

use super::posting::Posting;

/// Queue order: higher score first, then older `discovered_at`, then identity.
///
/// Total and deterministic, so every reader sees the same top element.
pub fn priority_order(a: &Posting, b: &Posting) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.discovered_at.cmp(&b.discovered_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort in queue order and keep at most `limit` items.
pub fn top_n(mut postings: Vec<Posting>, limit: usize) -> Vec<Posting> {
    postings.sort_by(priority_order);
    postings.truncate(limit);
    postings
}
