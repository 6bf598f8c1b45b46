//! InboxSource - inbox ディレクトリの `*.jsonl` を候補として読む
//!
//! 1 行 1 候補。読み終えたファイルは `.done` に rename する。
//! 壊れた行は warn して飛ばす（ファイル全体は捨てない）。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use shuttle_core::domain::{Candidate, Result};
use shuttle_core::ports::CandidateSource;

pub struct InboxSource {
    dir: PathBuf,
}

impl InboxSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn pending_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn parse_lines(path: &Path, text: &str) -> Vec<Candidate> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<Candidate>(line) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                warn!(file = %path.display(), line = n + 1, error = %e, "skipping malformed candidate");
                None
            }
        })
        .collect()
}

#[async_trait]
impl CandidateSource for InboxSource {
    fn name(&self) -> &str {
        "inbox"
    }

    async fn fetch(&self) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();
        for path in self.pending_files().await? {
            let text = tokio::fs::read_to_string(&path).await?;
            let parsed = parse_lines(&path, &text);
            debug!(file = %path.display(), candidates = parsed.len(), "inbox file read");
            candidates.extend(parsed);
            tokio::fs::rename(&path, path.with_extension("jsonl.done")).await?;
        }
        Ok(candidates)
    }
}
