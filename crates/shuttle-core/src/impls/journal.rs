//! Journal - 追記専用の JSON Lines ファイル
//!
//! # 耐久性
//! - 一行 = 一レコード。書き込みごとに `sync_data`
//! - 再生時、改行で終わっていない末尾行（書き込み途中のクラッシュ）は捨てて切り詰める
//! - compaction は一時ファイルに書いてから rename で置き換える
//! - 失敗した append の残骸は確定済みの長さまで切り詰めてから次を書く
//!
//! 途中の行が壊れている場合は黙って読み飛ばさず `JournalError::Corrupt` を返す。

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::domain::ShuttleError;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("journal {path} line {line} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode journal record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<JournalError> for ShuttleError {
    fn from(err: JournalError) -> Self {
        ShuttleError::Infrastructure(err.to_string())
    }
}

/// Append-only log of `T` records.
pub struct Journal<T> {
    path: PathBuf,
    file: File,
    records: usize,
    /// Bytes of acknowledged records; anything past this is a failed append.
    len: u64,
    dirty: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> Journal<T> {
    /// Open (creating if missing) and replay every complete record.
    pub async fn open(path: impl Into<PathBuf>) -> Result<(Self, Vec<T>), JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await.map_err(|e| io(&path, e))?;
        }

        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io(&path, e)),
        };

        let (records, valid_len) = replay::<T>(&path, &bytes)?;
        if valid_len < bytes.len() {
            warn!(
                path = %path.display(),
                discarded_bytes = bytes.len() - valid_len,
                "discarding torn trailing journal record"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&path)
                .await
                .map_err(|e| io(&path, e))?;
            file.set_len(valid_len as u64)
                .await
                .map_err(|e| io(&path, e))?;
            file.sync_data().await.map_err(|e| io(&path, e))?;
        }

        let file = open_append(&path).await?;
        let journal = Self {
            path,
            file,
            records: records.len(),
            len: valid_len as u64,
            dirty: false,
            _marker: PhantomData,
        };
        Ok((journal, records))
    }

    /// Durably append one record.
    ///
    /// On failure the file is cut back to the last acknowledged record. If even
    /// that fails, the next append retries the cut before writing.
    pub async fn append(&mut self, record: &T) -> Result<(), JournalError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.rollback().await?;

        if let Err(e) = self.write_line(&line).await {
            self.dirty = true;
            if let Err(cut) = self.rollback().await {
                warn!(path = %self.path.display(), error = %cut, "could not cut back failed journal append");
            }
            return Err(e);
        }
        self.len += line.len() as u64;
        self.records += 1;
        Ok(())
    }

    async fn write_line(&mut self, line: &[u8]) -> Result<(), JournalError> {
        self.file.write_all(line).await.map_err(|e| io(&self.path, e))?;
        self.file.flush().await.map_err(|e| io(&self.path, e))?;
        self.file.sync_data().await.map_err(|e| io(&self.path, e))
    }

    /// Drop bytes left behind by a failed append.
    async fn rollback(&mut self) -> Result<(), JournalError> {
        if !self.dirty {
            return Ok(());
        }
        self.file.set_len(self.len).await.map_err(|e| io(&self.path, e))?;
        self.file.sync_data().await.map_err(|e| io(&self.path, e))?;
        self.dirty = false;
        warn!(path = %self.path.display(), len = self.len, "cut journal back after a failed append");
        Ok(())
    }

    /// Replace the journal with exactly `snapshot`.
    pub async fn compact<'a, I>(&mut self, snapshot: I) -> Result<(), JournalError>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let tmp = tmp_path(&self.path);
        let mut buf = Vec::new();
        let mut count = 0;
        for record in snapshot {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
            count += 1;
        }

        let mut out = File::create(&tmp).await.map_err(|e| io(&tmp, e))?;
        out.write_all(&buf).await.map_err(|e| io(&tmp, e))?;
        out.flush().await.map_err(|e| io(&tmp, e))?;
        out.sync_all().await.map_err(|e| io(&tmp, e))?;
        drop(out);

        fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io(&self.path, e))?;
        self.file = open_append(&self.path).await?;
        self.records = count;
        self.len = buf.len() as u64;
        self.dirty = false;
        Ok(())
    }

    /// Records currently in the file (replayed + appended).
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn replay<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<(Vec<T>, usize), JournalError> {
    let mut records = Vec::new();
    let mut offset = 0;
    let mut line_no = 0;

    while offset < bytes.len() {
        let Some(nl) = bytes[offset..].iter().position(|b| *b == b'\n') else {
            // 改行のない末尾 = 書き込み途中
            break;
        };
        line_no += 1;
        let line = &bytes[offset..offset + nl];
        let end = offset + nl + 1;
        if !line.iter().all(u8::is_ascii_whitespace) {
            match serde_json::from_slice(line) {
                Ok(record) => records.push(record),
                Err(source) if end == bytes.len() => {
                    warn!(path = %path.display(), line = line_no, error = %source, "unreadable final journal record");
                    break;
                }
                Err(source) => {
                    return Err(JournalError::Corrupt {
                        path: path.to_path_buf(),
                        line: line_no,
                        source,
                    });
                }
            }
        }
        offset = end;
    }

    Ok((records, offset))
}

async fn open_append(path: &Path) -> Result<File, JournalError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| io(path, e))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn io(path: &Path, source: std::io::Error) -> JournalError {
    JournalError::Io {
        path: path.to_path_buf(),
        source,
    }
}
