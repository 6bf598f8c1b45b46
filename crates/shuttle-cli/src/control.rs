//! Control directory - daemon への運用リクエスト
//!
//! Lock Manager はプロセス内にしかないので、daemon が動いている間の運用操作は
//! daemon 自身に実行させる。
//!
//! - `state_dir/daemon.pid` の advisory lock (flock) を持つプロセスが state_dir の唯一の書き手
//!   （プロセスが死ねばカーネルが解放するので、残ったファイルは次の起動を妨げない）
//! - クライアントは `control/<name>.json` を置き、`control/<name>.reply` を待つ
//! - どちらのファイルも tmp に書いてから rename する（読み手が途中を見ない）

use anyhow::{Context, bail};
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::runtime::{ControlRequest, Runtime};

pub const CONTROL_DIR: &str = "control";
pub const OWNER_FILE: &str = "daemon.pid";

const REQUEST_EXT: &str = "json";
const REPLY_EXT: &str = "reply";
const CLIENT_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlReply {
    Ok(serde_json::Value),
    Error(String),
}

/// Exclusive ownership of a state dir; the lock goes with the file handle.
///
/// The owner file itself is never removed: unlinking a locked file would let a
/// second process lock the orphaned inode while a third creates a fresh one.
pub struct StateOwner {
    file: File,
}

impl StateOwner {
    /// Fails with `AlreadyExists` while another live process owns the dir.
    pub fn acquire(state_dir: &Path) -> std::io::Result<Self> {
        let path = state_dir.join(OWNER_FILE);
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.raw_os_error() != fs2::lock_contended_error().raw_os_error() {
                return Err(e);
            }
            let mut pid = String::new();
            let _ = file.read_to_string(&mut pid);
            return Err(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} is locked by pid {}", path.display(), pid.trim()),
            ));
        }

        // 前の持ち主の pid が残っていれば上書き
        file.set_len(0)?;
        file.rewind()?;
        writeln!(file, "{}", std::process::id())?;
        file.sync_data()?;
        Ok(Self { file })
    }
}

impl Drop for StateOwner {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = %e, "failed to unlock owner file");
        }
    }
}

/// Hand a request to the daemon owning `state_dir` and wait for its reply.
pub async fn forward(
    state_dir: &Path,
    request: &ControlRequest,
    wait: Duration,
) -> anyhow::Result<serde_json::Value> {
    let dir = state_dir.join(CONTROL_DIR);
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let name = format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%6f"), std::process::id());
    let path = dir.join(&name).with_extension(REQUEST_EXT);
    let reply_path = dir.join(&name).with_extension(REPLY_EXT);
    write_atomic(&path, &serde_json::to_vec(request)?).await?;

    let deadline = Instant::now() + wait;
    loop {
        match tokio::fs::read(&reply_path).await {
            Ok(bytes) => {
                let _ = tokio::fs::remove_file(&reply_path).await;
                return match serde_json::from_slice::<ControlReply>(&bytes)? {
                    ControlReply::Ok(value) => Ok(value),
                    ControlReply::Error(message) => bail!("daemon: {message}"),
                };
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("failed to read control reply"),
        }
        if Instant::now() >= deadline {
            let _ = tokio::fs::remove_file(&path).await;
            bail!(
                "no reply from the daemon within {wait:?}; check the process holding {}",
                state_dir.join(OWNER_FILE).display()
            );
        }
        tokio::time::sleep(CLIENT_POLL).await;
    }
}

/// Daemon side: answer requests until shutdown.
pub fn serve(
    runtime: Arc<Runtime>,
    dir: PathBuf,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = serve_pending(&runtime, &dir).await {
                warn!(dir = %dir.display(), error = %e, "control poll failed");
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(every) => {}
            }
        }
        info!("control loop stopped");
    })
}

async fn serve_pending(runtime: &Runtime, dir: &Path) -> anyhow::Result<usize> {
    let mut requests = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == REQUEST_EXT) {
            requests.push(path);
        }
    }
    requests.sort();

    for path in &requests {
        let reply = match read_request(path).await {
            Ok(request) => {
                info!(request = ?request, "control request");
                match runtime.execute(request).await {
                    Ok(value) => ControlReply::Ok(value),
                    Err(e) => ControlReply::Error(format!("{e:#}")),
                }
            }
            Err(e) => ControlReply::Error(format!("{e:#}")),
        };
        write_atomic(&path.with_extension(REPLY_EXT), &serde_json::to_vec(&reply)?).await?;
        tokio::fs::remove_file(path).await?;
    }
    Ok(requests.len())
}

async fn read_request(path: &Path) -> anyhow::Result<ControlRequest> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).with_context(|| format!("malformed request {}", path.display()))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to rename {}", tmp.display()))?;
    Ok(())
}
