//! File-backed store: load once, mutate under a lock, rewrite atomically.

use crate::document::{Database, RetentionLimits};
use raffle_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct JsonStore {
    path: PathBuf,
    db: Mutex<Database>,
}

impl JsonStore {
    /// Open the document at `path`, creating an empty one if it does not exist.
    /// A file that exists but fails to parse is an error; it is never overwritten.
    pub async fn open(path: impl AsRef<Path>, limits: RetentionLimits) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut db = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Database::default(),
            Ok(content) => serde_json::from_str::<Database>(&content).map_err(|e| {
                Error::Internal(format!("corrupt store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Creating new store at {}", path.display());
                let db = Database::default();
                write_atomic(&path, &db).await?;
                db
            }
            Err(e) => return Err(e.into()),
        };
        db.set_limits(limits);

        info!(
            "Store {} loaded: {} giveaways, {} users, {} referrals",
            path.display(),
            db.giveaways.len(),
            db.users.len(),
            db.referrals.len()
        );

        Ok(Self {
            path,
            db: Mutex::new(db),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read-only closure against the current document.
    pub async fn read<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        let db = self.db.lock().await;
        f(&*db)
    }

    /// Clone of the whole document.
    pub async fn snapshot(&self) -> Database {
        self.read(|db| db.clone()).await
    }

    /// Mutate the document and persist it.
    ///
    /// The closure runs on a scratch copy; the copy replaces the live document
    /// only after it has been written to disk. On error nothing changes.
    pub async fn update<T>(&self, f: impl FnOnce(&mut Database) -> Result<T>) -> Result<T> {
        let mut guard = self.db.lock().await;
        let mut scratch = guard.clone();
        let out = f(&mut scratch)?;
        write_atomic(&self.path, &scratch).await?;
        *guard = scratch;
        Ok(out)
    }
}

async fn write_atomic(path: &Path, db: &Database) -> Result<()> {
    let json = serde_json::to_string_pretty(db)?;
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, json.as_bytes()).await?;
    tokio::fs::rename(&tmp, path).await?;
    debug!("Wrote {} bytes to {}", json.len(), path.display());
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "db.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
