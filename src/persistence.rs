use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::{
    fs::{self, create_dir_all, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};

use crate::error::TrackerError;
use crate::ledger::Ledger;

/// Whole-file JSON store for the ledger with a `.backup` sibling.
///
/// Every mutation is a full read-modify-write round trip; `update` and
/// `reset` hold `write_lock` for the whole cycle so concurrent writers never
/// interleave. Plain reads take no lock because writes land via rename.
pub struct LedgerStore {
    path: PathBuf,
    backup_path: PathBuf,
    write_lock: Mutex<()>,
}

impl LedgerStore {
    /// Creates the parent directory and an empty `{}` document if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create data directory {}", parent.display()))?;
        }
        if fs::metadata(&path).await.is_err() {
            fs::write(&path, b"{}")
                .await
                .with_context(|| format!("failed to initialise {}", path.display()))?;
        }
        let backup_path = sibling(&path, "backup");
        Ok(Self {
            path,
            backup_path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Loads the ledger. Anything unreadable is treated as an empty ledger.
    pub async fn read(&self) -> Ledger {
        match self.try_read().await {
            Ok(ledger) => ledger,
            Err(err) => {
                tracing::warn!(error = %err, "treating ledger store as empty");
                Ledger::new()
            }
        }
    }

    async fn try_read(&self) -> std::result::Result<Ledger, TrackerError> {
        let corrupt = |reason: String| TrackerError::PersistenceCorrupt {
            path: self.path.display().to_string(),
            reason,
        };
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Ledger::new()),
            Err(err) => return Err(corrupt(err.to_string())),
        };
        if raw.trim().is_empty() {
            return Ok(Ledger::new());
        }
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|err| corrupt(err.to_string()))?;
        if !value.is_object() {
            return Err(corrupt("top level is not an object".into()));
        }
        serde_json::from_value(value).map_err(|err| corrupt(err.to_string()))
    }

    /// Persists `ledger`, keeping the previous document as `.backup`. On a
    /// failed write the live file is restored from the backup.
    pub async fn write(&self, ledger: &Ledger) -> std::result::Result<(), TrackerError> {
        let _guard = self.write_lock.lock().await;
        self.write_locked(ledger).await
    }

    /// Serialized read-modify-write. Returns the ledger as written.
    pub async fn update<F>(&self, mutate: F) -> std::result::Result<Ledger, TrackerError>
    where
        F: FnOnce(&mut Ledger),
    {
        let _guard = self.write_lock.lock().await;
        let mut ledger = self.read().await;
        mutate(&mut ledger);
        self.write_locked(&ledger).await?;
        Ok(ledger)
    }

    /// Replaces the stored ledger with an empty one.
    pub async fn reset(&self) -> std::result::Result<(), TrackerError> {
        let _guard = self.write_lock.lock().await;
        self.write_locked(&Ledger::new()).await?;
        tracing::info!(path = %self.path.display(), "ledger reset");
        Ok(())
    }

    async fn write_locked(&self, ledger: &Ledger) -> std::result::Result<(), TrackerError> {
        let value = serde_json::to_value(ledger)
            .map_err(|err| TrackerError::InvalidLedger(err.to_string()))?;
        if !value.is_object() {
            return Err(TrackerError::InvalidLedger(
                "ledger did not serialize to an object".into(),
            ));
        }
        let body = serde_json::to_vec_pretty(&value)
            .map_err(|err| TrackerError::InvalidLedger(err.to_string()))?;

        self.refresh_backup().await;

        if let Err(source) = self.replace_contents(&body).await {
            tracing::error!(error = %source, path = %self.path.display(), "ledger write failed");
            self.restore_backup().await;
            return Err(TrackerError::PersistenceWriteFailed {
                path: self.path.display().to_string(),
                source,
            });
        }

        self.verify(ledger.len()).await;
        tracing::debug!(entries = ledger.len(), "ledger saved");
        Ok(())
    }

    /// Copies the live file to `.backup` only when it holds a readable
    /// ledger; otherwise the previous backup stays the last good copy.
    async fn refresh_backup(&self) {
        match fs::read_to_string(&self.path).await {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
            Ok(raw) if raw.trim().is_empty() => {
                tracing::warn!(path = %self.path.display(), "ledger file empty, backup left untouched");
                return;
            }
            _ => {}
        }
        if let Err(err) = self.try_read().await {
            tracing::warn!(error = %err, backup = %self.backup_path.display(), "backup left untouched");
            return;
        }
        if let Err(err) = fs::copy(&self.path, &self.backup_path).await {
            tracing::warn!(error = %err, backup = %self.backup_path.display(), "ledger backup failed");
        }
    }

    async fn replace_contents(&self, body: &[u8]) -> std::io::Result<()> {
        let tmp = sibling(&self.path, "tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .await?;
        file.write_all(body).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        match fs::rename(&tmp, &self.path).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = fs::remove_file(&tmp).await;
                Err(err)
            }
        }
    }

    async fn restore_backup(&self) {
        if fs::metadata(&self.backup_path).await.is_err() {
            return;
        }
        match fs::copy(&self.backup_path, &self.path).await {
            Ok(_) => tracing::info!(path = %self.path.display(), "ledger restored from backup"),
            Err(err) => tracing::error!(error = %err, "failed to restore ledger from backup"),
        }
    }

    async fn verify(&self, expected_entries: usize) {
        let saved = self.read().await;
        if saved.len() < expected_entries {
            tracing::warn!(
                expected = expected_entries,
                saved = saved.len(),
                "ledger lost entries on save"
            );
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
