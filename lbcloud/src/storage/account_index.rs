//! Per-account file index.
//!
//! Every account owns one index document listing its namespaces, the files
//! uploaded into each of them in upload order, and the running byte total.
//! All operations on one account run under that account's lock; the index is
//! rewritten on every mutation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::domain::index_model::{FileRecord, IndexDocument, SCHEMA_VERSION};
use crate::error::AppError;
use crate::storage::Storage;
use crate::storage::locks::AccountLocks;
use crate::storage::paths::PathManager;
use crate::utils::validation::is_valid_segment;

type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Ok,
    LimitExceeded,
}

pub struct AccountIndex {
    paths: PathManager,
    storage: Arc<dyn Storage>,
    locks: AccountLocks,
    /// account id -> index document path
    handles: Mutex<HashMap<String, PathBuf>>,
    quota_bytes: u64,
}

impl AccountIndex {
    pub fn new(
        paths: PathManager,
        storage: Arc<dyn Storage>,
        quota_bytes: u64,
        lock_timeout: Duration,
    ) -> Self {
        AccountIndex {
            paths,
            storage,
            locks: AccountLocks::new(lock_timeout),
            handles: Mutex::new(HashMap::new()),
            quota_bytes,
        }
    }

    /// Creates the account directory and an empty index unless one exists.
    pub async fn create_account(&self, account: &str) -> Result<()> {
        let _guard = self.locks.acquire(account).await?;
        self.load_or_create(account).await.map(|_| ())
    }

    /// Startup reconciliation for accounts known to the credential store.
    pub async fn validate_account(&self, account: &str) -> Result<()> {
        let _guard = self.locks.acquire(account).await?;
        if !self.storage.exists(&self.index_handle(account)).await? {
            tracing::warn!("Index missing for known account {account}, recreating it");
            self.load_or_create(account).await?;
        }
        Ok(())
    }

    pub async fn upload(
        &self,
        account: &str,
        namespace: &str,
        name: &str,
        data: &str,
    ) -> Result<UploadStatus> {
        check_names(namespace, name)?;
        let _guard = self.locks.acquire(account).await?;
        let mut index = self.load_or_create(account).await?;

        let size = data.len() as u64;
        if index.total_size.saturating_add(size) > self.quota_bytes {
            tracing::warn!(
                "Upload of {size} bytes rejected for {account}: {} of {} bytes used",
                index.total_size,
                self.quota_bytes
            );
            return Ok(UploadStatus::LimitExceeded);
        }

        // payload before index: a crash in between leaves an unreferenced file
        // rather than an index entry without content
        let content_path = self.paths.content_path(account, namespace, name);
        self.storage.put(&content_path, data.as_bytes()).await?;

        index.namespace_mut_or_insert(namespace).files.push(FileRecord {
            version: SCHEMA_VERSION,
            name: name.to_string(),
            upload_time: Utc::now().timestamp_millis(),
        });
        index.total_size += size;
        self.write_index(account, &index).await?;

        tracing::info!("Uploaded {namespace}/{name} ({size} bytes) for {account}");
        Ok(UploadStatus::Ok)
    }

    pub async fn download(&self, account: &str, namespace: &str, name: &str) -> Result<String> {
        let not_found = || AppError::FileNotFound {
            location: namespace.to_string(),
            name: name.to_string(),
        };
        // such names are never stored
        if check_names(namespace, name).is_err() {
            return Err(not_found());
        }

        let _guard = self.locks.acquire(account).await?;
        let index = self.load_or_create(account).await?;
        if index.file(namespace, name).is_none() {
            return Err(not_found());
        }

        let content_path = self.paths.content_path(account, namespace, name);
        let Some(bytes) = self.storage.get(&content_path).await? else {
            tracing::error!("Index of {account} references missing payload {namespace}/{name}");
            return Err(not_found());
        };
        let data = String::from_utf8(bytes).map_err(|e| AppError::Others(e.to_string()))?;

        tracing::debug!("Downloaded {namespace}/{name} ({} bytes) for {account}", data.len());
        Ok(data)
    }

    /// File names of a namespace in upload order; empty when the namespace is unknown.
    pub async fn list(&self, account: &str, namespace: &str) -> Result<Vec<String>> {
        let _guard = self.locks.acquire(account).await?;
        let index = self.load_or_create(account).await?;
        Ok(index.file_names(namespace))
    }

    /// Bytes accepted so far for the account.
    pub async fn usage(&self, account: &str) -> Result<u64> {
        let _guard = self.locks.acquire(account).await?;
        Ok(self.load_or_create(account).await?.total_size)
    }

    /// Clears the whole handle cache once it holds more than `limit` entries.
    pub fn cache_evict(&self, limit: usize) -> bool {
        let Ok(mut handles) = self.handles.lock() else {
            return false;
        };
        if handles.len() <= limit {
            return false;
        }
        handles.clear();
        let pruned = self.locks.prune_idle();
        tracing::info!("Cleared index handle cache, pruned {pruned} idle account locks");
        true
    }

    pub fn cached_handles(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or_default()
    }

    fn index_handle(&self, account: &str) -> PathBuf {
        match self.handles.lock() {
            Ok(mut handles) => handles
                .entry(account.to_string())
                .or_insert_with(|| self.paths.index_path(account))
                .clone(),
            Err(_) => self.paths.index_path(account),
        }
    }

    /// Must be called with the account lock held.
    async fn load_or_create(&self, account: &str) -> Result<IndexDocument> {
        let path = self.index_handle(account);
        match self.storage.get(&path).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => {
                let index = IndexDocument::default();
                self.storage.create_dir(&self.paths.account_path(account)).await?;
                self.write_index(account, &index).await?;
                tracing::info!("Created index for {account}");
                Ok(index)
            }
        }
    }

    async fn write_index(&self, account: &str, index: &IndexDocument) -> Result<()> {
        let bytes = serde_json::to_vec(index)?;
        self.storage.put(&self.index_handle(account), &bytes).await?;
        Ok(())
    }
}

fn check_names(namespace: &str, name: &str) -> Result<()> {
    for segment in [namespace, name] {
        if !is_valid_segment(segment) {
            return Err(AppError::InvalidName(segment.to_string()));
        }
    }
    Ok(())
}
