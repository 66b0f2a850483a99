//! Credential store with deferred persistence.
//!
//! Maps auth tokens to account ids. Mutations only mark the store dirty and
//! push a save deadline forward by the debounce window; a single background
//! loop ([`CredentialStore::run`]) writes the whole map once the deadline
//! passes without further changes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::Instant;

use crate::error::AppError;
use crate::storage::Storage;
use crate::utils::identifier::digest_part;

#[derive(Serialize)]
struct CredentialDocumentRef<'a> {
    users: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct CredentialDocument {
    users: HashMap<String, String>,
}

#[derive(Clone, Copy, Debug, Default)]
struct SaveState {
    /// `Some` while there are unsaved changes.
    deadline: Option<Instant>,
    generation: u64,
    locked: bool,
}

pub struct CredentialStore {
    path: PathBuf,
    storage: Arc<dyn Storage>,
    window: Duration,
    users: RwLock<HashMap<String, String>>,
    /// digest half of an account id -> account id
    digests: RwLock<HashMap<String, String>>,
    state: watch::Sender<SaveState>,
    /// Held for a whole save; writers share one temp file.
    save_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, storage: Arc<dyn Storage>, window: Duration) -> Self {
        CredentialStore {
            path: path.into(),
            storage,
            window,
            users: RwLock::new(HashMap::new()),
            digests: RwLock::new(HashMap::new()),
            state: watch::Sender::new(SaveState::default()),
            save_lock: Mutex::new(()),
        }
    }

    /// Bulk-inserts the persisted document, if any. Returns the number of entries read.
    pub async fn load(&self) -> Result<usize, AppError> {
        let Some(bytes) = self.storage.get(&self.path).await? else {
            tracing::info!("No credential store at {}, starting empty", self.path.display());
            return Ok(0);
        };
        let document: CredentialDocument = serde_json::from_slice(&bytes)?;
        let count = document.users.len();
        self.extend(document.users).await;
        tracing::info!("Loaded {count} credentials from {}", self.path.display());
        Ok(count)
    }

    pub async fn get(&self, token: &str) -> Option<String> {
        self.users.read().await.get(token).cloned()
    }

    pub async fn contains(&self, token: &str) -> bool {
        self.users.read().await.contains_key(token)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether an account id with this digest half is already known.
    pub async fn contains_digest(&self, digest: &str) -> bool {
        self.digests.read().await.contains_key(digest)
    }

    pub async fn account_ids(&self) -> Vec<String> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn insert(&self, token: String, account: String) -> Option<String> {
        let mut users = self.users.write().await;
        self.index_digest(&account).await;
        let previous = users.insert(token, account);
        self.mark_dirty();
        previous
    }

    /// Replaces the account of an existing token.
    pub async fn update(&self, token: &str, account: String) -> Option<String> {
        let mut users = self.users.write().await;
        let slot = users.get_mut(token)?;
        let previous = std::mem::replace(slot, account.clone());
        self.unindex_digest(&previous).await;
        self.index_digest(&account).await;
        self.mark_dirty();
        Some(previous)
    }

    pub async fn remove(&self, token: &str) -> Option<String> {
        let mut users = self.users.write().await;
        let removed = users.remove(token);
        if let Some(account) = &removed {
            self.unindex_digest(account).await;
        }
        self.mark_dirty();
        removed
    }

    /// Inserts `account`, or combines it with the present value through `combine`.
    pub async fn merge<F>(&self, token: &str, account: String, combine: F) -> String
    where
        F: FnOnce(&str, &str) -> String,
    {
        let mut users = self.users.write().await;
        let merged = match users.get(token) {
            Some(current) => combine(current, &account),
            None => account,
        };
        self.index_digest(&merged).await;
        users.insert(token.to_string(), merged.clone());
        self.mark_dirty();
        merged
    }

    pub async fn extend<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut users = self.users.write().await;
        let mut digests = self.digests.write().await;
        for (token, account) in entries {
            digests.insert(digest_part(&account).to_string(), account.clone());
            users.insert(token, account);
        }
        self.mark_dirty();
    }

    /// Suspends background saves, e.g. while the store is being bulk loaded.
    pub fn lock(&self) {
        self.state.send_modify(|state| state.locked = true);
    }

    pub fn unlock(&self) {
        self.state.send_modify(|state| state.locked = false);
    }

    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    pub fn is_dirty(&self) -> bool {
        self.state.borrow().deadline.is_some()
    }

    /// Writes the store now if it has unsaved changes. Returns whether a write happened.
    pub async fn flush(&self) -> Result<bool, AppError> {
        let _saving = self.save_lock.lock().await;
        let (bytes, generation, count) = {
            let users = self.users.read().await;
            let state = *self.state.borrow();
            if state.deadline.is_none() {
                return Ok(false);
            }
            let bytes = serde_json::to_vec(&CredentialDocumentRef { users: &users })?;
            (bytes, state.generation, users.len())
        };

        self.storage.put(&self.path, &bytes).await?;

        // changes made during the write keep the store dirty
        self.state.send_if_modified(|state| {
            if state.generation == generation {
                state.deadline = None;
                true
            } else {
                false
            }
        });
        tracing::info!("Saved credential store ({count} entries)");
        Ok(true)
    }

    /// Durability loop. Only returns when a save fails, and the caller must
    /// then stop serving.
    pub async fn run<F>(&self, after_save: F) -> Result<(), AppError>
    where
        F: Fn() + Send + Sync,
    {
        let mut rx = self.state.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            match state.deadline {
                Some(deadline) if !state.locked => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            if let Err(e) = self.flush().await {
                                tracing::error!("Failed to save credential store: {e}");
                                return Err(e);
                            }
                            after_save();
                        }
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
                _ => {
                    if rx.changed().await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn index_digest(&self, account: &str) {
        self.digests
            .write()
            .await
            .insert(digest_part(account).to_string(), account.to_string());
    }

    async fn unindex_digest(&self, account: &str) {
        let mut digests = self.digests.write().await;
        if digests.get(digest_part(account)).map(String::as_str) == Some(account) {
            digests.remove(digest_part(account));
        }
    }

    fn mark_dirty(&self) {
        let deadline = Instant::now() + self.window;
        self.state.send_modify(|state| {
            state.generation += 1;
            state.deadline = Some(deadline);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::driver::filesystem::FilesystemStorage;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::time::sleep;

    const WINDOW: Duration = Duration::from_millis(300);

    fn new_store(dir: &TempDir) -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(
            dir.path().join("user_db.json"),
            Arc::new(FilesystemStorage::new()),
            WINDOW,
        ))
    }

    fn spawn_loop(
        store: &Arc<CredentialStore>,
        saves: Arc<AtomicUsize>,
    ) -> tokio::task::JoinHandle<Result<(), AppError>> {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .run(move || {
                    saves.fetch_add(1, Ordering::SeqCst);
                })
                .await
        })
    }

    fn read_users(path: &Path) -> HashMap<String, String> {
        let bytes = std::fs::read(path).unwrap();
        serde_json::from_slice::<CredentialDocument>(&bytes).unwrap().users
    }

    async fn wait_for_saves(saves: &AtomicUsize, count: usize) {
        for _ in 0..100 {
            if saves.load(Ordering::SeqCst) >= count {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("store was not saved in time");
    }

    #[tokio::test]
    async fn test_mutations_are_batched_into_one_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        let saves = Arc::new(AtomicUsize::new(0));
        let handle = spawn_loop(&store, saves.clone());

        for i in 0..3 {
            store.insert(format!("token{i}"), format!("account{i}")).await;
            sleep(Duration::from_millis(30)).await;
        }
        assert!(!dir.path().join("user_db.json").exists());
        assert!(store.is_dirty());

        wait_for_saves(&saves, 1).await;
        let users = read_users(&dir.path().join("user_db.json"));
        assert_eq!(users.len(), 3);
        assert!(!store.is_dirty());

        sleep(WINDOW * 2).await;
        assert_eq!(saves.load(Ordering::SeqCst), 1);
        handle.abort();
    }

    #[tokio::test]
    async fn test_save_reflects_latest_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        let saves = Arc::new(AtomicUsize::new(0));
        let handle = spawn_loop(&store, saves.clone());

        store.insert("a".into(), "v1".into()).await;
        store.insert("b".into(), "gone".into()).await;
        assert_eq!(store.update("a", "v2".into()).await, Some("v1".to_string()));
        assert_eq!(store.update("missing", "x".into()).await, None);
        store.remove("b").await;
        store.merge("a", "+v3".into(), |old, new| format!("{old}{new}")).await;

        wait_for_saves(&saves, 1).await;
        let users = read_users(&dir.path().join("user_db.json"));
        assert_eq!(users, HashMap::from([("a".to_string(), "v2+v3".to_string())]));
        handle.abort();
    }

    #[tokio::test]
    async fn test_locked_store_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        let saves = Arc::new(AtomicUsize::new(0));
        let handle = spawn_loop(&store, saves.clone());

        store.lock();
        store.insert("a".into(), "v".into()).await;
        sleep(WINDOW * 3).await;
        assert_eq!(saves.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("user_db.json").exists());

        store.unlock();
        wait_for_saves(&saves, 1).await;
        assert_eq!(read_users(&dir.path().join("user_db.json")).len(), 1);
        handle.abort();
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        assert!(!store.flush().await.unwrap());

        let account = "900150983cd24fb0d6963f7d28e17f720000018f0a1b2c3d";
        store.insert("token".into(), account.into()).await;
        assert!(store.flush().await.unwrap());
        assert!(!store.flush().await.unwrap());

        let reloaded = new_store(&dir);
        assert_eq!(reloaded.load().await.unwrap(), 1);
        assert_eq!(reloaded.get("token").await.as_deref(), Some(account));
        assert!(reloaded.contains_digest("900150983cd24fb0d6963f7d28e17f72").await);
        assert!(!reloaded.contains_digest("00000000000000000000000000000000").await);
    }

    #[tokio::test]
    async fn test_remove_drops_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        let account = "900150983cd24fb0d6963f7d28e17f720000018f0a1b2c3d";
        store.insert("token".into(), account.into()).await;
        assert!(store.contains_digest(digest_part(account)).await);
        store.remove("token").await;
        assert!(!store.contains_digest(digest_part(account)).await);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_replaces_digest_and_ignores_missing_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        let old = "900150983cd24fb0d6963f7d28e17f720000018f0a1b2c3d";
        let new = "e2fc714c4727ee9395f324cd2e7f331f0000018f0a1b2c3d";

        assert_eq!(store.update("token", new.into()).await, None);
        assert!(!store.is_dirty());

        store.insert("token".into(), old.into()).await;
        assert!(store.flush().await.unwrap());
        assert_eq!(store.update("token", new.into()).await.as_deref(), Some(old));
        assert!(store.is_dirty());
        assert!(!store.contains_digest(digest_part(old)).await);
        assert!(store.contains_digest(digest_part(new)).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_flushes_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_store(&dir);
        for round in 0..50 {
            store
                .extend((0..500).map(|i| (format!("token{round}-{i}"), format!("account{i}"))))
                .await;
            let (first, second) = tokio::join!(store.flush(), store.flush());
            let wrote = [first.unwrap(), second.unwrap()];
            assert_eq!(wrote.iter().filter(|w| **w).count(), 1, "round {round}");
            assert!(!store.is_dirty());
        }
        assert_eq!(read_users(&dir.path().join("user_db.json")).len(), 50 * 500);
    }

    #[tokio::test]
    async fn test_failed_save_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let store = Arc::new(CredentialStore::new(
            blocker.join("user_db.json"),
            Arc::new(FilesystemStorage::new()),
            Duration::from_millis(20),
        ));
        let saves = Arc::new(AtomicUsize::new(0));
        let handle = spawn_loop(&store, saves.clone());

        store.insert("a".into(), "v".into()).await;
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(AppError::Io(_))));
        assert_eq!(saves.load(Ordering::SeqCst), 0);
    }
}
