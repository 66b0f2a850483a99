use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::AppError;
use crate::storage::Storage;
use crate::storage::account_index::{AccountIndex, UploadStatus};
use crate::storage::credentials::CredentialStore;
use crate::storage::driver::filesystem::FilesystemStorage;
use crate::storage::paths::PathManager;
use crate::utils::identifier;

type Result<T> = std::result::Result<T, AppError>;

/// Entry point for every account operation: resolves auth tokens through the
/// credential store and delegates file work to the account index.
pub struct AccountCoordinator {
    config: Arc<Config>,
    paths: PathManager,
    storage: Arc<dyn Storage>,
    credentials: Arc<CredentialStore>,
    index: Arc<AccountIndex>,
    registration: Mutex<()>,
}

impl AccountCoordinator {
    pub fn new(config: Arc<Config>) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(FilesystemStorage::new());
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: Arc<Config>, storage: Arc<dyn Storage>) -> Self {
        let paths = PathManager::new(&config.root_dir);
        let credentials = Arc::new(CredentialStore::new(
            paths.credential_path(),
            storage.clone(),
            config.save_debounce,
        ));
        let index = Arc::new(AccountIndex::new(
            paths.clone(),
            storage.clone(),
            config.quota_bytes,
            config.lock_timeout,
        ));
        AccountCoordinator {
            config,
            paths,
            storage,
            credentials,
            index,
            registration: Mutex::new(()),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn index(&self) -> &Arc<AccountIndex> {
        &self.index
    }

    /// Loads the credential store and makes sure every known account has an
    /// index. Background saves stay suspended until this is done.
    pub async fn startup(&self) -> Result<usize> {
        self.credentials.lock();
        let loaded = self.load_and_reconcile().await;
        self.credentials.unlock();

        self.storage.create_dir(&self.paths.accounts_path()).await?;
        let count = loaded?;
        tracing::info!("{count} entries in credential store");
        Ok(count)
    }

    async fn load_and_reconcile(&self) -> Result<usize> {
        let count = self.credentials.load().await?;
        for account in self.credentials.account_ids().await {
            self.index.validate_account(&account).await?;
        }
        self.index.cache_evict(self.config.startup_cache_limit());
        Ok(count)
    }

    /// Runs the credential durability loop; only returns on a failed save.
    pub async fn run_durability(&self) -> Result<()> {
        let index = self.index.clone();
        let limit = self.config.cache_limit;
        self.credentials
            .run(move || {
                index.cache_evict(limit);
            })
            .await
    }

    /// Writes pending credential changes, used on shutdown.
    pub async fn flush(&self) -> Result<()> {
        self.credentials.flush().await.map(|_| ())
    }

    pub async fn account_count(&self) -> usize {
        self.credentials.len().await
    }

    /// Registers a new account for `source_token` and returns its auth token.
    pub async fn register(&self, source_token: &str) -> Result<String> {
        let _registration = self.registration.lock().await;

        if self.credentials.len().await >= self.config.max_accounts {
            tracing::warn!("Registration refused, account limit {} reached", self.config.max_accounts);
            return Err(AppError::CapacityReached(self.config.max_accounts));
        }

        let digest = self.config.digest.digest_hex(source_token.as_bytes());
        if self.credentials.contains_digest(&digest).await {
            return Err(AppError::UserExists);
        }

        let identity = identifier::generate(self.config.digest, source_token);
        self.index.create_account(&identity.account_id).await?;
        self.credentials
            .insert(identity.auth_token.clone(), identity.account_id.clone())
            .await;

        tracing::info!("Registered account {}", identity.account_id);
        Ok(identity.auth_token)
    }

    pub async fn identify(&self, token: &str) -> Result<String> {
        self.credentials.get(token).await.ok_or(AppError::UserNotFound)
    }

    pub async fn upload(
        &self,
        token: &str,
        location: &str,
        name: &str,
        data: &str,
    ) -> Result<UploadStatus> {
        let account = self.identify(token).await?;
        self.index.upload(&account, location, name, data).await
    }

    pub async fn download(&self, token: &str, location: &str, name: &str) -> Result<String> {
        let account = self.identify(token).await?;
        self.index.download(&account, location, name).await
    }

    pub async fn list(&self, token: &str, location: &str) -> Result<Vec<String>> {
        let account = self.identify(token).await?;
        self.index.list(&account, location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn new_coordinator(max_accounts: usize) -> (TempDir, AccountCoordinator) {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::with_root(tmp.path());
        config.max_accounts = max_accounts;
        config.save_debounce = Duration::from_millis(50);
        (tmp, AccountCoordinator::new(Arc::new(config)))
    }

    #[tokio::test]
    async fn test_register_creates_account_and_index() {
        let (tmp, coordinator) = new_coordinator(4);
        let token = coordinator.register("abc").await.unwrap();
        assert_eq!(token.len(), 28);

        let account = coordinator.identify(&token).await.unwrap();
        assert!(account.starts_with("900150983cd24fb0d6963f7d28e17f72"));
        assert!(PathManager::new(tmp.path()).index_path(&account).exists());
        assert_eq!(coordinator.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let (_tmp, coordinator) = new_coordinator(4);
        coordinator.register("abc").await.unwrap();
        let err = coordinator.register("abc").await.unwrap_err();
        assert!(matches!(err, AppError::UserExists));
        assert_eq!(coordinator.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let (_tmp, coordinator) = new_coordinator(2);
        coordinator.register("a").await.unwrap();
        coordinator.register("b").await.unwrap();
        let err = coordinator.register("c").await.unwrap_err();
        assert!(matches!(err, AppError::CapacityReached(2)));
        assert_eq!(coordinator.account_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (_tmp, coordinator) = new_coordinator(4);
        assert!(matches!(coordinator.identify("nope").await, Err(AppError::UserNotFound)));
        assert!(matches!(
            coordinator.upload("nope", "docs", "f", "x").await,
            Err(AppError::UserNotFound)
        ));
        assert!(matches!(coordinator.list("nope", "docs").await, Err(AppError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_restart_restores_accounts() {
        let (tmp, coordinator) = new_coordinator(4);
        let token = coordinator.register("abc").await.unwrap();
        coordinator.upload(&token, "docs", "f.txt", "hello").await.unwrap();
        coordinator.flush().await.unwrap();

        let mut config = Config::with_root(tmp.path());
        config.save_debounce = Duration::from_millis(50);
        let restarted = AccountCoordinator::new(Arc::new(config));
        assert_eq!(restarted.startup().await.unwrap(), 1);
        assert!(!restarted.credentials().is_locked());

        assert_eq!(restarted.download(&token, "docs", "f.txt").await.unwrap(), "hello");
        assert!(matches!(restarted.register("abc").await, Err(AppError::UserExists)));
    }

    #[tokio::test]
    async fn test_startup_recreates_missing_index() {
        let (tmp, coordinator) = new_coordinator(4);
        let token = coordinator.register("abc").await.unwrap();
        let account = coordinator.identify(&token).await.unwrap();
        coordinator.flush().await.unwrap();

        let paths = PathManager::new(tmp.path());
        std::fs::remove_file(paths.index_path(&account)).unwrap();

        let restarted = AccountCoordinator::new(Arc::new(Config::with_root(tmp.path())));
        restarted.startup().await.unwrap();
        assert!(paths.index_path(&account).exists());
        assert!(restarted.list(&token, "docs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_durability_loop_persists_registrations() {
        let (tmp, coordinator) = new_coordinator(4);
        let coordinator = Arc::new(coordinator);
        coordinator.startup().await.unwrap();
        let background = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.run_durability().await })
        };

        let token = coordinator.register("abc").await.unwrap();
        let path = PathManager::new(tmp.path()).credential_path();
        for _ in 0..100 {
            if !coordinator.credentials().is_dirty() && path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains(&token));
        background.abort();
    }
}
