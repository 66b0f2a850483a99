use std::path::Path;

use tokio::io;

pub mod account_index;
pub mod credentials;
pub mod driver;
pub mod locks;
pub mod paths;

/// Whole-document file backend. Keys are paths produced by [`paths::PathManager`].
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Reads the whole object, `None` if it does not exist.
    async fn get(&self, path: &Path) -> io::Result<Option<Vec<u8>>>;
    /// Replaces the object atomically, creating parent directories as needed.
    async fn put(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    async fn exists(&self, path: &Path) -> io::Result<bool>;
    async fn create_dir(&self, path: &Path) -> io::Result<()>;
}
