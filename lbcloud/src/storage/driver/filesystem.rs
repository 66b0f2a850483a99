use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::storage::Storage;

use tokio::{
    fs::{self, File, create_dir_all, rename},
    io::{self, AsyncWriteExt, BufWriter},
};

#[derive(Default)]
pub struct FilesystemStorage;

impl FilesystemStorage {
    pub fn new() -> Self {
        FilesystemStorage
    }

    async fn create_path(&self, path: &Path) -> io::Result<PathBuf> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }
        Ok(path.to_path_buf())
    }
}

/// Sibling used for write-then-rename, e.g. `.fsi.json` -> `..fsi.json.tmp`.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait::async_trait]
impl Storage for FilesystemStorage {
    async fn get(&self, path: &Path) -> io::Result<Option<Vec<u8>>> {
        match fs::read(path).await {
            Ok(buf) => Ok(Some(buf)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let file_path = self.create_path(path).await?;
        let tmp_path = temp_path(&file_path);

        let file = File::create(&tmp_path).await?;
        let mut file_writer = BufWriter::new(file);
        file_writer.write_all(data).await?;
        file_writer.flush().await?;
        file_writer.get_ref().sync_all().await?;
        drop(file_writer);

        rename(tmp_path, file_path).await
    }

    async fn exists(&self, path: &Path) -> io::Result<bool> {
        fs::try_exists(path).await
    }

    async fn create_dir(&self, path: &Path) -> io::Result<()> {
        create_dir_all(path).await
    }
}
