// PathManager maps accounts, namespaces and file names to paths below the root.
//
// The path layout in the storage backend is as follows:
//
//	<root>
//	├── user_db.json
//	└── userfs
//	    └── <account id>
//	        ├── .fsi.json
//	        └── <namespace>
//	            └── <name>
//
// `user_db.json` is the credential document. Each account directory holds its
// index document (`.fsi.json`) next to one directory per namespace, whose
// files carry the raw payloads.

use std::path::{Path, PathBuf};

const CREDENTIAL_FILE: &str = "user_db.json";
const ACCOUNTS_DIR: &str = "userfs";
const INDEX_FILE: &str = ".fsi.json";

#[derive(Clone, Debug)]
pub struct PathManager {
    root_path: PathBuf,
}

impl PathManager {
    pub fn new(root: impl AsRef<Path>) -> Self {
        PathManager {
            root_path: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the path to the credential document,
    /// (e.g. `<root>/user_db.json`).
    pub fn credential_path(&self) -> PathBuf {
        self.root_path.join(CREDENTIAL_FILE)
    }

    /// Returns the path to the root of the account trees,
    /// (e.g. `<root>/userfs`).
    pub fn accounts_path(&self) -> PathBuf {
        self.root_path.join(ACCOUNTS_DIR)
    }

    /// Returns the path to a single account tree,
    /// (e.g. `<root>/userfs/<account>`).
    pub fn account_path(&self, account: &str) -> PathBuf {
        self.accounts_path().join(account)
    }

    /// Returns the path to the index document of an account,
    /// (e.g. `<root>/userfs/<account>/.fsi.json`).
    pub fn index_path(&self, account: &str) -> PathBuf {
        self.account_path(account).join(INDEX_FILE)
    }

    /// Returns the path to the payload of a single file,
    /// (e.g. `<root>/userfs/<account>/<namespace>/<name>`).
    pub fn content_path(&self, account: &str, namespace: &str, name: &str) -> PathBuf {
        self.account_path(account).join(namespace).join(name)
    }
}
