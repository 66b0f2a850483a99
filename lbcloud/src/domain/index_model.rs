use serde::{Deserialize, Serialize};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub version: u32,
    pub name: String,
    /// Milliseconds since the epoch.
    pub upload_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub version: u32,
    pub name: String,
    pub files: Vec<FileRecord>,
}

/// Per-account index document, stored as `.fsi.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    pub version: u32,
    pub total_size: u64,
    #[serde(rename = "schemas")]
    pub namespaces: Vec<Namespace>,
}

impl Default for IndexDocument {
    fn default() -> Self {
        IndexDocument {
            version: SCHEMA_VERSION,
            total_size: 0,
            namespaces: Vec::new(),
        }
    }
}

impl IndexDocument {
    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.name == name)
    }

    /// Finds the namespace, appending an empty one first if it is missing.
    pub fn namespace_mut_or_insert(&mut self, name: &str) -> &mut Namespace {
        let idx = match self.namespaces.iter().position(|ns| ns.name == name) {
            Some(idx) => idx,
            None => {
                self.namespaces.push(Namespace {
                    version: SCHEMA_VERSION,
                    name: name.to_string(),
                    files: Vec::new(),
                });
                self.namespaces.len() - 1
            }
        };
        &mut self.namespaces[idx]
    }

    pub fn file(&self, namespace: &str, name: &str) -> Option<&FileRecord> {
        self.namespace(namespace)?.files.iter().find(|f| f.name == name)
    }

    pub fn file_names(&self, namespace: &str) -> Vec<String> {
        self.namespace(namespace)
            .map(|ns| ns.files.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default()
    }
}
