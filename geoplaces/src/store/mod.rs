//! Auxiliary document store.
//!
//! The manager records a small metadata document whenever a country reaches
//! `started` (code, city count, startup time). The store is an external
//! collaborator, so only the trait is load-bearing; the JSON-file
//! implementation below is what the binary wires in.

use std::fs;
use std::path::PathBuf;

/// Document store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid document {id}: {source}")]
    InvalidDocument {
        id: String,
        source: serde_json::Error,
    },
}

/// Keyed storage of JSON documents.
pub trait DocumentStore: Send + Sync + 'static {
    /// Store a document under an identifier, replacing any previous version.
    fn put_document(&self, id: &str, doc: &serde_json::Value) -> Result<(), StoreError>;

    /// Fetch a document by identifier.
    fn get_document(&self, id: &str) -> Result<Option<serde_json::Value>, StoreError>;
}

/// Document store backed by one JSON file per document.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (creating if necessary) a store rooted at the given directory.
    pub fn new(dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl DocumentStore for JsonFileStore {
    fn put_document(&self, id: &str, doc: &serde_json::Value) -> Result<(), StoreError> {
        let path = self.document_path(id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, doc.to_string())?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get_document(&self, id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let path = self.document_path(id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e)),
        };
        let doc = serde_json::from_str(&text).map_err(|source| StoreError::InvalidDocument {
            id: id.to_string(),
            source,
        })?;
        Ok(Some(doc))
    }
}
