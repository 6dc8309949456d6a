use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::record::{
    apply_query, sort_records, Collection, PersistedRecord, RecordQuery, RecordStore,
    StorageResult,
};

/// Filesystem-backed record store.
///
/// Layout: `<root>/<collection>/<id>.json`, one pretty-printed record per file.
/// Writes go through a temp file in the same directory and a rename, so a
/// crash never leaves a half-written record behind.
#[derive(Debug, Clone)]
pub struct FsRecordStore {
    root: PathBuf,
}

impl FsRecordStore {
    /// Create a store rooted at `root`. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn record_path(root: &Path, collection: Collection, id: &str) -> PathBuf {
        root.join(collection.as_str()).join(format!("{}.json", encode_id(id)))
    }

    fn write_blocking(root: &Path, record: &PersistedRecord) -> StorageResult<()> {
        let path = Self::record_path(root, record.collection, &record.id);
        let dir = root.join(record.collection.as_str());
        fs::create_dir_all(&dir)?;

        let bytes = serde_json::to_vec_pretty(record)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn read_blocking(
        root: &Path,
        collection: Collection,
        id: &str,
    ) -> StorageResult<PersistedRecord> {
        let path = Self::record_path(root, collection, id);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound {
                    collection,
                    id: id.to_string(),
                }
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn read_all_blocking(
        root: &Path,
        collection: Collection,
    ) -> StorageResult<Vec<PersistedRecord>> {
        let dir = root.join(collection.as_str());
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = fs::read(&path)?;
            records.push(serde_json::from_slice::<PersistedRecord>(&bytes)?);
        }
        sort_records(&mut records);
        Ok(records)
    }

    async fn blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> StorageResult<T> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || f(root))
            .await
            .map_err(|e| StorageError::Backend(format!("blocking task failed: {e}")))?
    }
}

/// Percent-encode an id into a file stem.
///
/// `[A-Za-z0-9_-]` pass through and every other byte becomes `%XX`, so
/// distinct ids always map to distinct files.
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn save(&self, record: PersistedRecord) -> StorageResult<()> {
        let collection = record.collection;
        let id = record.id.clone();
        self.blocking(move |root| Self::write_blocking(&root, &record))
            .await?;
        debug!(collection = %collection, id = %id, "record persisted");
        Ok(())
    }

    async fn load(&self, collection: Collection, id: &str) -> StorageResult<PersistedRecord> {
        let id = id.to_string();
        self.blocking(move |root| Self::read_blocking(&root, collection, &id))
            .await
    }

    async fn load_all(&self, collection: Collection) -> StorageResult<Vec<PersistedRecord>> {
        self.blocking(move |root| Self::read_all_blocking(&root, collection))
            .await
    }

    async fn query(&self, query: &RecordQuery) -> StorageResult<Vec<PersistedRecord>> {
        let all = self.load_all(query.collection).await?;
        Ok(apply_query(all, query))
    }
}
