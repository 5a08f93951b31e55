use crate::collection::{Collection, IndexSpec};
use crate::errors::{RegistryError, Result};
use crate::pipeline::{Pipeline, run_pipeline};
use crate::query::{self, EMAIL_PATH, Filter, FindOptions, UpdateDoc, UpdateReport};
use crate::store::{HOSPITALS, ROLES, RecordStore};
use crate::types::{CollectionName, RecordId};
use async_trait::async_trait;
use bson::{Bson, Document as BsonDocument};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

const SNAPSHOT_EXT: &str = "ndjson";

/// In-process document engine holding the named collections.
pub struct Engine {
    collections: RwLock<HashMap<CollectionName, Arc<Collection>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("collections", &self.list_collection_names()).finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Creates the engine with the `hospitals` and `roles` collections declared.
    #[must_use]
    pub fn new() -> Self {
        let engine = Self { collections: RwLock::new(HashMap::new()) };
        engine.create_collection(HOSPITALS, vec![IndexSpec::unique_ci(EMAIL_PATH)]);
        engine.create_collection(ROLES, vec![]);
        engine
    }

    pub fn create_collection(&self, name: &str, indexes: Vec<IndexSpec>) -> Arc<Collection> {
        let mut map = self.collections.write();
        Arc::clone(map.entry(name.to_string()).or_insert_with(|| Arc::new(Collection::new(name, indexes))))
    }

    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// # Errors
    /// `NoSuchCollection` when `name` was never declared.
    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.get_collection(name).ok_or_else(|| RegistryError::NoSuchCollection(name.to_string()))
    }

    #[must_use]
    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Writes one `<collection>.ndjson` file per collection into `dir`, each
    /// replaced atomically. Returns the number of documents written.
    ///
    /// # Errors
    /// I/O failures creating the directory, writing or persisting a file.
    pub fn save_snapshot(&self, dir: &Path) -> Result<usize> {
        std::fs::create_dir_all(dir)?;
        let mut written = 0;
        for name in self.list_collection_names() {
            let col = self.collection(&name)?;
            let mut tmp = NamedTempFile::new_in(dir)?;
            {
                let mut w = BufWriter::new(tmp.as_file_mut());
                for doc in col.all_documents() {
                    let value = Bson::Document(doc.data).into_canonical_extjson();
                    writeln!(w, "{}", serde_json::to_string(&value)?)?;
                    written += 1;
                }
                w.flush()?;
            }
            let dest = dir.join(format!("{name}.{SNAPSHOT_EXT}"));
            tmp.persist(&dest).map_err(|e| RegistryError::Io(e.error))?;
            log::info!("snapshot saved: collection={} path={}", name, dest.display());
        }
        Ok(written)
    }

    /// Replaces every collection's contents with its snapshot file from `dir`.
    /// A missing file leaves that collection empty. Unique indexes are
    /// re-checked while loading.
    ///
    /// # Errors
    /// I/O or parse failures, or `DuplicateKey` when the file violates an index.
    pub fn load_snapshot(&self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        for name in self.list_collection_names() {
            let col = self.collection(&name)?;
            col.clear();
            let path = dir.join(format!("{name}.{SNAPSHOT_EXT}"));
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for (lineno, line) in BufReader::new(file).lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let value: serde_json::Value = serde_json::from_str(&line)?;
                let Bson::Document(doc) = Bson::try_from(value).map_err(|e| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("{}:{}: {e}", path.display(), lineno + 1))
                })?
                else {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("{}:{}: expected a document", path.display(), lineno + 1),
                    )
                    .into());
                };
                col.insert_document(doc)?;
                loaded += 1;
            }
            log::info!("snapshot loaded: collection={} documents={}", name, col.len());
        }
        Ok(loaded)
    }
}

#[async_trait]
impl RecordStore for Engine {
    async fn insert(&self, collection: &str, doc: BsonDocument) -> Result<RecordId> {
        self.collection(collection)?.insert_document(doc)
    }

    async fn find(&self, collection: &str, filter: &Filter, opts: &FindOptions) -> Result<Vec<BsonDocument>> {
        let col = self.collection(collection)?;
        Ok(query::find_docs(&col, filter, opts, None))
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<BsonDocument>> {
        let col = self.collection(collection)?;
        Ok(query::find_one(&col, filter, None))
    }

    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<BsonDocument>> {
        let col = self.collection(collection)?;
        let bench_start = std::time::Instant::now();
        let out = run_pipeline(pipeline, col.all_documents().into_iter().map(|d| d.data).collect())?;
        log::debug!(
            "aggregate collection={} stages=[{}] duration_ms={} result_count={}",
            collection,
            pipeline.describe(),
            bench_start.elapsed().as_millis(),
            out.len()
        );
        Ok(out)
    }

    async fn update_one(&self, collection: &str, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport> {
        let col = self.collection(collection)?;
        query::update_one(&col, filter, update)
    }

    async fn update_many(&self, collection: &str, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport> {
        let col = self.collection(collection)?;
        query::update_many(&col, filter, update)
    }
}
