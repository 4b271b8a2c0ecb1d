//! Research result persistence

use chrono::{DateTime, Utc};
use delve_core::{
    not_found_error, storage_error, DelveResult, ReadingLevel, ResearchStore, SourceInfo,
    StoredResearch,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

fn new_record(
    query: &str,
    content: &str,
    sources: &[SourceInfo],
    suggested_topics: Option<&[String]>,
) -> StoredResearch {
    StoredResearch {
        id: Uuid::new_v4().to_string(),
        query: query.to_string(),
        content: content.to_string(),
        sources: sources.to_vec(),
        suggested_topics: suggested_topics.map(|topics| topics.to_vec()),
        created_at: Utc::now(),
    }
}

/// In-process store, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryResearchStore {
    /// Insertion order is chronological
    records: RwLock<Vec<StoredResearch>>,
    variants: RwLock<HashMap<(String, ReadingLevel), String>>,
}

impl MemoryResearchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ResearchStore for MemoryResearchStore {
    async fn store(
        &self,
        query: &str,
        content: &str,
        sources: &[SourceInfo],
        suggested_topics: Option<&[String]>,
    ) -> DelveResult<String> {
        let record = new_record(query, content, sources, suggested_topics);
        let id = record.id.clone();
        self.records.write().await.push(record);
        debug!(id = %id, "Stored research in memory");
        Ok(id)
    }

    async fn find(&self, query: &str) -> DelveResult<Option<StoredResearch>> {
        let records = self.records.read().await;
        Ok(records.iter().rev().find(|r| r.query == query).cloned())
    }

    async fn store_variant(
        &self,
        id: &str,
        level: ReadingLevel,
        content: &str,
    ) -> DelveResult<()> {
        if !self.records.read().await.iter().any(|r| r.id == id) {
            return Err(not_found_error!(format!("research record {}", id), "memory_store"));
        }
        self.variants
            .write()
            .await
            .insert((id.to_string(), level), content.to_string());
        Ok(())
    }

    async fn find_variant(&self, id: &str, level: ReadingLevel) -> DelveResult<Option<String>> {
        Ok(self
            .variants
            .read()
            .await
            .get(&(id.to_string(), level))
            .cloned())
    }

    async fn list(&self, limit: Option<usize>) -> DelveResult<Vec<StoredResearch>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

/// Index for query lookups without reading every record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreIndex {
    entries: Vec<IndexEntry>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    query: String,
    created_at: DateTime<Utc>,
}

/// File-backed store.
///
/// Layout under the root directory:
/// `records/<id>.json`, `variants/<id>/<level>.md` and `index.json`.
#[derive(Debug)]
pub struct FileResearchStore {
    root: PathBuf,
    /// Serialises index read-modify-write cycles
    index_lock: Mutex<()>,
}

impl FileResearchStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(root: P) -> DelveResult<Self> {
        let root = root.as_ref().to_path_buf();
        let records = root.join("records");
        if !records.exists() {
            std::fs::create_dir_all(&records).map_err(|e| {
                storage_error!(
                    format!("Failed to create storage directory {}", records.display()),
                    "file_store",
                    e
                )
            })?;
            info!("Created research storage directory: {}", root.display());
        }

        Ok(Self {
            root,
            index_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.root.join("records").join(format!("{}.json", id))
    }

    fn variant_path(&self, id: &str, level: ReadingLevel) -> PathBuf {
        self.root
            .join("variants")
            .join(id)
            .join(format!("{}.md", level.as_str()))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    /// Ids are generated UUIDs; anything else cannot name a record
    fn check_id(id: &str) -> DelveResult<()> {
        Uuid::parse_str(id)
            .map(|_| ())
            .map_err(|_| not_found_error!(format!("research record {}", id), "file_store"))
    }

    async fn load_index(&self) -> DelveResult<StoreIndex> {
        let path = self.index_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreIndex::default()),
            Err(e) => Err(storage_error!("Failed to read research index", "file_store", e)),
        }
    }

    async fn save_index(&self, index: &StoreIndex) -> DelveResult<()> {
        let content = serde_json::to_string_pretty(index)?;
        tokio::fs::write(self.index_path(), content)
            .await
            .map_err(|e| storage_error!("Failed to write research index", "file_store", e))
    }

    async fn load_record(&self, id: &str) -> DelveResult<Option<StoredResearch>> {
        match tokio::fs::read_to_string(self.record_path(id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(id = id, "Indexed research record is missing on disk");
                Ok(None)
            }
            Err(e) => Err(storage_error!(
                format!("Failed to read research record {}", id),
                "file_store",
                e
            )),
        }
    }
}

#[async_trait::async_trait]
impl ResearchStore for FileResearchStore {
    async fn store(
        &self,
        query: &str,
        content: &str,
        sources: &[SourceInfo],
        suggested_topics: Option<&[String]>,
    ) -> DelveResult<String> {
        let record = new_record(query, content, sources, suggested_topics);
        let serialized = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(self.record_path(&record.id), serialized)
            .await
            .map_err(|e| storage_error!("Failed to write research record", "file_store", e))?;

        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index().await?;
        index.entries.push(IndexEntry {
            id: record.id.clone(),
            query: record.query.clone(),
            created_at: record.created_at,
        });
        index.last_updated = Some(Utc::now());
        self.save_index(&index).await?;

        debug!(id = %record.id, "Saved research record");
        Ok(record.id)
    }

    async fn find(&self, query: &str) -> DelveResult<Option<StoredResearch>> {
        let index = self.load_index().await?;
        let newest = index
            .entries
            .iter()
            .filter(|entry| entry.query == query)
            .max_by_key(|entry| entry.created_at);

        match newest {
            Some(entry) => self.load_record(&entry.id).await,
            None => Ok(None),
        }
    }

    async fn store_variant(
        &self,
        id: &str,
        level: ReadingLevel,
        content: &str,
    ) -> DelveResult<()> {
        Self::check_id(id)?;
        if !self.record_path(id).exists() {
            return Err(not_found_error!(format!("research record {}", id), "file_store"));
        }

        let path = self.variant_path(id, level);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| {
                    storage_error!("Failed to create variant directory", "file_store", e)
                })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| storage_error!("Failed to write reading-level variant", "file_store", e))?;

        debug!(id = id, level = %level, "Saved reading-level variant");
        Ok(())
    }

    async fn find_variant(&self, id: &str, level: ReadingLevel) -> DelveResult<Option<String>> {
        if Self::check_id(id).is_err() {
            return Ok(None);
        }
        match tokio::fs::read_to_string(self.variant_path(id, level)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error!("Failed to read reading-level variant", "file_store", e)),
        }
    }

    async fn list(&self, limit: Option<usize>) -> DelveResult<Vec<StoredResearch>> {
        let mut entries = self.load_index().await?.entries;
        // Stable sort keeps later insertions first among equal timestamps
        entries.reverse();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut records = Vec::new();
        for entry in entries.into_iter().take(limit.unwrap_or(usize::MAX)) {
            if let Some(record) = self.load_record(&entry.id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }
}
