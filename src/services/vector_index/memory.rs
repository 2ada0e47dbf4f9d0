//! In-process vector index.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{IndexInfo, VectorIndex, check_dimensions};
use crate::error::VectorIndexError;
use crate::models::UpsertEntry;

/// Stored vector and metadata for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

/// Keyed map with the same upsert semantics as the remote backends.
#[derive(Debug)]
pub struct MemoryIndex {
    name: String,
    dimension: usize,
    entries: Mutex<HashMap<String, StoredEntry>>,
    upsert_calls: Mutex<Vec<Vec<String>>>,
}

impl MemoryIndex {
    pub fn new(name: &str, dimension: usize) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            entries: Mutex::new(HashMap::new()),
            upsert_calls: Mutex::new(Vec::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, StoredEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<StoredEntry> {
        self.entries().get(key).cloned()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of every accepted upsert call, in call order.
    pub fn upsert_log(&self) -> Vec<Vec<String>> {
        self.upsert_calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn health_check(&self) -> Result<bool, VectorIndexError> {
        Ok(true)
    }

    async fn describe(&self) -> Result<IndexInfo, VectorIndexError> {
        Ok(IndexInfo {
            dimension: Some(self.dimension),
            vector_count: self.len() as u64,
        })
    }

    async fn upsert(&self, entries: Vec<UpsertEntry>) -> Result<(), VectorIndexError> {
        if entries.is_empty() {
            return Ok(());
        }
        check_dimensions(self.dimension, &entries)?;

        let keys = entries.iter().map(|e| e.key.to_string()).collect();
        let mut stored = self.entries();
        for entry in entries {
            stored.insert(
                entry.key.to_string(),
                StoredEntry {
                    vector: entry.vector,
                    metadata: entry.metadata,
                },
            );
        }
        drop(stored);

        self.upsert_calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(keys);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
