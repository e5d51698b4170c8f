//! In-memory metadata store, for tests and offline compilation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::provider::{MetadataResult, MetadataStore};
use crate::types::{FieldKey, FieldKeySelector};

/// A known key, optionally scoped to one metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    #[serde(flatten)]
    pub key: FieldKey,
    /// `None` means the key exists on every metric.
    #[serde(default)]
    pub metric_name: Option<String>,
}

/// Metadata store backed by a list of key entries.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: RwLock<Vec<KeyEntry>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with keys visible on every metric.
    pub fn from_keys(keys: impl IntoIterator<Item = FieldKey>) -> Self {
        Self::from_entries(keys.into_iter().map(|key| KeyEntry {
            key,
            metric_name: None,
        }))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = KeyEntry>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Builder form of [`insert`](Self::insert) for setup code.
    pub fn with_key(self, key: FieldKey, metric_name: Option<&str>) -> Self {
        let mut entries = self.entries.into_inner();
        entries.push(KeyEntry {
            key,
            metric_name: metric_name.map(str::to_string),
        });
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn insert(&self, key: FieldKey, metric_name: Option<String>) {
        self.entries.write().await.push(KeyEntry { key, metric_name });
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn metric_matches(entry: &KeyEntry, selector: &FieldKeySelector) -> bool {
    match (&entry.metric_name, &selector.metric_name) {
        (Some(have), Some(want)) => have == want,
        _ => true,
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_keys(&self, selector: &FieldKeySelector) -> MetadataResult<Vec<FieldKey>> {
        let entries = self.entries.read().await;
        let mut found: Vec<FieldKey> = Vec::new();
        for entry in entries.iter() {
            if selector.matches(&entry.key)
                && metric_matches(entry, selector)
                && !found.contains(&entry.key)
            {
                found.push(entry.key.clone());
            }
        }
        Ok(found)
    }
}
