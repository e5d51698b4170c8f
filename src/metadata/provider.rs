//! MetadataStore trait definition.
//!
//! The statement builders only need one thing from metadata: which concrete
//! field keys exist for the names a query mentions. Everything else about the
//! store (backend, caching) stays behind this trait.

use async_trait::async_trait;

use crate::error::MetadataError;
use crate::types::{FieldKey, FieldKeySelector, KeyMap};

/// Result type for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Trait for resolving field keys.
///
/// # Example
///
/// ```ignore
/// use metricq::metadata::{InMemoryMetadataStore, MetadataStore};
///
/// async fn example(store: &impl MetadataStore) -> MetadataResult<()> {
///     let selectors = vec![FieldKeySelector::from_key(&FieldKey::new("service.name"))];
///     let keys = store.get_keys_multi(&selectors).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Keys matching one selector.
    async fn get_keys(&self, selector: &FieldKeySelector) -> MetadataResult<Vec<FieldKey>>;

    /// Keys for many selectors, grouped by key name.
    ///
    /// Default implementation runs the lookups concurrently using `join_all`
    /// and fails if any lookup fails. Duplicate keys are dropped.
    async fn get_keys_multi(&self, selectors: &[FieldKeySelector]) -> MetadataResult<KeyMap> {
        let futures: Vec<_> = selectors.iter().map(|s| self.get_keys(s)).collect();

        let results = futures::future::join_all(futures).await;

        let mut keys = KeyMap::new();
        for result in results {
            for key in result? {
                let entry = keys.entry(key.name.clone()).or_default();
                if !entry.contains(&key) {
                    entry.push(key);
                }
            }
        }
        Ok(keys)
    }
}
