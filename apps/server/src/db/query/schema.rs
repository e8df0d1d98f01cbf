//! Column allow-lists for catalog tables.
//!
//! Field names from requests are only concatenated into SQL after they have
//! been found in the introspected column set of the target table.

use super::table::Table;
use crate::db::traits::CatalogStore;
use crate::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Ordered, de-duplicated column names of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns {
    ordered: Vec<String>,
    index: HashSet<String>,
}

impl Columns {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered = Vec::new();
        let mut index = HashSet::new();
        for name in names {
            let name = name.into();
            if index.insert(name.clone()) {
                ordered.push(name);
            }
        }
        Self { ordered, index }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Whether rows carry the coordinates needed for distance and box filters.
    pub fn has_coordinates(&self) -> bool {
        self.contains("latitude") && self.contains("longitude")
    }
}

/// Supplies column allow-lists, optionally caching introspection results.
///
/// A zero TTL re-introspects on every call so live schema changes are seen
/// immediately.
pub struct SchemaCatalog {
    store: Arc<dyn CatalogStore>,
    ttl: Duration,
    cache: RwLock<HashMap<Table, (Instant, Arc<Columns>)>>,
}

impl SchemaCatalog {
    pub fn new(store: Arc<dyn CatalogStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn columns(&self, table: Table) -> Result<Arc<Columns>> {
        if !self.ttl.is_zero() {
            let cache = self.cache.read().await;
            if let Some((fetched_at, columns)) = cache.get(&table) {
                if fetched_at.elapsed() <= self.ttl {
                    return Ok(columns.clone());
                }
            }
        }

        let names = self.store.load_columns(table).await?;
        if names.is_empty() {
            tracing::warn!(table = %table, "Schema introspection returned no columns");
        }
        let columns = Arc::new(Columns::new(names));

        if !self.ttl.is_zero() {
            let mut cache = self.cache.write().await;
            cache.insert(table, (Instant::now(), columns.clone()));
        }

        Ok(columns)
    }
}
