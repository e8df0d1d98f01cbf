//! Storage traits for catalog backends
//!
//! The query engine and the catalog service only talk to storage through
//! these traits. The MySQL backend lives in [`super::mysql`]; tests use an
//! in-memory implementation that evaluates [`QueryPlan`]s directly.

use super::query::{BindValue, QueryPlan, Table};
use crate::Result;
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

/// A materialized row, keyed by column name in select order.
pub type Row = Map<String, JsonValue>;

/// Equality conditions identifying one row, e.g. `[("id", 3)]` or
/// `[("station_id", 1), ("evse_id", "A")]`. Column names are internal.
pub type RowKey<'a> = &'a [(&'a str, BindValue)];

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Column names of `table` in definition order.
    ///
    /// Returns an empty list when the table does not exist.
    async fn load_columns(&self, table: Table) -> Result<Vec<String>>;

    /// Execute an assembled list query and materialize every row.
    async fn fetch_page(&self, plan: &QueryPlan) -> Result<Vec<Row>>;

    /// Begin a transaction for mutations.
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>>;
}

/// Mutation scope over one checked-out connection.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait CatalogTransaction: Send {
    async fn fetch_one(&mut self, table: Table, key: RowKey<'_>) -> Result<Option<Row>>;

    /// Insert one row; returns the generated id (0 when the table has none).
    async fn insert(&mut self, table: Table, values: &Row) -> Result<u64>;

    /// Update allow-listed `values` on the keyed row; returns affected rows.
    async fn update(&mut self, table: Table, key: RowKey<'_>, values: &Row) -> Result<u64>;

    /// Returns affected rows.
    async fn delete(&mut self, table: Table, key: RowKey<'_>) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
