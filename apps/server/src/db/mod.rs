//! Database layer - query engine, storage traits and the MySQL backend

pub mod mysql;
pub mod query;
pub mod traits;
pub mod transaction;

pub use mysql::{MySqlCatalogStore, MySqlTransactionContext};
pub use query::{Page, QueryEngine, QueryParameters, Table};
pub use traits::{CatalogStore, CatalogTransaction, Row, RowKey};
pub use transaction::with_transaction;
