//! Generic list-query engine for catalog tables.
//!
//! Untyped request parameters are parsed once into immutable specs
//! (filters, full-text search, geo, projection, sort), assembled into a
//! single parameterized statement and executed with keyset pagination.

pub mod cursor;
pub mod engine;
pub mod filter;
pub mod fulltext;
pub mod geo;
pub mod params;
pub mod projection;
pub mod query_builder;
pub mod schema;
pub mod sort;
pub mod table;

pub use cursor::CursorValues;
pub use engine::{ListRequest, Page, PageCursor, QueryEngine, QuerySettings};
pub use filter::{FilterSpec, Scope};
pub use fulltext::SearchSpec;
pub use geo::{GeoRequest, GeoSpec, LatLng, OriginRequest};
pub use params::QueryParameters;
pub use projection::{Projection, ProjectionSpec};
pub use query_builder::{BindValue, QueryAssembler, QueryPlan, ScopeFilter, DISTANCE, SEARCH_SCORE};
pub use schema::{Columns, SchemaCatalog};
pub use sort::{Direction, SortKey, SortSpec};
pub use table::Table;

pub(crate) use table::quote_ident;
