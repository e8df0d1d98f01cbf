//! SQL assembly for catalog list queries.
//!
//! Composes the filter, search, geo, projection and sort specs into one
//! statement:
//!
//! ```text
//! SELECT <columns>[, search_score][, distance] FROM <table>
//! [WHERE <scope> AND <filters> AND <match> AND <bounds>]
//! [HAVING <keyset continuation>]
//! ORDER BY <sort keys> [LIMIT n]
//! ```
//!
//! Every value is bound with `?`. Only table names from [`Table`] and field
//! names found in the table's [`Columns`] are written into the SQL text.

use super::cursor::{is_truthy, CursorValues};
use super::filter::{FilterSpec, Scope};
use super::fulltext::SearchSpec;
use super::geo::{GeoSpec, LatLng};
use super::projection::{Projection, ProjectionSpec};
use super::schema::Columns;
use super::sort::{SortKey, SortSpec};
use super::table::{quote_ident, Table};
use serde_json::Value as JsonValue;

mod bind;

use bind::{push_bind, push_float};

/// Alias of the relevance projection.
pub const SEARCH_SCORE: &str = "search_score";
/// Alias of the great-circle distance projection, in kilometres.
pub const DISTANCE: &str = "distance";

/// Bind values for `sqlx` queries.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Null,
}

/// Scope restriction as applied to a concrete table.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopeFilter {
    Column(Scope),
    /// The table lacks the scope column; no row may match.
    Deny,
}

/// A fully assembled list query.
///
/// Carries the rendered SQL and binds alongside the resolved specs so that
/// executors other than SQL can evaluate the same plan.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    table: Table,
    projection: Projection,
    scope: Option<ScopeFilter>,
    filters: FilterSpec,
    search: Option<SearchSpec>,
    geo: Option<GeoSpec>,
    sort: SortSpec,
    continuation: Vec<(SortKey, JsonValue)>,
    limit: Option<u64>,
    sql: String,
    binds: Vec<BindValue>,
}

impl QueryPlan {
    pub fn table(&self) -> Table {
        self.table
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn scope(&self) -> Option<&ScopeFilter> {
        self.scope.as_ref()
    }

    pub fn filters(&self) -> &FilterSpec {
        &self.filters
    }

    pub fn search(&self) -> Option<&SearchSpec> {
        self.search.as_ref()
    }

    pub fn geo(&self) -> Option<&GeoSpec> {
        self.geo.as_ref()
    }

    /// Origin of the `distance` projection, when one is emitted.
    pub fn origin(&self) -> Option<LatLng> {
        self.geo.and_then(|g| g.origin())
    }

    /// Sort after invalid fields were dropped.
    pub fn sort(&self) -> &SortSpec {
        &self.sort
    }

    /// Sort keys with the cursor value each row must follow, in sort order.
    pub fn continuation(&self) -> &[(SortKey, JsonValue)] {
        &self.continuation
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binds(&self) -> &[BindValue] {
        &self.binds
    }
}

/// Builder for [`QueryPlan`].
pub struct QueryAssembler<'a> {
    table: Table,
    columns: &'a Columns,
    projection: ProjectionSpec,
    scope: Option<Scope>,
    filters: FilterSpec,
    search: Option<SearchSpec>,
    geo: Option<GeoSpec>,
    sort: SortSpec,
    cursor: Option<CursorValues>,
    limit: Option<u64>,
}

impl<'a> QueryAssembler<'a> {
    pub fn new(table: Table, columns: &'a Columns) -> Self {
        Self {
            table,
            columns,
            projection: ProjectionSpec::default(),
            scope: None,
            filters: FilterSpec::default(),
            search: None,
            geo: None,
            sort: SortSpec::default(),
            cursor: None,
            limit: None,
        }
    }

    pub fn projection(mut self, projection: ProjectionSpec) -> Self {
        self.projection = projection;
        self
    }

    pub fn scope(mut self, scope: Option<Scope>) -> Self {
        self.scope = scope;
        self
    }

    pub fn filters(mut self, filters: FilterSpec) -> Self {
        self.filters = filters;
        self
    }

    pub fn search(mut self, search: Option<SearchSpec>) -> Self {
        self.search = search;
        self
    }

    pub fn geo(mut self, geo: Option<GeoSpec>) -> Self {
        self.geo = geo;
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self
    }

    pub fn cursor(mut self, cursor: Option<CursorValues>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit.filter(|l| *l > 0);
        self
    }

    pub fn build(self) -> QueryPlan {
        let columns = self.columns;
        let geo = self.geo.filter(|_| columns.has_coordinates());
        let origin = geo.and_then(|g| g.origin());
        let search = self.search;

        let computed = |field: &str| match field {
            DISTANCE => origin.is_some(),
            SEARCH_SCORE => search.is_some(),
            _ => false,
        };

        let sort = self
            .sort
            .retain_valid(|field| computed(field) || columns.contains(field));

        let mut projection = self.projection.resolve(columns);
        for field in sort.fields() {
            if !computed(field) && columns.contains(field) {
                projection.require(field);
            }
        }

        let continuation: Vec<(SortKey, JsonValue)> = match &self.cursor {
            Some(values) => sort
                .keys()
                .iter()
                .filter_map(|key| {
                    values
                        .get(&key.field)
                        .filter(|v| is_truthy(v))
                        .map(|v| (key.clone(), v.clone()))
                })
                .collect(),
            None => Vec::new(),
        };

        let scope = self.scope.map(|scope| {
            if columns.contains(&scope.column) {
                ScopeFilter::Column(scope)
            } else {
                tracing::warn!(
                    table = %self.table,
                    column = %scope.column,
                    "Scope column missing from table; denying all rows"
                );
                ScopeFilter::Deny
            }
        });

        let mut binds = Vec::new();
        let mut sql = String::new();

        // SELECT
        let mut select: Vec<String> = match &projection {
            Projection::All => vec!["*".to_string()],
            Projection::Columns(cols) => cols.iter().map(|c| quote_ident(c)).collect(),
        };
        if let Some(search) = &search {
            let expr = match_expr(search, &mut binds);
            select.push(format!("{expr} AS {}", quote_ident(SEARCH_SCORE)));
        }
        if let Some(origin) = origin {
            let expr = distance_expr(origin, &mut binds);
            select.push(format!("{expr} AS {}", quote_ident(DISTANCE)));
        }
        sql.push_str("SELECT ");
        sql.push_str(&select.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&quote_ident(self.table.sql_name()));

        // WHERE
        let mut conditions: Vec<String> = Vec::new();
        match &scope {
            Some(ScopeFilter::Column(scope)) => {
                let ph = push_bind(&mut binds, scope.value.clone());
                conditions.push(format!("{} = {ph}", quote_ident(&scope.column)));
            }
            Some(ScopeFilter::Deny) => conditions.push("1=0".to_string()),
            None => {}
        }
        for (field, value) in self.filters.iter() {
            if !columns.contains(field) {
                continue;
            }
            let ph = push_bind(&mut binds, value.clone());
            conditions.push(format!("{} = {ph}", quote_ident(field)));
        }
        if let Some(search) = &search {
            conditions.push(match_expr(search, &mut binds));
        }
        if let Some(geo) = &geo {
            if let Some(min) = geo.min() {
                let lat = push_float(&mut binds, min.lat);
                let lng = push_float(&mut binds, min.lng);
                conditions.push(format!("`latitude` >= {lat} AND `longitude` >= {lng}"));
            }
            if let Some(max) = geo.max() {
                let lat = push_float(&mut binds, max.lat);
                let lng = push_float(&mut binds, max.lng);
                conditions.push(format!("`latitude` <= {lat} AND `longitude` <= {lng}"));
            }
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        // HAVING
        if let Some((predicate, mut predicate_binds)) = continuation_predicate(&continuation) {
            sql.push_str(" HAVING ");
            sql.push_str(&predicate);
            binds.append(&mut predicate_binds);
        }

        // ORDER BY
        let order: Vec<String> = sort
            .keys()
            .iter()
            .map(|k| format!("{} {}", quote_ident(&k.field), k.direction.sql()))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        QueryPlan {
            table: self.table,
            projection,
            scope,
            filters: self.filters,
            search,
            geo,
            sort,
            continuation,
            limit: self.limit,
            sql,
            binds,
        }
    }
}

fn match_expr(search: &SearchSpec, binds: &mut Vec<BindValue>) -> String {
    let fields: Vec<String> = search.fields().iter().map(|f| quote_ident(f)).collect();
    let ph = push_bind(binds, BindValue::Text(search.term().to_string()));
    format!("MATCH ({}) AGAINST ({ph} IN BOOLEAN MODE)", fields.join(", "))
}

fn distance_expr(origin: LatLng, binds: &mut Vec<BindValue>) -> String {
    let lat_a = push_float(binds, origin.lat);
    let lat_b = push_float(binds, origin.lat);
    let lng = push_float(binds, origin.lng);
    format!(
        "(6371 * 2 * ASIN(SQRT(POW(SIN(RADIANS(`latitude` - {lat_a}) / 2), 2) \
         + COS(RADIANS({lat_b})) * COS(RADIANS(`latitude`)) \
         * POW(SIN(RADIANS(`longitude` - {lng}) / 2), 2))))"
    )
}

/// Keyset predicate: the row's sort tuple follows the cursor's tuple.
///
/// Built from the last key back to the first as
/// `((f op ?) OR (f = ? AND <rest>))`, with binds in text order.
fn continuation_predicate(keys: &[(SortKey, JsonValue)]) -> Option<(String, Vec<BindValue>)> {
    let mut cond: Option<(String, Vec<BindValue>)> = None;

    for (key, value) in keys.iter().rev() {
        let column = quote_ident(&key.field);
        let op = key.direction.continuation_op();
        let bound = BindValue::from_json(value);

        cond = Some(match cond {
            None => (format!("({column} {op} ?)"), vec![bound]),
            Some((rest, rest_binds)) => {
                let mut binds = Vec::with_capacity(rest_binds.len() + 2);
                binds.push(bound.clone());
                binds.push(bound);
                binds.extend(rest_binds);
                (
                    format!("(({column} {op} ?) OR ({column} = ? AND {rest}))"),
                    binds,
                )
            }
        });
    }

    cond
}
