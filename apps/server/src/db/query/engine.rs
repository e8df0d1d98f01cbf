//! List query execution.
//!
//! The engine is the only part of the query pipeline that performs I/O:
//! schema introspection, the optional geolocation lookup and the page fetch.

use super::cursor::{self, CursorValues};
use super::filter::{FilterSpec, Scope};
use super::fulltext::SearchSpec;
use super::geo::{GeoSpec, LatLng};
use super::params::QueryParameters;
use super::projection::ProjectionSpec;
use super::query_builder::{QueryAssembler, QueryPlan};
use super::schema::SchemaCatalog;
use super::sort::SortSpec;
use super::table::Table;
use crate::db::traits::{CatalogStore, Row};
use crate::geo::GeoLocator;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Token for the following page; empty on the last page.
    pub next: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub data: Vec<Row>,
    pub cursor: PageCursor,
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Half-width in degrees of the box derived around a located origin.
    pub box_half_width: f64,
    /// Origin used when geolocation fails or is disabled.
    pub default_origin: LatLng,
    /// Upper bound on planning plus fetching one page.
    pub request_timeout: Duration,
}

/// One list request against a table.
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub table: Table,
    pub params: QueryParameters,
    /// Mandatory restriction from the caller's authorization.
    pub scope: Option<Scope>,
    pub client_ip: Option<IpAddr>,
}

impl ListRequest {
    pub fn new(table: Table, params: QueryParameters) -> Self {
        Self {
            table,
            params,
            scope: None,
            client_ip: None,
        }
    }

    pub fn with_scope(mut self, scope: Option<Scope>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_client_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.client_ip = ip;
        self
    }
}

pub struct QueryEngine {
    store: Arc<dyn CatalogStore>,
    schema: Arc<SchemaCatalog>,
    locator: Arc<dyn GeoLocator>,
    settings: QuerySettings,
}

impl QueryEngine {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        schema: Arc<SchemaCatalog>,
        locator: Arc<dyn GeoLocator>,
        settings: QuerySettings,
    ) -> Self {
        Self {
            store,
            schema,
            locator,
            settings,
        }
    }

    pub fn schema(&self) -> &SchemaCatalog {
        &self.schema
    }

    /// Fetch one page.
    pub async fn list(&self, request: &ListRequest) -> Result<Page> {
        let table = request.table;
        let result = self.list_inner(request).await;
        if let Err(err) = &result {
            crate::metrics::record_query_error(table.sql_name(), err);
        }
        result
    }

    async fn list_inner(&self, request: &ListRequest) -> Result<Page> {
        let params = &request.params;

        // A bad cursor must fail before any work, never restart from page one.
        let cursor: Option<CursorValues> = params
            .cursor
            .as_deref()
            .map(cursor::decode)
            .transpose()?;

        let started = Instant::now();
        let timeout = self.settings.request_timeout;
        let work = async {
            let plan = self.plan(request, cursor).await?;
            let rows = self.store.fetch_page(&plan).await?;
            Ok::<_, Error>((plan, rows))
        };
        let (plan, rows) = match tokio::time::timeout(timeout, work).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                tracing::warn!(table = %request.table, timeout_secs = timeout.as_secs(), "List query timed out");
                return Err(Error::Timeout(timeout.as_secs()));
            }
        };

        crate::metrics::record_query(
            plan.table().sql_name(),
            started.elapsed().as_secs_f64(),
            rows.len(),
        );

        let next = cursor::next_token(&rows, plan.limit(), plan.sort());
        tracing::debug!(
            table = %plan.table(),
            rows = rows.len(),
            has_next = !next.is_empty(),
            "List query complete"
        );

        Ok(Page {
            data: rows,
            cursor: PageCursor { next },
        })
    }

    /// Resolve every spec and assemble the statement.
    pub async fn plan(
        &self,
        request: &ListRequest,
        cursor: Option<CursorValues>,
    ) -> Result<QueryPlan> {
        let params = &request.params;
        let columns = self.schema.columns(request.table).await?;

        let located = if params.geo.wants_located_origin() {
            Some(self.locate(request.client_ip).await)
        } else {
            None
        };
        let geo = GeoSpec::resolve(&params.geo, located, self.settings.box_half_width);

        Ok(QueryAssembler::new(request.table, &columns)
            .projection(ProjectionSpec::parse(params.fields.as_deref()))
            .scope(request.scope.clone())
            .filters(FilterSpec::build(&params.filters, &columns))
            .search(SearchSpec::build(
                params.search.as_deref(),
                request.table,
                &columns,
            ))
            .geo(geo)
            .sort(SortSpec::parse(params.sort.as_deref()))
            .cursor(cursor)
            .limit(params.limit)
            .build())
    }

    /// Origin for `lat_lng_origin=default`; falls back on any failure.
    async fn locate(&self, ip: Option<IpAddr>) -> LatLng {
        let fallback = self.settings.default_origin;
        let Some(ip) = ip else {
            crate::metrics::GEO_LOOKUPS_TOTAL
                .with_label_values(&["no_address"])
                .inc();
            return fallback;
        };

        match self.locator.locate(ip).await.and_then(|loc| loc.lat_lng()) {
            Ok(origin) => {
                crate::metrics::GEO_LOOKUPS_TOTAL
                    .with_label_values(&["located"])
                    .inc();
                origin
            }
            Err(err) => {
                crate::metrics::GEO_LOOKUPS_TOTAL
                    .with_label_values(&["fallback"])
                    .inc();
                tracing::debug!(%ip, error = %err, "Geolocation failed; using default origin");
                fallback
            }
        }
    }
}
