//! Catalog service - sites, stations and EVSEs
//!
//! Orchestrates catalog operations by:
//! - Scoping list queries to the caller's rows when the caller is an owner
//! - Enforcing row ownership on single-resource reads and writes
//! - Running every read-modify-write inside one transaction
//! - Reading created and updated rows back through the joined views

use crate::{
    auth::Principal,
    db::query::{BindValue, ListRequest, Page, QueryEngine, QueryParameters, Scope, Table},
    db::{with_transaction, CatalogStore, CatalogTransaction, Row},
    models::{parse_new, to_row, NewEvse, NewRecord, NewSite, NewStation},
    Error, Result,
};
use std::net::IpAddr;
use std::sync::Arc;

/// Catalog resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Site,
    Station,
    Evse,
}

impl Resource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Site => NewSite::LABEL,
            Self::Station => NewStation::LABEL,
            Self::Evse => NewEvse::LABEL,
        }
    }

    /// Table written by mutations.
    pub fn table(self) -> Table {
        match self {
            Self::Site => Table::Site,
            Self::Station => Table::Station,
            Self::Evse => Table::Evse,
        }
    }

    /// Relation reads and lists go through.
    pub fn view(self) -> Table {
        self.table().read_view()
    }

    /// Columns an update may never change.
    fn immutable_columns(self) -> &'static [&'static str] {
        match self {
            Self::Site => &["id", "created_at"],
            Self::Station => &["id", "created_at", "site_id"],
            Self::Evse => &["id", "created_at", "station_id", "evse_id"],
        }
    }
}

/// Address of one catalog row, as given in the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKey {
    Site(i64),
    Station(i64),
    Evse { station_id: i64, evse_id: i64 },
}

impl ResourceKey {
    pub fn resource(self) -> Resource {
        match self {
            Self::Site(_) => Resource::Site,
            Self::Station(_) => Resource::Station,
            Self::Evse { .. } => Resource::Evse,
        }
    }

    fn bindings(self) -> Vec<(&'static str, BindValue)> {
        match self {
            Self::Site(id) | Self::Station(id) => vec![("id", BindValue::Int(id))],
            Self::Evse {
                station_id,
                evse_id,
            } => vec![
                ("station_id", BindValue::Int(station_id)),
                ("evse_id", BindValue::Int(evse_id)),
            ],
        }
    }
}

pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    engine: Arc<QueryEngine>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>, engine: Arc<QueryEngine>) -> Self {
        Self { store, engine }
    }

    /// One page of `resource`, restricted to the caller's rows for owners.
    pub async fn list(
        &self,
        resource: Resource,
        principal: &Principal,
        params: QueryParameters,
        client_ip: Option<IpAddr>,
    ) -> Result<Page> {
        let request = ListRequest::new(resource.view(), params)
            .with_scope(owner_scope(principal))
            .with_client_ip(client_ip);
        self.engine.list(&request).await
    }

    /// One page of the EVSEs of `station_id`.
    ///
    /// The path's station wins over any `station_id` query parameter.
    pub async fn list_station_evses(
        &self,
        station_id: i64,
        principal: &Principal,
        mut params: QueryParameters,
        client_ip: Option<IpAddr>,
    ) -> Result<Page> {
        params
            .filters
            .insert(0, ("station_id".to_string(), station_id.to_string()));
        self.list(Resource::Evse, principal, params, client_ip).await
    }

    pub async fn read(&self, key: ResourceKey, principal: &Principal) -> Result<Row> {
        let principal = principal.clone();
        with_transaction(self.store.as_ref(), move |mut tx| async move {
            let outcome = fetch_accessible(&mut tx, key, &principal).await;
            (tx, outcome)
        })
        .await
    }

    pub async fn create_site(&self, principal: &Principal, mut body: Row) -> Result<Row> {
        if principal.is_owner() {
            body.insert("owner_id".to_string(), principal.id_value());
        }
        let values = to_row(&parse_new::<NewSite>(body)?)?;

        let outcome = with_transaction(self.store.as_ref(), move |mut tx| async move {
            let outcome = insert_and_read_back(&mut tx, Resource::Site, &values).await;
            (tx, outcome)
        })
        .await;
        outcome.map_err(|e| duplicate_as(e, Resource::Site))
    }

    /// Create a station under an existing site the caller may access.
    pub async fn create_station(&self, principal: &Principal, body: Row) -> Result<Row> {
        let record = parse_new::<NewStation>(body)?;
        let values = to_row(&record)?;
        let principal = principal.clone();

        let outcome = with_transaction(self.store.as_ref(), move |mut tx| async move {
            let outcome: Result<Row> = async {
                require_parent(&mut tx, ResourceKey::Site(record.site_id), &principal).await?;
                insert_and_read_back(&mut tx, Resource::Station, &values).await
            }
            .await;
            (tx, outcome)
        })
        .await;
        outcome.map_err(|e| duplicate_as(e, Resource::Station))
    }

    /// Create an EVSE under `station_id`; a `station_id` in the body is ignored.
    pub async fn create_evse(
        &self,
        principal: &Principal,
        station_id: i64,
        mut body: Row,
    ) -> Result<Row> {
        body.insert("station_id".to_string(), station_id.into());
        let values = to_row(&parse_new::<NewEvse>(body)?)?;
        let principal = principal.clone();

        let outcome = with_transaction(self.store.as_ref(), move |mut tx| async move {
            let outcome: Result<Row> = async {
                require_parent(&mut tx, ResourceKey::Station(station_id), &principal).await?;
                insert_and_read_back(&mut tx, Resource::Evse, &values).await
            }
            .await;
            (tx, outcome)
        })
        .await;
        outcome.map_err(|e| duplicate_as(e, Resource::Evse))
    }

    /// Apply the updatable subset of `body` and return the row as re-read.
    pub async fn update(&self, key: ResourceKey, principal: &Principal, body: Row) -> Result<Row> {
        let resource = key.resource();
        let columns = self.engine.schema().columns(resource.table()).await?;
        let values: Row = body
            .into_iter()
            .filter(|(column, _)| {
                columns.contains(column)
                    && !resource.immutable_columns().contains(&column.as_str())
                    && !(principal.is_owner() && column == "owner_id")
            })
            .collect();
        let principal = principal.clone();

        let outcome = with_transaction(self.store.as_ref(), move |mut tx| async move {
            let outcome: Result<Row> = async {
                fetch_accessible(&mut tx, key, &principal).await?;
                if values.is_empty() {
                    return Err(Error::Validation(format!(
                        "{} not updated: no updatable fields in request body",
                        resource.label()
                    )));
                }

                let bindings = key.bindings();
                let affected = tx.update(resource.table(), &bindings, &values).await?;
                tracing::debug!(resource = resource.label(), affected, "Row updated");

                fetch_accessible(&mut tx, key, &principal).await
            }
            .await;
            (tx, outcome)
        })
        .await;
        outcome.map_err(|e| duplicate_as(e, resource))
    }

    pub async fn delete(&self, key: ResourceKey, principal: &Principal) -> Result<()> {
        let resource = key.resource();
        let principal = principal.clone();

        with_transaction(self.store.as_ref(), move |mut tx| async move {
            let outcome: Result<()> = async {
                fetch_accessible(&mut tx, key, &principal).await?;
                let affected = tx.delete(resource.table(), &key.bindings()).await?;
                if affected == 0 {
                    return Err(Error::Validation(format!("{} not deleted", resource.label())));
                }
                Ok(())
            }
            .await;
            (tx, outcome)
        })
        .await
    }
}

fn owner_scope(principal: &Principal) -> Option<Scope> {
    principal
        .is_owner()
        .then(|| Scope::new("owner_id", BindValue::Text(principal.id.clone())))
}

/// Fetch a row through its view: 404 when missing, 403 when not the caller's.
async fn fetch_accessible(
    tx: &mut Box<dyn CatalogTransaction>,
    key: ResourceKey,
    principal: &Principal,
) -> Result<Row> {
    let resource = key.resource();
    let row = tx
        .fetch_one(resource.view(), &key.bindings())
        .await?
        .ok_or_else(|| Error::NotFound(format!("{} not found", resource.label())))?;

    if !principal.may_access(&row) {
        return Err(Error::Forbidden("Access denied".to_string()));
    }
    Ok(row)
}

async fn require_parent(
    tx: &mut Box<dyn CatalogTransaction>,
    parent: ResourceKey,
    principal: &Principal,
) -> Result<()> {
    fetch_accessible(tx, parent, principal).await.map(|_| ())
}

async fn insert_and_read_back(
    tx: &mut Box<dyn CatalogTransaction>,
    resource: Resource,
    values: &Row,
) -> Result<Row> {
    let id = tx.insert(resource.table(), values).await?;
    tracing::debug!(resource = resource.label(), id, "Row inserted");

    tx.fetch_one(resource.view(), &[("id", BindValue::UInt(id))])
        .await?
        .ok_or_else(|| {
            Error::Internal(format!("{} {id} not readable after insert", resource.label()))
        })
}

fn duplicate_as(err: Error, resource: Resource) -> Error {
    match err {
        Error::DuplicateKey(detail) => {
            tracing::debug!(resource = resource.label(), %detail, "Duplicate key");
            Error::DuplicateKey(format!("{} already exists", resource.label()))
        }
        other => other,
    }
}
