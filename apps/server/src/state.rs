//! Shared application state

use anyhow::Context;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    auth::{HttpTokenVerifier, TokenVerifier},
    config::Config,
    db::{mysql, query::SchemaCatalog, CatalogStore, MySqlCatalogStore, QueryEngine},
    geo::{DisabledLocator, GeoLocator, MaxMindLocator},
    services::CatalogService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CatalogStore>,
    pub engine: Arc<QueryEngine>,
    pub catalog: Arc<CatalogService>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Present when backed by MySQL; used for pool gauges and shutdown.
    pub db_pool: Option<MySqlPool>,
}

impl AppState {
    /// Connect to MySQL and build the production collaborators.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let pool = mysql::connect(&config.database)
            .await
            .context("Failed to connect to database")?;
        tracing::info!(
            max_connections = config.database.max_connections,
            pool_timeout_secs = config.database.pool_timeout_seconds,
            "Database pool ready"
        );

        let store: Arc<dyn CatalogStore> = Arc::new(MySqlCatalogStore::new(
            pool.clone(),
            config.database.pool_timeout_seconds,
        ));

        let locator: Arc<dyn GeoLocator> = if config.geo.enabled {
            Arc::new(MaxMindLocator::new(&config.geo).context("Failed to build geolocator")?)
        } else {
            Arc::new(DisabledLocator)
        };

        let verifier: Arc<dyn TokenVerifier> = Arc::new(
            HttpTokenVerifier::new(&config.auth).context("Failed to build token verifier")?,
        );

        let mut state = Self::from_parts(config, store, locator, verifier)?;
        state.db_pool = Some(pool);
        Ok(state)
    }

    /// Assemble state around injected collaborators.
    pub fn from_parts(
        config: Config,
        store: Arc<dyn CatalogStore>,
        locator: Arc<dyn GeoLocator>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> anyhow::Result<Self> {
        let schema = Arc::new(SchemaCatalog::new(
            store.clone(),
            Duration::from_secs(config.query.schema_cache_ttl_seconds),
        ));
        let engine = Arc::new(QueryEngine::new(
            store.clone(),
            schema,
            locator,
            config.query_settings()?,
        ));
        let catalog = Arc::new(CatalogService::new(store.clone(), engine.clone()));

        Ok(Self {
            config: Arc::new(config),
            store,
            engine,
            catalog,
            verifier,
            db_pool: None,
        })
    }
}
