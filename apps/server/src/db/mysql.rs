//! MySQL catalog backend

use super::query::{quote_ident, BindValue, QueryPlan, Table};
use super::traits::{CatalogStore, CatalogTransaction, Row, RowKey};
use crate::config::DatabaseConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, MySql, Row as _, Transaction, TypeInfo};
use std::time::Duration;

/// SQLSTATE for "table doesn't exist" (error 1146).
const NO_SUCH_TABLE: &str = "42S02";

/// Open the connection pool.
///
/// Checkout waits at most `pool_timeout_seconds`; callers see
/// [`Error::ConnectionExhausted`] after that instead of queueing forever.
pub async fn connect(config: &DatabaseConfig) -> Result<MySqlPool> {
    MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
        .connect(&config.url)
        .await
        .map_err(|e| Error::from_sqlx(e, config.pool_timeout_seconds))
}

#[derive(Clone)]
pub struct MySqlCatalogStore {
    pool: MySqlPool,
    pool_timeout_seconds: u64,
}

impl MySqlCatalogStore {
    pub fn new(pool: MySqlPool, pool_timeout_seconds: u64) -> Self {
        Self {
            pool,
            pool_timeout_seconds,
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn map_err(&self, err: sqlx::Error) -> Error {
        map_sqlx(err, self.pool_timeout_seconds)
    }
}

fn map_sqlx(err: sqlx::Error, pool_timeout_seconds: u64) -> Error {
    let err = Error::from_sqlx(err, pool_timeout_seconds);
    if matches!(err, Error::ConnectionExhausted(_)) {
        crate::metrics::record_pool_exhausted();
    }
    err
}

#[async_trait]
impl CatalogStore for MySqlCatalogStore {
    async fn load_columns(&self, table: Table) -> Result<Vec<String>> {
        let sql = format!("SHOW COLUMNS FROM {}", quote_ident(table.sql_name()));
        let rows = match sqlx::query(&sql).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(NO_SUCH_TABLE) => {
                tracing::warn!(table = %table, "Table does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.map_err(e)),
        };

        let mut names = Vec::with_capacity(rows.len());
        for row in &rows {
            // Some server versions report SHOW output as binary strings.
            let name = match row.try_get::<String, _>("Field") {
                Ok(name) => name,
                Err(_) => {
                    let raw: Vec<u8> = row.try_get("Field").map_err(|e| self.map_err(e))?;
                    String::from_utf8_lossy(&raw).into_owned()
                }
            };
            names.push(name);
        }
        Ok(names)
    }

    async fn fetch_page(&self, plan: &QueryPlan) -> Result<Vec<Row>> {
        let mut conn = self.pool.acquire().await.map_err(|e| self.map_err(e))?;

        tracing::debug!(table = %plan.table(), sql = %plan.sql(), binds = plan.binds().len(), "Executing list query");

        let rows = bind_all(sqlx::query(plan.sql()), plan.binds())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| self.map_err(e))?;

        Ok(rows.iter().map(decode_row).collect())
    }

    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>> {
        let tx = self.pool.begin().await.map_err(|e| self.map_err(e))?;
        Ok(Box::new(MySqlTransactionContext::new(
            tx,
            self.pool_timeout_seconds,
        )))
    }
}

/// MySQL transaction context
pub struct MySqlTransactionContext {
    tx: Option<Transaction<'static, MySql>>,
    pool_timeout_seconds: u64,
}

impl MySqlTransactionContext {
    pub fn new(tx: Transaction<'static, MySql>, pool_timeout_seconds: u64) -> Self {
        Self {
            tx: Some(tx),
            pool_timeout_seconds,
        }
    }

    fn tx_mut(&mut self) -> Result<&mut Transaction<'static, MySql>> {
        self.tx.as_mut().ok_or_else(|| {
            Error::Internal("Transaction already committed or rolled back".to_string())
        })
    }
}

#[async_trait]
impl CatalogTransaction for MySqlTransactionContext {
    async fn fetch_one(&mut self, table: Table, key: RowKey<'_>) -> Result<Option<Row>> {
        let (where_sql, key_binds) = key_clause(key)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {where_sql} LIMIT 1",
            quote_ident(table.sql_name())
        );
        let timeout = self.pool_timeout_seconds;
        let tx = self.tx_mut()?;

        let row = bind_all(sqlx::query(&sql), &key_binds)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx(e, timeout))?;

        Ok(row.as_ref().map(decode_row))
    }

    async fn insert(&mut self, table: Table, values: &Row) -> Result<u64> {
        if values.is_empty() {
            return Err(Error::Validation("Nothing to insert".to_string()));
        }
        let columns: Vec<String> = values.keys().map(|k| quote_ident(k)).collect();
        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote_ident(table.sql_name()),
            columns.join(", ")
        );
        let binds: Vec<BindValue> = values.values().map(BindValue::from_json).collect();
        let timeout = self.pool_timeout_seconds;
        let tx = self.tx_mut()?;

        let result = bind_all(sqlx::query(&sql), &binds)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx(e, timeout))?;

        Ok(result.last_insert_id())
    }

    async fn update(&mut self, table: Table, key: RowKey<'_>, values: &Row) -> Result<u64> {
        if values.is_empty() {
            return Err(Error::Validation("No valid fields to update".to_string()));
        }
        let assignments: Vec<String> = values
            .keys()
            .map(|k| format!("{} = ?", quote_ident(k)))
            .collect();
        let (where_sql, key_binds) = key_clause(key)?;
        let sql = format!(
            "UPDATE {} SET {} WHERE {where_sql}",
            quote_ident(table.sql_name()),
            assignments.join(", ")
        );
        let mut binds: Vec<BindValue> = values.values().map(BindValue::from_json).collect();
        binds.extend(key_binds);
        let timeout = self.pool_timeout_seconds;
        let tx = self.tx_mut()?;

        let result = bind_all(sqlx::query(&sql), &binds)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx(e, timeout))?;

        Ok(result.rows_affected())
    }

    async fn delete(&mut self, table: Table, key: RowKey<'_>) -> Result<u64> {
        let (where_sql, key_binds) = key_clause(key)?;
        let sql = format!(
            "DELETE FROM {} WHERE {where_sql}",
            quote_ident(table.sql_name())
        );
        let timeout = self.pool_timeout_seconds;
        let tx = self.tx_mut()?;

        let result = bind_all(sqlx::query(&sql), &key_binds)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx(e, timeout))?;

        Ok(result.rows_affected())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already committed".to_string()))?;

        tx.commit().await.map_err(Error::Database)
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("Transaction already rolled back".to_string()))?;

        tx.rollback().await.map_err(Error::Database)
    }
}

fn key_clause(key: RowKey<'_>) -> Result<(String, Vec<BindValue>)> {
    if key.is_empty() {
        return Err(Error::Internal("Row key must not be empty".to_string()));
    }
    let sql = key
        .iter()
        .map(|(column, _)| format!("{} = ?", quote_ident(column)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let binds = key.iter().map(|(_, value)| value.clone()).collect();
    Ok((sql, binds))
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    binds: &'q [BindValue],
) -> Query<'q, MySql, MySqlArguments> {
    for value in binds {
        query = match value {
            BindValue::Text(v) => query.bind(v.as_str()),
            BindValue::Int(v) => query.bind(*v),
            BindValue::UInt(v) => query.bind(*v),
            BindValue::Float(v) => query.bind(*v),
            BindValue::Bool(v) => query.bind(*v),
            BindValue::Null => query.bind(Option::<String>::None),
        };
    }
    query
}

fn decode_row(row: &MySqlRow) -> Row {
    let mut out = Row::new();
    for column in row.columns() {
        let value = decode_value(row, column.ordinal(), column.type_info().name());
        out.insert(column.name().to_string(), value);
    }
    out
}

/// ISO-8601 without a zone, matching how the tables store local times.
fn iso_datetime(dt: NaiveDateTime) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

fn decode_value(row: &MySqlRow, idx: usize, type_name: &str) -> JsonValue {
    let decoded: std::result::Result<JsonValue, sqlx::Error> = match type_name {
        "NULL" => Ok(JsonValue::Null),
        "BOOLEAN" => row.try_get::<Option<bool>, _>(idx).map(|v| v.into()),
        t if t.ends_with("UNSIGNED") => row.try_get::<Option<u64>, _>(idx).map(|v| v.into()),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<Option<i64>, _>(idx).map(|v| v.into())
        }
        "FLOAT" | "DOUBLE" => row.try_get::<Option<f64>, _>(idx).map(|v| v.into()),
        "DECIMAL" => row
            .try_get::<Option<Decimal>, _>(idx)
            .map(|v| v.and_then(|d| d.to_f64()).into()),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .map(|v| v.map(iso_datetime).into()),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .map(|v| v.map(|d| d.format("%Y-%m-%d").to_string()).into()),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)
            .map(|v| v.map(|t| t.format("%H:%M:%S").to_string()).into()),
        "JSON" => row
            .try_get::<Option<JsonValue>, _>(idx)
            .map(|v| v.unwrap_or(JsonValue::Null)),
        _ => row.try_get::<Option<String>, _>(idx).map(|v| v.into()),
    };

    match decoded {
        Ok(value) => value,
        Err(err) => match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => v.into(),
            Err(_) => {
                tracing::debug!(column = idx, type_name, error = %err, "Undecodable column value");
                JsonValue::Null
            }
        },
    }
}
