//! Per-tenant data source.
//!
//! [`DataSource`] is the seam between reconciliation checks and MySQL: the
//! production implementation is [`MySqlDataSource`], tests substitute an
//! in-memory fake. A [`TenantConnection`] owns exactly one connection and is
//! used by exactly one work unit.

use async_trait::async_trait;
use recon_core::types::{Record, Value};
use sqlx::mysql::{MySqlArguments, MySqlConnection};
use sqlx::query::Query;
use sqlx::{Connection, MySql};

use crate::config::DbConfig;
use crate::error::DbError;
use crate::row::row_to_record;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Opens connections to logical databases by name.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Open a dedicated connection to `database` (a tenant id or a shared
    /// database such as `mercury`).
    async fn open(&self, database: &str) -> Result<Box<dyn TenantConnection>, DbError>;
}

/// A single open connection. Dropping it releases the handle.
#[async_trait]
pub trait TenantConnection: Send {
    /// Name of the database this connection was opened against.
    fn database(&self) -> &str;

    /// Run `sql` with positional `?` parameters and collect all rows.
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Record>, DbError>;

    /// Close the connection gracefully.
    async fn close(self: Box<Self>) -> Result<(), DbError>;
}

/// Open `database`, run one query, and close the connection.
///
/// The connection is closed whether or not the query succeeds; a query error
/// takes precedence over a close error.
pub async fn query_once(
    source: &dyn DataSource,
    database: &str,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Record>, DbError> {
    let mut conn = source.open(database).await?;
    let result = conn.query(sql, params).await;
    let closed = conn.close().await;
    match (result, closed) {
        (Ok(rows), Ok(())) => Ok(rows),
        (Ok(_), Err(e)) => {
            tracing::warn!(database, error = %e, "Connection close failed after successful query");
            Err(e)
        }
        (Err(e), _) => Err(e),
    }
}

/// Build a `?, ?, ?` placeholder list for an `IN (...)` clause.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ---------------------------------------------------------------------------
// MySQL implementation
// ---------------------------------------------------------------------------

/// [`DataSource`] that resolves credentials from the environment and opens a
/// fresh MySQL connection per call.
#[derive(Debug, Default, Clone)]
pub struct MySqlDataSource;

impl MySqlDataSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for MySqlDataSource {
    async fn open(&self, database: &str) -> Result<Box<dyn TenantConnection>, DbError> {
        let config = DbConfig::resolve(database)?;
        let conn = MySqlConnection::connect_with(&config.connect_options(database))
            .await
            .map_err(|source| DbError::Connect {
                database: database.to_string(),
                source,
            })?;
        tracing::debug!(database, host = %config.host, "Opened database connection");
        Ok(Box::new(MySqlTenantConnection {
            database: database.to_string(),
            conn,
        }))
    }
}

struct MySqlTenantConnection {
    database: String,
    conn: MySqlConnection,
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::UInt(u) => query.bind(*u),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
    }
}

#[async_trait]
impl TenantConnection for MySqlTenantConnection {
    fn database(&self) -> &str {
        &self.database
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Record>, DbError> {
        let query = params
            .iter()
            .fold(sqlx::query(sql), |query, value| bind_value(query, value));

        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| DbError::Query {
                database: self.database.clone(),
                message: e.to_string(),
            })?;

        rows.iter().map(row_to_record).collect()
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        let database = self.database;
        self.conn.close().await.map_err(|e| DbError::Query {
            database,
            message: format!("close failed: {e}"),
        })
    }
}
