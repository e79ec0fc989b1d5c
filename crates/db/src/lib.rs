//! MySQL access for reconciliation checks.
//!
//! Every tenant lives in its own logical database. A [`DataSource`] opens one
//! [`TenantConnection`] per unit of work; connections are never shared between
//! workers and are released when dropped.

pub mod config;
pub mod directory;
pub mod error;
pub mod row;
pub mod source;

pub use config::DbConfig;
pub use directory::{TenantCategory, TenantDirectory, TenantListing};
pub use error::{DbError, DirectoryError};
pub use source::{placeholders, query_once, DataSource, MySqlDataSource, TenantConnection};

/// Verify that a logical database is reachable by running `SELECT 1`.
pub async fn health_check(source: &dyn DataSource, database: &str) -> Result<(), DbError> {
    let rows = query_once(source, database, "SELECT 1 AS ok", &[]).await?;
    if rows.len() == 1 {
        Ok(())
    } else {
        Err(DbError::Query {
            database: database.to_string(),
            message: format!("health check returned {} rows", rows.len()),
        })
    }
}
