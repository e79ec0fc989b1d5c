use crate::directory::TenantCategory;

/// Failures opening or querying a tenant database.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// No usable `<NAME>_DB_CONFIG` / `MERCURY_DB_CONFIG` entry.
    #[error("Database config error for '{database}': {message}")]
    Config { database: String, message: String },

    #[error("Failed to connect to '{database}': {source}")]
    Connect {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed on '{database}': {message}")]
    Query { database: String, message: String },

    /// A column came back in a type the row decoder does not handle.
    #[error("Cannot decode column '{column}' ({type_name}): {message}")]
    Decode {
        column: String,
        type_name: String,
        message: String,
    },
}

/// The tenant directory could not be enumerated.
#[derive(Debug, thiserror::Error)]
#[error("Failed to list {category} tenants: {source}")]
pub struct DirectoryError {
    pub category: TenantCategory,
    #[source]
    pub source: DbError,
}
