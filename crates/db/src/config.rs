//! Connection settings for logical databases.
//!
//! Credentials come from JSON-valued environment variables, one per logical
//! database name (upper-cased), with `MERCURY_DB_CONFIG` as the fallback
//! server for any name that has no entry of its own:
//!
//! | Variable              | Example                                                    |
//! |-----------------------|------------------------------------------------------------|
//! | `TH411_DB_CONFIG`     | `{"host":"th-replica","user":"ro","password":"...","port":3306}` |
//! | `MERCURY_DB_CONFIG`   | `{"host":"mercury-replica","user":"ro","password":"..."}`  |

use std::fmt;

use serde::Deserialize;
use sqlx::mysql::MySqlConnectOptions;

use crate::error::DbError;

/// Default MySQL port when the config omits `port`.
pub const DEFAULT_PORT: u16 = 3306;

/// Environment variable consulted when a database has no config of its own.
pub const FALLBACK_CONFIG_VAR: &str = "MERCURY_DB_CONFIG";

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Host and credentials for one MySQL server.
#[derive(Clone, Deserialize)]
pub struct DbConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("port", &self.port)
            .finish()
    }
}

impl DbConfig {
    /// Name of the environment variable holding config for `database`.
    pub fn env_var_for(database: &str) -> String {
        format!("{}_DB_CONFIG", database.trim().to_uppercase())
    }

    /// Resolve the config for `database` from the process environment.
    pub fn resolve(database: &str) -> Result<Self, DbError> {
        Self::resolve_with(database, |key| std::env::var(key).ok())
    }

    /// Resolve using an arbitrary variable lookup.
    ///
    /// A missing, empty, or `{}` entry for the database falls back to
    /// [`FALLBACK_CONFIG_VAR`]. A present but malformed entry is an error.
    pub fn resolve_with<F>(database: &str, lookup: F) -> Result<Self, DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let own = lookup(&Self::env_var_for(database)).filter(|raw| !is_blank_config(raw));
        let (var, raw) = match own {
            Some(raw) => (Self::env_var_for(database), raw),
            None => {
                let raw = lookup(FALLBACK_CONFIG_VAR)
                    .filter(|raw| !is_blank_config(raw))
                    .ok_or_else(|| DbError::Config {
                        database: database.to_string(),
                        message: format!(
                            "neither {} nor {FALLBACK_CONFIG_VAR} is set",
                            Self::env_var_for(database)
                        ),
                    })?;
                (FALLBACK_CONFIG_VAR.to_string(), raw)
            }
        };

        serde_json::from_str(&raw).map_err(|e| DbError::Config {
            database: database.to_string(),
            message: format!("{var} is not a valid config object: {e}"),
        })
    }

    /// Connect options targeting `database` on this server.
    pub fn connect_options(&self, database: &str) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
    }
}

fn is_blank_config(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.is_empty() || trimmed == "{}"
}
