use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use recon_core::batch::DEFAULT_BATCH_SIZE;
use recon_core::types::TenantId;
use recon_db::directory::DEFAULT_DIRECTORY_DB;
use recon_fanout::FanOutConfig;
use recon_sink::SchemaPolicy;

/// A configuration value that could not be used.
#[derive(Debug, thiserror::Error)]
#[error("{var}='{value}' is invalid: {message}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub message: String,
}

/// Worker configuration loaded from environment variables.
///
/// Database credentials are not part of this struct; they are resolved per
/// logical database by [`recon_db::DbConfig::resolve`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Logical database holding the tenant directory tables.
    pub directory_db: String,
    /// Directory every CSV sink is written to.
    pub output_dir: PathBuf,
    /// Concurrency ceiling for a fan-out run.
    pub max_workers: usize,
    /// Per-tenant deadline; `None` when disabled.
    pub tenant_timeout: Option<Duration>,
    /// Items per `IN (...)` lookup.
    pub batch_size: usize,
    /// JSON file mapping partner detail ids to tenants.
    pub partner_map_path: PathBuf,
    /// Lower date bound overriding each check's own default.
    pub since: Option<NaiveDate>,
    pub sink_schema: SchemaPolicy,
    /// Tenants skipped by every check.
    pub exclude: Vec<TenantId>,
    /// Invoice-details CSV for checks that take their tenants from a file.
    pub input_path: Option<PathBuf>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                |
    /// |-----------------------|------------------------|
    /// | `DIRECTORY_DB`        | `mercury`              |
    /// | `OUTPUT_DIR`          | `./CSV_FILES`          |
    /// | `MAX_WORKERS`         | `10`                   |
    /// | `TENANT_TIMEOUT_SECS` | `300` (`0` disables)   |
    /// | `BATCH_SIZE`          | `500`                  |
    /// | `PARTNER_TENANT_MAP`  | `partner_tenants.json` |
    /// | `RECON_SINCE`         | (each check's own)     |
    /// | `SINK_SCHEMA`         | `strict`               |
    /// | `EXCLUDE_TENANTS`     | (empty, comma list)    |
    /// | `RECON_INPUT`         | (unset)                |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str, default: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let max_workers: usize = parse("MAX_WORKERS", &get("MAX_WORKERS", "10"))?;
        if max_workers == 0 {
            return Err(invalid("MAX_WORKERS", "0", "must be at least 1"));
        }

        let timeout_secs: u64 = parse("TENANT_TIMEOUT_SECS", &get("TENANT_TIMEOUT_SECS", "300"))?;

        let batch_size: usize = parse("BATCH_SIZE", &get("BATCH_SIZE", &DEFAULT_BATCH_SIZE.to_string()))?;
        if batch_size == 0 {
            return Err(invalid("BATCH_SIZE", "0", "must be at least 1"));
        }

        let since = match get("RECON_SINCE", "") {
            raw if raw.is_empty() => None,
            raw => Some(
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|e| invalid("RECON_SINCE", &raw, &e.to_string()))?,
            ),
        };

        let sink_schema: SchemaPolicy = parse("SINK_SCHEMA", &get("SINK_SCHEMA", "strict"))?;

        let exclude = get("EXCLUDE_TENANTS", "")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| TenantId::new(s).map_err(|e| invalid("EXCLUDE_TENANTS", s, &e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            directory_db: get("DIRECTORY_DB", DEFAULT_DIRECTORY_DB),
            output_dir: PathBuf::from(get("OUTPUT_DIR", "./CSV_FILES")),
            max_workers,
            tenant_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            batch_size,
            partner_map_path: PathBuf::from(get("PARTNER_TENANT_MAP", "partner_tenants.json")),
            since,
            sink_schema,
            exclude,
            input_path: Some(get("RECON_INPUT", ""))
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn fan_out(&self) -> Result<FanOutConfig, ConfigError> {
        FanOutConfig::new(self.max_workers, self.tenant_timeout)
            .map_err(|e| invalid("MAX_WORKERS", &self.max_workers.to_string(), &e.to_string()))
    }

    /// Date bound for a check, `YYYY-MM-DD`: the override if set, else
    /// `default`.
    pub fn since_or(&self, default: &str) -> String {
        match self.since {
            Some(since) => since.format("%Y-%m-%d").to_string(),
            None => default.to_string(),
        }
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| invalid(var, value, &e.to_string()))
}

fn invalid(var: &'static str, value: &str, message: &str) -> ConfigError {
    ConfigError {
        var,
        value: value.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.directory_db, "mercury");
        assert_eq!(cfg.output_dir, PathBuf::from("./CSV_FILES"));
        assert_eq!(cfg.max_workers, 10);
        assert_eq!(cfg.tenant_timeout, Some(Duration::from_secs(300)));
        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.since, None);
        assert_eq!(cfg.since_or("2025-08-25"), "2025-08-25");
        assert_eq!(cfg.sink_schema, SchemaPolicy::Strict);
        assert!(cfg.exclude.is_empty());
        assert_eq!(cfg.input_path, None);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let cfg = load(&[("TENANT_TIMEOUT_SECS", "0")]).unwrap();
        assert_eq!(cfg.tenant_timeout, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = load(&[
            ("MAX_WORKERS", "4"),
            ("SINK_SCHEMA", "Lenient"),
            ("RECON_SINCE", "2025-05-28"),
            ("EXCLUDE_TENANTS", "th303, th997,,th438"),
        ])
        .unwrap();
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.sink_schema, SchemaPolicy::Lenient);
        assert_eq!(cfg.since_or("2025-08-25"), "2025-05-28");
        let excluded: Vec<&str> = cfg.exclude.iter().map(TenantId::as_str).collect();
        assert_eq!(excluded, ["th303", "th997", "th438"]);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        assert_eq!(load(&[("MAX_WORKERS", "0")]).unwrap_err().var, "MAX_WORKERS");
        assert_eq!(load(&[("MAX_WORKERS", "ten")]).unwrap_err().var, "MAX_WORKERS");
        assert_eq!(load(&[("BATCH_SIZE", "0")]).unwrap_err().var, "BATCH_SIZE");
        assert_eq!(load(&[("RECON_SINCE", "08/01/2025")]).unwrap_err().var, "RECON_SINCE");
        assert_eq!(load(&[("SINK_SCHEMA", "loose")]).unwrap_err().var, "SINK_SCHEMA");
    }
}
