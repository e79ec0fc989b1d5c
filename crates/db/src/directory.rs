//! Tenant directory: which tenant databases exist and are set up.
//!
//! Tenants are enumerated from the shared directory database (`mercury` by
//! default). A lookup failure is reported as a [`DirectoryError`] rather than
//! collapsed into an empty list, so callers can tell "nothing to do" apart
//! from "could not ask".

use std::fmt;
use std::sync::Arc;

use recon_core::types::TenantId;

use crate::error::DirectoryError;
use crate::source::{query_once, DataSource};

/// Logical database that holds the `warehouse` and `arsenal` tables.
pub const DEFAULT_DIRECTORY_DB: &str = "mercury";

/// A family of tenants listed in its own directory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantCategory {
    Warehouse,
    Arsenal,
}

impl TenantCategory {
    pub const ALL: [TenantCategory; 2] = [TenantCategory::Warehouse, TenantCategory::Arsenal];

    /// Directory table listing tenants of this category.
    pub fn table(self) -> &'static str {
        match self {
            TenantCategory::Warehouse => "warehouse",
            TenantCategory::Arsenal => "arsenal",
        }
    }

    /// Query returning the set-up tenants of this category, ordered by id.
    pub fn list_query(self) -> String {
        format!(
            "SELECT tenant FROM {} WHERE is_setup = 1 ORDER BY tenant",
            self.table()
        )
    }
}

impl fmt::Display for TenantCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// Result of listing several categories.
///
/// `tenants` holds every tenant from the categories that succeeded, in
/// category order; `failures` holds one error per category that did not.
#[derive(Debug, Default)]
pub struct TenantListing {
    pub tenants: Vec<TenantId>,
    pub failures: Vec<DirectoryError>,
}

impl TenantListing {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Enumerates tenants through a [`DataSource`].
#[derive(Clone)]
pub struct TenantDirectory {
    source: Arc<dyn DataSource>,
    database: String,
}

impl TenantDirectory {
    pub fn new(source: Arc<dyn DataSource>, database: impl Into<String>) -> Self {
        Self {
            source,
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// List the set-up tenants of one category.
    ///
    /// Rows with an empty tenant value are skipped with a warning.
    pub async fn list_tenants(
        &self,
        category: TenantCategory,
    ) -> Result<Vec<TenantId>, DirectoryError> {
        let rows = query_once(self.source.as_ref(), &self.database, &category.list_query(), &[])
            .await
            .map_err(|source| DirectoryError { category, source })?;

        let mut tenants = Vec::with_capacity(rows.len());
        for row in rows {
            let raw = row.field("tenant").map(|f| f.into_owned()).unwrap_or_default();
            match TenantId::new(raw) {
                Ok(id) => tenants.push(id),
                Err(e) => tracing::warn!(%category, error = %e, "Skipping invalid tenant row"),
            }
        }

        tracing::info!(%category, count = tenants.len(), "Listed tenants");
        Ok(tenants)
    }

    /// List several categories, concatenated in the given order.
    ///
    /// A failing category is logged and recorded in
    /// [`TenantListing::failures`]; the remaining categories are still listed.
    /// Duplicates across categories are kept.
    pub async fn list_all(&self, categories: &[TenantCategory]) -> TenantListing {
        let mut listing = TenantListing::default();
        for &category in categories {
            match self.list_tenants(category).await {
                Ok(mut tenants) => listing.tenants.append(&mut tenants),
                Err(e) => {
                    tracing::error!(%category, error = %e, "Tenant directory lookup failed");
                    listing.failures.push(e);
                }
            }
        }
        listing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_targets_category_table() {
        assert_eq!(
            TenantCategory::Arsenal.list_query(),
            "SELECT tenant FROM arsenal WHERE is_setup = 1 ORDER BY tenant"
        );
        assert!(TenantCategory::Warehouse.list_query().contains("FROM warehouse"));
    }

    #[test]
    fn all_lists_warehouses_first() {
        assert_eq!(
            TenantCategory::ALL,
            [TenantCategory::Warehouse, TenantCategory::Arsenal]
        );
    }
}
