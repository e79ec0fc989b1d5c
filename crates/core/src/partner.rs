//! Mapping from partner detail ids to the tenant that partner represents.
//!
//! Inter-tenant documents (debit notes, stock transfers) reference the
//! counterparty by `partner_detail_id`. Cross-tenant checks use this map to
//! find the destination tenant to look the document up in.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::CoreError;
use crate::types::{TenantId, Value};

/// Partner detail id to tenant lookup, loaded from a JSON object.
///
/// ```json
/// { "10234": "th411", "10311": "ar124" }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartnerTenantMap {
    entries: BTreeMap<String, TenantId>,
}

impl PartnerTenantMap {
    /// Parse a JSON object of `partner_detail_id -> tenant`.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| CoreError::PartnerMap(format!("invalid JSON: {e}")))?;

        let mut entries = BTreeMap::new();
        for (pdi, tenant) in raw {
            let pdi = pdi.trim().to_string();
            if pdi.is_empty() {
                return Err(CoreError::PartnerMap(
                    "partner detail id must not be empty".to_string(),
                ));
            }
            let tenant = TenantId::new(tenant).map_err(|e| {
                CoreError::PartnerMap(format!("partner {pdi}: {e}"))
            })?;
            entries.insert(pdi, tenant);
        }
        Ok(Self { entries })
    }

    /// Read and parse a JSON map file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CoreError::PartnerMap(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, partner_detail_id: &str) -> Option<&TenantId> {
        self.entries.get(partner_detail_id.trim())
    }

    /// Look up by a query value (ids come back as integers or text).
    pub fn get_value(&self, partner_detail_id: &Value) -> Option<&TenantId> {
        if partner_detail_id.is_null() {
            return None;
        }
        self.get(&partner_detail_id.to_field())
    }

    /// All known partner detail ids, in sorted order.
    pub fn partner_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, TenantId)> for PartnerTenantMap {
    fn from_iter<I: IntoIterator<Item = (String, TenantId)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
