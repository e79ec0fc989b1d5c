use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use recon_core::types::{Record, TenantId, Value};
use recon_db::query_once;
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::CheckEnv;

/// Output file for [`StDispatchedInwardNotCreated`].
pub const OUTPUT_FILE: &str = "stDispatchInwardNotCreated.csv";

const DISPATCHED_TRANSFERS_SQL: &str = "\
SELECT id, invoice_no, dest_id, status, created_on
FROM stock_transfer
WHERE status IN ('DISPATCHED', 'PACKED')
  AND invoice_no IS NOT NULL
  AND created_on >= ?";

fn inward_invoices_sql(placeholders: &str) -> String {
    format!(
        "SELECT invoice_no
FROM inward_invoice
WHERE invoice_no IN ({placeholders})
  AND status NOT IN ('CANCELLED', 'DELETED')"
    )
}

/// Group stock transfers by destination tenant. Transfers without a usable
/// `dest_id` are dropped.
fn by_destination(tenant: &TenantId, transfers: Vec<Record>) -> BTreeMap<TenantId, Vec<Record>> {
    let mut groups: BTreeMap<TenantId, Vec<Record>> = BTreeMap::new();
    for transfer in transfers {
        let dest = transfer
            .field("dest_id")
            .and_then(|d| TenantId::new(d.trim()).ok());
        match dest {
            Some(dest) => groups.entry(dest).or_default().push(transfer),
            None => tracing::warn!(%tenant, transfer = ?transfer.get("id"), "Stock transfer has no destination"),
        }
    }
    groups
}

/// Stock transfers dispatched to another tenant that the destination never
/// inwarded.
///
/// The destination is the transfer's `dest_id`, which names the receiving
/// tenant directly. Each destination is looked up as nested work.
pub struct StDispatchedInwardNotCreated {
    env: CheckEnv,
}

impl StDispatchedInwardNotCreated {
    pub fn new(env: CheckEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl WorkUnit for StDispatchedInwardNotCreated {
    fn name(&self) -> &str {
        "st-dispatched-inward-not-created"
    }

    async fn run(&self, tenant: &TenantId, ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let transfers = query_once(
            self.env.source.as_ref(),
            tenant.as_str(),
            DISPATCHED_TRANSFERS_SQL,
            &[self.env.since()],
        )
        .await?;
        if transfers.is_empty() {
            return Ok(Vec::new());
        }

        let env = self.env.clone();
        let source = tenant.clone();
        let results = ctx
            .scatter(by_destination(tenant, transfers), move |(dest, transfers)| {
                let env = env.clone();
                let source = source.clone();
                async move { missing_at(&env, &source, dest, transfers).await }
            })
            .await;

        let mut missing = Vec::new();
        for result in results {
            missing.extend(result?);
        }
        Ok(missing)
    }
}

/// Transfers from `source` whose invoice number has no live inward at `dest`.
async fn missing_at(
    env: &CheckEnv,
    source: &TenantId,
    dest: TenantId,
    transfers: Vec<Record>,
) -> Result<Vec<Record>, WorkError> {
    let invoice_nos: Vec<Value> = transfers
        .iter()
        .filter_map(|st| st.get("invoice_no").cloned())
        .collect();

    let found: HashSet<String> = env
        .query_in_batches(dest.as_str(), inward_invoices_sql, &[], &invoice_nos)
        .await?
        .iter()
        .filter_map(|row| row.field("invoice_no").map(|f| f.into_owned()))
        .collect();

    Ok(transfers
        .into_iter()
        .filter(|st| {
            st.field("invoice_no")
                .is_some_and(|no| !found.contains(&*no))
        })
        .map(|mut st| {
            st.insert("tenant", &dest);
            st.insert("source_tenant", source);
            st
        })
        .collect())
}
