use async_trait::async_trait;
use recon_core::types::{Record, TenantId};
use recon_db::query_once;
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::CheckEnv;

/// Output file for [`DuplicateStrInwardInvoice`].
pub const OUTPUT_FILE: &str = "duplicateStrInwardInvoice.csv";

const DUPLICATE_RETURN_INWARDS_SQL: &str = "\
SELECT ii.invoice_no,
       GROUP_CONCAT(DISTINCT ii.status SEPARATOR ', ') AS statuses,
       GROUP_CONCAT(ii.created_on SEPARATOR ', ') AS created_ons,
       GROUP_CONCAT(DISTINCT ii.created_by SEPARATOR ', ') AS created_by,
       GROUP_CONCAT(ii.total SEPARATOR ', ') AS total_amount_invoice,
       COUNT(*) AS total_count
FROM inward_invoice ii
WHERE ii.purchase_type IN ('StockTransferReturn', 'ICSReturn')
  AND ii.status NOT IN ('CANCELLED', 'DELETED')
  AND ii.created_on >= ?
GROUP BY ii.invoice_no
HAVING COUNT(*) > 1
ORDER BY total_count DESC";

/// Return invoice numbers inwarded more than once by the same tenant.
pub struct DuplicateStrInwardInvoice {
    env: CheckEnv,
}

impl DuplicateStrInwardInvoice {
    pub fn new(env: CheckEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl WorkUnit for DuplicateStrInwardInvoice {
    fn name(&self) -> &str {
        "duplicate-str-inward-invoice"
    }

    async fn run(&self, tenant: &TenantId, _ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let rows = query_once(
            self.env.source.as_ref(),
            tenant.as_str(),
            DUPLICATE_RETURN_INWARDS_SQL,
            &[self.env.since()],
        )
        .await?;

        Ok(rows.into_iter().map(|row| super::tenant_first(tenant, row)).collect())
    }
}
