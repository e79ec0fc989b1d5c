use async_trait::async_trait;
use recon_core::types::{Record, TenantId};
use recon_db::query_once;
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::CheckEnv;

/// Output file for [`PrSales`].
pub const OUTPUT_FILE: &str = "prSales.csv";

const PR_SALES_WITHOUT_DEBIT_NOTE_SQL: &str = "\
SELECT pi.id AS purchase_issue_id, pi.pr_type, pi.debit_note_number,
       pi.partner_detail_id, pi.created_on, pi.status
FROM purchase_issue pi
WHERE pi.pr_type = 'PR_SALES'
  AND (pi.debit_note_number IS NULL OR pi.debit_note_number = '')
  AND pi.status NOT IN ('cancelled', 'DELETED')
  AND pi.created_on >= ?";

/// `PR_SALES` purchase returns that never got a debit note.
pub struct PrSales {
    env: CheckEnv,
}

impl PrSales {
    pub fn new(env: CheckEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl WorkUnit for PrSales {
    fn name(&self) -> &str {
        "pr-sales"
    }

    async fn run(&self, tenant: &TenantId, _ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let rows = query_once(
            self.env.source.as_ref(),
            tenant.as_str(),
            PR_SALES_WITHOUT_DEBIT_NOTE_SQL,
            &[self.env.since()],
        )
        .await?;

        Ok(rows.into_iter().map(|row| super::tenant_first(tenant, row)).collect())
    }
}
