use async_trait::async_trait;
use recon_core::types::{Record, TenantId};
use recon_db::query_once;
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::CheckEnv;

/// Output file for [`ArsenalPrIsDcn`].
pub const OUTPUT_FILE: &str = "deliveryChallanNormalInArsenalPRV2.csv";

const PR_WITH_DC_DEBIT_NOTE_SQL: &str = "\
SELECT DISTINCT pi.debit_note_number
FROM purchase_issue pi
JOIN purchase_issue_item pii ON pii.purchase_issue_id = pi.id
JOIN delivery_challan dc ON dc.dc_number = pi.debit_note_number
WHERE pi.invoice_date >= ?";

/// Purchase returns in an arsenal whose debit note number is actually a
/// delivery challan number.
pub struct ArsenalPrIsDcn {
    env: CheckEnv,
}

impl ArsenalPrIsDcn {
    pub fn new(env: CheckEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl WorkUnit for ArsenalPrIsDcn {
    fn name(&self) -> &str {
        "arsenal-pr-is-dcn"
    }

    async fn run(&self, tenant: &TenantId, _ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let rows = query_once(
            self.env.source.as_ref(),
            tenant.as_str(),
            PR_WITH_DC_DEBIT_NOTE_SQL,
            &[self.env.since()],
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|mut row| {
                row.insert("tenant", tenant);
                row
            })
            .collect())
    }
}
