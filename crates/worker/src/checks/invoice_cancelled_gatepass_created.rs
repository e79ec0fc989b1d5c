use async_trait::async_trait;
use recon_core::types::{Record, TenantId};
use recon_db::query_once;
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::CheckEnv;

/// Output file for [`InvoiceCancelledGatepassCreated`].
pub const OUTPUT_FILE: &str = "invoiceCancelledGatepassCreated.csv";

const LIVE_GATEPASS_FOR_CANCELLED_INVOICE_SQL: &str = "\
SELECT ii.id AS inward_invoice_id, ii.invoice_no, ii.created_on, ii.status,
       gi.status AS gatepass_status, gi.id AS gatepass_invoice_id, gi.gatepass_id,
       ii.total AS inward_invoice_total
FROM inward_invoice ii
JOIN gatepass_invoice gi ON gi.no = ii.invoice_no AND gi.gatepass_id = ii.gatepass_id
WHERE gi.status <> 'CANCELLED'
  AND ii.status IN ('CANCELLED', 'DELETED')
  AND ii.created_on >= ?";

/// Quote `value` as a MySQL string literal.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// The statement an operator runs to cancel the gatepass entry in `row`.
///
/// Only emitted into the report; never executed here.
pub fn cancel_statement(tenant: &TenantId, row: &Record) -> String {
    let field = |name: &str| row.field(name).unwrap_or_default().into_owned();
    format!(
        "UPDATE `{}`.gatepass_invoice SET status = 'CANCELLED' WHERE id = {} AND no = {} AND status = {};",
        tenant.as_str().replace('`', "``"),
        sql_literal(&field("gatepass_invoice_id")),
        sql_literal(&field("invoice_no")),
        sql_literal(&field("gatepass_status")),
    )
}

/// Gatepass invoices still open although their inward invoice was cancelled
/// or deleted.
pub struct InvoiceCancelledGatepassCreated {
    env: CheckEnv,
}

impl InvoiceCancelledGatepassCreated {
    pub fn new(env: CheckEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl WorkUnit for InvoiceCancelledGatepassCreated {
    fn name(&self) -> &str {
        "invoice-cancelled-gatepass-created"
    }

    async fn run(&self, tenant: &TenantId, _ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let rows = query_once(
            self.env.source.as_ref(),
            tenant.as_str(),
            LIVE_GATEPASS_FOR_CANCELLED_INVOICE_SQL,
            &[self.env.since()],
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|mut row| {
                let statement = cancel_statement(tenant, &row);
                row.insert("tenant", tenant);
                row.insert("cancelled_query", statement);
                row
            })
            .collect())
    }
}
