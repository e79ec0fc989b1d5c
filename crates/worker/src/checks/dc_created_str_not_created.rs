use std::collections::HashSet;

use async_trait::async_trait;
use recon_core::types::{Record, TenantId, Value};
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::{group_by_partner, CheckEnv};

/// Output file for [`DcCreatedStrNotCreated`].
pub const OUTPUT_FILE: &str = "dcCreatedStrNotCreated.csv";

/// Debit notes prefixed with this are not delivery challans.
const NON_DC_PREFIX: &str = "PE";

fn debit_notes_sql(placeholders: &str) -> String {
    format!(
        "SELECT DISTINCT pi.debit_note_number, pi.partner_detail_id
FROM purchase_issue pi
JOIN purchase_issue_item pii ON pii.purchase_issue_id = pi.id
WHERE pi.debit_note_number IS NOT NULL
  AND pi.invoice_date >= ?
  AND pi.pr_type <> 'REGULAR_EASYSOL'
  AND pi.status NOT IN ('cancelled', 'DELETED')
  AND pi.partner_detail_id IN ({placeholders})"
    )
}

fn inward_invoices_sql(placeholders: &str) -> String {
    format!(
        "SELECT DISTINCT ii.invoice_no
FROM inward_invoice ii
WHERE ii.status NOT IN ('CANCELLED', 'DELETED')
  AND ii.invoice_no IN ({placeholders})"
    )
}

/// Delivery challans raised against a partner tenant for which the partner
/// never created the matching stock-transfer inward invoice.
pub struct DcCreatedStrNotCreated {
    env: CheckEnv,
}

impl DcCreatedStrNotCreated {
    pub fn new(env: CheckEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl WorkUnit for DcCreatedStrNotCreated {
    fn name(&self) -> &str {
        "dc-created-str-not-created"
    }

    async fn run(&self, tenant: &TenantId, _ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let issues = self
            .env
            .query_in_batches(
                tenant.as_str(),
                debit_notes_sql,
                &[self.env.since()],
                &self.env.partner_ids(),
            )
            .await?;

        let mut missing = Vec::new();
        for (pdi, debit_notes) in group_by_partner(&issues, "debit_note_number") {
            let Some(dest) = self.env.partners.get(&pdi) else {
                tracing::warn!(%tenant, partner_detail_id = %pdi, "Partner has no tenant mapping");
                continue;
            };
            let dcs: Vec<Value> = debit_notes
                .into_iter()
                .filter(|dn| !dn.starts_with(NON_DC_PREFIX))
                .map(Value::from)
                .collect();

            let found: HashSet<String> = self
                .env
                .query_in_batches(dest.as_str(), inward_invoices_sql, &[], &dcs)
                .await?
                .iter()
                .filter_map(|row| row.field("invoice_no").map(|f| f.into_owned()))
                .collect();

            missing.extend(
                dcs.iter()
                    .filter(|dc| !found.contains(&*dc.to_field()))
                    .map(|dc| {
                        Record::new()
                            .with("source_debit_note_number", dc.clone())
                            .with("dest_tenant", dest)
                            .with("source_tenant", tenant)
                    }),
            );
        }

        Ok(missing)
    }
}
