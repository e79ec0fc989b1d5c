use async_trait::async_trait;
use recon_core::batch::batches;
use recon_core::types::{Record, TenantId, Value};
use recon_db::{placeholders, query_once};
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::CheckEnv;

/// Output file for [`MultiCnForStrInward`].
pub const OUTPUT_FILE: &str = "multiCNForStrInward.csv";

/// Logical database holding debit and credit notes for every tenant.
pub const VAULT_DB: &str = "vault";

const RETURN_NOTE_TYPES: [&str; 2] = ["ICS_RETURN", "ST_RETURN"];

const LIVE_RETURN_INWARDS_SQL: &str = "\
SELECT id AS invoice_id, invoice_no, created_on
FROM inward_invoice
WHERE purchase_type IN ('StockTransferReturn', 'ICSReturn')
  AND status = 'live'
  AND created_on >= ?";

fn repeated_notes_sql(placeholders: &str) -> String {
    format!(
        "SELECT return_order_id, note_type, partner_detail_id,
       GROUP_CONCAT(debit_note_number SEPARATOR ', ') AS debit_note_numbers,
       GROUP_CONCAT(credit_note_number SEPARATOR ', ') AS credit_note_numbers
FROM debitnote
WHERE return_order_id IN ({placeholders})
  AND note_type IN (?, ?)
  AND tenant = ?
GROUP BY return_order_id
HAVING COUNT(DISTINCT debit_note_number) > 1"
    )
}

/// Return inward invoices that were issued more than one credit note in
/// the vault.
///
/// Invoice ids are looked up in batches; the batches run as nested work on
/// the run's shared pool.
pub struct MultiCnForStrInward {
    env: CheckEnv,
}

impl MultiCnForStrInward {
    pub fn new(env: CheckEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl WorkUnit for MultiCnForStrInward {
    fn name(&self) -> &str {
        "multi-cn-for-str-inward"
    }

    async fn run(&self, tenant: &TenantId, ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let inwards = query_once(
            self.env.source.as_ref(),
            tenant.as_str(),
            LIVE_RETURN_INWARDS_SQL,
            &[self.env.since()],
        )
        .await?;

        let ids: Vec<Value> = inwards
            .iter()
            .filter_map(|row| row.get("invoice_id"))
            .filter(|id| !id.is_null())
            .cloned()
            .collect();
        if ids.is_empty() {
            tracing::debug!(%tenant, "No return inwards to look up");
            return Ok(Vec::new());
        }

        let chunks: Vec<Vec<Value>> = batches(&ids, self.env.batch_size)?
            .into_iter()
            .map(|batch| batch.items.to_vec())
            .collect();
        tracing::debug!(%tenant, invoices = ids.len(), batches = chunks.len(), "Looking up credit notes");

        let env = self.env.clone();
        let owner = tenant.clone();
        let results = ctx
            .scatter(chunks, move |chunk| {
                let env = env.clone();
                let tenant = owner.clone();
                async move { repeated_notes(&env, &tenant, chunk).await }
            })
            .await;

        let mut rows = Vec::new();
        for result in results {
            rows.extend(result?);
        }
        Ok(rows)
    }
}

async fn repeated_notes(
    env: &CheckEnv,
    tenant: &TenantId,
    invoice_ids: Vec<Value>,
) -> Result<Vec<Record>, WorkError> {
    let sql = repeated_notes_sql(&placeholders(invoice_ids.len()));
    let mut params = invoice_ids;
    params.extend(RETURN_NOTE_TYPES.iter().map(|t| Value::from(*t)));
    params.push(Value::from(tenant));

    let rows = query_once(env.source.as_ref(), VAULT_DB, &sql, &params).await?;
    Ok(rows
        .into_iter()
        .map(|mut row| {
            row.insert("tenant", tenant);
            row
        })
        .collect())
}
