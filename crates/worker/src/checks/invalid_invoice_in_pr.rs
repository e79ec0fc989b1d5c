use async_trait::async_trait;
use recon_core::types::{Record, TenantId, Value};
use recon_db::query_once;
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::CheckEnv;

/// Output file for [`InvalidInvoiceInPr`].
pub const OUTPUT_FILE: &str = "invalidInvoiceInPR.csv";

/// Inward invoice purchase types that must point back at the returning partner.
const INTER_TENANT_PURCHASE_TYPES: [&str; 2] = ["ICS", "StockTransfer"];

/// Purchase-return columns copied into each output row, after the tenants.
const COPIED_COLUMNS: [(&str, &str); 5] = [
    ("purchase_issue_id", "id"),
    ("invoice_id", "invoice_id"),
    ("invoice_no", "invoice_no"),
    ("pr_type", "pr_type"),
    ("invoice_tenant", "invoice_tenant"),
];

const TRAILING_COLUMNS: [&str; 4] = ["status", "debit_note_number", "created_on", "updated_on"];

fn purchase_returns_sql(placeholders: &str) -> String {
    format!(
        "SELECT id, partner_detail_id, tray_id, invoice_id, invoice_no, invoice_sequence_type,
       pr_type, invoice_date, invoice_tenant, status, debit_note_number, created_on, updated_on
FROM purchase_issue
WHERE pr_type <> 'REGULAR_EASYSOL'
  AND status NOT IN ('cancelled', 'DELETED')
  AND (invoice_date >= ? OR created_on >= ?)
  AND (debit_note_number IS NULL OR debit_note_number = '')
  AND partner_detail_id IN ({placeholders})"
    )
}

const INWARD_INVOICE_SQL: &str = "\
SELECT purchase_type, partner_detail_id
FROM inward_invoice
WHERE id = ?";

/// Whether a purchase return's linked inward invoice is consistent with the
/// partner it is being returned to.
///
/// A missing invoice is invalid. Invoices that are not inter-tenant purchases
/// are always valid; inter-tenant ones must name the same partner.
pub fn invoice_is_valid(invoice: Option<&Record>, partner_detail_id: &str) -> bool {
    let Some(invoice) = invoice else {
        return false;
    };
    let purchase_type = invoice.field("purchase_type").unwrap_or_default();
    if !INTER_TENANT_PURCHASE_TYPES.iter().any(|t| *t == purchase_type) {
        return true;
    }
    invoice
        .field("partner_detail_id")
        .is_some_and(|p| p.trim() == partner_detail_id.trim())
}

/// Purchase returns to a partner tenant whose linked inward invoice is
/// missing or belongs to a different partner.
pub struct InvalidInvoiceInPr {
    env: CheckEnv,
}

impl InvalidInvoiceInPr {
    pub fn new(env: CheckEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl WorkUnit for InvalidInvoiceInPr {
    fn name(&self) -> &str {
        "invalid-invoice-in-pr"
    }

    async fn run(&self, tenant: &TenantId, ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let since = self.env.since();
        let returns = self
            .env
            .query_in_batches(
                tenant.as_str(),
                purchase_returns_sql,
                &[since.clone(), since],
                &self.env.partner_ids(),
            )
            .await?;

        let candidates: Vec<Record> = returns
            .into_iter()
            .filter(|pr| pr.get("invoice_id").is_some_and(|v| !v.is_null()))
            .filter(|pr| pr.get("partner_detail_id").and_then(|p| self.env.partners.get_value(p)).is_some())
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let env = self.env.clone();
        let source_tenant = tenant.clone();
        let results = ctx
            .scatter(candidates, move |pr| {
                let env = env.clone();
                let tenant = source_tenant.clone();
                async move { validate_return(&env, &tenant, pr).await }
            })
            .await;

        let mut invalid = Vec::new();
        for result in results {
            match result {
                Ok(Some(row)) => invalid.push(row),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(%tenant, kind = e.kind(), error = %e, "Skipping purchase return")
                }
            }
        }
        Ok(invalid)
    }
}

/// Check one purchase return; `Some(row)` when its invoice is invalid.
async fn validate_return(
    env: &CheckEnv,
    tenant: &TenantId,
    pr: Record,
) -> Result<Option<Record>, WorkError> {
    let pdi_value = pr.get("partner_detail_id").cloned().unwrap_or(Value::Null);
    let Some(dest) = env.partners.get_value(&pdi_value) else {
        return Ok(None);
    };
    let invoice_id = pr.get("invoice_id").cloned().unwrap_or(Value::Null);

    let invoices = query_once(env.source.as_ref(), tenant.as_str(), INWARD_INVOICE_SQL, &[invoice_id]).await?;
    if invoice_is_valid(invoices.first(), &pdi_value.to_field()) {
        return Ok(None);
    }

    let column = |name: &str| pr.get(name).cloned().unwrap_or(Value::Null);
    let mut row = Record::new()
        .with("dest_tenant", dest)
        .with("source_tenant", tenant);
    for (out, src) in COPIED_COLUMNS {
        row.insert(out, column(src));
    }
    let same_tenant = pr.get_str("invoice_tenant") == Some(tenant.as_str());
    row.insert("is_invoice_tenant_same", same_tenant);
    for name in TRAILING_COLUMNS {
        row.insert(name, column(name));
    }
    Ok(Some(row))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(purchase_type: &str, pdi: i64) -> Record {
        Record::new()
            .with("purchase_type", purchase_type)
            .with("partner_detail_id", pdi)
    }

    #[test]
    fn missing_invoice_is_invalid() {
        assert!(!invoice_is_valid(None, "7"));
    }

    #[test]
    fn regular_purchase_is_always_valid() {
        assert!(invoice_is_valid(Some(&invoice("Regular", 99)), "7"));
    }

    #[test]
    fn inter_tenant_purchase_must_match_partner() {
        assert!(invoice_is_valid(Some(&invoice("ICS", 7)), "7"));
        assert!(invoice_is_valid(Some(&invoice("StockTransfer", 7)), " 7"));
        assert!(!invoice_is_valid(Some(&invoice("StockTransfer", 8)), "7"));
        let no_partner = Record::new().with("purchase_type", "ICS");
        assert!(!invoice_is_valid(Some(&no_partner), "7"));
    }
}
