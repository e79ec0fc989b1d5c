use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use recon_core::types::{Record, TenantId, Value};
use recon_db::query_once;
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::CheckEnv;

/// Output file for [`StrReturnQuantityDifferent`].
pub const OUTPUT_FILE: &str = "strCreatedReturnQunatityDifferent.csv";

/// Return inwards with exactly one live invoice per number, summed per line.
const INWARD_LINES_SQL: &str = "\
WITH unique_invoices AS (
    SELECT MIN(ii.id) AS id
    FROM inward_invoice ii
    WHERE ii.purchase_type IN ('StockTransferReturn', 'ICSReturn')
      AND ii.status NOT IN ('CANCELLED', 'DELETED')
      AND ii.created_on >= ?
    GROUP BY ii.invoice_no
    HAVING COUNT(*) = 1
)
SELECT ii.invoice_no, ii.status, ii.partner_detail_id, iii.code, iii.batch,
       SUM(iii.quantity) AS total_quantity
FROM inward_invoice ii
JOIN inward_invoice_item iii ON ii.id = iii.invoice_id
JOIN unique_invoices u ON ii.id = u.id
GROUP BY ii.invoice_no, ii.status, ii.partner_detail_id, iii.code, iii.batch
ORDER BY ii.invoice_no";

fn returned_quantities_sql(placeholders: &str) -> String {
    format!(
        "SELECT pi.debit_note_number, LPAD(pii.ucode, 6, '0') AS ucode, pii.batch,
       SUM(pii.return_quantity) AS total_return_qty
FROM purchase_issue_item pii
JOIN purchase_issue pi ON pii.purchase_issue_id = pi.id
WHERE pi.status NOT IN ('cancelled', 'DELETED')
  AND pi.debit_note_number IN ({placeholders})
GROUP BY pi.debit_note_number, LPAD(pii.ucode, 6, '0'), pii.batch"
    )
}

/// `(invoice_no, ucode, batch)`, ucode zero-padded to six digits.
type LineKey = (String, String, String);

fn line_key(row: &Record, invoice_column: &str, code_column: &str) -> LineKey {
    let text = |name: &str| row.field(name).unwrap_or_default().trim().to_string();
    (
        text(invoice_column),
        format!("{:0>6}", text(code_column)),
        text("batch"),
    )
}

fn quantity(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}

/// Quantity inwarded per line, with the invoice status.
#[derive(Debug, Default)]
struct Inwarded {
    quantity: f64,
    status: Option<Value>,
}

/// Compare inwarded quantities with what the source tenant returned.
///
/// A line with no matching purchase return counts as zero returned.
fn mismatches(
    tenant: &TenantId,
    source: &TenantId,
    inwarded: &BTreeMap<LineKey, Inwarded>,
    returned: &[Record],
) -> Vec<Record> {
    let mut in_pr: HashMap<LineKey, f64> = HashMap::new();
    for row in returned {
        *in_pr
            .entry(line_key(row, "debit_note_number", "ucode"))
            .or_default() += quantity(row.get("total_return_qty"));
    }

    inwarded
        .iter()
        .filter_map(|(key, line)| {
            let returned = in_pr.get(key).copied().unwrap_or(0.0);
            if returned == line.quantity {
                return None;
            }
            let (invoice_no, ucode, batch) = key.clone();
            Some(
                Record::new()
                    .with("tenant", tenant)
                    .with("ucode", ucode)
                    .with("batch", batch)
                    .with("invoice_no", invoice_no)
                    .with("returnQuantityInInwardInvoice", line.quantity)
                    .with("returnQuantityInPR", returned)
                    .with("diff", returned - line.quantity)
                    .with("status", line.status.clone())
                    .with("source_tenant", source),
            )
        })
        .collect()
}

/// Return inwards whose per-line quantity differs from the quantity the
/// source tenant's purchase return recorded under the same debit note.
pub struct StrReturnQuantityDifferent {
    env: CheckEnv,
}

impl StrReturnQuantityDifferent {
    pub fn new(env: CheckEnv) -> Self {
        Self { env }
    }
}

#[async_trait]
impl WorkUnit for StrReturnQuantityDifferent {
    fn name(&self) -> &str {
        "str-created-return-quantity-different"
    }

    async fn run(&self, tenant: &TenantId, _ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let lines = query_once(
            self.env.source.as_ref(),
            tenant.as_str(),
            INWARD_LINES_SQL,
            &[self.env.since()],
        )
        .await?;

        let mut by_source: BTreeMap<TenantId, BTreeMap<LineKey, Inwarded>> = BTreeMap::new();
        for line in &lines {
            let Some(source) = line
                .get("partner_detail_id")
                .and_then(|pdi| self.env.partners.get_value(pdi))
            else {
                tracing::warn!(
                    %tenant,
                    invoice_no = %line.field("invoice_no").unwrap_or_default(),
                    "Partner has no tenant mapping",
                );
                continue;
            };
            let entry = by_source
                .entry(source.clone())
                .or_default()
                .entry(line_key(line, "invoice_no", "code"))
                .or_default();
            entry.quantity += quantity(line.get("total_quantity"));
            entry.status = line.get("status").cloned();
        }

        let mut found = Vec::new();
        for (source, inwarded) in by_source {
            let invoice_nos: Vec<Value> = inwarded
                .keys()
                .map(|(invoice_no, _, _)| invoice_no.as_str())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(Value::from)
                .collect();
            let returned = self
                .env
                .query_in_batches(source.as_str(), returned_quantities_sql, &[], &invoice_nos)
                .await?;
            found.extend(mismatches(tenant, &source, &inwarded, &returned));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inwarded(entries: &[(&str, &str, &str, f64)]) -> BTreeMap<LineKey, Inwarded> {
        entries
            .iter()
            .map(|(invoice, code, batch, qty)| {
                let key = (invoice.to_string(), code.to_string(), batch.to_string());
                let line = Inwarded {
                    quantity: *qty,
                    status: Some(Value::from("live")),
                };
                (key, line)
            })
            .collect()
    }

    #[test]
    fn codes_are_padded_before_matching() {
        let row = Record::new()
            .with("invoice_no", "DN1")
            .with("code", "123")
            .with("batch", "B1");
        assert_eq!(
            line_key(&row, "invoice_no", "code"),
            ("DN1".to_string(), "000123".to_string(), "B1".to_string())
        );
    }

    #[test]
    fn only_differing_lines_are_reported() {
        let tenant = TenantId::new("th2").unwrap();
        let source = TenantId::new("th1").unwrap();
        let lines = inwarded(&[
            ("DN1", "000001", "B1", 5.0),
            ("DN1", "000002", "B1", 3.0),
            ("DN2", "000001", "B9", 1.0),
        ]);
        let returned = vec![
            Record::new()
                .with("debit_note_number", "DN1")
                .with("ucode", "000001")
                .with("batch", "B1")
                .with("total_return_qty", "5.000"),
            Record::new()
                .with("debit_note_number", "DN1")
                .with("ucode", "000002")
                .with("batch", "B1")
                .with("total_return_qty", 4i64),
        ];

        let rows = mismatches(&tenant, &source, &lines, &returned);

        let summary: Vec<(String, String, String)> = rows
            .iter()
            .map(|r| {
                (
                    r.field("invoice_no").unwrap().into_owned(),
                    r.field("ucode").unwrap().into_owned(),
                    r.field("diff").unwrap().into_owned(),
                )
            })
            .collect();
        let expected = [("DN1", "000002", "1"), ("DN2", "000001", "-1")]
            .map(|(a, b, c)| (a.to_string(), b.to_string(), c.to_string()));
        assert_eq!(summary, expected);
    }
}
