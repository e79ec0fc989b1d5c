use std::collections::HashSet;

use async_trait::async_trait;
use recon_core::types::{Record, TenantId, Value};
use recon_fanout::{WorkContext, WorkError, WorkUnit};
use recon_sink::SinkFile;

use super::{group_by_partner, CheckEnv};

/// Output file for returns that already have a delivery challan.
pub const GENERATED_FILE: &str = "ucodeNeverInwardForDCGenerated.csv";

/// Output file for returns without a delivery challan.
pub const NOT_GENERATED_FILE: &str = "ucodeNeverInwardForDCNotGenerated.csv";

/// Whether the purchase return already has a delivery challan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcState {
    Generated,
    NotGenerated,
}

impl DcState {
    pub const ALL: [DcState; 2] = [DcState::NotGenerated, DcState::Generated];

    pub fn output_file(self) -> &'static str {
        match self {
            DcState::Generated => GENERATED_FILE,
            DcState::NotGenerated => NOT_GENERATED_FILE,
        }
    }

    fn debit_note_filter(self) -> &'static str {
        match self {
            DcState::Generated => "pi.debit_note_number IS NOT NULL AND pi.debit_note_number <> ''",
            DcState::NotGenerated => "(pi.debit_note_number IS NULL OR pi.debit_note_number = '')",
        }
    }

    fn returned_ucodes_sql(self, placeholders: &str) -> String {
        format!(
            "SELECT DISTINCT pi.partner_detail_id, LPAD(pii.ucode, 6, '0') AS ucode
FROM purchase_issue pi
JOIN purchase_issue_item pii ON pii.purchase_issue_id = pi.id
WHERE pi.status NOT IN ('cancelled', 'DELETED')
  AND {}
  AND pi.created_on >= ?
  AND pi.partner_detail_id IN ({placeholders})",
            self.debit_note_filter()
        )
    }
}

fn inwarded_codes_sql(placeholders: &str) -> String {
    format!(
        "SELECT DISTINCT iii.code
FROM inward_invoice ii
JOIN inward_invoice_item iii ON iii.invoice_id = ii.id
WHERE ii.status = 'live'
  AND ii.purchase_type NOT IN ('ICSReturn', 'StockTransferReturn')
  AND iii.code IN ({placeholders})"
    )
}

/// Unit codes returned to a partner tenant that never show up in the
/// partner's live inward invoices. Runs once per [`DcState`], writing each
/// pass to its own file.
pub struct UcodeNeverInwarded {
    env: CheckEnv,
    generated: SinkFile,
    not_generated: SinkFile,
}

impl UcodeNeverInwarded {
    pub fn new(env: CheckEnv, generated: SinkFile, not_generated: SinkFile) -> Self {
        Self {
            env,
            generated,
            not_generated,
        }
    }

    fn sink(&self, state: DcState) -> &SinkFile {
        match state {
            DcState::Generated => &self.generated,
            DcState::NotGenerated => &self.not_generated,
        }
    }

    async fn missing_ucodes(&self, tenant: &TenantId, state: DcState) -> Result<Vec<Record>, WorkError> {
        let returned = self
            .env
            .query_in_batches(
                tenant.as_str(),
                |ph| state.returned_ucodes_sql(ph),
                &[self.env.since()],
                &self.env.partner_ids(),
            )
            .await?;

        let mut missing = Vec::new();
        for (pdi, ucodes) in group_by_partner(&returned, "ucode") {
            let Some(dest) = self.env.partners.get(&pdi) else {
                tracing::warn!(%tenant, partner_detail_id = %pdi, "Partner has no tenant mapping");
                continue;
            };
            let codes: Vec<Value> = ucodes.iter().map(Value::from).collect();
            let inwarded: HashSet<String> = self
                .env
                .query_in_batches(dest.as_str(), inwarded_codes_sql, &[], &codes)
                .await?
                .iter()
                .filter_map(|row| row.field("code").map(|f| f.into_owned()))
                .collect();

            for ucode in ucodes.into_iter().filter(|u| !inwarded.contains(u)) {
                tracing::debug!(%tenant, partner_detail_id = %pdi, %ucode, %dest, "Ucode never inwarded");
                missing.push(
                    Record::new()
                        .with("tenant", tenant)
                        .with("partner_detail_id", pdi.as_str())
                        .with("ucode", ucode)
                        .with("dest_tenant", dest),
                );
            }
        }
        Ok(missing)
    }
}

#[async_trait]
impl WorkUnit for UcodeNeverInwarded {
    fn name(&self) -> &str {
        "ucode-never-inwarded"
    }

    async fn run(&self, tenant: &TenantId, _ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        for state in DcState::ALL {
            let missing = self.missing_ucodes(tenant, state).await?;
            let written = self.sink(state).append(missing).await?;
            tracing::info!(%tenant, file = state.output_file(), rows = written, "Ucode pass finished");
        }
        // Both passes wrote to their own files.
        Ok(Vec::new())
    }
}
