//! Reconciliation checks.
//!
//! Each check is a [`WorkUnit`](recon_fanout::WorkUnit) run once per tenant.
//! Cross-tenant checks resolve the counterparty of a document through the
//! [`PartnerTenantMap`] and look it up in that tenant's database in batches.

mod arsenal_pr_is_dcn;
mod dc_created_str_not_created;
mod duplicate_str_inward_invoice;
mod invalid_invoice_in_pr;
mod invoice_cancelled_gatepass_created;
mod invoice_submitted_pr_not_created;
mod multi_cn_for_str_inward;
mod pr_sales;
mod st_dispatched_inward_not_created;
mod str_return_quantity_different;
mod ucode_never_inwarded;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use recon_core::batch::batches;
use recon_core::partner::PartnerTenantMap;
use recon_core::types::{Record, TenantId, Value};
use recon_db::{placeholders, DataSource, TenantCategory};
use recon_fanout::WorkError;

pub use arsenal_pr_is_dcn::ArsenalPrIsDcn;
pub use dc_created_str_not_created::DcCreatedStrNotCreated;
pub use duplicate_str_inward_invoice::DuplicateStrInwardInvoice;
pub use invalid_invoice_in_pr::{invoice_is_valid, InvalidInvoiceInPr};
pub use invoice_cancelled_gatepass_created::{cancel_statement, InvoiceCancelledGatepassCreated};
pub use invoice_submitted_pr_not_created::{InvoiceDetails, InvoiceSubmittedPrNotCreated};
pub use multi_cn_for_str_inward::{MultiCnForStrInward, VAULT_DB};
pub use pr_sales::PrSales;
pub use st_dispatched_inward_not_created::StDispatchedInwardNotCreated;
pub use str_return_quantity_different::StrReturnQuantityDifferent;
pub use ucode_never_inwarded::{DcState, UcodeNeverInwarded};

// ---------------------------------------------------------------------------
// Check catalogue
// ---------------------------------------------------------------------------

/// The checks the worker can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    ArsenalPrIsDcn,
    DcCreatedStrNotCreated,
    UcodeNeverInwarded,
    InvalidInvoiceInPr,
    DuplicateStrInwardInvoice,
    InvoiceCancelledGatepassCreated,
    MultiCnForStrInward,
    PrSales,
    StrReturnQuantityDifferent,
    StDispatchedInwardNotCreated,
    InvoiceSubmittedPrNotCreated,
}

impl Check {
    pub const ALL: [Check; 11] = [
        Check::ArsenalPrIsDcn,
        Check::DcCreatedStrNotCreated,
        Check::UcodeNeverInwarded,
        Check::InvalidInvoiceInPr,
        Check::DuplicateStrInwardInvoice,
        Check::InvoiceCancelledGatepassCreated,
        Check::MultiCnForStrInward,
        Check::PrSales,
        Check::StrReturnQuantityDifferent,
        Check::StDispatchedInwardNotCreated,
        Check::InvoiceSubmittedPrNotCreated,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Check::ArsenalPrIsDcn => "arsenal-pr-is-dcn",
            Check::DcCreatedStrNotCreated => "dc-created-str-not-created",
            Check::UcodeNeverInwarded => "ucode-never-inwarded",
            Check::InvalidInvoiceInPr => "invalid-invoice-in-pr",
            Check::DuplicateStrInwardInvoice => "duplicate-str-inward-invoice",
            Check::InvoiceCancelledGatepassCreated => "invoice-cancelled-gatepass-created",
            Check::MultiCnForStrInward => "multi-cn-for-str-inward",
            Check::PrSales => "pr-sales",
            Check::StrReturnQuantityDifferent => "str-created-return-quantity-different",
            Check::StDispatchedInwardNotCreated => "st-dispatched-inward-not-created",
            Check::InvoiceSubmittedPrNotCreated => "invoice-submitted-pr-not-created",
        }
    }

    /// Tenant categories the check runs over, in listing order.
    ///
    /// Ignored by checks whose tenants come from an input file.
    pub fn categories(self) -> &'static [TenantCategory] {
        match self {
            Check::ArsenalPrIsDcn => &[TenantCategory::Arsenal],
            _ => &TenantCategory::ALL,
        }
    }

    /// Files the check writes, relative to the output directory.
    pub fn output_files(self) -> &'static [&'static str] {
        match self {
            Check::ArsenalPrIsDcn => &[arsenal_pr_is_dcn::OUTPUT_FILE],
            Check::DcCreatedStrNotCreated => &[dc_created_str_not_created::OUTPUT_FILE],
            Check::UcodeNeverInwarded => &[
                ucode_never_inwarded::NOT_GENERATED_FILE,
                ucode_never_inwarded::GENERATED_FILE,
            ],
            Check::InvalidInvoiceInPr => &[invalid_invoice_in_pr::OUTPUT_FILE],
            Check::DuplicateStrInwardInvoice => &[duplicate_str_inward_invoice::OUTPUT_FILE],
            Check::InvoiceCancelledGatepassCreated => &[invoice_cancelled_gatepass_created::OUTPUT_FILE],
            Check::MultiCnForStrInward => &[multi_cn_for_str_inward::OUTPUT_FILE],
            Check::PrSales => &[pr_sales::OUTPUT_FILE],
            Check::StrReturnQuantityDifferent => &[str_return_quantity_different::OUTPUT_FILE],
            Check::StDispatchedInwardNotCreated => &[st_dispatched_inward_not_created::OUTPUT_FILE],
            Check::InvoiceSubmittedPrNotCreated => &[],
        }
    }

    /// Whether the check needs the partner-to-tenant map.
    pub fn uses_partner_map(self) -> bool {
        matches!(
            self,
            Check::DcCreatedStrNotCreated
                | Check::UcodeNeverInwarded
                | Check::InvalidInvoiceInPr
                | Check::StrReturnQuantityDifferent
        )
    }

    /// Whether tenants come from an invoice-details input file instead of
    /// the directory.
    pub fn reads_input(self) -> bool {
        matches!(self, Check::InvoiceSubmittedPrNotCreated)
    }

    /// Lower date bound, `YYYY-MM-DD`, used when `RECON_SINCE` is unset.
    pub fn default_since(self) -> &'static str {
        match self {
            Check::ArsenalPrIsDcn => "2025-08-25",
            Check::DcCreatedStrNotCreated | Check::MultiCnForStrInward => "2025-05-28",
            Check::InvoiceCancelledGatepassCreated => "2025-05-27",
            Check::PrSales => "2025-07-01",
            Check::StDispatchedInwardNotCreated => "2025-08-22",
            Check::DuplicateStrInwardInvoice | Check::StrReturnQuantityDifferent => "2025-08-26",
            Check::UcodeNeverInwarded
            | Check::InvalidInvoiceInPr
            | Check::InvoiceSubmittedPrNotCreated => "2025-08-01",
        }
    }
}

// ---------------------------------------------------------------------------
// Shared environment
// ---------------------------------------------------------------------------

/// Everything a check needs besides the tenant it runs for.
#[derive(Clone)]
pub struct CheckEnv {
    pub source: Arc<dyn DataSource>,
    pub partners: Arc<PartnerTenantMap>,
    /// Lower date bound, `YYYY-MM-DD`.
    pub since: String,
    pub batch_size: usize,
}

impl CheckEnv {
    pub(crate) fn since(&self) -> Value {
        Value::from(self.since.as_str())
    }

    pub(crate) fn partner_ids(&self) -> Vec<Value> {
        self.partners.partner_ids().into_iter().map(Value::from).collect()
    }

    /// Run `sql_for(placeholders)` once per batch of `items` on a single
    /// connection to `database`. `leading` parameters are bound before each
    /// batch's items.
    pub(crate) async fn query_in_batches<F>(
        &self,
        database: &str,
        sql_for: F,
        leading: &[Value],
        items: &[Value],
    ) -> Result<Vec<Record>, WorkError>
    where
        F: Fn(&str) -> String,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let chunks = batches(items, self.batch_size)?;
        let mut conn = self.source.open(database).await?;
        let mut rows = Vec::new();
        for batch in chunks {
            let sql = sql_for(&placeholders(batch.len()));
            let mut params = leading.to_vec();
            params.extend_from_slice(batch.items);
            rows.extend(conn.query(&sql, &params).await?);
        }
        conn.close().await?;
        Ok(rows)
    }
}

/// `row` with a leading `tenant` column.
pub(crate) fn tenant_first(tenant: &TenantId, row: Record) -> Record {
    row.iter()
        .fold(Record::new().with("tenant", tenant), |record, (key, value)| {
            record.with(key, value.clone())
        })
}

/// Group `value_field` of each row by its `partner_detail_id`.
pub(crate) fn group_by_partner(rows: &[Record], value_field: &str) -> BTreeMap<String, BTreeSet<String>> {
    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for row in rows {
        let (Some(pdi), Some(value)) = (row.get("partner_detail_id"), row.get(value_field)) else {
            continue;
        };
        if pdi.is_null() || value.is_null() {
            continue;
        }
        groups
            .entry(pdi.to_field().into_owned())
            .or_default()
            .insert(value.to_field().into_owned());
    }
    groups
}
