use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use recon_core::batch::batches;
use recon_core::types::{Record, TenantId};
use recon_fanout::{WorkContext, WorkError, WorkUnit};

use super::CheckEnv;

/// Rows of an invoice-details CSV grouped by their `tenant` column.
#[derive(Debug, Clone, Default)]
pub struct InvoiceDetails {
    by_tenant: BTreeMap<TenantId, Vec<Record>>,
}

impl InvoiceDetails {
    pub fn from_path(path: &Path) -> Result<Self, WorkError> {
        let file = std::fs::File::open(path)
            .map_err(|e| WorkError::Other(format!("{}: {e}", path.display())))?;
        Self::from_reader(file, path)
    }

    /// Parse CSV text with a header row. Rows with an empty `tenant` are
    /// skipped; every column is kept as text.
    pub fn from_reader<R: Read>(reader: R, origin: &Path) -> Result<Self, WorkError> {
        let csv_err = |e: csv::Error| WorkError::Other(format!("{}: {e}", origin.display()));
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let header: Vec<String> = reader.headers().map_err(csv_err)?.iter().map(str::to_string).collect();
        if !header.iter().any(|h| h == "tenant") {
            return Err(WorkError::Other(format!(
                "{}: no 'tenant' column",
                origin.display()
            )));
        }

        let mut by_tenant: BTreeMap<TenantId, Vec<Record>> = BTreeMap::new();
        for (line, row) in reader.records().enumerate() {
            let row = row.map_err(csv_err)?;
            let record = header
                .iter()
                .zip(row.iter())
                .fold(Record::new(), |record, (column, value)| record.with(column, value));
            let tenant = record.get_str("tenant").and_then(|t| TenantId::new(t.trim()).ok());
            match tenant {
                Some(tenant) => by_tenant.entry(tenant).or_default().push(record),
                None => tracing::warn!(path = %origin.display(), line = line + 2, "Row has no tenant"),
            }
        }
        Ok(Self { by_tenant })
    }

    pub fn tenants(&self) -> Vec<TenantId> {
        self.by_tenant.keys().cloned().collect()
    }

    pub fn for_tenant(&self, tenant: &TenantId) -> &[Record] {
        self.by_tenant.get(tenant).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_tenant.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tenant.is_empty()
    }
}

/// Walks submitted invoices whose purchase return was never created, as
/// listed in an input file, tenant by tenant in batches.
///
/// Tenants come from the input, not the directory. Each invoice is logged;
/// nothing is written to a sink.
pub struct InvoiceSubmittedPrNotCreated {
    env: CheckEnv,
    details: Arc<InvoiceDetails>,
}

impl InvoiceSubmittedPrNotCreated {
    pub fn new(env: CheckEnv, details: Arc<InvoiceDetails>) -> Self {
        Self { env, details }
    }
}

#[async_trait]
impl WorkUnit for InvoiceSubmittedPrNotCreated {
    fn name(&self) -> &str {
        "invoice-submitted-pr-not-created"
    }

    async fn run(&self, tenant: &TenantId, ctx: &WorkContext) -> Result<Vec<Record>, WorkError> {
        let details = self.details.for_tenant(tenant);
        if details.is_empty() {
            return Ok(Vec::new());
        }

        let chunks: Vec<(usize, Vec<Record>)> = batches(details, self.env.batch_size)?
            .into_iter()
            .map(|batch| (batch.offset, batch.items.to_vec()))
            .collect();

        let owner = tenant.clone();
        let results = ctx
            .scatter(chunks, move |(offset, rows)| {
                let tenant = owner.clone();
                async move {
                    for row in &rows {
                        tracing::info!(%tenant, offset, detail = ?row, "Invoice detail");
                    }
                    Ok::<usize, WorkError>(rows.len())
                }
            })
            .await;

        let mut processed = 0;
        for result in results {
            processed += result?;
        }
        tracing::info!(%tenant, invoices = processed, "Processed invoice details");
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_group_by_tenant() {
        let text = "tenant,invoice_no\nth2,A\nth1,B\n,C\nth2,D\n";
        let details = InvoiceDetails::from_reader(text.as_bytes(), Path::new("input.csv")).unwrap();

        let tenants: Vec<&str> = details.by_tenant.keys().map(TenantId::as_str).collect();
        assert_eq!(tenants, ["th1", "th2"]);
        assert_eq!(details.len(), 3);
        let th2 = TenantId::new("th2").unwrap();
        let numbers: Vec<&str> = details
            .for_tenant(&th2)
            .iter()
            .filter_map(|r| r.get_str("invoice_no"))
            .collect();
        assert_eq!(numbers, ["A", "D"]);
    }

    #[test]
    fn tenant_column_is_required() {
        let err = InvoiceDetails::from_reader("invoice_no\nA\n".as_bytes(), Path::new("input.csv"))
            .unwrap_err();
        assert!(err.to_string().contains("tenant"));
    }
}
