//! Wires the tenant directory, a check, and its sinks into one fan-out run.

use std::sync::Arc;

use recon_core::partner::PartnerTenantMap;
use recon_core::types::TenantId;
use recon_db::{DataSource, TenantDirectory};
use recon_fanout::{FanOut, FanOutSummary, WorkError, WorkUnit};
use recon_sink::{RecordSink, SinkFile};

use crate::checks::{
    ArsenalPrIsDcn, Check, CheckEnv, DcCreatedStrNotCreated, DcState, DuplicateStrInwardInvoice,
    InvalidInvoiceInPr, InvoiceCancelledGatepassCreated, InvoiceDetails,
    InvoiceSubmittedPrNotCreated, MultiCnForStrInward, PrSales, StDispatchedInwardNotCreated,
    StrReturnQuantityDifferent, UcodeNeverInwarded,
};
use crate::config::{ConfigError, WorkerConfig};

pub struct Runner {
    config: WorkerConfig,
    source: Arc<dyn DataSource>,
    sink: RecordSink,
    fan_out: FanOut,
}

impl Runner {
    pub fn new(config: WorkerConfig, source: Arc<dyn DataSource>) -> Result<Self, ConfigError> {
        let fan_out = FanOut::new(config.fan_out()?);
        let sink = RecordSink::new(config.sink_schema);
        Ok(Self {
            config,
            source,
            sink,
            fan_out,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn directory(&self) -> TenantDirectory {
        TenantDirectory::new(self.source.clone(), self.config.directory_db.clone())
    }

    /// Tenants a check runs over, minus excluded ones.
    ///
    /// Fails only when no category could be listed; a partial listing is
    /// used as-is (the failed categories are already logged).
    pub async fn tenants_for(&self, check: Check) -> Result<Vec<TenantId>, WorkError> {
        let listing = self.directory().list_all(check.categories()).await;
        if listing.tenants.is_empty() {
            if let Some(failure) = listing.failures.into_iter().next() {
                return Err(failure.into());
            }
        }

        Ok(self.without_excluded(listing.tenants))
    }

    fn without_excluded(&self, tenants: Vec<TenantId>) -> Vec<TenantId> {
        tenants
            .into_iter()
            .filter(|t| !self.config.exclude.contains(t))
            .collect()
    }

    /// Load the invoice-details input named by `RECON_INPUT` / `--input`.
    pub fn invoice_details(&self) -> Result<InvoiceDetails, WorkError> {
        let path = self.config.input_path.as_ref().ok_or_else(|| {
            WorkError::Other("No input file: set RECON_INPUT or pass --input".to_string())
        })?;
        let details = InvoiceDetails::from_path(path)?;
        if details.is_empty() {
            tracing::warn!(path = %path.display(), "Input file lists no invoices");
        }
        Ok(details)
    }

    /// Load the partner map if `check` needs it.
    pub fn partners_for(&self, check: Check) -> Result<PartnerTenantMap, WorkError> {
        if !check.uses_partner_map() {
            return Ok(PartnerTenantMap::default());
        }
        let partners = PartnerTenantMap::from_path(&self.config.partner_map_path)?;
        if partners.is_empty() {
            tracing::warn!(
                path = %self.config.partner_map_path.display(),
                "Partner map is empty; cross-tenant checks will find nothing",
            );
        }
        Ok(partners)
    }

    /// Run `check` across every tenant it covers.
    ///
    /// Per-tenant failures are reported in the summary, not as an error.
    pub async fn run(&self, check: Check) -> Result<FanOutSummary, WorkError> {
        let partners = Arc::new(self.partners_for(check)?);
        if check.reads_input() {
            let details = self.invoice_details()?;
            let tenants = self.without_excluded(details.tenants());
            return self.start(check, tenants, partners, Some(details)).await;
        }
        let tenants = self.tenants_for(check).await?;
        self.start(check, tenants, partners, None).await
    }

    /// Run `check` for an explicit tenant list.
    pub async fn run_for(
        &self,
        check: Check,
        tenants: Vec<TenantId>,
        partners: Arc<PartnerTenantMap>,
    ) -> Result<FanOutSummary, WorkError> {
        self.start(check, tenants, partners, None).await
    }

    async fn start(
        &self,
        check: Check,
        tenants: Vec<TenantId>,
        partners: Arc<PartnerTenantMap>,
        details: Option<InvoiceDetails>,
    ) -> Result<FanOutSummary, WorkError> {
        let since = self.config.since_or(check.default_since());
        tracing::info!(
            check = check.name(),
            tenants = tenants.len(),
            %since,
            output_dir = %self.config.output_dir.display(),
            "Starting check",
        );

        let env = CheckEnv {
            source: self.source.clone(),
            partners,
            since,
            batch_size: self.config.batch_size,
        };

        // Checks with several files (or none) write for themselves.
        let output = match check.output_files() {
            [name] => Some(self.file(name)?),
            _ => None,
        };
        let unit: Arc<dyn WorkUnit> = match check {
            Check::ArsenalPrIsDcn => Arc::new(ArsenalPrIsDcn::new(env)),
            Check::DcCreatedStrNotCreated => Arc::new(DcCreatedStrNotCreated::new(env)),
            Check::InvalidInvoiceInPr => Arc::new(InvalidInvoiceInPr::new(env)),
            Check::UcodeNeverInwarded => Arc::new(UcodeNeverInwarded::new(
                env,
                self.file(DcState::Generated.output_file())?,
                self.file(DcState::NotGenerated.output_file())?,
            )),
            Check::DuplicateStrInwardInvoice => Arc::new(DuplicateStrInwardInvoice::new(env)),
            Check::InvoiceCancelledGatepassCreated => {
                Arc::new(InvoiceCancelledGatepassCreated::new(env))
            }
            Check::MultiCnForStrInward => Arc::new(MultiCnForStrInward::new(env)),
            Check::PrSales => Arc::new(PrSales::new(env)),
            Check::StrReturnQuantityDifferent => Arc::new(StrReturnQuantityDifferent::new(env)),
            Check::StDispatchedInwardNotCreated => Arc::new(StDispatchedInwardNotCreated::new(env)),
            Check::InvoiceSubmittedPrNotCreated => {
                let details = match details {
                    Some(details) => details,
                    None => self.invoice_details()?,
                };
                Arc::new(InvoiceSubmittedPrNotCreated::new(env, Arc::new(details)))
            }
        };

        Ok(self.fan_out.run(tenants, unit, output).await)
    }

    fn file(&self, name: &str) -> Result<SinkFile, WorkError> {
        Ok(self.sink.file(&self.config.output_dir, name)?)
    }
}
