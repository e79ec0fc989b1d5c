use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use recon_db::{health_check, MySqlDataSource, TenantCategory};
use recon_worker::checks::Check;
use recon_worker::{Runner, WorkerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "recon-worker", version, about = "Cross-tenant reconciliation checks")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Flags that override the environment.
#[derive(Args, Debug)]
struct Overrides {
    /// Concurrency ceiling (MAX_WORKERS)
    #[arg(long, global = true)]
    max_workers: Option<usize>,
    /// Per-tenant deadline in seconds, 0 disables (TENANT_TIMEOUT_SECS)
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    /// Output directory for CSV files (OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// Partner map JSON file (PARTNER_TENANT_MAP)
    #[arg(long, global = true)]
    partner_map: Option<PathBuf>,
    /// Skip these tenants; repeatable (EXCLUDE_TENANTS)
    #[arg(long = "exclude", global = true, value_delimiter = ',')]
    exclude: Vec<String>,
    /// Lower date bound, YYYY-MM-DD, for any check (RECON_SINCE)
    #[arg(long, global = true)]
    since: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// Arsenal purchase returns whose debit note is a delivery challan
    ArsenalPrIsDcn,
    /// Delivery challans with no stock-transfer inward at the partner
    DcCreatedStrNotCreated,
    /// Returned ucodes never inwarded at the partner
    UcodeNeverInwarded,
    /// Purchase returns linked to an invalid inward invoice
    InvalidInvoiceInPr,
    /// Return invoice numbers inwarded more than once
    DuplicateStrInwardInvoice,
    /// Open gatepass entries for cancelled inward invoices
    InvoiceCancelledGatepassCreated,
    /// Return inwards with more than one credit note in the vault
    MultiCnForStrInward,
    /// PR_SALES purchase returns without a debit note
    PrSales,
    /// Return inward quantities that differ from the source purchase return
    StrCreatedReturnQuantityDifferent,
    /// Dispatched stock transfers never inwarded at the destination
    StDispatchedInwardNotCreated,
    /// Walk an invoice-details file tenant by tenant
    InvoiceSubmittedPrNotCreated {
        /// Invoice-details CSV with a tenant column (RECON_INPUT)
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the tenants the directory lists
    ListTenants {
        /// Only this category (warehouse or arsenal)
        #[arg(long)]
        category: Option<String>,
    },
    /// Check that a logical database is reachable
    Ping {
        /// Logical database name (defaults to DIRECTORY_DB)
        database: Option<String>,
    },
}

impl Overrides {
    fn apply(self, config: &mut WorkerConfig) -> Result<()> {
        if let Some(n) = self.max_workers {
            anyhow::ensure!(n >= 1, "--max-workers must be at least 1");
            config.max_workers = n;
        }
        if let Some(secs) = self.timeout_secs {
            config.tenant_timeout = (secs > 0).then(|| std::time::Duration::from_secs(secs));
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(path) = self.partner_map {
            config.partner_map_path = path;
        }
        if let Some(since) = self.since {
            config.since = Some(since);
        }
        for tenant in self.exclude {
            let tenant = tenant.parse().with_context(|| format!("--exclude {tenant}"))?;
            config.exclude.push(tenant);
        }
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "recon_worker=info,recon_fanout=info,recon_sink=info,recon_db=info".into()
    });
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::from_filename("config.env").ok();
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut config = WorkerConfig::from_env()?;
    cli.overrides.apply(&mut config)?;
    if let Command::InvoiceSubmittedPrNotCreated { input: Some(path) } = &cli.command {
        config.input_path = Some(path.clone());
    }

    let source = Arc::new(MySqlDataSource::new());
    let runner = Runner::new(config, source.clone())?;

    let check = match cli.command {
        Command::ArsenalPrIsDcn => Check::ArsenalPrIsDcn,
        Command::DcCreatedStrNotCreated => Check::DcCreatedStrNotCreated,
        Command::UcodeNeverInwarded => Check::UcodeNeverInwarded,
        Command::InvalidInvoiceInPr => Check::InvalidInvoiceInPr,
        Command::DuplicateStrInwardInvoice => Check::DuplicateStrInwardInvoice,
        Command::InvoiceCancelledGatepassCreated => Check::InvoiceCancelledGatepassCreated,
        Command::MultiCnForStrInward => Check::MultiCnForStrInward,
        Command::PrSales => Check::PrSales,
        Command::StrCreatedReturnQuantityDifferent => Check::StrReturnQuantityDifferent,
        Command::StDispatchedInwardNotCreated => Check::StDispatchedInwardNotCreated,
        Command::InvoiceSubmittedPrNotCreated { .. } => Check::InvoiceSubmittedPrNotCreated,
        Command::ListTenants { category } => return list_tenants(&runner, category.as_deref()).await,
        Command::Ping { database } => {
            let database = database.unwrap_or_else(|| runner.config().directory_db.clone());
            health_check(source.as_ref(), &database)
                .await
                .with_context(|| format!("{database} is not reachable"))?;
            tracing::info!(%database, "Database reachable");
            return Ok(());
        }
    };

    let summary = runner
        .run(check)
        .await
        .with_context(|| format!("{} could not start", check.name()))?;

    for failure in &summary.failed {
        tracing::warn!(tenant = %failure.tenant, error = %failure.error, "Tenant not reconciled");
    }
    tracing::info!(
        check = check.name(),
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        records = summary.records_written,
        files = ?check.output_files(),
        "Check complete",
    );
    Ok(())
}

async fn list_tenants(runner: &Runner, category: Option<&str>) -> Result<()> {
    let categories: Vec<TenantCategory> = match category {
        None => TenantCategory::ALL.to_vec(),
        Some(name) => vec![TenantCategory::ALL
            .into_iter()
            .find(|c| c.table().eq_ignore_ascii_case(name.trim()))
            .with_context(|| format!("unknown tenant category '{name}'"))?],
    };

    let directory = runner.directory();
    for category in categories {
        let tenants = directory.list_tenants(category).await?;
        for tenant in tenants {
            println!("{category}\t{tenant}");
        }
    }
    Ok(())
}
