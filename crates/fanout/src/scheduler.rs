//! The fan-out scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use recon_core::error::CoreError;
use recon_core::types::{Record, TenantFailure, TenantId};
use recon_sink::SinkFile;
use tokio::task::JoinSet;

use crate::admission::{guarded, Admission};
use crate::error::WorkError;
use crate::unit::{WorkContext, WorkUnit};

/// Default concurrency ceiling.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Default per-unit deadline.
pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutConfig {
    /// Maximum work in flight at once, nested work included.
    pub max_concurrency: usize,
    /// Deadline for one tenant's unit. `None` waits indefinitely.
    pub unit_timeout: Option<Duration>,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            unit_timeout: Some(DEFAULT_UNIT_TIMEOUT),
        }
    }
}

impl FanOutConfig {
    pub fn new(max_concurrency: usize, unit_timeout: Option<Duration>) -> Result<Self, CoreError> {
        if max_concurrency == 0 {
            return Err(CoreError::Validation(
                "Concurrency ceiling must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_concurrency,
            unit_timeout,
        })
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// What happened to every tenant in one run.
#[derive(Debug, Default)]
pub struct FanOutSummary {
    /// Tenants whose unit completed, in completion order.
    pub succeeded: Vec<TenantId>,
    /// Tenants whose unit failed, in completion order.
    pub failed: Vec<TenantFailure>,
    /// Records written to the run's output sink.
    pub records_written: usize,
    pub elapsed: Duration,
}

impl FanOutSummary {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FanOut
// ---------------------------------------------------------------------------

/// Runs one [`WorkUnit`] per tenant with bounded concurrency.
#[derive(Debug, Clone, Default)]
pub struct FanOut {
    config: FanOutConfig,
}

impl FanOut {
    pub fn new(config: FanOutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FanOutConfig {
        &self.config
    }

    /// Run `unit` for every tenant and wait for all of them.
    ///
    /// Tenants are admitted in submission order, at most
    /// `max_concurrency` at a time. With a ceiling of 1 they run strictly one
    /// after another. A failing, timed-out, or panicking unit is logged and
    /// recorded in the summary; it never stops the others. Records a unit
    /// returns are appended to `output` before the unit's permit is released.
    pub async fn run<U>(
        &self,
        tenants: Vec<TenantId>,
        unit: Arc<U>,
        output: Option<SinkFile>,
    ) -> FanOutSummary
    where
        U: WorkUnit + ?Sized,
    {
        let started = Instant::now();
        let mut summary = FanOutSummary::default();

        if tenants.is_empty() {
            tracing::info!(unit = unit.name(), "No tenants to process");
            return summary;
        }

        let admission = Admission::new(self.config.max_concurrency);
        let timeout = self.config.unit_timeout;
        tracing::info!(
            unit = unit.name(),
            tenants = tenants.len(),
            max_concurrency = admission.size(),
            "Fan-out started",
        );

        let mut running = JoinSet::new();
        for tenant in tenants {
            let permit = match admission.acquire().await {
                Ok(permit) => permit,
                Err(e) => {
                    record_outcome(&mut summary, unit.name(), tenant, Err(e));
                    continue;
                }
            };

            let task_unit = unit.clone();
            let output = output.clone();
            let ctx = WorkContext::new(tenant.clone(), admission.clone());
            running.spawn(async move {
                let _permit = permit;
                let result = run_unit(task_unit.as_ref(), &ctx, timeout, output.as_ref()).await;
                (tenant, result)
            });

            while let Some(done) = running.try_join_next() {
                collect(&mut summary, unit.name(), done);
            }
        }

        while let Some(done) = running.join_next().await {
            collect(&mut summary, unit.name(), done);
        }

        summary.elapsed = started.elapsed();
        if summary.all_succeeded() {
            tracing::info!(
                unit = unit.name(),
                succeeded = summary.succeeded.len(),
                records = summary.records_written,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Fan-out finished",
            );
        } else {
            tracing::warn!(
                unit = unit.name(),
                succeeded = summary.succeeded.len(),
                failed = summary.failed.len(),
                records = summary.records_written,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Fan-out finished with failures",
            );
        }
        summary
    }
}

/// One tenant: run the unit under its deadline, then write its records.
async fn run_unit<U>(
    unit: &U,
    ctx: &WorkContext,
    timeout: Option<Duration>,
    output: Option<&SinkFile>,
) -> Result<usize, WorkError>
where
    U: WorkUnit + ?Sized,
{
    let work = guarded(unit.run(ctx.tenant(), ctx));
    let records: Vec<Record> = match timeout {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| WorkError::Timeout(limit))??,
        None => work.await?,
    };

    match output {
        Some(sink) => Ok(sink.append(records).await?),
        None => Ok(0),
    }
}

fn collect(
    summary: &mut FanOutSummary,
    unit: &str,
    done: Result<(TenantId, Result<usize, WorkError>), tokio::task::JoinError>,
) {
    match done {
        Ok((tenant, result)) => record_outcome(summary, unit, tenant, result),
        // Panics are caught inside the task, so only cancellation lands here.
        Err(e) => tracing::error!(unit, error = %e, "Tenant task did not complete"),
    }
}

fn record_outcome(
    summary: &mut FanOutSummary,
    unit: &str,
    tenant: TenantId,
    result: Result<usize, WorkError>,
) {
    match result {
        Ok(rows) => {
            tracing::info!(unit, %tenant, rows, "Finished tenant");
            summary.records_written += rows;
            summary.succeeded.push(tenant);
        }
        Err(e) => {
            tracing::error!(unit, %tenant, kind = e.kind(), error = %e, "Tenant failed");
            summary.failed.push(TenantFailure {
                tenant,
                error: e.to_string(),
            });
        }
    }
}
