//! The per-tenant work unit contract.

use std::future::Future;

use async_trait::async_trait;
use recon_core::types::{Record, TenantId};

use crate::admission::Admission;
use crate::error::WorkError;

/// Bespoke per-tenant logic run by [`FanOut`](crate::FanOut).
///
/// Implementations must not share mutable state with sibling units except
/// through a sink, must release any connection they open on every path
/// (dropping a [`TenantConnection`](recon_db::TenantConnection) does), and
/// must treat "no rows found" as success.
#[async_trait]
pub trait WorkUnit: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produce this tenant's records. Returned records are appended to the
    /// run's output sink, if one was given; units writing to several sinks
    /// write themselves and return an empty list.
    async fn run(&self, tenant: &TenantId, ctx: &WorkContext) -> Result<Vec<Record>, WorkError>;
}

/// Per-invocation context handed to a [`WorkUnit`].
#[derive(Debug, Clone)]
pub struct WorkContext {
    tenant: TenantId,
    admission: Admission,
}

impl WorkContext {
    pub fn new(tenant: TenantId, admission: Admission) -> Self {
        Self { tenant, admission }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    /// Nested fan-out within this tenant, bounded by the run's shared pool.
    /// See [`Admission::scatter`].
    pub async fn scatter<I, F, Fut, T>(&self, items: I, f: F) -> Vec<Result<T, WorkError>>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(I::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, WorkError>> + Send + 'static,
        T: Send + 'static,
    {
        self.admission.scatter(items, f).await
    }
}
