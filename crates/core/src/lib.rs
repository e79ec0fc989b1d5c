//! Shared types for the tenant reconciliation workspace.
//!
//! Nothing in this crate performs I/O except [`partner::PartnerTenantMap::from_path`].
//! The data source, sink, and scheduler crates all speak in terms of the
//! [`TenantId`](types::TenantId) and [`Record`](types::Record) defined here.

pub mod batch;
pub mod error;
pub mod partner;
pub mod types;
