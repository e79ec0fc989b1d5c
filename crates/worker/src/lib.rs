//! Cross-tenant reconciliation worker.
//!
//! Each [`checks::Check`] runs once per tenant through the fan-out scheduler
//! and writes its findings to a CSV file under the configured output
//! directory. [`runner::Runner`] ties the pieces together for the binary.

pub mod checks;
pub mod config;
pub mod runner;

pub use config::{ConfigError, WorkerConfig};
pub use runner::Runner;
