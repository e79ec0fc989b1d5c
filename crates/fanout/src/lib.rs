//! Bounded-concurrency fan-out of one work unit across many tenants.
//!
//! [`FanOut::run`] executes a [`WorkUnit`] once per tenant with at most N
//! units in flight, isolates each tenant's failure (errors, timeouts, and
//! panics alike), and reports a [`FanOutSummary`] once every unit finished.
//!
//! Nested work inside a unit (per-batch or per-row lookups) goes through
//! [`WorkContext::scatter`], which draws from the same [`Admission`] pool so
//! nesting never multiplies the concurrency ceiling.

pub mod admission;
pub mod error;
pub mod scheduler;
pub mod unit;

pub use admission::Admission;
pub use error::WorkError;
pub use scheduler::{FanOut, FanOutConfig, FanOutSummary};
pub use unit::{WorkContext, WorkUnit};
