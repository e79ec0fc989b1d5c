//! Append-only CSV record sink shared by concurrent work units.
//!
//! A [`RecordSink`] owns one lock per resolved output path. Every append
//! holds that path's lock across the whole "open, decide header, write rows,
//! sync" sequence, so concurrent writers never interleave partial rows and a
//! new file gets exactly one header.

pub mod error;
pub mod schema;
pub mod sink;

pub use error::SinkError;
pub use schema::SchemaPolicy;
pub use sink::{RecordSink, SinkFile};
