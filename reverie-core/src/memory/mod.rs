//! The per-agent memory stream.
//!
//! A [`MemoryLog`] is an append-only sequence of [`MemoryRecord`]s. Record
//! ids are append positions, so the citation relation among reflections is a
//! DAG by construction: a record can only ever point backwards.

pub mod log;
pub mod record;

pub use log::MemoryLog;
pub use record::MemoryRecord;
