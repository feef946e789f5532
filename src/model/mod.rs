//! # Record Model
//!
//! DTOs shared by the store, the order policy, the change log and the
//! exporter. Pure data: no I/O, no cross-record state.

pub mod record;
pub mod value;

pub use record::{Field, Record, RecordId};
pub use value::Value;
