//! Identifiers shared by the write side and the read side.

mod types;

pub use types::{AggregateId, IdParseError, OrderId};
