//! Stateful table of currently-known alert conditions.
//!
//! Upstream rule evaluation delivers alert-shaped events; the store
//! deduplicates repeated firings of the same condition, tracks
//! transitions back to normal, persists its state across restarts in a
//! newline-delimited file, and answers the queries management surfaces
//! use (list, query, flag, delete, cleanup, eviction).
//!
//! The facade ([`AlertStore`]) is the only entry point embedding
//! processes need; [`table::AlertTable`] and [`codec::PersistenceCodec`]
//! are exposed for direct use in tests and tooling.

pub mod codec;
pub mod error;
pub mod query;
pub mod store;
pub mod table;

#[cfg(test)]
mod tests;

pub use error::{Result, StoreError};
pub use store::{AlertStore, StoreOptions};
