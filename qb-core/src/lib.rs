//! Queryable billing: continuously aggregated monthly subtotals with
//! externally queryable keyed state.
pub mod errorhandling;
pub mod partitioners;
pub mod pipeline;
pub mod query;
pub mod runtime;
pub mod snapshot;
pub mod sources;
pub mod state;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
