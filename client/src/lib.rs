//! Client core for a credit-metered ML inference marketplace: session
//! management, the model catalog, the credit ledger, prediction submission
//! in vector and batch modes, and usage aggregation over the prediction
//! history.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod inference;
pub mod ledger;
pub mod stats;

/// Flat admission threshold: charge-causing operations require at least
/// this balance before any network call is attempted. The remote authority
/// applies the exact charge.
pub const MINIMUM_STAKE: f64 = 1.0;
