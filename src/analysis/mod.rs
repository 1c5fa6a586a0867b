//! Analysis modules.
//!
//! Read-only aggregation over plans and transfer results.

pub mod aggregator;

pub use aggregator::*;
