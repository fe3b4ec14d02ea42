//! Merge and aggregation stages.
//!
//! `merger` folds a fresh scrape into the published dataset; `aggregator`
//! derives agent, company and market statistics from the result.

pub mod aggregator;
pub mod merger;

pub use aggregator::{aggregate, market_stats, AggregateOptions, Aggregates};
pub use merger::merge;
