//! Publishing of merged data and statistics.
//!
//! `render` turns a market's records and aggregates into byte-stable
//! artifacts; `sink` stores them.

pub mod render;
pub mod sink;

pub use render::{dataset_name, render_market, Artifact};
pub use sink::{DirectorySink, DryRunSink, Sink};

#[cfg(test)]
pub use sink::MemorySink;
