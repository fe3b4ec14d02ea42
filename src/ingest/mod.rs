//! Ingestion of scraper CSV output.
//!
//! This module reads `<market>_closed.csv` files into typed transaction
//! records and discovers which markets have data.

pub mod discovery;
pub mod reader;

pub use discovery::{discover_markets, market_input_path, CLOSED_SUFFIX};
pub use reader::{parse_str, read_records, ColumnMap, IngestReport};
