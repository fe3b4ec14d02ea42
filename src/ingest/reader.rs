//! CSV reading and row validation.
//!
//! Turns scraper output (and the published snapshot, which shares the
//! format) into typed [`Transaction`] records. Bad rows are collected as
//! [`ParseError`]s and skipped; only an unreadable file or header is fatal.

use crate::error::{IngestError, ParseError, ParseErrorKind};
use crate::models::{Cents, MlsNumber, Transaction};
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Rejected rows logged individually before switching to a count.
const MAX_LOGGED_REJECTIONS: usize = 10;

/// Header names of the interpreted columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub mls: String,
    pub agent: String,
    pub agent_email: String,
    pub company: String,
    pub selling_agent: String,
    pub selling_agent_email: String,
    pub selling_company: String,
    pub price: String,
    pub close_date: String,
    pub city: String,
    pub zip: String,
    pub days_on_market: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self::from(&crate::config::ColumnsConfig::default())
    }
}

impl From<&crate::config::ColumnsConfig> for ColumnMap {
    fn from(config: &crate::config::ColumnsConfig) -> Self {
        Self {
            mls: config.mls.clone(),
            agent: config.agent.clone(),
            agent_email: config.agent_email.clone(),
            company: config.company.clone(),
            selling_agent: config.selling_agent.clone(),
            selling_agent_email: config.selling_agent_email.clone(),
            selling_company: config.selling_company.clone(),
            price: config.price.clone(),
            close_date: config.close_date.clone(),
            city: config.city.clone(),
            zip: config.zip.clone(),
            days_on_market: config.days_on_market.clone(),
        }
    }
}

impl ColumnMap {
    /// Interpreted column names in output order.
    pub fn core_columns(&self) -> [&str; 12] {
        [
            &self.mls,
            &self.agent,
            &self.agent_email,
            &self.company,
            &self.selling_agent,
            &self.selling_agent_email,
            &self.selling_company,
            &self.price,
            &self.close_date,
            &self.city,
            &self.zip,
            &self.days_on_market,
        ]
    }

    fn is_core(&self, name: &str) -> bool {
        self.core_columns().contains(&name)
    }
}

/// Records that parsed, plus the rows that did not.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub records: Vec<Transaction>,
    pub rejected: Vec<ParseError>,
}

/// Read and validate a CSV file.
pub fn read_records(path: &Path, columns: &ColumnMap) -> Result<IngestReport, IngestError> {
    info!("Reading records from {}", path.display());

    let reader = reader_builder()
        .from_path(path)
        .map_err(|source| IngestError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    parse_records(reader, columns)
}

/// Read and validate CSV text already in memory.
pub fn parse_str(text: &str, columns: &ColumnMap) -> Result<IngestReport, IngestError> {
    parse_records(reader_builder().from_reader(text.as_bytes()), columns)
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true).trim(csv::Trim::All);
    builder
}

fn parse_records<R: io::Read>(
    mut reader: csv::Reader<R>,
    columns: &ColumnMap,
) -> Result<IngestReport, IngestError> {
    let headers = reader.headers().map_err(IngestError::Header)?.clone();
    let layout = HeaderLayout::resolve(&headers, columns)?;

    let mut report = IngestReport::default();

    for (index, result) in reader.records().enumerate() {
        let row = index + 1;
        let parsed = match result {
            Ok(record) => layout.parse_row(row, &record),
            Err(e) => Err(ParseError::new(
                row,
                String::new(),
                ParseErrorKind::Malformed(e.to_string()),
            )),
        };

        match parsed {
            Ok(transaction) => report.records.push(transaction),
            Err(e) => {
                if report.rejected.len() < MAX_LOGGED_REJECTIONS {
                    warn!("Skipping {}", e);
                }
                report.rejected.push(e);
            }
        }
    }

    if report.rejected.len() > MAX_LOGGED_REJECTIONS {
        warn!("Total rejected rows: {}", report.rejected.len());
    }

    debug!(
        "Parsed {} records, rejected {}",
        report.records.len(),
        report.rejected.len()
    );

    Ok(report)
}

/// Column positions resolved against a concrete header row.
struct HeaderLayout<'a> {
    columns: &'a ColumnMap,
    mls: usize,
    agent: usize,
    close_date: usize,
    agent_email: Option<usize>,
    company: Option<usize>,
    selling_agent: Option<usize>,
    selling_agent_email: Option<usize>,
    selling_company: Option<usize>,
    price: Option<usize>,
    city: Option<usize>,
    zip: Option<usize>,
    days_on_market: Option<usize>,
    passthrough: Vec<(String, usize)>,
}

impl<'a> HeaderLayout<'a> {
    fn resolve(headers: &StringRecord, columns: &'a ColumnMap) -> Result<Self, IngestError> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let require =
            |name: &str| find(name).ok_or_else(|| IngestError::MissingColumn(name.to_string()));

        let passthrough = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty() && !columns.is_core(h))
            .map(|(i, h)| (h.to_string(), i))
            .collect();

        Ok(Self {
            columns,
            mls: require(columns.mls.as_str())?,
            agent: require(columns.agent.as_str())?,
            close_date: require(columns.close_date.as_str())?,
            agent_email: find(columns.agent_email.as_str()),
            company: find(columns.company.as_str()),
            selling_agent: find(columns.selling_agent.as_str()),
            selling_agent_email: find(columns.selling_agent_email.as_str()),
            selling_company: find(columns.selling_company.as_str()),
            price: find(columns.price.as_str()),
            city: find(columns.city.as_str()),
            zip: find(columns.zip.as_str()),
            days_on_market: find(columns.days_on_market.as_str()),
            passthrough,
        })
    }

    fn parse_row(&self, row: usize, record: &StringRecord) -> Result<Transaction, ParseError> {
        let cell = |index: usize| record.get(index).unwrap_or("");
        let optional = |index: Option<usize>| {
            index
                .map(cell)
                .filter(|value| !value.is_empty())
                .map(String::from)
        };
        let missing = |column: &str| ParseError::new(row, column, ParseErrorKind::Missing);

        let mls = MlsNumber::new(cell(self.mls))
            .ok_or_else(|| missing(self.columns.mls.as_str()))?;

        let agent = cell(self.agent);
        if agent.is_empty() {
            return Err(missing(self.columns.agent.as_str()));
        }

        let date_raw = cell(self.close_date);
        if date_raw.is_empty() {
            return Err(missing(self.columns.close_date.as_str()));
        }
        let close_date = parse_close_date(date_raw).ok_or_else(|| {
            ParseError::new(
                row,
                self.columns.close_date.as_str(),
                ParseErrorKind::InvalidDate(date_raw.to_string()),
            )
        })?;

        let price_raw = optional(self.price).unwrap_or_default();
        let price = Cents::parse(&price_raw);
        if price.is_none() && !price_raw.is_empty() {
            debug!("Row {}: unusable price '{}'", row, price_raw);
        }

        let extra = self
            .passthrough
            .iter()
            .filter_map(|(name, index)| {
                let value = cell(*index);
                (!value.is_empty()).then(|| (name.clone(), value.to_string()))
            })
            .collect::<BTreeMap<_, _>>();

        Ok(Transaction {
            mls,
            agent: agent.to_string(),
            agent_email: optional(self.agent_email).map(|e| e.to_lowercase()),
            company: optional(self.company),
            selling_agent: optional(self.selling_agent),
            selling_agent_email: optional(self.selling_agent_email).map(|e| e.to_lowercase()),
            selling_company: optional(self.selling_company),
            price,
            price_raw,
            close_date,
            city: optional(self.city),
            zip: optional(self.zip),
            days_on_market: optional(self.days_on_market)
                .as_deref()
                .and_then(parse_days_on_market),
            extra,
        })
    }
}

/// Parse `MM/DD/YYYY`, `MM/DD/YY` or `YYYY-MM-DD`.
pub fn parse_close_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let format = if raw.contains('-') {
        "%Y-%m-%d"
    } else if raw.rsplit('/').next().map(str::len) == Some(2) {
        "%m/%d/%y"
    } else {
        "%m/%d/%Y"
    };
    NaiveDate::parse_from_str(raw, format).ok()
}

/// Only positive whole numbers count as days on market.
pub fn parse_days_on_market(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|days| *days > 0)
}
