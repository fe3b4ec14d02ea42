//! Data models for the sync pipeline.
//!
//! This module contains the core data structures shared by the ingest,
//! merge, aggregate and publish stages: the typed transaction record,
//! the policy enums, and the derived agent/company/market statistics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Multiple Listing Service number. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct MlsNumber(String);

impl MlsNumber {
    /// Build an MLS number from raw cell text. Returns `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MlsNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A currency amount held as whole cents.
///
/// Serializes as a JSON integer when the amount is a whole number of
/// dollars, otherwise as a decimal number of dollars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cents(pub u64);

impl Cents {
    /// Parse a currency string such as `$295,000` or `1234.5`.
    ///
    /// Returns `None` for blank, negative or otherwise non-numeric text.
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .trim()
            .trim_start_matches('$')
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect();

        let (whole, frac) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), ""));
        if whole.is_empty() && frac.is_empty() {
            return None;
        }
        if frac.len() > 2
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let dollars: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
        let cents: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().ok()? * 10,
            _ => frac.parse().ok()?,
        };

        dollars.checked_mul(100)?.checked_add(cents).map(Cents)
    }

    pub fn from_dollars(dollars: u64) -> Self {
        Cents(dollars.saturating_mul(100))
    }

    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn saturating_add(self, other: Cents) -> Cents {
        Cents(self.0.saturating_add(other.0))
    }

    /// Mean over `count` items, truncated to the cent. `None` when `count` is zero.
    pub fn average(self, count: usize) -> Option<Cents> {
        if count == 0 {
            None
        } else {
            Some(Cents(self.0 / count as u64))
        }
    }
}

impl Serialize for Cents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % 100 == 0 {
            serializer.serialize_u64(self.0 / 100)
        } else {
            serializer.serialize_f64(self.as_dollars())
        }
    }
}

impl fmt::Display for Cents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// One closed real-estate sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Unique key within a market.
    pub mls: MlsNumber,
    /// Listing agent; the agent this record is attributed to.
    pub agent: String,
    /// Listing agent email, lowercased.
    pub agent_email: Option<String>,
    /// Listing brokerage.
    pub company: Option<String>,
    /// Buyer-side agent.
    pub selling_agent: Option<String>,
    pub selling_agent_email: Option<String>,
    pub selling_company: Option<String>,
    /// Parsed sale price. `None` when the cell was blank or malformed.
    pub price: Option<Cents>,
    /// Sale price exactly as scraped.
    pub price_raw: String,
    pub close_date: NaiveDate,
    pub city: Option<String>,
    pub zip: Option<String>,
    /// Days on market; only positive values are kept.
    pub days_on_market: Option<u32>,
    /// Columns carried through untouched, keyed by header name.
    pub extra: BTreeMap<String, String>,
}

/// Which side wins when an MLS number is present in both the snapshot and
/// the new scrape.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// The latest scrape replaces the stored record.
    #[default]
    PreferNew,
    /// A stored record is never replaced.
    PreferExisting,
}

/// How a record is credited to agents and companies.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Attribution {
    /// Each record counts once, for its listing agent and brokerage.
    #[default]
    Listing,
    /// Listing side plus a sale credited to the selling agent and brokerage.
    BothSides,
}

/// What to do with records whose price is blank or malformed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum PricePolicy {
    /// Count the record, leave it out of volume sums and averages.
    #[default]
    CountUnpriced,
    /// Leave the record out of aggregation entirely.
    RejectUnpriced,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::PreferNew => write!(f, "prefer-new"),
            ConflictPolicy::PreferExisting => write!(f, "prefer-existing"),
        }
    }
}

/// A label with an occurrence count (cities, zip codes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

/// Statistics for one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStats {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Brokerage on the agent's most recent closing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub transaction_count: usize,
    pub listings: usize,
    pub sales: usize,
    pub total_volume: Cents,
    pub list_volume: Cents,
    pub sale_volume: Cents,
    /// Transactions that contributed to the volume sums.
    pub priced_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_price: Option<Cents>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_days_on_market: Option<u32>,
    pub days_on_market_count: usize,
    pub top_cities: Vec<NamedCount>,
    pub top_zips: Vec<NamedCount>,
    pub first_close: NaiveDate,
    pub last_close: NaiveDate,
}

/// Statistics for one brokerage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyStats {
    pub name: String,
    pub transaction_count: usize,
    pub listings: usize,
    pub sales: usize,
    pub total_volume: Cents,
    pub priced_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_price: Option<Cents>,
    /// Distinct agents credited through this brokerage.
    pub agent_count: usize,
}

/// Market-wide figures derived from the agent statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketStats {
    pub agent_count: usize,
    pub company_count: usize,
    pub average_transactions: f64,
    pub average_volume: Cents,
    pub average_listings: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_days_on_market: Option<u32>,
}

/// Outcome of one market's run, printed at the end of the invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketSummary {
    pub market: String,
    pub ingested: usize,
    pub rejected: usize,
    pub snapshot_records: usize,
    pub added: usize,
    pub updated: usize,
    pub total_records: usize,
    pub agents: usize,
    pub companies: usize,
    /// Artifacts handed to the sink; zero when publishing was skipped.
    pub published: usize,
}
