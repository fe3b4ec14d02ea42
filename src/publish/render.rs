//! Artifact rendering.
//!
//! Produces the three files published per market:
//!
//! - `<market>_closed.csv`: the merged dataset, core columns first, then
//!   passthrough columns sorted by name
//! - `<market>_agents.json`: `{ market, as_of, stats, agents: [...] }`
//! - `<market>_companies.json`: `{ market, as_of, total, companies: [...] }`
//!
//! Nothing here reads the clock: `as_of` is the latest close date in the
//! data, so the same input always renders to the same bytes.

use crate::analysis::{market_stats, Aggregates};
use crate::error::PublishError;
use crate::ingest::{ColumnMap, CLOSED_SUFFIX};
use crate::models::{AgentStats, CompanyStats, MarketStats, Transaction};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;

/// A named blob ready for a [`Sink`](super::Sink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Serialize)]
struct AgentsDocument<'a> {
    market: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    as_of: Option<NaiveDate>,
    stats: MarketStats,
    agents: Vec<&'a AgentStats>,
}

#[derive(Serialize)]
struct CompaniesDocument<'a> {
    market: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    as_of: Option<NaiveDate>,
    total: usize,
    companies: Vec<&'a CompanyStats>,
}

pub fn dataset_name(market: &str) -> String {
    format!("{}{}", market, CLOSED_SUFFIX)
}

fn agents_name(market: &str) -> String {
    format!("{}_agents.json", market)
}

fn companies_name(market: &str) -> String {
    format!("{}_companies.json", market)
}

/// Render every artifact for one market.
pub fn render_market(
    market: &str,
    records: &[Transaction],
    aggregates: &Aggregates,
    columns: &ColumnMap,
    pretty: bool,
) -> Result<Vec<Artifact>, PublishError> {
    let as_of = records.iter().map(|r| r.close_date).max();

    let dataset = dataset_name(market);
    let agents = agents_name(market);
    let companies = companies_name(market);

    let agents_doc = AgentsDocument {
        market,
        as_of,
        stats: market_stats(aggregates),
        agents: aggregates.ranked_agents(),
    };
    let companies_doc = CompaniesDocument {
        market,
        as_of,
        total: aggregates.companies.len(),
        companies: aggregates.ranked_companies(),
    };

    Ok(vec![
        Artifact {
            bytes: render_dataset_csv(&dataset, records, columns)?,
            name: dataset,
        },
        Artifact {
            bytes: to_json(&agents, &agents_doc, pretty)?,
            name: agents,
        },
        Artifact {
            bytes: to_json(&companies, &companies_doc, pretty)?,
            name: companies,
        },
    ])
}

fn to_json<T: Serialize>(artifact: &str, value: &T, pretty: bool) -> Result<Vec<u8>, PublishError> {
    let serialized = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    };

    let mut bytes = serialized.map_err(|source| PublishError::Json {
        artifact: artifact.to_string(),
        source,
    })?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Render the merged dataset in the same layout the reader accepts.
pub fn render_dataset_csv(
    artifact: &str,
    records: &[Transaction],
    columns: &ColumnMap,
) -> Result<Vec<u8>, PublishError> {
    let csv_error = |source: csv::Error| PublishError::Csv {
        artifact: artifact.to_string(),
        source,
    };

    let extra_columns: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.extra.keys().map(String::as_str))
        .collect();

    let mut header: Vec<&str> = columns.core_columns().to_vec();
    header.extend(extra_columns.iter().copied());

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header).map_err(csv_error)?;

    for record in records {
        let mut row = vec![
            record.mls.to_string(),
            record.agent.clone(),
            optional(&record.agent_email),
            optional(&record.company),
            optional(&record.selling_agent),
            optional(&record.selling_agent_email),
            optional(&record.selling_company),
            record.price_raw.clone(),
            record.close_date.format("%Y-%m-%d").to_string(),
            optional(&record.city),
            optional(&record.zip),
            record
                .days_on_market
                .map(|d| d.to_string())
                .unwrap_or_default(),
        ];
        row.extend(
            extra_columns
                .iter()
                .map(|c| record.extra.get(*c).cloned().unwrap_or_default()),
        );
        writer.write_record(&row).map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv_error(csv::Error::from(e.into_error())))
}

fn optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}
