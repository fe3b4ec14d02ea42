//! Agent and company aggregation.
//!
//! This module groups transaction records by agent and by brokerage in a
//! single pass and computes per-group and market-wide statistics. Groups
//! live in `BTreeMap`s so iteration order is always by key.

use crate::models::{
    AgentStats, Attribution, Cents, CompanyStats, MarketStats, NamedCount, PricePolicy,
    Transaction,
};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Options controlling how records are credited.
#[derive(Debug, Clone, Copy)]
pub struct AggregateOptions {
    pub attribution: Attribution,
    pub price_policy: PricePolicy,
    /// Entries kept in each agent's city and zip rankings.
    pub top_n: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            attribution: Attribution::Listing,
            price_policy: PricePolicy::CountUnpriced,
            top_n: 10,
        }
    }
}

impl From<&crate::config::AggregateConfig> for AggregateOptions {
    fn from(config: &crate::config::AggregateConfig) -> Self {
        Self {
            attribution: config.attribution,
            price_policy: config.price_policy,
            top_n: config.top_n,
        }
    }
}

/// Per-agent and per-company statistics for one market.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    /// Keyed by agent name.
    pub agents: BTreeMap<String, AgentStats>,
    /// Keyed by lowercased company name.
    pub companies: BTreeMap<String, CompanyStats>,
    /// Records left out under `PricePolicy::RejectUnpriced`.
    pub skipped_unpriced: usize,
}

impl Aggregates {
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty() && self.companies.is_empty()
    }

    /// Agents ranked by transaction count, then volume, then name.
    pub fn ranked_agents(&self) -> Vec<&AgentStats> {
        let mut agents: Vec<&AgentStats> = self.agents.values().collect();
        agents.sort_by(|a, b| {
            b.transaction_count
                .cmp(&a.transaction_count)
                .then_with(|| b.total_volume.cmp(&a.total_volume))
                .then_with(|| a.name.cmp(&b.name))
        });
        agents
    }

    /// Companies ranked by transaction count, then volume, then name.
    pub fn ranked_companies(&self) -> Vec<&CompanyStats> {
        let mut companies: Vec<&CompanyStats> = self.companies.values().collect();
        companies.sort_by(|a, b| {
            b.transaction_count
                .cmp(&a.transaction_count)
                .then_with(|| b.total_volume.cmp(&a.total_volume))
                .then_with(|| a.name.cmp(&b.name))
        });
        companies
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Listing,
    Selling,
}

#[derive(Debug, Default)]
struct AgentAccumulator {
    email: Option<String>,
    company: Option<String>,
    transactions: usize,
    listings: usize,
    sales: usize,
    total_volume: Cents,
    list_volume: Cents,
    sale_volume: Cents,
    priced: usize,
    dom_sum: u64,
    dom_count: usize,
    cities: BTreeMap<String, usize>,
    zips: BTreeMap<String, usize>,
    first_close: Option<NaiveDate>,
    last_close: Option<NaiveDate>,
}

impl AgentAccumulator {
    fn add(
        &mut self,
        side: Side,
        record: &Transaction,
        email: Option<&str>,
        company: Option<&str>,
    ) {
        self.transactions += 1;
        let price = record.price.unwrap_or_default();
        if record.price.is_some() {
            self.priced += 1;
        }
        self.total_volume = self.total_volume.saturating_add(price);

        match side {
            Side::Listing => {
                self.listings += 1;
                self.list_volume = self.list_volume.saturating_add(price);
            }
            Side::Selling => {
                self.sales += 1;
                self.sale_volume = self.sale_volume.saturating_add(price);
            }
        }

        if let Some(days) = record.days_on_market {
            self.dom_sum += u64::from(days);
            self.dom_count += 1;
        }
        if let Some(ref city) = record.city {
            *self.cities.entry(city.clone()).or_default() += 1;
        }
        if let Some(ref zip) = record.zip {
            *self.zips.entry(zip.clone()).or_default() += 1;
        }

        // Affiliation and contact follow the most recent closing.
        let is_latest = self.last_close.map_or(true, |last| record.close_date >= last);
        if is_latest {
            if let Some(company) = company {
                self.company = Some(company.to_string());
            }
            if let Some(email) = email {
                self.email = Some(email.to_string());
            }
        }

        self.first_close = Some(
            self.first_close
                .map_or(record.close_date, |d| d.min(record.close_date)),
        );
        self.last_close = Some(
            self.last_close
                .map_or(record.close_date, |d| d.max(record.close_date)),
        );
    }

    fn finish(self, name: String, top_n: usize) -> Option<AgentStats> {
        if self.transactions == 0 {
            return None;
        }
        Some(AgentStats {
            name,
            email: self.email,
            company: self.company,
            transaction_count: self.transactions,
            listings: self.listings,
            sales: self.sales,
            total_volume: self.total_volume,
            list_volume: self.list_volume,
            sale_volume: self.sale_volume,
            priced_count: self.priced,
            average_price: self.total_volume.average(self.priced),
            average_days_on_market: (self.dom_count > 0)
                .then(|| (self.dom_sum / self.dom_count as u64) as u32),
            days_on_market_count: self.dom_count,
            top_cities: top_counts(self.cities, top_n),
            top_zips: top_counts(self.zips, top_n),
            first_close: self.first_close?,
            last_close: self.last_close?,
        })
    }
}

#[derive(Debug, Default)]
struct CompanyAccumulator {
    name: String,
    transactions: usize,
    listings: usize,
    sales: usize,
    total_volume: Cents,
    priced: usize,
    agents: BTreeSet<String>,
}

impl CompanyAccumulator {
    fn add(&mut self, side: Side, record: &Transaction, agent: &str) {
        self.transactions += 1;
        match side {
            Side::Listing => self.listings += 1,
            Side::Selling => self.sales += 1,
        }
        if let Some(price) = record.price {
            self.priced += 1;
            self.total_volume = self.total_volume.saturating_add(price);
        }
        self.agents.insert(agent.to_string());
    }

    fn finish(self) -> Option<CompanyStats> {
        if self.transactions == 0 {
            return None;
        }
        Some(CompanyStats {
            name: self.name,
            transaction_count: self.transactions,
            listings: self.listings,
            sales: self.sales,
            total_volume: self.total_volume,
            priced_count: self.priced,
            average_price: self.total_volume.average(self.priced),
            agent_count: self.agents.len(),
        })
    }
}

/// Aggregate a market's records into agent and company statistics.
///
/// Empty input yields empty mappings.
pub fn aggregate(records: &[Transaction], options: &AggregateOptions) -> Aggregates {
    let mut agents: BTreeMap<String, AgentAccumulator> = BTreeMap::new();
    let mut companies: BTreeMap<String, CompanyAccumulator> = BTreeMap::new();
    let mut skipped_unpriced = 0;

    let mut credit = |side: Side,
                      record: &Transaction,
                      agent: &str,
                      email: Option<&str>,
                      company: Option<&str>| {
        agents
            .entry(agent.to_string())
            .or_default()
            .add(side, record, email, company);

        if let Some(company) = company {
            let entry = companies.entry(company.to_lowercase()).or_insert_with(|| {
                CompanyAccumulator {
                    name: company.to_string(),
                    ..CompanyAccumulator::default()
                }
            });
            entry.add(side, record, agent);
        }
    };

    for record in records {
        if record.price.is_none() && options.price_policy == PricePolicy::RejectUnpriced {
            skipped_unpriced += 1;
            continue;
        }

        credit(
            Side::Listing,
            record,
            record.agent.as_str(),
            record.agent_email.as_deref(),
            record.company.as_deref(),
        );

        if options.attribution == Attribution::BothSides {
            if let Some(ref selling) = record.selling_agent {
                credit(
                    Side::Selling,
                    record,
                    selling.as_str(),
                    record.selling_agent_email.as_deref(),
                    record.selling_company.as_deref(),
                );
            }
        }
    }

    Aggregates {
        agents: agents
            .into_iter()
            .filter_map(|(name, acc)| {
                acc.finish(name.clone(), options.top_n)
                    .map(|stats| (name, stats))
            })
            .collect(),
        companies: companies
            .into_iter()
            .filter_map(|(key, acc)| acc.finish().map(|stats| (key, stats)))
            .collect(),
        skipped_unpriced,
    }
}

/// Market-wide averages over the agent statistics.
pub fn market_stats(aggregates: &Aggregates) -> MarketStats {
    let agent_count = aggregates.agents.len();
    if agent_count == 0 {
        return MarketStats {
            company_count: aggregates.companies.len(),
            ..MarketStats::default()
        };
    }

    let agents = aggregates.agents.values();
    let total_transactions: usize = agents.clone().map(|a| a.transaction_count).sum();
    let total_listings: usize = agents.clone().map(|a| a.listings).sum();
    let total_volume = agents
        .clone()
        .fold(Cents::default(), |acc, a| acc.saturating_add(a.total_volume));

    let dom: Vec<u32> = agents.filter_map(|a| a.average_days_on_market).collect();
    let average_days_on_market = (!dom.is_empty()).then(|| {
        let sum: u64 = dom.iter().map(|d| u64::from(*d)).sum();
        (sum as f64 / dom.len() as f64).round() as u32
    });

    MarketStats {
        agent_count,
        company_count: aggregates.companies.len(),
        average_transactions: round_tenth(total_transactions as f64 / agent_count as f64),
        average_volume: total_volume.average(agent_count).unwrap_or_default(),
        average_listings: round_tenth(total_listings as f64 / agent_count as f64),
        average_days_on_market,
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Highest counts first, ties broken by name, truncated to `n`.
fn top_counts(counts: BTreeMap<String, usize>, n: usize) -> Vec<NamedCount> {
    let mut entries: Vec<NamedCount> = counts
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect();
    // BTreeMap order is by name; a stable sort keeps it for equal counts.
    entries.sort_by_key(|e| std::cmp::Reverse(e.count));
    entries.truncate(n);
    entries
}
