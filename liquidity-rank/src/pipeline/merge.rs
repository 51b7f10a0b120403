//! Left-join of liquidity summaries with the side tables.
//!
//! The summaries are the anchor: every summary produces exactly one report
//! row, and a symbol missing from a side table gets nulls for that table's
//! columns. Side tables are indexed by symbol before the join so a repeated
//! key can never duplicate an anchor row.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::analytics::SymbolLiquiditySummary;
use crate::data::{EarningsRecord, FundamentalsRecord, VolRankRecord};
use crate::report::ReportRow;

/// A side-table record joined on its symbol.
pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for EarningsRecord {
    fn key(&self) -> &str {
        &self.symbol
    }
}

impl Keyed for FundamentalsRecord {
    fn key(&self) -> &str {
        &self.symbol
    }
}

impl Keyed for VolRankRecord {
    fn key(&self) -> &str {
        &self.symbol
    }
}

/// Side table indexed by symbol, first row wins.
#[derive(Debug, Clone)]
pub struct SideTable<T> {
    rows: HashMap<String, T>,
    duplicates: usize,
}

impl<T> Default for SideTable<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            duplicates: 0,
        }
    }
}

impl<T: Keyed> SideTable<T> {
    pub fn from_rows(name: &str, rows: Vec<T>) -> Self {
        let mut table = Self::default();
        for row in rows {
            if table.rows.contains_key(row.key()) {
                table.duplicates += 1;
                continue;
            }
            table.rows.insert(row.key().to_string(), row);
        }

        if table.duplicates > 0 {
            warn!(
                "{} table had {} duplicate symbols; kept first occurrence",
                name, table.duplicates
            );
        }
        table
    }

    pub fn get(&self, symbol: &str) -> Option<&T> {
        self.rows.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows dropped as repeated keys.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

/// Render an earnings record as `AM 02/15/2024 (36)`.
///
/// Days until the announcement are counted from `today` and are negative for
/// past dates. A record without a date renders as `None`.
pub fn format_earnings(record: &EarningsRecord, today: NaiveDate) -> Option<String> {
    let date = record.earnings_date?;
    let days_until = (date - today).num_days();
    Some(format!(
        "{} {} ({})",
        record.timing.tag(),
        date.format("%m/%d/%Y"),
        days_until
    ))
}

/// Joins summaries with earnings, fundamentals and IV rank tables.
#[derive(Debug, Clone)]
pub struct MergeEngine {
    today: NaiveDate,
}

impl MergeEngine {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// One row per summary, in summary order.
    pub fn merge(
        &self,
        summaries: Vec<SymbolLiquiditySummary>,
        earnings: &SideTable<EarningsRecord>,
        fundamentals: &SideTable<FundamentalsRecord>,
        vol_ranks: &SideTable<VolRankRecord>,
    ) -> Vec<ReportRow> {
        summaries
            .into_iter()
            .map(|summary| {
                let vol = vol_ranks.get(&summary.symbol);
                let company = fundamentals.get(&summary.symbol);
                let earnings_date = earnings
                    .get(&summary.symbol)
                    .and_then(|e| format_earnings(e, self.today));

                ReportRow {
                    price: summary.spot,
                    iv_rank: vol.map(|v| v.iv_rank),
                    iv_percentile: vol.map(|v| v.iv_percentile),
                    liquidity: summary.liquidity,
                    earnings_date,
                    open_interest: summary.open_interest,
                    sector: company.and_then(|c| c.sector.clone()),
                    subsector: company.and_then(|c| c.subsector.clone()),
                    spread_mid: summary.spread_mid,
                    spread_spot: summary.spread_spot,
                    symbol: summary.symbol,
                }
            })
            .collect()
    }
}
