//! Portfolio return panel and monthly compounding.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::OptionType;

/// One portfolio's return for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioReturnRecord {
    /// Date the return is realized on.
    pub date: NaiveDate,
    pub portfolio_id: String,
    pub option_type: OptionType,
    pub moneyness: f64,
    /// Target days to maturity; `None` in the reduced view.
    pub maturity_bucket: Option<i64>,
    /// Weighted leverage-adjusted daily return.
    pub daily_return: f64,
    /// Compounded return for the calendar month, on its last record.
    pub monthly_return: Option<f64>,
    /// Weighted member elasticity.
    pub elasticity_summary: f64,
    pub members: usize,
}

/// Compounded return of one portfolio over one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    pub portfolio_id: String,
    pub year: i32,
    pub month: u32,
    pub return_pct: f64,
    pub trading_days: usize,
}

/// prod(1 + r) - 1
pub fn compound(daily_returns: &[f64]) -> f64 {
    daily_returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// Compounded returns per (portfolio, year, month), over the days present.
pub fn monthly_returns(records: &[PortfolioReturnRecord]) -> Vec<MonthlyReturn> {
    let mut months: BTreeMap<(String, i32, u32), Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for r in records {
        months
            .entry((r.portfolio_id.clone(), r.date.year(), r.date.month()))
            .or_default()
            .push((r.date, r.daily_return));
    }

    months
        .into_iter()
        .map(|((portfolio_id, year, month), mut days)| {
            days.sort_by_key(|(date, _)| *date);
            let returns: Vec<f64> = days.iter().map(|(_, r)| *r).collect();
            MonthlyReturn {
                portfolio_id,
                year,
                month,
                return_pct: compound(&returns),
                trading_days: returns.len(),
            }
        })
        .collect()
}

/// Set `monthly_return` on the last record of every (portfolio, month) and
/// clear it elsewhere. Records must be sorted by date within a portfolio.
pub fn annotate_month_ends(records: &mut [PortfolioReturnRecord]) {
    let mut last: BTreeMap<(String, i32, u32), usize> = BTreeMap::new();
    for (i, r) in records.iter_mut().enumerate() {
        r.monthly_return = None;
        last.insert((r.portfolio_id.clone(), r.date.year(), r.date.month()), i);
    }

    for m in monthly_returns(records) {
        if let Some(&i) = last.get(&(m.portfolio_id, m.year, m.month)) {
            records[i].monthly_return = Some(m.return_pct);
        }
    }
}

fn sort_records(records: &mut [PortfolioReturnRecord]) {
    records.sort_by(|a, b| (a.date, &a.portfolio_id).cmp(&(b.date, &b.portfolio_id)));
}

/// Full (type x moneyness x maturity) and reduced (type x moneyness)
/// return panels, each sorted by (date, portfolio id).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPanel {
    pub full: Vec<PortfolioReturnRecord>,
    pub reduced: Vec<PortfolioReturnRecord>,
}

/// Which view to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelView {
    Full,
    Reduced,
    Both,
}

impl PortfolioPanel {
    /// Sort both views and compound month ends.
    pub fn new(mut full: Vec<PortfolioReturnRecord>, mut reduced: Vec<PortfolioReturnRecord>) -> Self {
        sort_records(&mut full);
        sort_records(&mut reduced);
        annotate_month_ends(&mut full);
        annotate_month_ends(&mut reduced);
        Self { full, reduced }
    }

    pub fn records(&self, view: PanelView) -> Vec<&PortfolioReturnRecord> {
        match view {
            PanelView::Full => self.full.iter().collect(),
            PanelView::Reduced => self.reduced.iter().collect(),
            PanelView::Both => self.full.iter().chain(self.reduced.iter()).collect(),
        }
    }

    pub fn find(&self, date: NaiveDate, portfolio_id: &str) -> Option<&PortfolioReturnRecord> {
        self.full
            .iter()
            .chain(self.reduced.iter())
            .find(|r| r.date == date && r.portfolio_id == portfolio_id)
    }

    pub fn monthly_returns(&self, view: PanelView) -> Vec<MonthlyReturn> {
        let records: Vec<PortfolioReturnRecord> = self.records(view).into_iter().cloned().collect();
        monthly_returns(&records)
    }

    /// Render a view as a long-format DataFrame keyed by (date, portfolio_id).
    pub fn to_dataframe(&self, view: PanelView) -> PolarsResult<DataFrame> {
        let records = self.records(view);

        let date: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
        let portfolio_id: Vec<&str> = records.iter().map(|r| r.portfolio_id.as_str()).collect();
        let option_type: Vec<&str> = records.iter().map(|r| r.option_type.as_str()).collect();
        let moneyness: Vec<f64> = records.iter().map(|r| r.moneyness).collect();
        let maturity_bucket: Vec<Option<i64>> = records.iter().map(|r| r.maturity_bucket).collect();
        let daily_return: Vec<f64> = records.iter().map(|r| r.daily_return).collect();
        let monthly_return: Vec<Option<f64>> = records.iter().map(|r| r.monthly_return).collect();
        let elasticity_summary: Vec<f64> = records.iter().map(|r| r.elasticity_summary).collect();
        let members: Vec<u32> = records.iter().map(|r| r.members as u32).collect();

        DataFrame::new(vec![
            Series::new("date".into(), date).into(),
            Series::new("portfolio_id".into(), portfolio_id).into(),
            Series::new("option_type".into(), option_type).into(),
            Series::new("moneyness".into(), moneyness).into(),
            Series::new("maturity_bucket".into(), maturity_bucket).into(),
            Series::new("return".into(), daily_return).into(),
            Series::new("monthly_return".into(), monthly_return).into(),
            Series::new("elasticity_summary".into(), elasticity_summary).into(),
            Series::new("members".into(), members).into(),
        ])
    }
}
