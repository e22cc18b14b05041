//! Leverage-adjusted portfolio returns.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info};

use super::bucket::{full_grid, PortfolioSpec};
use super::panel::{PortfolioPanel, PortfolioReturnRecord};
use super::weights::{portfolio_weights, Candidate};
use crate::config::PipelineConfig;
use crate::data::{partition_by_date, OptionQuote};
use crate::diagnostics::RunDiagnostics;
use crate::error::{PipelineError, PipelineResult};

pub struct PortfolioAggregator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> PortfolioAggregator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Build both panel views from quotes carrying leverage-adjusted
    /// returns. Quotes without a return are ignored.
    pub fn build_portfolios(&self, quotes: &[OptionQuote], diagnostics: &mut RunDiagnostics) -> PortfolioPanel {
        let full = self.full_view(quotes, diagnostics);
        let reduced = reduce_maturities(&full);

        diagnostics.full_view_records = full.len();
        diagnostics.reduced_view_records = reduced.len();
        info!(
            "Built {} full-view and {} reduced-view portfolio records",
            full.len(),
            reduced.len()
        );

        PortfolioPanel::new(full, reduced)
    }

    /// One record per formation date and non-empty portfolio of the full
    /// grid, dated on the day the return is realized.
    pub fn full_view(&self, quotes: &[OptionQuote], diagnostics: &mut RunDiagnostics) -> Vec<PortfolioReturnRecord> {
        let with_returns: Vec<OptionQuote> = quotes
            .iter()
            .filter(|q| q.derived.leverage_adjusted_return.is_some() && q.derived.return_date.is_some())
            .cloned()
            .collect();

        let grid = full_grid(self.config);
        let days: Vec<(NaiveDate, Vec<OptionQuote>)> = partition_by_date(&with_returns).into_iter().collect();

        let per_day: Vec<Vec<PipelineResult<PortfolioReturnRecord>>> = days
            .par_iter()
            .map(|(_, day)| {
                grid.iter()
                    .map(|spec| self.portfolio_return(spec, day))
                    .collect()
            })
            .collect();

        let mut records = Vec::new();
        for result in per_day.into_iter().flatten() {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!("Skipping: {}", e);
                    diagnostics.absorb(&e);
                }
            }
        }
        records
    }

    /// Weighted return of one portfolio over one formation date's quotes.
    pub fn portfolio_return(&self, spec: &PortfolioSpec, day: &[OptionQuote]) -> PipelineResult<PortfolioReturnRecord> {
        let members: Vec<&OptionQuote> = day
            .iter()
            .filter(|q| q.option_type() == spec.option_type)
            .collect();
        let candidates: Vec<Candidate> = members
            .iter()
            .map(|q| Candidate {
                moneyness: q.derived.moneyness,
                days_to_maturity: q.derived.days_to_maturity as f64,
            })
            .collect();

        let weights = portfolio_weights(spec, &candidates, self.config).map_err(|e| match e {
            PipelineError::InsufficientData { context, found, required } => PipelineError::InsufficientData {
                context: match day.first() {
                    Some(q) => format!("{} on {}", context, q.trade_date()),
                    None => context,
                },
                found,
                required,
            },
            other => other,
        })?;

        let mut daily_return = 0.0;
        let mut elasticity_summary = 0.0;
        let mut date = None;
        for &(i, w) in &weights {
            let q = members[i];
            daily_return += w * q.derived.leverage_adjusted_return.unwrap_or_default();
            elasticity_summary += w * q.derived.elasticity.unwrap_or_default();
            date = date.max(q.derived.return_date);
        }

        let date = date.ok_or_else(|| PipelineError::InsufficientData {
            context: format!("portfolio {} has no return date", spec.id()),
            found: 0,
            required: 1,
        })?;

        Ok(PortfolioReturnRecord {
            date,
            portfolio_id: spec.id(),
            option_type: spec.option_type,
            moneyness: spec.moneyness,
            maturity_bucket: spec.maturity,
            daily_return,
            monthly_return: None,
            elasticity_summary,
            members: weights.len(),
        })
    }
}

/// Equal-weight average of the maturities present for each (date, type,
/// moneyness). Averaging happens on daily returns, before compounding.
pub fn reduce_maturities(full: &[PortfolioReturnRecord]) -> Vec<PortfolioReturnRecord> {
    let mut groups: BTreeMap<(NaiveDate, String), Vec<&PortfolioReturnRecord>> = BTreeMap::new();
    for r in full {
        let spec = PortfolioSpec::reduced(r.option_type, r.moneyness);
        groups.entry((r.date, spec.id())).or_default().push(r);
    }

    groups
        .into_iter()
        .filter_map(|((date, portfolio_id), parts)| {
            let first = parts.first()?;
            let n = parts.len() as f64;
            Some(PortfolioReturnRecord {
                date,
                portfolio_id,
                option_type: first.option_type,
                moneyness: first.moneyness,
                maturity_bucket: None,
                daily_return: parts.iter().map(|r| r.daily_return).sum::<f64>() / n,
                monthly_return: None,
                elasticity_summary: parts.iter().map(|r| r.elasticity_summary).sum::<f64>() / n,
                members: parts.iter().map(|r| r.members).sum(),
            })
        })
        .collect()
}
