pub mod calculator;
pub mod dividend;
pub mod matcher;
pub mod pool;
pub mod uk;

// Flat public surface for the engine types and functions.
pub use calculator::{run_pipeline, run_stage, StageOutput, STAGES};
pub use dividend::{
    aggregate_dividends, DividendRecord, DividendReport, DividendSummaryRow, WithholdingClass,
};
pub use matcher::{
    match_asset, AssetCalculation, CostAdjustment, MatchRule, MergedTrade, TradeMatch,
    TradeTaxCalculation,
};
pub use pool::{Pool, PoolSnapshot};
pub use uk::TaxYear;

use crate::events::{ClassFilter, Ledger};
use crate::money::MoneyError;
use chrono::NaiveDate;
use rust_decimal::Decimal;

#[derive(Debug, thiserror::Error)]
pub enum CalcError {
    /// A disposal (or pool removal) wants more than the ledger ever
    /// acquired: the asset's history is inconsistent or incomplete.
    #[error(
        "insufficient holding for {asset} on {date}: disposal of {requested} exceeds {available} held"
    )]
    InsufficientHolding {
        asset: String,
        date: NaiveDate,
        requested: Decimal,
        available: Decimal,
    },

    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Everything one full recalculation produces.
#[derive(Debug)]
pub struct TaxReport {
    /// Disposal-level results across all assets, in date then asset order.
    pub calculations: Vec<TradeTaxCalculation>,
    /// Per-asset detail: final pools and merged-trade match provenance.
    pub assets: Vec<AssetCalculation>,
    pub dividends: DividendReport,
}

impl TaxReport {
    pub fn total_proceeds(&self, year: Option<TaxYear>) -> Decimal {
        self.filter_calculations(year).map(|c| c.proceeds).sum()
    }

    pub fn total_allowable_costs(&self, year: Option<TaxYear>) -> Decimal {
        self.filter_calculations(year)
            .map(|c| c.allowable_cost)
            .sum()
    }

    pub fn total_gain(&self, year: Option<TaxYear>) -> Decimal {
        self.filter_calculations(year).map(|c| c.gain).sum()
    }

    pub fn disposal_count(&self, year: Option<TaxYear>) -> usize {
        self.filter_calculations(year).count()
    }

    /// Every tax year touched by a disposal or a dividend, ascending.
    pub fn tax_years(&self) -> Vec<TaxYear> {
        let mut years: Vec<TaxYear> = self
            .calculations
            .iter()
            .map(|c| c.tax_year)
            .chain(self.dividends.records.iter().map(|r| r.tax_year))
            .collect();
        years.sort();
        years.dedup();
        years
    }

    /// Final Section 104 pools that still hold anything, per asset.
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.assets.iter().map(|a| &a.pool).filter(|p| !p.is_empty())
    }

    pub fn filter_calculations(
        &self,
        year: Option<TaxYear>,
    ) -> impl Iterator<Item = &TradeTaxCalculation> {
        self.calculations
            .iter()
            .filter(move |c| year.is_none_or(|y| c.tax_year == y))
    }
}

/// Run one full recalculation over the ledger.
///
/// The engine is synchronous and deterministic: the class filter is applied
/// first, the calculator stages run in declared order, and all pool and
/// match state is rebuilt from the ledger alone, so repeated invocations on
/// an unchanged ledger produce identical reports.
pub fn calculate(ledger: &Ledger, filter: &ClassFilter) -> Result<TaxReport, CalcError> {
    let filtered = ledger.filtered(filter);
    log::debug!(
        "calculating over {} of {} ledger events",
        filtered.len(),
        ledger.len()
    );

    let assets = run_pipeline(&filtered)?;
    let mut calculations: Vec<TradeTaxCalculation> = assets
        .iter()
        .flat_map(|a| a.calculations.iter().cloned())
        .collect();
    calculations.sort_by(|a, b| (a.date, &a.asset).cmp(&(b.date, &b.asset)));

    let dividends = aggregate_dividends(&filtered);

    Ok(TaxReport {
        calculations,
        assets,
        dividends,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        AssetClass, TaxEvent, Trade, TradeDirection,
    };
    use crate::money::DescribedMoney;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn trade(
        asset: &str,
        d: &str,
        direction: TradeDirection,
        class: AssetClass,
        qty: Decimal,
        amount: Decimal,
    ) -> TaxEvent {
        TaxEvent::Trade(Trade {
            asset: asset.to_string(),
            date: date(d),
            direction,
            class,
            quantity: qty,
            amount: DescribedMoney::base(amount, format!("{d} {asset}")),
            underlying: None,
            option_action: None,
        })
    }

    use TradeDirection::{Acquisition, Disposal};

    fn sample_ledger() -> Ledger {
        Ledger::new(vec![
            trade("VOD", "2024-01-01", Acquisition, AssetClass::Equity, dec!(100), dec!(1000)),
            trade("VOD", "2024-04-05", Disposal, AssetClass::Equity, dec!(10), dec!(150)),
            trade("VOD", "2024-04-06", Disposal, AssetClass::Equity, dec!(10), dec!(160)),
            trade("ESZ4", "2024-02-01", Acquisition, AssetClass::Future, dec!(1), dec!(500)),
            trade("ESZ4", "2024-03-01", Disposal, AssetClass::Future, dec!(1), dec!(650)),
        ])
    }

    #[test]
    fn totals_by_tax_year() {
        let report = calculate(&sample_ledger(), &ClassFilter::default()).unwrap();

        // 5 April 2024 is 2023/24; 6 April is 2024/25.
        assert_eq!(report.disposal_count(Some(TaxYear(2024))), 2);
        assert_eq!(report.disposal_count(Some(TaxYear(2025))), 1);
        assert_eq!(report.total_proceeds(Some(TaxYear(2024))), dec!(800));
        assert_eq!(report.total_gain(Some(TaxYear(2024))), dec!(200));
        assert_eq!(report.total_gain(None), dec!(260));
    }

    #[test]
    fn class_filter_excludes_futures() {
        let filter = ClassFilter {
            futures: false,
            ..ClassFilter::default()
        };
        let report = calculate(&sample_ledger(), &filter).unwrap();

        assert!(report.calculations.iter().all(|c| c.class != AssetClass::Future));
        assert_eq!(report.disposal_count(None), 2);
    }

    #[test]
    fn recalculation_is_byte_for_byte_idempotent() {
        let ledger = sample_ledger();
        let first = calculate(&ledger, &ClassFilter::default()).unwrap();
        let second = calculate(&ledger, &ClassFilter::default()).unwrap();
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }

    #[test]
    fn calculations_sorted_by_date_then_asset() {
        let report = calculate(&sample_ledger(), &ClassFilter::default()).unwrap();
        let keys: Vec<_> = report
            .calculations
            .iter()
            .map(|c| (c.date, c.asset.clone()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn insufficient_holding_surfaces_asset_and_date() {
        let ledger = Ledger::new(vec![trade(
            "VOD",
            "2024-01-01",
            Disposal,
            AssetClass::Equity,
            dec!(10),
            dec!(150),
        )]);
        let err = calculate(&ledger, &ClassFilter::default()).unwrap_err();
        match err {
            CalcError::InsufficientHolding { asset, date: d, .. } => {
                assert_eq!(asset, "VOD");
                assert_eq!(d, date("2024-01-01"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
