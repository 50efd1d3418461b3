//! Dividend and withholding-tax aggregation by UK tax year.
//!
//! Base-currency values come from the fx rate recorded on each event when it
//! was created; nothing here re-derives a rate.

use crate::events::{DividendKind, Jurisdiction, Ledger, TaxEvent};
use crate::tax::uk::TaxYear;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Withholding treatment of a paying jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WithholdingClass {
    /// No withholding at source.
    UkDomestic,
    /// Jurisdictions with a UK double-taxation treaty.
    Treaty,
    /// Everything else: withholding generally not reclaimable.
    NonTreaty,
}

impl WithholdingClass {
    pub fn classify(jurisdiction: &Jurisdiction) -> Self {
        match jurisdiction {
            Jurisdiction::Uk => WithholdingClass::UkDomestic,
            Jurisdiction::Us
            | Jurisdiction::Ireland
            | Jurisdiction::France
            | Jurisdiction::Germany
            | Jurisdiction::Switzerland
            | Jurisdiction::Netherlands => WithholdingClass::Treaty,
            Jurisdiction::Other(_) => WithholdingClass::NonTreaty,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            WithholdingClass::UkDomestic => "UK",
            WithholdingClass::Treaty => "Treaty",
            WithholdingClass::NonTreaty => "Non-treaty",
        }
    }
}

/// One dividend event, FX-normalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DividendRecord {
    pub asset: String,
    pub date: NaiveDate,
    pub tax_year: TaxYear,
    pub kind: DividendKind,
    pub jurisdiction: Jurisdiction,
    pub withholding_class: WithholdingClass,
    pub gross: Decimal,
    pub withheld: Decimal,
    pub net: Decimal,
}

/// Per-tax-year, per-jurisdiction totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DividendSummaryRow {
    pub tax_year: TaxYear,
    pub jurisdiction: Jurisdiction,
    pub withholding_class: WithholdingClass,
    pub count: usize,
    pub gross: Decimal,
    pub withheld: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DividendReport {
    pub records: Vec<DividendRecord>,
    pub rows: Vec<DividendSummaryRow>,
}

impl DividendReport {
    pub fn total_gross(&self, year: Option<TaxYear>) -> Decimal {
        self.records
            .iter()
            .filter(|r| year.is_none_or(|y| r.tax_year == y))
            .map(|r| r.gross)
            .sum()
    }

    pub fn total_withheld(&self, year: Option<TaxYear>) -> Decimal {
        self.records
            .iter()
            .filter(|r| year.is_none_or(|y| r.tax_year == y))
            .map(|r| r.withheld)
            .sum()
    }
}

/// Collect every dividend in the ledger into per-event records and
/// per-(tax year, jurisdiction) summary rows.
pub fn aggregate_dividends(ledger: &Ledger) -> DividendReport {
    let mut records: Vec<DividendRecord> = Vec::new();
    for event in ledger.events() {
        let dividend = match event {
            TaxEvent::Dividend(d) => d,
            _ => continue,
        };
        let gross = dividend.proceed.base_amount();
        let withheld = dividend
            .withheld
            .as_ref()
            .map(|w| w.base_amount())
            .unwrap_or(Decimal::ZERO);
        records.push(DividendRecord {
            asset: dividend.asset.clone(),
            date: dividend.date,
            tax_year: TaxYear::from_date(dividend.date),
            kind: dividend.kind,
            jurisdiction: dividend.jurisdiction.clone(),
            withholding_class: WithholdingClass::classify(&dividend.jurisdiction),
            gross,
            withheld,
            net: gross - withheld,
        });
    }

    let mut grouped: BTreeMap<(TaxYear, String), DividendSummaryRow> = BTreeMap::new();
    for record in &records {
        let key = (record.tax_year, record.jurisdiction.code().to_string());
        let row = grouped.entry(key).or_insert_with(|| DividendSummaryRow {
            tax_year: record.tax_year,
            jurisdiction: record.jurisdiction.clone(),
            withholding_class: record.withholding_class,
            count: 0,
            gross: Decimal::ZERO,
            withheld: Decimal::ZERO,
            net: Decimal::ZERO,
        });
        row.count += 1;
        row.gross += record.gross;
        row.withheld += record.withheld;
        row.net += record.net;
    }

    DividendReport {
        records,
        rows: grouped.into_values().collect(),
    }
}
