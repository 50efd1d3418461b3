//! Report command - disposal-level CGT report with full match provenance

use crate::cmd::read_ledger;
use crate::events::{AssetClass, ClassFilter};
use crate::tax::{calculate, TaxReport, TaxYear, TradeTaxCalculation};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct ReportCommand {
    /// CSV or JSON file containing tax events (or stdin with "-")
    #[arg(short, long, default_value = "-")]
    events: PathBuf,

    /// Tax year to report (e.g., 2025 for 2024/25)
    #[arg(short, long)]
    year: Option<i32>,

    /// Exclude equity trades
    #[arg(long)]
    no_equities: bool,

    /// Exclude option trades
    #[arg(long)]
    no_options: bool,

    /// Exclude futures trades
    #[arg(long)]
    no_futures: bool,

    /// Exclude FX trades
    #[arg(long)]
    no_fx: bool,

    /// Output as CSV instead of formatted table
    #[arg(long)]
    csv: bool,

    /// Output full calculations (matches, pool snapshots) as JSON
    #[arg(long, conflicts_with = "csv")]
    json: bool,
}

#[derive(Debug, Clone, Tabled)]
struct DisposalRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Year")]
    tax_year: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Proceeds")]
    proceeds: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Gain")]
    gain: String,
    #[tabled(rename = "Rules")]
    rules: String,
}

/// CSV record for disposal output
#[derive(Debug, Serialize)]
struct DisposalCsvRecord {
    date: String,
    tax_year: String,
    asset: String,
    class: String,
    quantity: String,
    proceeds_gbp: String,
    allowable_cost_gbp: String,
    gain_gbp: String,
    rules: String,
}

impl From<&TradeTaxCalculation> for DisposalCsvRecord {
    fn from(calc: &TradeTaxCalculation) -> Self {
        DisposalCsvRecord {
            date: calc.date.format("%Y-%m-%d").to_string(),
            tax_year: calc.tax_year.display(),
            asset: calc.asset.clone(),
            class: calc.class.display().to_string(),
            quantity: format_quantity(calc.quantity),
            proceeds_gbp: calc.proceeds.round_dp(2).to_string(),
            allowable_cost_gbp: calc.allowable_cost.round_dp(2).to_string(),
            gain_gbp: calc.gain.round_dp(2).to_string(),
            rules: rules_summary(calc),
        }
    }
}

impl ReportCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = read_ledger(&self.events)?;
        let filter = ClassFilter {
            equities: !self.no_equities,
            options: !self.no_options,
            futures: !self.no_futures,
            fx: !self.no_fx,
        };
        let report = calculate(&ledger, &filter)?;
        let year = self.year.map(TaxYear);

        if self.csv {
            self.write_csv(&report, year)
        } else if self.json {
            self.write_json(&report, year)
        } else {
            self.print_report(&report, year);
            Ok(())
        }
    }

    fn write_json(&self, report: &TaxReport, year: Option<TaxYear>) -> anyhow::Result<()> {
        let calculations: Vec<&TradeTaxCalculation> = report.filter_calculations(year).collect();
        println!("{}", serde_json::to_string_pretty(&calculations)?);
        Ok(())
    }

    fn write_csv(&self, report: &TaxReport, year: Option<TaxYear>) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(io::stdout());
        for calc in report.filter_calculations(year) {
            let record: DisposalCsvRecord = calc.into();
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn print_report(&self, report: &TaxReport, year: Option<TaxYear>) {
        let year_str = year.map_or("All Years".to_string(), |y| y.display());
        let disposals: Vec<&TradeTaxCalculation> = report.filter_calculations(year).collect();

        println!();
        println!("CAPITAL GAINS REPORT ({})", year_str);
        println!();

        if disposals.is_empty() {
            println!("No disposals found");
            return;
        }

        let rows: Vec<DisposalRow> = disposals
            .iter()
            .map(|calc| DisposalRow {
                date: calc.date.format("%Y-%m-%d").to_string(),
                tax_year: calc.tax_year.display(),
                asset: calc.asset.clone(),
                class: calc.class.display().to_string(),
                quantity: format_quantity(calc.quantity),
                proceeds: format_gbp(calc.proceeds),
                cost: format_gbp(calc.allowable_cost),
                gain: format_gbp_signed(calc.gain),
                rules: rules_summary(calc),
            })
            .collect();

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);

        self.print_fx_detail(&disposals);

        println!();
        println!(
            "Disposals: {} | Proceeds: {} | Costs: {} | Gain: {}",
            disposals.len(),
            format_gbp(report.total_proceeds(year)),
            format_gbp(report.total_allowable_costs(year)),
            format_gbp_signed(report.total_gain(year)),
        );

        if year.is_none() {
            for ty in report.tax_years() {
                if report.disposal_count(Some(ty)) == 0 {
                    continue;
                }
                println!(
                    "  {}: {} disposals, gain {}",
                    ty.display(),
                    report.disposal_count(Some(ty)),
                    format_gbp_signed(report.total_gain(Some(ty))),
                );
            }
        }
        println!();
    }

    /// FX disposals stitched together from many legs get their own
    /// per-leg breakdown with an aggregate footer.
    fn print_fx_detail(&self, disposals: &[&TradeTaxCalculation]) {
        for calc in disposals {
            if calc.class != AssetClass::Fx || calc.matches.len() <= 2 {
                continue;
            }
            println!();
            println!(
                "FX detail: {} disposed {} on {}",
                calc.asset,
                format_quantity(calc.quantity),
                calc.date.format("%Y-%m-%d")
            );
            for m in &calc.matches {
                let counterpart = m
                    .counterpart
                    .map(|d| format!(" (from {})", d.format("%Y-%m-%d")))
                    .unwrap_or_default();
                println!(
                    "  {:<10} {:>12} @ cost {:>12}{}",
                    m.rule.display(),
                    format_quantity(m.quantity),
                    format_gbp(m.cost),
                    counterpart,
                );
            }
            println!("  aggregate gain: {}", format_gbp_signed(calc.gain));
        }
    }
}

fn rules_summary(calc: &TradeTaxCalculation) -> String {
    let mut rules: Vec<&'static str> = Vec::new();
    for m in &calc.matches {
        let name = m.rule.display();
        if !rules.contains(&name) {
            rules.push(name);
        }
    }
    rules.join("+")
}

fn format_gbp(amount: Decimal) -> String {
    format!("£{:.2}", amount)
}

fn format_gbp_signed(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-£{:.2}", amount.abs())
    } else {
        format!("£{:.2}", amount)
    }
}

fn format_quantity(qty: Decimal) -> String {
    let s = format!("{:.8}", qty);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}
