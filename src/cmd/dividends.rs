//! Dividends command - withholding summary by tax year and jurisdiction

use crate::cmd::read_ledger;
use crate::tax::{aggregate_dividends, DividendReport, TaxYear};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct DividendsCommand {
    /// CSV or JSON file containing tax events (or stdin with "-")
    #[arg(short, long, default_value = "-")]
    events: PathBuf,

    /// Tax year to report (e.g., 2025 for 2024/25)
    #[arg(short, long)]
    year: Option<i32>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,

    /// List every dividend event instead of the per-year summary
    #[arg(long)]
    detail: bool,
}

#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
    #[tabled(rename = "Tax Year")]
    tax_year: String,
    #[tabled(rename = "Jurisdiction")]
    jurisdiction: String,
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Dividends")]
    count: usize,
    #[tabled(rename = "Gross")]
    gross: String,
    #[tabled(rename = "Withheld")]
    withheld: String,
    #[tabled(rename = "Net")]
    net: String,
}

#[derive(Debug, Clone, Tabled)]
struct DetailRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Jurisdiction")]
    jurisdiction: String,
    #[tabled(rename = "Gross")]
    gross: String,
    #[tabled(rename = "Withheld")]
    withheld: String,
    #[tabled(rename = "Net")]
    net: String,
}

#[derive(Debug, Serialize)]
struct JsonOutput<'r> {
    tax_year: String,
    rows: Vec<&'r crate::tax::DividendSummaryRow>,
}

impl DividendsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = read_ledger(&self.events)?;
        let report = aggregate_dividends(&ledger);
        let year = self.year.map(TaxYear);

        if self.json {
            self.print_json(&report, year)
        } else if self.detail {
            self.print_detail(&report, year);
            Ok(())
        } else {
            self.print_table(&report, year);
            Ok(())
        }
    }

    fn print_detail(&self, report: &DividendReport, year: Option<TaxYear>) {
        let rows: Vec<DetailRow> = report
            .records
            .iter()
            .filter(|r| year.is_none_or(|y| r.tax_year == y))
            .map(|r| DetailRow {
                date: r.date.format("%Y-%m-%d").to_string(),
                asset: r.asset.clone(),
                kind: r.kind.display().to_string(),
                jurisdiction: r.jurisdiction.code().to_string(),
                gross: format_gbp(r.gross),
                withheld: format_gbp(r.withheld),
                net: format_gbp(r.net),
            })
            .collect();

        if rows.is_empty() {
            println!("No dividends found");
            return;
        }

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
    }

    fn print_table(&self, report: &DividendReport, year: Option<TaxYear>) {
        let year_str = year.map_or("All Years".to_string(), |y| y.display());
        let rows: Vec<SummaryRow> = report
            .rows
            .iter()
            .filter(|r| year.is_none_or(|y| r.tax_year == y))
            .map(|r| SummaryRow {
                tax_year: r.tax_year.display(),
                jurisdiction: r.jurisdiction.code().to_string(),
                class: r.withholding_class.display().to_string(),
                count: r.count,
                gross: format_gbp(r.gross),
                withheld: format_gbp(r.withheld),
                net: format_gbp(r.net),
            })
            .collect();

        println!();
        println!("DIVIDENDS ({})", year_str);
        println!();

        if rows.is_empty() {
            println!("No dividends found");
            return;
        }

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);

        println!();
        println!(
            "Gross: {} | Withheld at source: {}",
            format_gbp(report.total_gross(year)),
            format_gbp(report.total_withheld(year)),
        );
        println!();
    }

    fn print_json(&self, report: &DividendReport, year: Option<TaxYear>) -> anyhow::Result<()> {
        let output = JsonOutput {
            tax_year: year.map_or("All Years".to_string(), |y| y.display()),
            rows: report
                .rows
                .iter()
                .filter(|r| year.is_none_or(|y| r.tax_year == y))
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

fn format_gbp(amount: Decimal) -> String {
    format!("£{:.2}", amount)
}
