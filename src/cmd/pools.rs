//! Pools command - final Section 104 pool balances

use crate::cmd::read_ledger;
use crate::events::ClassFilter;
use crate::tax::Pool;
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct PoolsCommand {
    /// Events file (CSV or JSON). Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Filter by asset (e.g., VOD, AAPL)
    #[arg(short, long)]
    asset: Option<String>,

    /// Output as JSON instead of formatted table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Tabled)]
struct PoolRow {
    #[tabled(rename = "Asset")]
    asset: String,
    #[tabled(rename = "Quantity")]
    quantity: String,
    #[tabled(rename = "Cost (GBP)")]
    cost: String,
    #[tabled(rename = "Cost Basis")]
    cost_basis: String,
}

#[derive(Debug, Serialize)]
struct PoolView {
    asset: String,
    quantity: Decimal,
    cost: Decimal,
}

#[derive(Debug, Serialize)]
struct PoolsOutput {
    pools: Vec<PoolView>,
}

impl PoolsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = read_ledger(&self.file)?;
        let report = crate::tax::calculate(&ledger, &ClassFilter::default())?;
        let asset_filter = self.asset.as_deref();

        let pools: Vec<&Pool> = report
            .pools()
            .filter(|p| asset_filter.is_none_or(|a| p.asset().eq_ignore_ascii_case(a)))
            .collect();

        if self.json {
            self.print_json(&pools)
        } else {
            self.print_table(&pools);
            Ok(())
        }
    }

    fn print_table(&self, pools: &[&Pool]) {
        if pools.is_empty() {
            println!("No pool balances found matching filters");
            return;
        }

        println!();
        println!("POOL BALANCES");
        println!();

        let rows: Vec<PoolRow> = pools
            .iter()
            .map(|p| PoolRow {
                asset: p.asset().to_string(),
                quantity: format_quantity(p.quantity()),
                cost: format_gbp(p.cost()),
                cost_basis: format_gbp(cost_basis(p.quantity(), p.cost())),
            })
            .collect();

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
    }

    fn print_json(&self, pools: &[&Pool]) -> anyhow::Result<()> {
        let output = PoolsOutput {
            pools: pools
                .iter()
                .map(|p| PoolView {
                    asset: p.asset().to_string(),
                    quantity: p.quantity(),
                    cost: p.cost().round_dp(2),
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

fn cost_basis(quantity: Decimal, cost: Decimal) -> Decimal {
    if quantity.is_zero() {
        Decimal::ZERO
    } else {
        (cost / quantity).round_dp(2)
    }
}

fn format_gbp(amount: Decimal) -> String {
    format!("£{:.2}", amount)
}

fn format_quantity(qty: Decimal) -> String {
    let s = format!("{:.8}", qty);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}
