//! Per-instrument-class calculator stages.
//!
//! Stages run in a fixed, declared order: options are settled first because
//! an exercised or assigned option stops being a disposal of its own and
//! becomes a cost adjustment on the underlying equity. Futures skip the
//! share identification rules entirely and recognize gain per close-out.

use crate::events::{
    AssetClass, CorporateAction, Ledger, Trade, TaxEvent, TradeDirection,
};
use crate::tax::matcher::{
    match_asset, AssetCalculation, CostAdjustment, MatchRule, TradeMatch, TradeTaxCalculation,
};
use crate::tax::pool::{Pool, PoolSnapshot};
use crate::tax::uk::TaxYear;
use crate::tax::CalcError;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};

/// The declared pipeline order. Options must precede equities; the report
/// treats FX like equities; futures are independent of everything else.
pub const STAGES: [AssetClass; 4] = [
    AssetClass::Option,
    AssetClass::Equity,
    AssetClass::Fx,
    AssetClass::Future,
];

/// What one stage hands back: per-asset results plus any cost adjustments
/// for later stages.
#[derive(Debug, Default)]
pub struct StageOutput {
    pub assets: Vec<AssetCalculation>,
    pub adjustments: Vec<CostAdjustment>,
}

/// Run every stage in declared order over an already-filtered ledger.
pub fn run_pipeline(ledger: &Ledger) -> Result<Vec<AssetCalculation>, CalcError> {
    let mut assets = Vec::new();
    let mut adjustments: Vec<CostAdjustment> = Vec::new();
    for class in STAGES {
        let output = run_stage(class, ledger, &adjustments)?;
        assets.extend(output.assets);
        adjustments.extend(output.adjustments);
    }
    Ok(assets)
}

/// Run a single calculator stage.
pub fn run_stage(
    class: AssetClass,
    ledger: &Ledger,
    adjustments: &[CostAdjustment],
) -> Result<StageOutput, CalcError> {
    match class {
        AssetClass::Option => options_stage(ledger),
        AssetClass::Equity | AssetClass::Fx => share_stage(class, ledger, adjustments),
        AssetClass::Future => futures_stage(ledger),
    }
}

fn trades_by_asset<'l>(ledger: &'l Ledger, class: AssetClass) -> BTreeMap<&'l str, Vec<&'l Trade>> {
    let mut grouped: BTreeMap<&str, Vec<&Trade>> = BTreeMap::new();
    for event in ledger.events() {
        if let TaxEvent::Trade(trade) = event {
            if trade.class == class {
                grouped.entry(trade.asset.as_str()).or_default().push(trade);
            }
        }
    }
    grouped
}

fn actions_for<'l>(ledger: &'l Ledger, asset: &str) -> Vec<&'l CorporateAction> {
    ledger
        .events()
        .iter()
        .filter_map(|event| match event {
            TaxEvent::CorporateAction(action) if action.asset == asset => Some(action),
            _ => None,
        })
        .collect()
}

/// Options: exercised/assigned trades become cost adjustments on their
/// underlying; everything else is matched like shares.
fn options_stage(ledger: &Ledger) -> Result<StageOutput, CalcError> {
    let mut output = StageOutput::default();
    for (asset, trades) in trades_by_asset(ledger, AssetClass::Option) {
        let mut matchable: Vec<&Trade> = Vec::new();
        for trade in trades {
            match (&trade.option_action, &trade.underlying) {
                (Some(action), Some(underlying)) => {
                    // Premium paid raises the underlying's cost base; premium
                    // received on an assigned written option lowers it.
                    let premium = trade.amount.base_amount();
                    let amount = match trade.direction {
                        TradeDirection::Acquisition => premium,
                        TradeDirection::Disposal => -premium,
                    };
                    log::debug!(
                        "{asset}: {action:?} converts premium {premium} into adjustment {amount} on {underlying}"
                    );
                    output.adjustments.push(CostAdjustment {
                        asset: underlying.clone(),
                        date: trade.date,
                        amount,
                        description: format!(
                            "{:?} of {} ({})",
                            action,
                            asset,
                            trade.amount.description()
                        ),
                    });
                }
                _ => matchable.push(trade),
            }
        }
        if !matchable.is_empty() {
            let actions = actions_for(ledger, asset);
            output
                .assets
                .push(match_asset(asset, AssetClass::Option, &matchable, &actions, &[])?);
        }
    }
    Ok(output)
}

/// Equities and FX: the share identification rules, with any accumulated
/// cost adjustments folded in. FX report formatting differs downstream but
/// the matching is identical.
fn share_stage(
    class: AssetClass,
    ledger: &Ledger,
    adjustments: &[CostAdjustment],
) -> Result<StageOutput, CalcError> {
    let mut output = StageOutput::default();
    let grouped = trades_by_asset(ledger, class);
    for adj in adjustments {
        if !grouped.contains_key(adj.asset.as_str()) {
            log::warn!(
                "adjustment '{}' targets {} which has no {} trades in the ledger",
                adj.description,
                adj.asset,
                class.display()
            );
        }
    }
    for (asset, trades) in grouped {
        let actions = actions_for(ledger, asset);
        let asset_adjustments: Vec<CostAdjustment> = adjustments
            .iter()
            .filter(|a| a.asset == asset)
            .cloned()
            .collect();
        output
            .assets
            .push(match_asset(asset, class, &trades, &actions, &asset_adjustments)?);
    }
    Ok(output)
}

/// An open futures lot awaiting offset.
#[derive(Debug)]
struct OpenLot {
    date: chrono::NaiveDate,
    direction: TradeDirection,
    quantity: Decimal,
    value: Decimal,
}

/// Futures: realized gain per contract close-out, first-in first-out.
/// No pool participation at all.
fn futures_stage(ledger: &Ledger) -> Result<StageOutput, CalcError> {
    let mut output = StageOutput::default();
    for (asset, trades) in trades_by_asset(ledger, AssetClass::Future) {
        let mut open: VecDeque<OpenLot> = VecDeque::new();
        let mut calculations: Vec<TradeTaxCalculation> = Vec::new();

        for trade in trades {
            let mut quantity = trade.quantity;
            let mut value = trade.amount.base_amount();
            let mut matches: Vec<TradeMatch> = Vec::new();
            let mut proceeds = Decimal::ZERO;
            let mut cost = Decimal::ZERO;

            while quantity > Decimal::ZERO {
                let front = match open.front_mut() {
                    Some(lot) if lot.direction != trade.direction => lot,
                    _ => break,
                };
                let matched = quantity.min(front.quantity);
                let front_share = if matched == front.quantity {
                    front.value
                } else {
                    front.value * matched / front.quantity
                };
                let trade_share = if matched == quantity {
                    value
                } else {
                    value * matched / quantity
                };
                // The disposal side supplies proceeds, whichever leg it is.
                let (p, c) = match trade.direction {
                    TradeDirection::Disposal => (trade_share, front_share),
                    TradeDirection::Acquisition => (front_share, trade_share),
                };
                proceeds += p;
                cost += c;
                matches.push(TradeMatch {
                    rule: MatchRule::CloseOut,
                    quantity: matched,
                    cost: c,
                    counterpart: Some(front.date),
                });
                log::debug!(
                    "{asset}: close-out {matched} against {} (proceeds {p}, cost {c})",
                    front.date
                );

                front.quantity -= matched;
                front.value -= front_share;
                if front.quantity.is_zero() {
                    open.pop_front();
                }
                quantity -= matched;
                value -= trade_share;
            }

            if !matches.is_empty() {
                let matched_total: Decimal = matches.iter().map(|m| m.quantity).sum();
                calculations.push(TradeTaxCalculation {
                    asset: asset.to_string(),
                    class: AssetClass::Future,
                    date: trade.date,
                    tax_year: TaxYear::from_date(trade.date),
                    quantity: matched_total,
                    proceeds,
                    allowable_cost: cost,
                    gain: proceeds - cost,
                    matches,
                    pool_after: PoolSnapshot::default(),
                });
            }
            if quantity > Decimal::ZERO {
                open.push_back(OpenLot {
                    date: trade.date,
                    direction: trade.direction,
                    quantity,
                    value,
                });
            }
        }

        output.assets.push(AssetCalculation {
            asset: asset.to_string(),
            calculations,
            trades: Vec::new(),
            pool: Pool::new(asset),
        });
    }
    Ok(output)
}
