//! Statutory share-identification matcher.
//!
//! Implements HMRC's identification order for one asset:
//! 1. Same-day rule: match with acquisitions on the same day
//! 2. Bed & breakfast rule: match with acquisitions within 30 days after disposal
//! 3. Section 104 pool: match with pooled cost basis
//!
//! Trades sharing a date are merged per direction before matching, and every
//! partial match is recorded on both sides so the full provenance of a
//! disposal survives into the report.

use crate::events::{ActionKind, AssetClass, CorporateAction, Trade, TradeDirection};
use crate::tax::pool::{Pool, PoolSnapshot};
use crate::tax::uk::TaxYear;
use crate::tax::CalcError;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;

/// Which HMRC rule produced a match. `CloseOut` is the futures-specific
/// recognition record; futures never reach the share identification rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchRule {
    SameDay,
    BedAndBreakfast,
    Section104,
    CloseOut,
}

impl MatchRule {
    pub fn display(&self) -> &'static str {
        match self {
            MatchRule::SameDay => "Same-Day",
            MatchRule::BedAndBreakfast => "B&B",
            MatchRule::Section104 => "S104 Pool",
            MatchRule::CloseOut => "Close-Out",
        }
    }
}

impl std::fmt::Display for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// One partial match. The same quantity is recorded on the disposal and on
/// the touched acquisition; `counterpart` is the other side's date (`None`
/// for pool matches, which have no single counterpart trade).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeMatch {
    pub rule: MatchRule,
    pub quantity: Decimal,
    pub cost: Decimal,
    pub counterpart: Option<NaiveDate>,
}

/// Working copy of all same-date, same-direction trades of one asset.
/// Rebuilt from the ledger on every recalculation; `unmatched_*` are
/// mutated only by the matcher within a single pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedTrade {
    pub date: NaiveDate,
    pub direction: TradeDirection,
    pub quantity: Decimal,
    /// Total net cost (acquisition) or net proceeds (disposal) in GBP.
    pub value: Decimal,
    pub unmatched_qty: Decimal,
    pub unmatched_value: Decimal,
    pub matches: Vec<TradeMatch>,
    /// Provenance descriptions of the underlying ledger trades.
    pub descriptions: Vec<String>,
}

impl MergedTrade {
    fn from_trade(trade: &Trade) -> Self {
        let value = trade.amount.base_amount();
        MergedTrade {
            date: trade.date,
            direction: trade.direction,
            quantity: trade.quantity,
            value,
            unmatched_qty: trade.quantity,
            unmatched_value: value,
            matches: Vec::new(),
            descriptions: vec![trade.amount.description().to_string()],
        }
    }

    fn absorb(&mut self, trade: &Trade) {
        let value = trade.amount.base_amount();
        self.quantity += trade.quantity;
        self.value += value;
        self.unmatched_qty += trade.quantity;
        self.unmatched_value += value;
        self.descriptions
            .push(trade.amount.description().to_string());
    }

    /// Consume `quantity` from the unmatched remainder, returning the value
    /// share it carries. Consuming the whole remainder takes the whole
    /// remaining value so nothing is lost to division.
    fn consume(&mut self, quantity: Decimal) -> Decimal {
        let value = if quantity == self.unmatched_qty {
            self.unmatched_value
        } else {
            self.unmatched_value * quantity / self.unmatched_qty
        };
        self.unmatched_qty -= quantity;
        self.unmatched_value -= value;
        value
    }
}

/// A cost-basis adjustment produced by one calculator stage for another,
/// e.g. an exercised option premium folded into the underlying equity.
#[derive(Debug, Clone, PartialEq)]
pub struct CostAdjustment {
    pub asset: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub description: String,
}

/// The tax-relevant result of one (merged) disposal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeTaxCalculation {
    pub asset: String,
    pub class: AssetClass,
    pub date: NaiveDate,
    pub tax_year: TaxYear,
    pub quantity: Decimal,
    pub proceeds: Decimal,
    pub allowable_cost: Decimal,
    pub gain: Decimal,
    pub matches: Vec<TradeMatch>,
    /// Pool state after this disposal
    pub pool_after: PoolSnapshot,
}

/// Everything the matcher produced for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetCalculation {
    pub asset: String,
    pub calculations: Vec<TradeTaxCalculation>,
    /// Final merged-trade state; acquisitions carry the mirror side of every
    /// same-day and B&B match.
    pub trades: Vec<MergedTrade>,
    pub pool: Pool,
}

/// Run the share identification rules for one asset. `trades` and `actions`
/// must all belong to `asset` and be in ledger (date, then insertion) order.
pub fn match_asset(
    asset: &str,
    class: AssetClass,
    trades: &[&Trade],
    actions: &[&CorporateAction],
    adjustments: &[CostAdjustment],
) -> Result<AssetCalculation, CalcError> {
    let mut merged: Vec<MergedTrade> = Vec::new();
    for trade in trades {
        match merged
            .iter_mut()
            .find(|m| m.date == trade.date && m.direction == trade.direction)
        {
            Some(existing) => existing.absorb(trade),
            None => merged.push(MergedTrade::from_trade(trade)),
        }
    }
    merged.sort_by_key(|m| m.date);

    // Adjustments land on the same-date acquisition when one exists;
    // otherwise they adjust the pool's cost basis at their date.
    let mut pool_adjustments: Vec<&CostAdjustment> = Vec::new();
    for adj in adjustments {
        match merged.iter_mut().find(|m| {
            m.date == adj.date && m.direction == TradeDirection::Acquisition
        }) {
            Some(acq) => {
                log::debug!(
                    "{asset}: folding adjustment {} ({}) into acquisition on {}",
                    adj.amount,
                    adj.description,
                    adj.date
                );
                acq.value += adj.amount;
                acq.unmatched_value += adj.amount;
            }
            None => pool_adjustments.push(adj),
        }
    }

    let dates: BTreeSet<NaiveDate> = merged
        .iter()
        .map(|m| m.date)
        .chain(actions.iter().map(|a| a.date))
        .chain(pool_adjustments.iter().map(|a| a.date))
        .collect();

    let mut pool = Pool::new(asset);
    let mut calculations: Vec<TradeTaxCalculation> = Vec::new();

    for &date in &dates {
        // Corporate actions first, in ledger order: a split dated between
        // two acquisitions scales only the quantity pooled by its date.
        for action in actions.iter().filter(|a| a.date == date) {
            match &action.kind {
                ActionKind::StockSplit { ratio } => pool.apply_split(*ratio),
                ActionKind::FundEqualisation { amount, related } => {
                    pool.apply_equalisation(amount.base_amount(), related)
                }
            }
        }
        for adj in pool_adjustments.iter().filter(|a| a.date == date) {
            log::debug!(
                "{asset}: pool cost adjustment {} ({})",
                adj.amount,
                adj.description
            );
            pool.add(Decimal::ZERO, adj.amount);
        }

        let disposal_idx = merged
            .iter()
            .position(|m| m.date == date && m.direction == TradeDirection::Disposal);
        let acquisition_idx = merged
            .iter()
            .position(|m| m.date == date && m.direction == TradeDirection::Acquisition);

        // 1. Same-day rule
        if let (Some(di), Some(ai)) = (disposal_idx, acquisition_idx) {
            let quantity = merged[di].unmatched_qty.min(merged[ai].unmatched_qty);
            if quantity > Decimal::ZERO {
                let cost = merged[ai].consume(quantity);
                merged[di].consume(quantity);
                merged[ai].matches.push(TradeMatch {
                    rule: MatchRule::SameDay,
                    quantity,
                    cost,
                    counterpart: Some(date),
                });
                merged[di].matches.push(TradeMatch {
                    rule: MatchRule::SameDay,
                    quantity,
                    cost,
                    counterpart: Some(date),
                });
                log::debug!("{asset}: same-day match {quantity} at cost {cost} on {date}");
            }
        }

        if let Some(di) = disposal_idx {
            // 2. Bed & breakfast rule: acquisitions strictly after the
            // disposal, within 30 calendar days, earliest first. Portions
            // already consumed by an earlier match are not reused.
            let window_end = date + Duration::days(30);
            for ai in 0..merged.len() {
                if merged[di].unmatched_qty.is_zero() {
                    break;
                }
                let eligible = merged[ai].direction == TradeDirection::Acquisition
                    && merged[ai].date > date
                    && merged[ai].date <= window_end
                    && merged[ai].unmatched_qty > Decimal::ZERO;
                if !eligible {
                    continue;
                }
                let quantity = merged[di].unmatched_qty.min(merged[ai].unmatched_qty);
                let cost = merged[ai].consume(quantity);
                merged[di].consume(quantity);
                let acquired = merged[ai].date;
                merged[ai].matches.push(TradeMatch {
                    rule: MatchRule::BedAndBreakfast,
                    quantity,
                    cost,
                    counterpart: Some(date),
                });
                merged[di].matches.push(TradeMatch {
                    rule: MatchRule::BedAndBreakfast,
                    quantity,
                    cost,
                    counterpart: Some(acquired),
                });
                log::debug!(
                    "{asset}: B&B match {quantity} against {acquired} at cost {cost}"
                );
            }

            // 3. Section 104 pool
            let remaining = merged[di].unmatched_qty;
            if remaining > Decimal::ZERO {
                let cost = pool.remove(remaining, date)?;
                merged[di].consume(remaining);
                merged[di].matches.push(TradeMatch {
                    rule: MatchRule::Section104,
                    quantity: remaining,
                    cost,
                    counterpart: None,
                });
                log::debug!("{asset}: pool match {remaining} at cost {cost} on {date}");
            }

            let disposal = &merged[di];
            let allowable_cost: Decimal = disposal.matches.iter().map(|m| m.cost).sum();
            calculations.push(TradeTaxCalculation {
                asset: asset.to_string(),
                class,
                date,
                tax_year: TaxYear::from_date(date),
                quantity: disposal.quantity,
                proceeds: disposal.value,
                allowable_cost,
                gain: disposal.value - allowable_cost,
                matches: disposal.matches.clone(),
                pool_after: pool.snapshot(),
            });
        }

        // Whatever survives of a day's acquisitions enters the pool.
        if let Some(ai) = acquisition_idx {
            let quantity = merged[ai].unmatched_qty;
            if quantity > Decimal::ZERO {
                let cost = merged[ai].consume(quantity);
                pool.add(quantity, cost);
            }
        }
    }

    Ok(AssetCalculation {
        asset: asset.to_string(),
        calculations,
        trades: merged,
        pool,
    })
}
