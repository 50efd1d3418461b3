//! Section 104 holding pool: one averaged cost basis per asset.

use crate::tax::CalcError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

/// Snapshot of pool state at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolSnapshot {
    pub quantity: Decimal,
    pub cost: Decimal,
}

/// Per-asset pooled holding. Owned exclusively by the matcher during one
/// calculation pass and rebuilt from the ledger on every recalculation.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool {
    asset: String,
    quantity: Decimal,
    cost: Decimal,
}

impl Pool {
    pub fn new(asset: impl Into<String>) -> Self {
        Pool {
            asset: asset.into(),
            quantity: Decimal::ZERO,
            cost: Decimal::ZERO,
        }
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn cost(&self) -> Decimal {
        self.cost
    }

    pub fn is_empty(&self) -> bool {
        self.quantity.is_zero() && self.cost.is_zero()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            quantity: self.quantity,
            cost: self.cost,
        }
    }

    /// Add to the pool (acquisition, or a cost-only basis adjustment when
    /// `quantity` is zero).
    pub fn add(&mut self, quantity: Decimal, cost: Decimal) {
        self.quantity += quantity;
        self.cost += cost;
        log::debug!(
            "pool {} ADD qty={} cost={} -> qty={} cost={}",
            self.asset,
            quantity,
            cost,
            self.quantity,
            self.cost
        );
    }

    /// Remove from the pool (disposal), returning the matched cost at the
    /// whole-pool average. Disposing of more than is held is a ledger
    /// integrity problem and fails rather than clamping.
    pub fn remove(&mut self, quantity: Decimal, date: NaiveDate) -> Result<Decimal, CalcError> {
        if quantity > self.quantity {
            return Err(CalcError::InsufficientHolding {
                asset: self.asset.clone(),
                date,
                requested: quantity,
                available: self.quantity,
            });
        }
        // Removing the whole pool takes the whole cost, leaving no residue
        // from the division below.
        let matched_cost = if quantity == self.quantity {
            log::warn!(
                "pool {} fully consumed by disposal on {}: check for missing acquisitions",
                self.asset,
                date
            );
            self.cost
        } else {
            self.cost * quantity / self.quantity
        };
        self.quantity -= quantity;
        self.cost -= matched_cost;
        log::debug!(
            "pool {} REMOVE qty={} cost={} -> qty={} cost={}",
            self.asset,
            quantity,
            matched_cost,
            self.quantity,
            self.cost
        );
        Ok(matched_cost)
    }

    /// Stock split: quantity scales, cost is untouched (the cost per unit
    /// implicitly divides by the ratio). A reverse split has ratio < 1.
    pub fn apply_split(&mut self, ratio: Decimal) {
        self.quantity *= ratio;
        log::debug!(
            "pool {} SPLIT ratio={} -> qty={} cost={}",
            self.asset,
            ratio,
            self.quantity,
            self.cost
        );
    }

    /// Fund equalisation: a capital-return style reduction of the cost basis
    /// without any change in quantity.
    pub fn apply_equalisation(&mut self, amount: Decimal, related: &str) {
        self.cost -= amount;
        log::debug!(
            "pool {} EQUALISATION amount={} ({}) -> qty={} cost={}",
            self.asset,
            amount,
            related,
            self.quantity,
            self.cost
        );
        if self.cost < Decimal::ZERO {
            log::warn!(
                "pool {} cost basis went negative ({}) after equalisation '{}'",
                self.asset,
                self.cost,
                related
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn remove_at_whole_pool_average_cost() {
        // Buy 100 @ £10, buy 100 @ £20 -> pool (200, £3000).
        let mut pool = Pool::new("VOD");
        pool.add(dec!(100), dec!(1000));
        pool.add(dec!(100), dec!(2000));
        assert_eq!(pool.quantity(), dec!(200));
        assert_eq!(pool.cost(), dec!(3000));

        // Sell 50 -> matched cost 50 x £15 = £750, pool (150, £2250).
        let cost = pool.remove(dec!(50), date("2023-06-01")).unwrap();
        assert_eq!(cost, dec!(750));
        assert_eq!(pool.quantity(), dec!(150));
        assert_eq!(pool.cost(), dec!(2250));
    }

    #[test]
    fn remove_whole_pool_takes_whole_cost() {
        let mut pool = Pool::new("VOD");
        pool.add(dec!(3), dec!(100));
        let cost = pool.remove(dec!(3), date("2023-06-01")).unwrap();
        assert_eq!(cost, dec!(100));
        assert!(pool.is_empty());
    }

    #[test]
    fn remove_more_than_held_fails() {
        let mut pool = Pool::new("VOD");
        pool.add(dec!(10), dec!(100));
        let err = pool.remove(dec!(15), date("2023-06-01")).unwrap_err();
        match err {
            CalcError::InsufficientHolding {
                asset,
                requested,
                available,
                ..
            } => {
                assert_eq!(asset, "VOD");
                assert_eq!(requested, dec!(15));
                assert_eq!(available, dec!(10));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Pool untouched after the failure.
        assert_eq!(pool.quantity(), dec!(10));
        assert_eq!(pool.cost(), dec!(100));
    }

    #[test]
    fn split_scales_quantity_only() {
        let mut pool = Pool::new("VOD");
        pool.add(dec!(100), dec!(1500));
        pool.apply_split(dec!(2));
        assert_eq!(pool.quantity(), dec!(200));
        assert_eq!(pool.cost(), dec!(1500));

        // A disposal of 100 now costs half the pooled cost.
        let cost = pool.remove(dec!(100), date("2023-06-01")).unwrap();
        assert_eq!(cost, dec!(750));
    }

    #[test]
    fn reverse_split_uses_fractional_ratio() {
        let mut pool = Pool::new("VOD");
        pool.add(dec!(100), dec!(1500));
        pool.apply_split(dec!(0.5));
        assert_eq!(pool.quantity(), dec!(50));
        assert_eq!(pool.cost(), dec!(1500));
    }

    #[test]
    fn equalisation_reduces_cost_only() {
        let mut pool = Pool::new("FUND");
        pool.add(dec!(100), dec!(1000));
        pool.apply_equalisation(dec!(40), "2023-06-01 Dividend FUND");
        assert_eq!(pool.quantity(), dec!(100));
        assert_eq!(pool.cost(), dec!(960));
    }
}
