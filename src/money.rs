//! Exact-decimal money values and FX conversion to the reporting currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The single reporting currency all amounts are normalized to.
pub const BASE_CURRENCY: Currency = Currency::Gbp;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("currency mismatch: {0} and {1}")]
    CurrencyMismatch(Currency, Currency),

    #[error("invalid fx rate {rate} on '{description}': rates must be positive and supplied upstream")]
    InvalidFxRate { rate: Decimal, description: String },

    #[error("unknown currency code: {0}")]
    UnknownCurrency(String),
}

/// Supported currency codes. The set is closed: an unknown code on ingestion
/// is an error, never a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    Gbp,
    Usd,
    Eur,
    Chf,
    Jpy,
    Cad,
    Aud,
    Sek,
    Nok,
    Dkk,
}

impl Currency {
    pub fn find(code: &str) -> Result<Currency, MoneyError> {
        match code.to_ascii_uppercase().as_str() {
            "GBP" => Ok(Currency::Gbp),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "CHF" => Ok(Currency::Chf),
            "JPY" => Ok(Currency::Jpy),
            "CAD" => Ok(Currency::Cad),
            "AUD" => Ok(Currency::Aud),
            "SEK" => Ok(Currency::Sek),
            "NOK" => Ok(Currency::Nok),
            "DKK" => Ok(Currency::Dkk),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Gbp => "GBP",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Chf => "CHF",
            Currency::Jpy => "JPY",
            Currency::Cad => "CAD",
            Currency::Aud => "AUD",
            Currency::Sek => "SEK",
            Currency::Nok => "NOK",
            Currency::Dkk => "DKK",
        }
    }

    /// Minor-unit decimal places (JPY has none).
    pub fn exponent(&self) -> u32 {
        match self {
            Currency::Jpy => 0,
            _ => 2,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An immutable amount in a single currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Money { amount, currency }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(self.currency, other.currency));
        }
        Ok(Money::new(self.amount + other.amount, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(self.currency, other.currency));
        }
        Ok(Money::new(self.amount - other.amount, self.currency))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.*} {}",
            self.currency.exponent() as usize,
            self.amount,
            self.currency
        )
    }
}

/// A foreign amount with the fx rate it was converted at and where it came
/// from. The GBP value is fixed at construction: whatever rates later code
/// paths see, the amount recorded on an event never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribedMoney {
    money: Money,
    fx_rate: Decimal,
    description: String,
    base_amount: Decimal,
}

impl DescribedMoney {
    pub fn new(
        money: Money,
        fx_rate: Decimal,
        description: impl Into<String>,
    ) -> Result<Self, MoneyError> {
        let description = description.into();
        if fx_rate <= Decimal::ZERO {
            return Err(MoneyError::InvalidFxRate {
                rate: fx_rate,
                description,
            });
        }
        let base_amount = (money.amount() * fx_rate).round_dp(BASE_CURRENCY.exponent());
        Ok(DescribedMoney {
            money,
            fx_rate,
            description,
            base_amount,
        })
    }

    /// An amount already in the reporting currency, with rate 1.
    pub fn base(amount: Decimal, description: impl Into<String>) -> Self {
        DescribedMoney {
            money: Money::new(amount, BASE_CURRENCY),
            fx_rate: Decimal::ONE,
            description: description.into(),
            base_amount: amount.round_dp(BASE_CURRENCY.exponent()),
        }
    }

    pub fn money(&self) -> &Money {
        &self.money
    }

    pub fn fx_rate(&self) -> Decimal {
        self.fx_rate
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The GBP value recorded when the event was created.
    pub fn base_amount(&self) -> Decimal {
        self.base_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn add_same_currency() {
        let a = Money::new(dec!(10.50), Currency::Gbp);
        let b = Money::new(dec!(4.50), Currency::Gbp);
        assert_eq!(a.checked_add(&b).unwrap().amount(), dec!(15.00));
    }

    #[test]
    fn add_mixed_currencies_fails() {
        let a = Money::new(dec!(10), Currency::Gbp);
        let b = Money::new(dec!(10), Currency::Usd);
        assert_eq!(
            a.checked_add(&b),
            Err(MoneyError::CurrencyMismatch(Currency::Gbp, Currency::Usd))
        );
        assert_eq!(
            b.checked_sub(&a),
            Err(MoneyError::CurrencyMismatch(Currency::Usd, Currency::Gbp))
        );
    }

    #[test]
    fn base_amount_converted_once() {
        let usd = Money::new(dec!(100), Currency::Usd);
        let dm = DescribedMoney::new(usd, dec!(0.80), "dividend AAPL").unwrap();
        assert_eq!(dm.base_amount(), dec!(80.00));
        assert_eq!(dm.fx_rate(), dec!(0.80));
    }

    #[test]
    fn base_amount_rounds_to_minor_units() {
        let usd = Money::new(dec!(33.33), Currency::Usd);
        let dm = DescribedMoney::new(usd, dec!(0.7777), "proceeds").unwrap();
        // 33.33 * 0.7777 = 25.9207...
        assert_eq!(dm.base_amount(), dec!(25.92));
    }

    #[test]
    fn zero_fx_rate_rejected() {
        let usd = Money::new(dec!(100), Currency::Usd);
        let err = DescribedMoney::new(usd, Decimal::ZERO, "broken rate").unwrap_err();
        assert!(matches!(err, MoneyError::InvalidFxRate { .. }));
    }

    #[test]
    fn negative_fx_rate_rejected() {
        let usd = Money::new(dec!(100), Currency::Usd);
        assert!(DescribedMoney::new(usd, dec!(-1), "bad").is_err());
    }

    #[test]
    fn unknown_currency_code() {
        assert_eq!(
            Currency::find("XYZ"),
            Err(MoneyError::UnknownCurrency("XYZ".to_string()))
        );
        assert_eq!(Currency::find("gbp"), Ok(Currency::Gbp));
    }

    #[test]
    fn gbp_helper_uses_identity_rate() {
        let dm = DescribedMoney::base(dec!(1234.56), "UK trade");
        assert_eq!(dm.base_amount(), dec!(1234.56));
        assert_eq!(dm.money().currency(), Currency::Gbp);
        assert_eq!(dm.fx_rate(), Decimal::ONE);
    }
}
