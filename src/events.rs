//! Typed tax events and the append-only ledger they live in.
//!
//! Ingestion of the flat CSV/JSON record format also lives here; everything
//! downstream of [`Ledger`] works on fully validated events.

use crate::money::{Currency, DescribedMoney, Money, MoneyError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Read;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid event kind: {0}")]
    InvalidKind(String),

    #[error("invalid trade direction: {0}")]
    InvalidDirection(String),

    #[error("invalid asset class: {0}")]
    InvalidClass(String),

    #[error("invalid option action: {0}")]
    InvalidOptionAction(String),

    #[error("invalid dividend type: {0}")]
    InvalidDividendKind(String),

    #[error("missing field '{field}' for {kind} event ({asset} {date})")]
    MissingField {
        field: &'static str,
        kind: String,
        asset: String,
        date: String,
    },

    #[error("quantity must be positive for {asset} on {date}")]
    NonPositiveQuantity { asset: String, date: String },

    #[error("split ratio must be positive for {asset} on {date}")]
    NonPositiveRatio { asset: String, date: String },

    #[error("option action on {asset} requires an underlying asset")]
    OptionActionWithoutUnderlying { asset: String },

    #[error(transparent)]
    Money(#[from] MoneyError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Acquisition,
    Disposal,
}

/// Instrument class, used for the inclusion filter and calculator staging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Option,
    Future,
    Fx,
}

impl AssetClass {
    pub fn display(&self) -> &'static str {
        match self {
            AssetClass::Equity => "Equity",
            AssetClass::Option => "Option",
            AssetClass::Future => "Future",
            AssetClass::Fx => "FX",
        }
    }
}

/// What happened to an option position, when it was not simply closed out.
/// Either action turns the option's premium into a cost adjustment on the
/// underlying instead of a disposal in its own right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionAction {
    Exercise,
    Assignment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub asset: String,
    pub date: NaiveDate,
    pub direction: TradeDirection,
    pub class: AssetClass,
    pub quantity: Decimal,
    /// Net proceeds (disposal) or net cost (acquisition).
    pub amount: DescribedMoney,
    pub underlying: Option<String>,
    pub option_action: Option<OptionAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    /// Ratio > 1 is a forward split, < 1 a reverse split.
    StockSplit { ratio: Decimal },
    /// Capital-return style reduction of the pool's cost basis,
    /// cross-referenced to the originating dividend event.
    FundEqualisation {
        amount: DescribedMoney,
        related: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorporateAction {
    pub asset: String,
    pub date: NaiveDate,
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DividendKind {
    Ordinary,
    Equalisation,
    PaymentInLieu,
    Interest,
}

impl DividendKind {
    pub fn display(&self) -> &'static str {
        match self {
            DividendKind::Ordinary => "Ordinary",
            DividendKind::Equalisation => "Equalisation",
            DividendKind::PaymentInLieu => "Payment in lieu",
            DividendKind::Interest => "Interest",
        }
    }
}

/// Where the paying company is resident, for withholding-tax classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Jurisdiction {
    Uk,
    Us,
    Ireland,
    France,
    Germany,
    Switzerland,
    Netherlands,
    Other(String),
}

impl Jurisdiction {
    pub fn from_code(code: &str) -> Jurisdiction {
        match code.to_ascii_uppercase().as_str() {
            "UK" | "GB" => Jurisdiction::Uk,
            "US" => Jurisdiction::Us,
            "IE" => Jurisdiction::Ireland,
            "FR" => Jurisdiction::France,
            "DE" => Jurisdiction::Germany,
            "CH" => Jurisdiction::Switzerland,
            "NL" => Jurisdiction::Netherlands,
            other => Jurisdiction::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Jurisdiction::Uk => "UK",
            Jurisdiction::Us => "US",
            Jurisdiction::Ireland => "IE",
            Jurisdiction::France => "FR",
            Jurisdiction::Germany => "DE",
            Jurisdiction::Switzerland => "CH",
            Jurisdiction::Netherlands => "NL",
            Jurisdiction::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dividend {
    pub asset: String,
    pub date: NaiveDate,
    pub kind: DividendKind,
    pub jurisdiction: Jurisdiction,
    /// Gross proceed, converted at the rate recorded upstream.
    pub proceed: DescribedMoney,
    /// Tax withheld at source, same currency and rate as the proceed.
    pub withheld: Option<DescribedMoney>,
}

/// One entry in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum TaxEvent {
    Trade(Trade),
    CorporateAction(CorporateAction),
    Dividend(Dividend),
}

impl TaxEvent {
    pub fn asset(&self) -> &str {
        match self {
            TaxEvent::Trade(t) => &t.asset,
            TaxEvent::CorporateAction(a) => &a.asset,
            TaxEvent::Dividend(d) => &d.asset,
        }
    }

    pub fn date(&self) -> NaiveDate {
        match self {
            TaxEvent::Trade(t) => t.date,
            TaxEvent::CorporateAction(a) => a.date,
            TaxEvent::Dividend(d) => d.date,
        }
    }
}

/// Per-instrument-class inclusion filter, applied before the engine runs.
#[derive(Debug, Clone, Copy)]
pub struct ClassFilter {
    pub equities: bool,
    pub options: bool,
    pub futures: bool,
    pub fx: bool,
}

impl Default for ClassFilter {
    fn default() -> Self {
        ClassFilter {
            equities: true,
            options: true,
            futures: true,
            fx: true,
        }
    }
}

impl ClassFilter {
    pub fn includes(&self, class: AssetClass) -> bool {
        match class {
            AssetClass::Equity => self.equities,
            AssetClass::Option => self.options,
            AssetClass::Future => self.futures,
            AssetClass::Fx => self.fx,
        }
    }
}

/// Append-only, date-ordered event collection. Sorting is stable so events
/// sharing a date keep their insertion order, which the matcher relies on
/// when applying corporate actions.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    events: Vec<TaxEvent>,
}

impl Ledger {
    pub fn new(events: Vec<TaxEvent>) -> Self {
        let mut ledger = Ledger { events };
        ledger.sort();
        ledger
    }

    fn sort(&mut self) {
        self.events.sort_by_key(|e| e.date());
    }

    pub fn append(&mut self, event: TaxEvent) {
        self.events.push(event);
        self.sort();
    }

    pub fn events(&self) -> &[TaxEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Distinct asset identifiers, sorted for deterministic iteration.
    pub fn assets(&self) -> Vec<String> {
        let mut assets: Vec<String> = self.events.iter().map(|e| e.asset().to_string()).collect();
        assets.sort();
        assets.dedup();
        assets
    }

    /// Copy of this ledger with trades outside the filter removed.
    /// Corporate actions and dividends carry no class and are kept.
    pub fn filtered(&self, filter: &ClassFilter) -> Ledger {
        let events = self
            .events
            .iter()
            .filter(|e| match e {
                TaxEvent::Trade(t) => filter.includes(t.class),
                _ => true,
            })
            .cloned()
            .collect();
        Ledger { events }
    }
}

/// Unified JSON input format.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LedgerInput {
    pub events: Vec<EventRecord>,
}

/// One flat input row, shared between the CSV and JSON formats. Which fields
/// are required depends on `kind`; conversion to [`TaxEvent`] validates.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EventRecord {
    /// Event date, YYYY-MM-DD (a trailing time component is accepted and ignored)
    pub date: String,
    /// Trade | StockSplit | FundEqualisation | Dividend
    pub kind: String,
    /// Asset identifier, e.g. ticker or contract code
    pub asset: String,
    /// Equity | Option | Future | Fx (trades only, default Equity)
    #[serde(default)]
    pub class: Option<String>,
    /// Acquisition | Disposal (trades only)
    #[serde(default)]
    pub direction: Option<String>,
    /// Units traded, always positive (trades only)
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub quantity: Option<Decimal>,
    /// ISO currency code of `amount` (default GBP)
    #[serde(default)]
    pub currency: Option<String>,
    /// Net proceeds/cost, gross dividend, or equalisation amount
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub amount: Option<Decimal>,
    /// FX rate to GBP recorded upstream; required for non-GBP amounts
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub fx_rate: Option<Decimal>,
    /// Free-text provenance, e.g. broker reference
    #[serde(default)]
    pub description: Option<String>,
    /// Underlying asset for option trades
    #[serde(default)]
    pub underlying: Option<String>,
    /// Exercise | Assignment (option trades only)
    #[serde(default)]
    pub option_action: Option<String>,
    /// Split ratio (StockSplit only); > 1 forward, < 1 reverse
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub ratio: Option<Decimal>,
    /// Paying company jurisdiction code (dividends only), e.g. UK, US, IE
    #[serde(default)]
    pub jurisdiction: Option<String>,
    /// Ordinary | Equalisation | PaymentInLieu | Interest (dividends only)
    #[serde(default)]
    pub dividend_type: Option<String>,
    /// Tax withheld at source, in `currency` (dividends only)
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub withheld: Option<Decimal>,
    /// Cross-reference to the originating event (FundEqualisation only)
    #[serde(default)]
    pub related: Option<String>,
}

impl EventRecord {
    fn missing(&self, field: &'static str) -> LedgerError {
        LedgerError::MissingField {
            field,
            kind: self.kind.clone(),
            asset: self.asset.clone(),
            date: self.date.clone(),
        }
    }

    fn parse_date(&self) -> Result<NaiveDate, LedgerError> {
        let text = self.date.trim();
        let date_part = text.split(['T', ' ']).next().unwrap_or(text);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map_err(|_| LedgerError::InvalidDate(self.date.clone()))
    }

    fn parse_amount(&self) -> Result<DescribedMoney, LedgerError> {
        let amount = self.amount.ok_or_else(|| self.missing("amount"))?;
        let currency = match &self.currency {
            Some(code) => Currency::find(code)?,
            None => crate::money::BASE_CURRENCY,
        };
        self.described(amount, currency)
    }

    fn described(
        &self,
        amount: Decimal,
        currency: Currency,
    ) -> Result<DescribedMoney, LedgerError> {
        let description = self
            .description
            .clone()
            .unwrap_or_else(|| format!("{} {} {}", self.date, self.kind, self.asset));
        // GBP amounts need no rate; anything else must carry the one
        // recorded upstream, there is no 1.0 fallback.
        let rate = match self.fx_rate {
            Some(rate) => rate,
            None if currency == crate::money::BASE_CURRENCY => Decimal::ONE,
            None => {
                return Err(MoneyError::InvalidFxRate {
                    rate: Decimal::ZERO,
                    description,
                }
                .into())
            }
        };
        Ok(DescribedMoney::new(
            Money::new(amount, currency),
            rate,
            description,
        )?)
    }

    fn into_trade(self) -> Result<Trade, LedgerError> {
        let date = self.parse_date()?;
        let direction = match self
            .direction
            .as_deref()
            .ok_or_else(|| self.missing("direction"))?
        {
            "Acquisition" => TradeDirection::Acquisition,
            "Disposal" => TradeDirection::Disposal,
            other => return Err(LedgerError::InvalidDirection(other.to_string())),
        };
        let class = match self.class.as_deref() {
            None | Some("Equity") => AssetClass::Equity,
            Some("Option") => AssetClass::Option,
            Some("Future") => AssetClass::Future,
            Some("Fx") | Some("FX") => AssetClass::Fx,
            Some(other) => return Err(LedgerError::InvalidClass(other.to_string())),
        };
        let quantity = self.quantity.ok_or_else(|| self.missing("quantity"))?;
        if quantity <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveQuantity {
                asset: self.asset,
                date: self.date,
            });
        }
        let option_action = match self.option_action.as_deref() {
            None | Some("") => None,
            Some("Exercise") => Some(OptionAction::Exercise),
            Some("Assignment") => Some(OptionAction::Assignment),
            Some(other) => return Err(LedgerError::InvalidOptionAction(other.to_string())),
        };
        if option_action.is_some() && self.underlying.is_none() {
            return Err(LedgerError::OptionActionWithoutUnderlying { asset: self.asset });
        }
        let amount = self.parse_amount()?;
        Ok(Trade {
            asset: self.asset,
            date,
            direction,
            class,
            quantity,
            amount,
            underlying: self.underlying,
            option_action,
        })
    }

    fn into_dividend(self) -> Result<Dividend, LedgerError> {
        let date = self.parse_date()?;
        let kind = match self.dividend_type.as_deref() {
            None | Some("Ordinary") => DividendKind::Ordinary,
            Some("Equalisation") => DividendKind::Equalisation,
            Some("PaymentInLieu") => DividendKind::PaymentInLieu,
            Some("Interest") => DividendKind::Interest,
            Some(other) => return Err(LedgerError::InvalidDividendKind(other.to_string())),
        };
        let jurisdiction = self
            .jurisdiction
            .as_deref()
            .map(Jurisdiction::from_code)
            .ok_or_else(|| self.missing("jurisdiction"))?;
        let proceed = self.parse_amount()?;
        let withheld = match self.withheld {
            Some(amount) => Some(self.described(amount, proceed.money().currency())?),
            None => None,
        };
        Ok(Dividend {
            asset: self.asset,
            date,
            kind,
            jurisdiction,
            proceed,
            withheld,
        })
    }

    pub fn into_event(self) -> Result<TaxEvent, LedgerError> {
        match self.kind.as_str() {
            "Trade" => Ok(TaxEvent::Trade(self.into_trade()?)),
            "StockSplit" => {
                let date = self.parse_date()?;
                let ratio = self.ratio.ok_or_else(|| self.missing("ratio"))?;
                if ratio <= Decimal::ZERO {
                    return Err(LedgerError::NonPositiveRatio {
                        asset: self.asset,
                        date: self.date,
                    });
                }
                Ok(TaxEvent::CorporateAction(CorporateAction {
                    asset: self.asset,
                    date,
                    kind: ActionKind::StockSplit { ratio },
                }))
            }
            "FundEqualisation" => {
                let date = self.parse_date()?;
                let related = self.related.clone().ok_or_else(|| self.missing("related"))?;
                let amount = self.parse_amount()?;
                Ok(TaxEvent::CorporateAction(CorporateAction {
                    asset: self.asset,
                    date,
                    kind: ActionKind::FundEqualisation { amount, related },
                }))
            }
            "Dividend" => Ok(TaxEvent::Dividend(self.into_dividend()?)),
            other => Err(LedgerError::InvalidKind(other.to_string())),
        }
    }
}

/// Read a ledger from CSV.
pub fn read_csv<R: Read>(reader: R) -> Result<Ledger, LedgerError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut events = Vec::new();
    for record in rdr.deserialize::<EventRecord>() {
        events.push(record?.into_event()?);
    }
    Ok(Ledger::new(events))
}

/// Read a ledger from the unified JSON format.
pub fn read_json<R: Read>(reader: R) -> Result<Ledger, LedgerError> {
    let input: LedgerInput = serde_json::from_reader(reader)?;
    let events = input
        .events
        .into_iter()
        .map(EventRecord::into_event)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Ledger::new(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parse_csv_mixed_events() {
        let csv_data = "\
date,kind,asset,class,direction,quantity,currency,amount,fx_rate,description,underlying,option_action,ratio,jurisdiction,dividend_type,withheld,related
2023-01-10,Trade,VOD,Equity,Acquisition,100,GBP,1000.00,,LSE buy,,,,,,,
2023-02-01,StockSplit,VOD,,,,,,,,,,2,,,,
2023-03-15,Dividend,AAPL,,,,USD,100,0.80,Q1 dividend,,,,US,Ordinary,15,
2023-04-20,Trade,VOD,Equity,Disposal,50,GBP,700.00,,LSE sell,,,,,,,";

        let ledger = read_csv(csv_data.as_bytes()).unwrap();
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.assets(), vec!["AAPL".to_string(), "VOD".to_string()]);

        match &ledger.events()[0] {
            TaxEvent::Trade(t) => {
                assert_eq!(t.direction, TradeDirection::Acquisition);
                assert_eq!(t.quantity, dec!(100));
                assert_eq!(t.amount.base_amount(), dec!(1000.00));
            }
            other => panic!("expected trade, got {other:?}"),
        }
        match &ledger.events()[1] {
            TaxEvent::CorporateAction(a) => {
                assert_eq!(a.kind, ActionKind::StockSplit { ratio: dec!(2) });
            }
            other => panic!("expected corporate action, got {other:?}"),
        }
        match &ledger.events()[2] {
            TaxEvent::Dividend(d) => {
                assert_eq!(d.jurisdiction, Jurisdiction::Us);
                assert_eq!(d.proceed.base_amount(), dec!(80.00));
                assert_eq!(d.withheld.as_ref().unwrap().base_amount(), dec!(12.00));
            }
            other => panic!("expected dividend, got {other:?}"),
        }
    }

    #[test]
    fn parse_json_events() {
        let json_data = r#"{
            "events": [
                {
                    "date": "2023-06-15",
                    "kind": "Trade",
                    "asset": "VOD",
                    "direction": "Disposal",
                    "quantity": 10,
                    "amount": 150.00
                },
                {
                    "date": "2023-01-15",
                    "kind": "Trade",
                    "asset": "VOD",
                    "direction": "Acquisition",
                    "quantity": 10,
                    "amount": 100.00
                }
            ]
        }"#;

        let ledger = read_json(json_data.as_bytes()).unwrap();
        assert_eq!(ledger.len(), 2);
        // Sorted by date regardless of input order.
        assert_eq!(
            ledger.events()[0].date(),
            NaiveDate::from_ymd_opt(2023, 1, 15).unwrap()
        );
    }

    #[test]
    fn missing_fx_rate_on_foreign_amount_is_fatal() {
        let csv_data = "\
date,kind,asset,class,direction,quantity,currency,amount,fx_rate
2023-03-15,Trade,AAPL,Equity,Acquisition,10,USD,1500.00,";

        let err = read_csv(csv_data.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Money(MoneyError::InvalidFxRate { .. })
        ));
    }

    #[test]
    fn zero_fx_rate_is_fatal() {
        let csv_data = "\
date,kind,asset,class,direction,quantity,currency,amount,fx_rate
2023-03-15,Trade,AAPL,Equity,Acquisition,10,USD,1500.00,0";

        let err = read_csv(csv_data.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Money(MoneyError::InvalidFxRate { .. })
        ));
    }

    #[test]
    fn option_action_requires_underlying() {
        let record = EventRecord {
            date: "2023-03-15".into(),
            kind: "Trade".into(),
            asset: "VOD 150 CALL".into(),
            class: Some("Option".into()),
            direction: Some("Acquisition".into()),
            quantity: Some(dec!(1)),
            currency: None,
            amount: Some(dec!(50)),
            fx_rate: None,
            description: None,
            underlying: None,
            option_action: Some("Exercise".into()),
            ratio: None,
            jurisdiction: None,
            dividend_type: None,
            withheld: None,
            related: None,
        };
        assert!(matches!(
            record.into_event(),
            Err(LedgerError::OptionActionWithoutUnderlying { .. })
        ));
    }

    #[test]
    fn same_date_events_keep_insertion_order() {
        let csv_data = "\
date,kind,asset,class,direction,quantity,currency,amount,fx_rate
2023-05-01,Trade,VOD,Equity,Acquisition,100,GBP,1000,
2023-05-01,Trade,VOD,Equity,Disposal,100,GBP,1200,";

        let ledger = read_csv(csv_data.as_bytes()).unwrap();
        let directions: Vec<_> = ledger
            .events()
            .iter()
            .map(|e| match e {
                TaxEvent::Trade(t) => t.direction,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(
            directions,
            vec![TradeDirection::Acquisition, TradeDirection::Disposal]
        );
    }

    #[test]
    fn append_keeps_date_order() {
        let csv_data = "\
date,kind,asset,class,direction,quantity,currency,amount,fx_rate
2023-05-01,Trade,VOD,Equity,Acquisition,100,GBP,1000,";
        let mut ledger = read_csv(csv_data.as_bytes()).unwrap();

        let record = EventRecord {
            date: "2023-02-01".into(),
            kind: "Trade".into(),
            asset: "VOD".into(),
            class: None,
            direction: Some("Acquisition".into()),
            quantity: Some(dec!(10)),
            currency: None,
            amount: Some(dec!(90)),
            fx_rate: None,
            description: None,
            underlying: None,
            option_action: None,
            ratio: None,
            jurisdiction: None,
            dividend_type: None,
            withheld: None,
            related: None,
        };
        ledger.append(record.into_event().unwrap());

        assert_eq!(ledger.len(), 2);
        assert_eq!(
            ledger.events()[0].date(),
            NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
        );
    }

    #[test]
    fn class_filter_removes_trades_only() {
        let csv_data = "\
date,kind,asset,class,direction,quantity,currency,amount,fx_rate,jurisdiction
2023-05-01,Trade,VOD,Equity,Acquisition,100,GBP,1000,,
2023-05-02,Trade,ESZ3,Future,Acquisition,2,GBP,5000,,
2023-05-03,Dividend,VOD,,,,GBP,20,,UK";

        let ledger = read_csv(csv_data.as_bytes()).unwrap();
        let filter = ClassFilter {
            futures: false,
            ..ClassFilter::default()
        };
        let filtered = ledger.filtered(&filter);
        assert_eq!(filtered.len(), 2);
        assert!(filtered
            .events()
            .iter()
            .all(|e| !matches!(e, TaxEvent::Trade(t) if t.class == AssetClass::Future)));
    }
}
