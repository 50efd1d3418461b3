//! Schema command - print expected input formats

use crate::events::LedgerInput;
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format: json-schema or csv-header
    #[arg(value_enum, default_value = "json-schema")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema for the input format
    JsonSchema,
    /// CSV header row with column names
    CsvHeader,
    /// CSV column descriptions
    CsvFields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::JsonSchema => self.print_json_schema(),
            SchemaFormat::CsvHeader => self.print_csv_header(),
            SchemaFormat::CsvFields => self.print_csv_fields(),
        }
    }

    fn print_json_schema(&self) -> anyhow::Result<()> {
        let schema = schema_for!(LedgerInput);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        Ok(())
    }

    fn print_csv_header(&self) -> anyhow::Result<()> {
        println!("{}", CSV_COLUMNS.join(","));
        Ok(())
    }

    fn print_csv_fields(&self) -> anyhow::Result<()> {
        println!("CSV Input Format");
        println!("================");
        println!();
        for (name, required, description) in CSV_FIELD_DESCRIPTIONS {
            let req = if *required { "required" } else { "optional" };
            println!("{:20} ({:8})  {}", name, req, description);
        }
        println!();
        println!("FX rate convention: fx_rate is GBP per one unit of currency");
        Ok(())
    }
}

const CSV_COLUMNS: &[&str] = &[
    "date",
    "kind",
    "asset",
    "class",
    "direction",
    "quantity",
    "currency",
    "amount",
    "fx_rate",
    "description",
    "underlying",
    "option_action",
    "ratio",
    "jurisdiction",
    "dividend_type",
    "withheld",
    "related",
];

const CSV_FIELD_DESCRIPTIONS: &[(&str, bool, &str)] = &[
    (
        "date",
        true,
        "Event date (YYYY-MM-DD, a trailing time component is ignored)",
    ),
    (
        "kind",
        true,
        "Trade, StockSplit, FundEqualisation, Dividend",
    ),
    ("asset", true, "Asset identifier (e.g., VOD, AAPL, ESZ3)"),
    (
        "class",
        false,
        "Equity, Option, Future, Fx (trades only, default Equity)",
    ),
    ("direction", false, "Acquisition or Disposal (trades only)"),
    ("quantity", false, "Units traded, always positive (trades only)"),
    ("currency", false, "ISO currency code of amount (default GBP)"),
    (
        "amount",
        false,
        "Net proceeds/cost, gross dividend, or equalisation amount",
    ),
    (
        "fx_rate",
        false,
        "FX rate to GBP recorded upstream (required if currency != GBP)",
    ),
    ("description", false, "Free-text provenance, e.g. broker reference"),
    ("underlying", false, "Underlying asset for option trades"),
    (
        "option_action",
        false,
        "Exercise or Assignment (option trades only)",
    ),
    ("ratio", false, "Split ratio (StockSplit only); > 1 forward"),
    (
        "jurisdiction",
        false,
        "Paying company jurisdiction (dividends only), e.g. UK, US, IE",
    ),
    (
        "dividend_type",
        false,
        "Ordinary, Equalisation, PaymentInLieu, Interest (default Ordinary)",
    ),
    (
        "withheld",
        false,
        "Tax withheld at source, in currency (dividends only)",
    ),
    (
        "related",
        false,
        "Cross-reference to the originating event (FundEqualisation only)",
    ),
];
