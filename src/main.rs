mod cmd;
mod events;
mod money;
mod tax;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "cgtc",
    version,
    about = "Calculate UK Capital Gains Tax and dividend summaries"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Disposal-level CGT report with match provenance
    Report(cmd::report::ReportCommand),
    /// Final Section 104 pool balances
    Pools(cmd::pools::PoolsCommand),
    /// Dividend and withholding summary by tax year
    Dividends(cmd::dividends::DividendsCommand),
    /// Print expected input formats
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Report(cmd) => cmd.exec(),
        Command::Pools(cmd) => cmd.exec(),
        Command::Dividends(cmd) => cmd.exec(),
        Command::Schema(cmd) => cmd.exec(),
    }
}
