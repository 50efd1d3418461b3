pub mod dividends;
pub mod pools;
pub mod report;
pub mod schema;

use crate::events::{self, Ledger};
use anyhow::Context;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Read a ledger from a CSV or JSON file, or stdin with "-". Files are
/// dispatched on extension; stdin is sniffed from the first byte.
pub fn read_ledger(path: &Path) -> anyhow::Result<Ledger> {
    if path.as_os_str() == "-" {
        read_from_stdin()
    } else {
        let file =
            File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = BufReader::new(file);
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let ledger = if is_json {
            events::read_json(reader)?
        } else {
            events::read_csv(reader)?
        };
        Ok(ledger)
    }
}

fn read_from_stdin() -> anyhow::Result<Ledger> {
    let mut buffer = Vec::new();
    io::stdin().lock().read_to_end(&mut buffer)?;

    if buffer.is_empty() {
        anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
    }

    let looks_like_json = buffer
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{');
    let cursor = io::Cursor::new(buffer);
    let ledger = if looks_like_json {
        events::read_json(cursor)?
    } else {
        events::read_csv(cursor)?
    };
    Ok(ledger)
}
