// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result, anyhow, bail};
use breeding_ledger_rs::{
    BookId, BreedingId, BullId, Engine, EntryForm, Identity, Jati, LedgerConfig, MonthWindow,
    NewBatch, PdResult, SemenType, StoreSnapshot, telemetry,
};
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use csv::{ReaderBuilder, Trim, Writer};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Breeding Ledger - Replay an operations journal and print a monthly ledger
///
/// Reads journal rows from a CSV file, applies them to the engine and writes
/// the stock or receipt-book ledger of one month to stdout.
#[derive(Parser, Debug)]
#[command(name = "breeding-ledger")]
#[command(about = "Replays an A.I. centre journal and prints monthly ledgers", long_about = None)]
struct Args {
    /// Path to the journal CSV
    ///
    /// Expected columns:
    /// op,date,key,semen_type,tag,bull,quantity,start,end,jati,breed,village,detail
    #[arg(value_name = "JOURNAL")]
    input: PathBuf,

    #[arg(long)]
    year: i32,

    #[arg(long)]
    month: u32,

    #[arg(long, value_enum, default_value_t = Report::Stock)]
    report: Report,

    /// Operator the journal is recorded for
    #[arg(long, env = "BREEDING_LEDGER_USER", default_value = "local")]
    user: String,

    /// JSON state file, loaded before and saved after the replay
    #[arg(long)]
    state: Option<PathBuf>,

    /// TOML policy file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Report {
    Stock,
    Receipts,
}

fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init(args.verbose);

    let config = match &args.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    let window = MonthWindow::new(args.year, args.month)
        .ok_or_else(|| anyhow!("invalid month {}-{}", args.year, args.month))?;

    let engine = match &args.state {
        Some(path) if path.exists() => {
            let file = File::open(path)
                .with_context(|| format!("opening state '{}'", path.display()))?;
            let snapshot: StoreSnapshot = serde_json::from_reader(BufReader::new(file))?;
            Engine::from_snapshot(snapshot, config)?
        }
        _ => Engine::with_config(config),
    };

    let identity = Identity::user(args.user.as_str(), args.user.as_str());
    let file = File::open(&args.input)
        .with_context(|| format!("opening journal '{}'", args.input.display()))?;
    let summary = process_journal(BufReader::new(file), &engine, &identity)?;
    info!(applied = summary.applied, skipped = summary.skipped, "journal replayed");

    if let Some(path) = &args.state {
        let file = File::create(path)
            .with_context(|| format!("writing state '{}'", path.display()))?;
        serde_json::to_writer_pretty(file, &engine.snapshot())?;
    }

    let stdout = std::io::stdout();
    match args.report {
        Report::Stock => write_stock_report(&engine, &identity, window, stdout.lock())?,
        Report::Receipts => write_receipt_report(&engine, &identity, window, stdout.lock())?,
    }
    Ok(())
}

/// Raw journal row. Columns not used by an op are left empty.
#[derive(Debug, Deserialize)]
struct JournalRow {
    op: String,
    date: NaiveDate,
    #[serde(default)]
    key: String,
    #[serde(default)]
    semen_type: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    bull: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    quantity: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    start: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    end: Option<u32>,
    #[serde(default)]
    jati: String,
    #[serde(default)]
    breed: String,
    #[serde(default)]
    village: String,
    #[serde(default)]
    detail: String,
}

/// Journal keys resolved to engine ids.
#[derive(Debug, Default)]
struct Journal {
    books: HashMap<String, BookId>,
    bulls: HashMap<String, BullId>,
    entries: HashMap<String, BreedingId>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub skipped: usize,
}

impl Journal {
    fn apply(&mut self, engine: &Engine, identity: &Identity, row: JournalRow) -> Result<()> {
        let owner = identity.scope();
        match row.op.to_ascii_lowercase().as_str() {
            "book" => {
                let semen_type = parse_semen_type(&row.semen_type)?;
                let (Some(start), Some(end)) = (row.start, row.end) else {
                    bail!("book needs start and end");
                };
                let book = engine.receipts().create(owner, start, end, semen_type, row.date)?;
                self.books.insert(row.key, book.id);
            }
            "activate" => {
                let book = self.book(&row.key)?;
                engine.receipts().activate(book)?;
            }
            "receive" => {
                let semen_type = parse_semen_type(&row.semen_type)?;
                let jati = parse_jati(&row.jati)?;
                let doses = row.quantity.context("receive needs a quantity")?;
                let name = if row.detail.is_empty() { row.key.clone() } else { row.detail };
                let batch = NewBatch::new(name, jati, row.breed, semen_type, doses).on(row.date);
                let batch = engine.stock().receive(owner, batch)?;
                self.bulls.insert(row.key, batch.id);
            }
            "discard" => {
                let bull = self.bull(&row.bull)?;
                let quantity = row.quantity.context("discard needs a quantity")?;
                engine.stock().discard(bull, quantity, &row.detail, row.date)?;
            }
            "ai" => {
                let bull = self.bull(&row.bull)?;
                let semen_type = parse_semen_type(&row.semen_type)?;
                let jati = parse_jati(&row.jati)?;
                let mut form = EntryForm::new(
                    row.date,
                    row.tag,
                    bull,
                    semen_type,
                    jati,
                    row.breed,
                    row.village,
                );
                if let Some(number) = row.start {
                    form = form.manual_receipt(number);
                }
                if row.detail.eq_ignore_ascii_case("confirm") {
                    form = form.confirmed();
                }
                let record = engine.create_entry(identity, &form)?;
                self.entries.insert(row.key, record.id);
            }
            "pd" => {
                let entry = self.entry(&row.key)?;
                let result: PdResult = row.detail.parse().map_err(|e: String| anyhow!(e))?;
                engine.record_pd(identity, entry, result, row.date)?;
            }
            "calving" => {
                engine.record_calving(identity, &row.tag, &row.detail, row.date)?;
            }
            "delete" => {
                let entry = self.entry(&row.key)?;
                engine.delete_entry(identity, entry)?;
                self.entries.remove(&row.key);
            }
            other => bail!("unknown op '{other}'"),
        }
        Ok(())
    }

    fn book(&self, key: &str) -> Result<BookId> {
        self.books.get(key).copied().ok_or_else(|| anyhow!("unknown book '{key}'"))
    }

    fn bull(&self, key: &str) -> Result<BullId> {
        self.bulls.get(key).copied().ok_or_else(|| anyhow!("unknown bull '{key}'"))
    }

    fn entry(&self, key: &str) -> Result<BreedingId> {
        self.entries.get(key).copied().ok_or_else(|| anyhow!("unknown entry '{key}'"))
    }
}

fn parse_semen_type(value: &str) -> Result<SemenType> {
    value.parse().map_err(|e: String| anyhow!(e))
}

fn parse_jati(value: &str) -> Result<Jati> {
    value.parse().map_err(|e: String| anyhow!(e))
}

/// Replays journal rows into `engine`.
///
/// Rows are applied in file order. A malformed row, or one the engine
/// rejects, is logged and skipped; the replay carries on.
///
/// # CSV Format
///
/// ```csv
/// op,date,key,semen_type,tag,bull,quantity,start,end,jati,breed,village,detail
/// book,2024-01-01,B1,Conventional,,,,101,200,,,,
/// receive,2024-01-10,HF1,Conventional,,,50,,,Cow,HF,,HF 1042
/// ai,2024-01-15,E1,Conventional,12345678,HF1,,,,Cow,HF,Khed,
/// pd,2024-03-01,E1,,,,,,,,,,positive
/// ```
///
/// In `ai` rows a `start` value is a manual receipt number and a `detail`
/// of `confirm` accepts a same-day duplicate.
///
/// # Errors
///
/// Returns a CSV error only if the reader itself fails.
pub fn process_journal<R: Read>(
    reader: R,
    engine: &Engine,
    identity: &Identity,
) -> Result<ReplaySummary, csv::Error> {
    let mut journal = Journal::default();
    let mut summary = ReplaySummary::default();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<JournalRow>().enumerate() {
        let row = match result {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e),
            Err(e) => {
                warn!(line = line + 2, error = %e, "skipping malformed row");
                summary.skipped += 1;
                continue;
            }
        };

        let op = row.op.clone();
        match journal.apply(engine, identity, row) {
            Ok(()) => {
                debug!(line = line + 2, op, "row applied");
                summary.applied += 1;
            }
            Err(e) => {
                warn!(line = line + 2, op, error = %e, "skipping rejected row");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// Writes the month ledger of every batch.
///
/// Columns: `bull_id, name, semen_type, previous_stock, added_this_month,
/// used_this_month, discarded_this_month, closing_balance`
pub fn write_stock_report<W: Write>(
    engine: &Engine,
    identity: &Identity,
    window: MonthWindow,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for balance in engine.stock_report(identity, window) {
        wtr.serialize(&balance)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the month ledger of every receipt book.
pub fn write_receipt_report<W: Write>(
    engine: &Engine,
    identity: &Identity,
    window: MonthWindow,
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for balance in engine.receipt_report(identity, window) {
        wtr.serialize(&balance)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use breeding_ledger_rs::BreedingStatus;
    use std::io::Cursor;

    const HEADER: &str =
        "op,date,key,semen_type,tag,bull,quantity,start,end,jati,breed,village,detail\n";

    fn replay(rows: &str) -> (Engine, Identity, ReplaySummary) {
        let engine = Engine::new();
        let identity = Identity::user("vet", "Vet");
        let input = format!("{HEADER}{rows}");
        let summary = process_journal(Cursor::new(input), &engine, &identity).unwrap();
        (engine, identity, summary)
    }

    #[test]
    fn replay_book_batch_and_entry() {
        let (engine, identity, summary) = replay(
            "book,2024-01-01,B1,Conventional,,,,101,200,,,,\n\
             receive,2024-01-10,HF1,Conventional,,,50,,,Cow,HF,,HF 1042\n\
             ai,2024-01-15,E1,Conventional,12345678,HF1,,,,Cow,HF,Khed,\n",
        );

        assert_eq!(summary, ReplaySummary { applied: 3, skipped: 0 });
        assert_eq!(engine.next_number(&identity, SemenType::Conventional), Some(102));
        let records = engine.records(&identity);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].bull_name, "HF 1042");
    }

    #[test]
    fn pd_row_updates_entry() {
        let (engine, identity, _) = replay(
            "book,2024-01-01,B1,Conventional,,,,101,200,,,,\n\
             receive,2024-01-10,HF1,Conventional,,,50,,,Cow,HF,,\n\
             ai,2024-01-15,E1,Conventional,12345678,HF1,,,,Cow,HF,Khed,\n\
             pd,2024-03-01,E1,,,,,,,,,,positive\n",
        );

        assert_eq!(engine.records(&identity)[0].status, BreedingStatus::PregnantConfirmed);
    }

    #[test]
    fn rejected_and_malformed_rows_are_skipped() {
        let (engine, identity, summary) = replay(
            "receive,2024-01-10,HF1,Conventional,,,50,,,Cow,HF,,\n\
             ai,2024-01-15,E1,Conventional,12345678,HF1,,,,Cow,HF,Khed,\n\
             discard,not-a-date,,,,HF1,5,,,,,,\n\
             explode,2024-01-20,,,,,,,,,,,\n\
             discard,2024-01-20,,,,HF1,5,,,,,,expired\n",
        );

        // the entry has no active book to take a receipt from
        assert_eq!(summary, ReplaySummary { applied: 2, skipped: 3 });
        assert!(engine.records(&identity).is_empty());
    }

    #[test]
    fn stock_report_csv() {
        let (engine, identity, _) = replay(
            "receive,2024-01-10,HF1,Conventional,,,100,,,Cow,HF,,HF 1042\n\
             discard,2024-01-20,,,,HF1,30,,,,,,expired\n",
        );

        let mut output = Vec::new();
        let january = MonthWindow::new(2024, 1).unwrap();
        write_stock_report(&engine, &identity, january, &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.starts_with(concat!(
            "bull_id,name,semen_type,previous_stock,added_this_month,",
            "used_this_month,discarded_this_month,closing_balance\n"
        )));
        assert!(text.contains(",HF 1042,Conventional,0,100,0,30,70\n"));
    }

    #[test]
    fn receipt_report_csv() {
        let (engine, identity, _) = replay(
            "book,2024-01-01,B1,Conventional,,,,101,150,,,,\n\
             receive,2024-01-10,HF1,Conventional,,,50,,,Cow,HF,,\n\
             ai,2024-01-15,E1,Conventional,12345678,HF1,,,,Cow,HF,Khed,\n",
        );

        let mut output = Vec::new();
        let january = MonthWindow::new(2024, 1).unwrap();
        write_receipt_report(&engine, &identity, january, &mut output).unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains(",Conventional,101,150,active,0,50,1,49,300\n"));
    }
}
