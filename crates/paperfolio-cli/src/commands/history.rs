use std::path::Path;

use csv::{ReaderBuilder, Trim};
use paperfolio_core::adapters::price_record;
use paperfolio_core::{CalendarDate, PriceRecord, ProviderId, Symbol, Warehouse};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::cli::{HistoryArgs, HistoryCommand, HistoryImportArgs};
use crate::error::CliError;

use super::{parse_symbol, CommandResult};

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    price: f64,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ImportResponseData {
    symbol: String,
    source: String,
    request_id: String,
    rows_written: usize,
    first_date: Option<String>,
    last_date: Option<String>,
}

#[derive(Debug, Serialize)]
struct CoverageResponseData {
    symbols: Vec<paperfolio_core::SymbolCoverage>,
}

pub fn run(args: &HistoryArgs) -> Result<CommandResult, CliError> {
    let warehouse = Warehouse::open_default()?;
    match &args.command {
        HistoryCommand::Import(import_args) => import(import_args, &warehouse),
        HistoryCommand::Coverage => coverage(&warehouse),
    }
}

fn import(args: &HistoryImportArgs, warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let symbol = parse_symbol(&args.symbol)?;
    let records = read_rows(&symbol, &args.file)?;
    let request_id = format!("import:{}", Uuid::new_v4());
    let rows_written = warehouse.upsert_daily_prices(&args.source, &request_id, &records)?;
    info!(symbol = %symbol, rows_written, source = %args.source, "history imported");

    let data = serde_json::to_value(ImportResponseData {
        symbol: symbol.as_str().to_owned(),
        source: args.source.clone(),
        request_id,
        rows_written,
        first_date: records.iter().map(|record| record.date.clone()).min(),
        last_date: records.iter().map(|record| record.date.clone()).max(),
    })?;

    let result = CommandResult::ok(data, vec![ProviderId::Warehouse]);
    if rows_written == 0 {
        return Ok(result.with_warning(format!("{} contained no rows", args.file.display())));
    }
    Ok(result)
}

fn coverage(warehouse: &Warehouse) -> Result<CommandResult, CliError> {
    let symbols = warehouse.coverage()?;
    let data = serde_json::to_value(CoverageResponseData { symbols })?;
    Ok(CommandResult::ok(data, vec![ProviderId::Warehouse]))
}

/// `date,price[,volume]` with a header row; any invalid row rejects the file.
fn read_rows(symbol: &Symbol, path: &Path) -> Result<Vec<PriceRecord>, CliError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?;

    let mut records = Vec::new();
    for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
        // Line numbers as shown in an editor; the header is line 1.
        let line = index + 2;
        let row = row?;
        let date = CalendarDate::parse(&row.date)
            .map_err(|error| CliError::Command(format!("line {line}: {error}")))?;
        let record = price_record(symbol, date, row.price, row.volume.unwrap_or(0.0))
            .map_err(|error| CliError::Command(format!("line {line}: {error}")))?;
        records.push(record);
    }
    Ok(records)
}
