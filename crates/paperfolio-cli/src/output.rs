use std::io::{self, Write};

use paperfolio_core::Envelope;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(
    envelope: &Envelope<Value>,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_envelope(&mut out, envelope, format, pretty)?;
    out.flush()?;
    Ok(())
}

fn write_envelope<W: Write>(
    out: &mut W,
    envelope: &Envelope<Value>,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json if pretty => {
            writeln!(out, "{}", serde_json::to_string_pretty(envelope)?)?;
        }
        OutputFormat::Json | OutputFormat::Ndjson => {
            writeln!(out, "{}", serde_json::to_string(envelope)?)?;
        }
        OutputFormat::Table => write_table(out, envelope)?,
    }
    Ok(())
}

fn write_table<W: Write>(out: &mut W, envelope: &Envelope<Value>) -> Result<(), CliError> {
    writeln!(out, "request_id  : {}", envelope.meta.request_id)?;
    writeln!(out, "generated_at: {}", envelope.meta.generated_at)?;
    writeln!(
        out,
        "sources     : {}",
        envelope
            .meta
            .source_chain
            .iter()
            .map(|source| source.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    )?;
    if let Some(lineage) = &envelope.meta.lineage {
        let provenance = lineage.provenance.map_or("caller", |provider| provider.as_str());
        let marker = if lineage.provisional { " (provisional)" } else { "" };
        writeln!(
            out,
            "lineage     : {provenance}, {} confidence{marker}",
            lineage.confidence.as_str()
        )?;
    }
    writeln!(out, "latency_ms  : {}", envelope.meta.latency_ms)?;
    writeln!(out, "cache_hit   : {}", envelope.meta.cache_hit)?;

    if !envelope.meta.warnings.is_empty() {
        writeln!(out, "warnings:")?;
        for warning in &envelope.meta.warnings {
            writeln!(out, "  - {warning}")?;
        }
    }

    writeln!(out, "data:")?;
    match &envelope.data {
        Value::Object(fields) => {
            let width = fields.keys().map(String::len).max().unwrap_or(0);
            for (key, value) in fields {
                writeln!(out, "  {key:<width$} : {}", scalar(value))?;
            }
        }
        other => {
            for line in serde_json::to_string_pretty(other)?.lines() {
                writeln!(out, "  {line}")?;
            }
        }
    }

    if !envelope.errors.is_empty() {
        writeln!(out, "errors:")?;
        for error in &envelope.errors {
            match error.source {
                Some(source) => writeln!(out, "  - [{source}] {}: {}", error.code, error.message)?,
                None => writeln!(out, "  - {}: {}", error.code, error.message)?,
            }
        }
    }

    Ok(())
}

/// Nested values are shown as compact JSON on one line.
fn scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::from("-"),
        other => other.to_string(),
    }
}
