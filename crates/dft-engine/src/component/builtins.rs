//! Built-in components: CSV source, validator processor, CSV endpoint.
//!
//! Deliberately small file-based implementations. They exist so a project
//! works out of the box and the engine's contracts are exercisable without
//! external services; database-backed components plug in through the
//! registry.

use std::path::PathBuf;

use anyhow::{bail, Context};
use dft_types::time::parse_timestamp;
use dft_types::{DataPacket, Table};
use serde_json::Value;

use super::registry::ComponentRegistry;
use super::{ComponentSpec, Endpoint, Processor, Source, Vars};

pub(super) fn register(registry: &mut ComponentRegistry) {
    registry.register_source("csv", |spec| {
        Ok(Box::new(CsvSource {
            file_path: PathBuf::from(spec.require_str("file_path")?),
        }))
    });
    registry.register_processor("validator", |spec| {
        let required_columns = match spec.config.get("required_columns") {
            None => Vec::new(),
            Some(Value::Array(cols)) => cols
                .iter()
                .map(|c| {
                    c.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| anyhow::anyhow!("required_columns entries must be strings"))
                })
                .collect::<anyhow::Result<_>>()?,
            Some(_) => bail!("required_columns must be a list"),
        };
        let fail_on_empty = spec
            .config
            .get("fail_on_empty")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Box::new(ValidatorProcessor {
            required_columns,
            fail_on_empty,
        }))
    });
    registry.register_endpoint("csv", |spec| {
        Ok(Box::new(CsvEndpoint {
            file_path: PathBuf::from(spec.require_str("file_path")?),
            event_time_column: spec.get_str("event_time_column").map(str::to_string),
        }))
    });
}

// ---------------------------------------------------------------------------
// CSV source
// ---------------------------------------------------------------------------

struct CsvSource {
    file_path: PathBuf,
}

impl Source for CsvSource {
    fn extract(&mut self, _vars: &Vars) -> anyhow::Result<DataPacket> {
        let content = std::fs::read_to_string(&self.file_path)
            .with_context(|| format!("cannot read {}", self.file_path.display()))?;
        let table = parse_csv(&content)
            .with_context(|| format!("cannot parse {}", self.file_path.display()))?;
        let rows = table.num_rows().to_string();
        Ok(DataPacket::new(table)
            .with_metadata("source", format!("csv:{}", self.file_path.display()))
            .with_metadata("rows", rows))
    }

    fn test_connection(&self) -> bool {
        self.file_path.is_file()
    }
}

// ---------------------------------------------------------------------------
// Validator processor
// ---------------------------------------------------------------------------

struct ValidatorProcessor {
    required_columns: Vec<String>,
    fail_on_empty: bool,
}

impl Processor for ValidatorProcessor {
    fn process(&mut self, packet: DataPacket, _vars: &Vars) -> anyhow::Result<DataPacket> {
        for column in &self.required_columns {
            if packet.data.column_index(column).is_none() {
                bail!("required column '{column}' is missing");
            }
        }
        if self.fail_on_empty && packet.data.is_empty() {
            bail!("packet has no rows");
        }
        Ok(packet)
    }
}

// ---------------------------------------------------------------------------
// CSV endpoint
// ---------------------------------------------------------------------------

/// Writes packets to a CSV file. With `event_time_column` declared and
/// batch variables present, rows whose event time falls inside
/// `[batch_start, batch_end)` are deleted before this window's rows are
/// appended (window-replace). Otherwise the file is replaced wholesale.
struct CsvEndpoint {
    file_path: PathBuf,
    event_time_column: Option<String>,
}

impl Endpoint for CsvEndpoint {
    fn load(&mut self, packet: DataPacket, vars: &Vars) -> anyhow::Result<()> {
        let window = match (&self.event_time_column, vars.get("batch_start"), vars.get("batch_end"))
        {
            (Some(column), Some(start), Some(end)) => {
                let start = start
                    .as_str()
                    .and_then(parse_timestamp)
                    .context("batch_start is not a timestamp")?;
                let end = end
                    .as_str()
                    .and_then(parse_timestamp)
                    .context("batch_end is not a timestamp")?;
                Some((column.clone(), start, end))
            }
            _ => None,
        };

        let table = match window {
            Some((column, start, end)) => match self.read_existing()? {
                Some(existing) => {
                    let idx = existing.column_index(&column);
                    let mut merged = existing.filter_rows(|row| {
                        // Rows without a parseable event time are kept.
                        idx.and_then(|i| row[i].as_str())
                            .and_then(parse_timestamp)
                            .map_or(true, |ts| ts < start || ts >= end)
                    });
                    if merged.column_names() != packet.data.column_names() {
                        bail!(
                            "destination {} has columns {:?}, packet has {:?}",
                            self.file_path.display(),
                            merged.column_names(),
                            packet.data.column_names()
                        );
                    }
                    for row in packet.data.rows() {
                        merged
                            .push_row(row.clone())
                            .map_err(|e| anyhow::anyhow!(e))?;
                    }
                    merged
                }
                None => packet.data,
            },
            None => packet.data,
        };

        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.file_path, format_csv(&table))
            .with_context(|| format!("cannot write {}", self.file_path.display()))?;
        Ok(())
    }
}

impl CsvEndpoint {
    fn read_existing(&self) -> anyhow::Result<Option<Table>> {
        match std::fs::read_to_string(&self.file_path) {
            Ok(content) => Ok(Some(parse_csv(&content).with_context(|| {
                format!("cannot parse {}", self.file_path.display())
            })?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Minimal CSV codec
// ---------------------------------------------------------------------------

fn parse_csv(content: &str) -> anyhow::Result<Table> {
    let mut lines = content.lines().filter(|l| !l.is_empty());
    let header = match lines.next() {
        Some(header) => split_csv_line(header)?,
        None => return Ok(Table::default()),
    };
    let mut table = Table::new(header);
    for line in lines {
        let cells = split_csv_line(line)?
            .into_iter()
            .map(Value::from)
            .collect();
        table.push_row(cells).map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(table)
}

fn split_csv_line(line: &str) -> anyhow::Result<Vec<String>> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    current.push('"');
                }
                '"' => quoted = false,
                other => current.push(other),
            }
        } else {
            match c {
                '"' if current.is_empty() => quoted = true,
                ',' => cells.push(std::mem::take(&mut current)),
                other => current.push(other),
            }
        }
    }
    if quoted {
        bail!("unterminated quote in line: {line}");
    }
    cells.push(current);
    Ok(cells)
}

fn format_csv(table: &Table) -> String {
    let mut out = String::new();
    out.push_str(&format_csv_row(
        &table
            .column_names()
            .iter()
            .map(|c| Value::from(c.clone()))
            .collect::<Vec<_>>(),
    ));
    for row in table.rows() {
        out.push_str(&format_csv_row(row));
    }
    out
}

fn format_csv_row(cells: &[Value]) -> String {
    let mut line = cells
        .iter()
        .map(format_csv_cell)
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

fn format_csv_cell(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    if text.contains(',') || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}
