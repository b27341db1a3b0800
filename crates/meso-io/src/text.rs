//! Tab-delimited spike and position records.
//!
//! Layout shared by the raw inputs and the converted per-population files:
//!
//! ```text
//! # nodeid	time_ms
//! 17	0.300
//! ```
//!
//! Positions use the columns `nodeid`, `x-position_mm`, `y-position_mm`.
//! Lines starting with `#` and blank lines are ignored when reading.

use meso_core::{AnalysisError, AsciiFormat, PositionRecord, Result, SpikeRecord, Time};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const SPIKE_COLUMNS: [&str; 2] = ["nodeid", "time_ms"];
pub const POSITION_COLUMNS: [&str; 3] = ["nodeid", "x-position_mm", "y-position_mm"];

/// `spike_recorder_<X>.dat`
pub fn spikes_file_name(population: &str) -> String {
    format!("spike_recorder_{population}.dat")
}

/// `positions_<X>.dat`
pub fn positions_file_name(population: &str) -> String {
    format!("positions_{population}.dat")
}

fn parse_error(path: &Path, lineno: usize, msg: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::ParseError(format!("{}:{}: {msg}", path.display(), lineno + 1))
}

/// Split data lines into exactly `n_cols` fields.
fn read_rows(path: &Path, n_cols: usize) -> Result<Vec<(usize, Vec<String>)>> {
    let text = std::fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if fields.len() != n_cols {
            return Err(parse_error(
                path,
                lineno,
                format!("expected {n_cols} columns, got {}", fields.len()),
            ));
        }
        rows.push((lineno, fields));
    }
    Ok(rows)
}

fn field<T>(path: &Path, lineno: usize, s: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    s.parse::<T>()
        .map_err(|e| parse_error(path, lineno, format!("'{s}': {e}")))
}

/// `(raw_id, time_ms)` rows as written by the simulator.
pub fn read_raw_spikes(path: &Path) -> Result<Vec<(u64, Time)>> {
    read_rows(path, SPIKE_COLUMNS.len())?
        .iter()
        .map(|(l, f)| Ok((field(path, *l, &f[0])?, field(path, *l, &f[1])?)))
        .collect::<Result<Vec<_>>>()
}

/// `(raw_id, x, y)` rows as written by the simulator.
pub fn read_raw_positions(path: &Path) -> Result<Vec<(u64, f64, f64)>> {
    read_rows(path, POSITION_COLUMNS.len())?
        .iter()
        .map(|(l, f)| {
            Ok((
                field(path, *l, &f[0])?,
                field(path, *l, &f[1])?,
                field(path, *l, &f[2])?,
            ))
        })
        .collect::<Result<Vec<_>>>()
}

/// Spike record with population-local ids.
pub fn read_spikes(path: &Path) -> Result<SpikeRecord> {
    let mut record = SpikeRecord::new();
    for (l, f) in read_rows(path, SPIKE_COLUMNS.len())? {
        record.record(field(path, l, &f[0])?, field(path, l, &f[1])?);
    }
    Ok(record)
}

/// Position record with population-local ids.
pub fn read_positions(path: &Path) -> Result<PositionRecord> {
    let rows = read_rows(path, POSITION_COLUMNS.len())?
        .iter()
        .map(|(l, f)| {
            Ok((
                field(path, *l, &f[0])?,
                field(path, *l, &f[1])?,
                field(path, *l, &f[2])?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    PositionRecord::from_rows(rows)
}

/// Write spikes sorted by `format.sortby`; returns the number of rows.
pub fn write_spikes(path: &Path, spikes: &SpikeRecord, format: &AsciiFormat) -> Result<usize> {
    let mut sorted = spikes.clone();
    sorted.sort_by_key(format.sortby);

    let mut f = BufWriter::new(File::create(path)?);
    writeln!(f, "# {}", SPIKE_COLUMNS.join("\t"))?;
    let prec = format.decimals;
    for ev in &sorted.events {
        writeln!(f, "{}\t{:.prec$}", ev.node_id, ev.time_ms)?;
    }
    f.flush()?;
    Ok(sorted.len())
}

/// Write positions in id order; returns the number of rows.
pub fn write_positions(
    path: &Path,
    positions: &PositionRecord,
    format: &AsciiFormat,
) -> Result<usize> {
    let mut f = BufWriter::new(File::create(path)?);
    writeln!(f, "# {}", POSITION_COLUMNS.join("\t"))?;
    let prec = format.decimals;
    for (id, x, y) in positions.rows() {
        writeln!(f, "{id}\t{x:.prec$}\t{y:.prec$}")?;
    }
    f.flush()?;
    Ok(positions.len())
}
