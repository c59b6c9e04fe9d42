//! CSV export of named series.

use crate::{ResultsError, ResultsResult};
use std::io::Write;
use std::path::Path;

/// Write equally long named columns as a CSV table with a header row.
pub fn write_series_csv<W: Write>(writer: W, columns: &[(String, Vec<f64>)]) -> ResultsResult<()> {
    let rows = columns.first().map_or(0, |(_, values)| values.len());
    if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != rows) {
        return Err(ResultsError::Export {
            what: format!("column {name} has {} values, expected {rows}", values.len()),
        });
    }

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(columns.iter().map(|(name, _)| name.as_str()))?;
    for i in 0..rows {
        wtr.write_record(columns.iter().map(|(_, values)| values[i].to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_series_csv(path: &Path, columns: &[(String, Vec<f64>)]) -> ResultsResult<()> {
    let file = std::fs::File::create(path)?;
    write_series_csv(file, columns)
}
