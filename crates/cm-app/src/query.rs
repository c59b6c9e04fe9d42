//! Query helpers for extracting data from loaded runs.

use cm_results::{Comparison, ReferenceTrace, RunManifest, SampleRecord};
use std::path::Path;

use crate::error::{AppError, AppResult};

/// Name of the time column.
pub const TIME_SERIES: &str = "t";
/// Name of the aggregated current series.
pub const TOTAL_CURRENT_SERIES: &str = "i_tot";
/// Name of the membrane potential slew rate series.
pub const SLEW_RATE_SERIES: &str = "dvm_dt";

/// Summary of a run's time range and data.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub time_range: (f64, f64),
    pub record_count: usize,
    pub state_count: usize,
    pub diagnostic_count: usize,
}

/// Get run summary from stored samples.
pub fn get_run_summary(records: &[SampleRecord]) -> AppResult<RunSummary> {
    let (Some(first), Some(last)) = (records.first(), records.last()) else {
        return Err(AppError::InvalidInput("No records in run".to_string()));
    };

    Ok(RunSummary {
        time_range: (first.time_s, last.time_s),
        record_count: records.len(),
        state_count: first.state.len(),
        diagnostic_count: first.diagnostics.len(),
    })
}

#[derive(Clone, Copy)]
enum Column {
    Time,
    TotalCurrent,
    SlewRate,
    State(usize),
    Diagnostic(usize),
}

/// Every series name a stored run can be queried for.
pub fn list_series_names(manifest: &RunManifest) -> Vec<String> {
    std::iter::once(TIME_SERIES.to_string())
        .chain(manifest.state_names.iter().cloned())
        .chain(manifest.diagnostic_names.iter().cloned())
        .chain([
            TOTAL_CURRENT_SERIES.to_string(),
            SLEW_RATE_SERIES.to_string(),
        ])
        .collect()
}

/// Extract one named series from a stored run.
pub fn extract_series(
    manifest: &RunManifest,
    records: &[SampleRecord],
    name: &str,
) -> AppResult<Vec<f64>> {
    let column = match name {
        TIME_SERIES => Column::Time,
        TOTAL_CURRENT_SERIES => Column::TotalCurrent,
        SLEW_RATE_SERIES => Column::SlewRate,
        _ => {
            if let Some(i) = manifest.state_names.iter().position(|n| n == name) {
                Column::State(i)
            } else if let Some(i) = manifest.diagnostic_names.iter().position(|n| n == name) {
                Column::Diagnostic(i)
            } else {
                return Err(AppError::InvalidInput(format!("Unknown series: {name}")));
            }
        }
    };

    let width_ok = records.iter().all(|r| {
        r.state.len() == manifest.state_names.len()
            && r.diagnostics.len() == manifest.diagnostic_names.len()
    });
    if !width_ok {
        return Err(AppError::Results(format!(
            "run {} has records that do not match its manifest",
            manifest.run_id
        )));
    }

    Ok(records
        .iter()
        .map(|r| match column {
            Column::Time => r.time_s,
            Column::TotalCurrent => r.i_tot,
            Column::SlewRate => r.dvm_dt,
            Column::State(i) => r.state[i],
            Column::Diagnostic(i) => r.diagnostics[i],
        })
        .collect())
}

/// Named columns for export, with time prepended unless requested.
pub fn series_columns(
    manifest: &RunManifest,
    records: &[SampleRecord],
    names: &[String],
) -> AppResult<Vec<(String, Vec<f64>)>> {
    let mut columns = Vec::with_capacity(names.len() + 1);
    if names.iter().all(|n| n != TIME_SERIES) {
        columns.push((
            TIME_SERIES.to_string(),
            extract_series(manifest, records, TIME_SERIES)?,
        ));
    }
    for name in names {
        columns.push((name.clone(), extract_series(manifest, records, name)?));
    }
    Ok(columns)
}

/// Write the named series of a stored run as a CSV file.
pub fn export_series(
    manifest: &RunManifest,
    records: &[SampleRecord],
    names: &[String],
    path: &Path,
) -> AppResult<()> {
    let columns = series_columns(manifest, records, names)?;
    Ok(cm_results::export_series_csv(path, &columns)?)
}

/// Compare the stored membrane potential against a reference trace.
pub fn compare_run(
    manifest: &RunManifest,
    records: &[SampleRecord],
    reference: &ReferenceTrace,
) -> AppResult<Comparison> {
    let vm_name = cm_model::StateSlot::Vm.name();
    let vm_index = manifest
        .state_names
        .iter()
        .position(|n| n == vm_name)
        .ok_or_else(|| AppError::InvalidInput(format!("run has no {vm_name} state")))?;
    let t = extract_series(manifest, records, TIME_SERIES)?;
    let vm = extract_series(manifest, records, vm_name)?;
    Ok(cm_results::compare_membrane_potential(
        &t, &vm, reference, vm_index,
    )?)
}
