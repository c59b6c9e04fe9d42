//! Reference trajectories produced by an independent implementation, and
//! comparison of a simulated membrane potential against them.
//!
//! A reference is two headerless numeric tables: the state matrix and the
//! sample-time vector. Fields are separated by commas, tabs or runs of spaces.
//! The state matrix may hold one sample per row or one sample per column; the
//! orientation is taken from the length of the time vector.

use crate::{ResultsError, ResultsResult};
use std::path::Path;

/// Parse a headerless numeric table.
pub fn parse_table(content: &str, source: &str) -> ResultsResult<Vec<Vec<f64>>> {
    let delimiter = if content.contains(',') {
        b','
    } else if content.contains('\t') {
        b'\t'
    } else {
        b' '
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let mut row = Vec::with_capacity(record.len());
        for field in record.iter().filter(|f| !f.is_empty()) {
            let value: f64 = field.parse().map_err(|_| ResultsError::Parse {
                source_name: source.to_string(),
                line: line + 1,
                field: field.to_string(),
            })?;
            row.push(value);
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

pub fn read_table(path: &Path) -> ResultsResult<Vec<Vec<f64>>> {
    let content = std::fs::read_to_string(path)?;
    parse_table(&content, &path.display().to_string())
}

/// Reference samples: `states[i]` is the state at `times[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTrace {
    pub times: Vec<f64>,
    pub states: Vec<Vec<f64>>,
}

impl ReferenceTrace {
    pub fn load(states_path: &Path, times_path: &Path) -> ResultsResult<Self> {
        Self::from_tables(read_table(states_path)?, read_table(times_path)?)
    }

    /// Build from parsed tables. The time table is read as a flat vector.
    pub fn from_tables(states: Vec<Vec<f64>>, times: Vec<Vec<f64>>) -> ResultsResult<Self> {
        let times: Vec<f64> = times.into_iter().flatten().collect();
        if times.is_empty() {
            return Err(ResultsError::Reference {
                what: "time vector is empty".to_string(),
            });
        }
        if times.windows(2).any(|w| w[1] <= w[0]) || times.iter().any(|t| !t.is_finite()) {
            return Err(ResultsError::Reference {
                what: "reference times must be finite and strictly increasing".to_string(),
            });
        }

        let n = times.len();
        let states = if states.len() == n && states.iter().all(|r| r.len() == states[0].len()) {
            states
        } else if !states.is_empty() && states.iter().all(|r| r.len() == n) {
            (0..n)
                .map(|i| states.iter().map(|row| row[i]).collect())
                .collect()
        } else {
            return Err(ResultsError::Reference {
                what: format!(
                    "state table ({} rows) does not match {n} reference times",
                    states.len()
                ),
            });
        };

        Ok(Self { times, states })
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn state_len(&self) -> usize {
        self.states.first().map_or(0, Vec::len)
    }

    /// Series of one state slot.
    pub fn component(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.state_len() {
            return None;
        }
        Some(self.states.iter().map(|s| s[index]).collect())
    }
}

/// Linear interpolation of `(ts, vs)` at `t`; `None` outside `[ts[0], ts[n-1]]`.
pub fn interpolate(ts: &[f64], vs: &[f64], t: f64) -> Option<f64> {
    let (first, last) = (*ts.first()?, *ts.last()?);
    if t < first || t > last {
        return None;
    }
    let hi = ts.partition_point(|x| *x < t);
    if hi == 0 {
        return vs.first().copied();
    }
    let lo = hi - 1;
    if ts[hi] == t {
        return vs.get(hi).copied();
    }
    let w = (t - ts[lo]) / (ts[hi] - ts[lo]);
    Some(vs[lo] + w * (vs[hi] - vs[lo]))
}

/// Deviation of a simulated membrane potential from a reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// Reference samples inside the simulated window
    pub compared: usize,
    /// Reference samples outside the simulated window
    pub skipped: usize,
    pub rmse: f64,
    pub max_abs: f64,
    /// Reference time of the largest deviation
    pub t_at_max: f64,
}

/// Compare simulated `Vm` against slot `vm_index` of the reference, at the
/// reference times.
pub fn compare_membrane_potential(
    sim_t: &[f64],
    sim_vm: &[f64],
    reference: &ReferenceTrace,
    vm_index: usize,
) -> ResultsResult<Comparison> {
    if sim_t.len() != sim_vm.len() {
        return Err(ResultsError::Reference {
            what: format!("{} times but {} potentials", sim_t.len(), sim_vm.len()),
        });
    }
    let ref_vm = reference
        .component(vm_index)
        .ok_or_else(|| ResultsError::Reference {
            what: format!("reference has no state slot {vm_index}"),
        })?;

    let mut compared = 0;
    let mut skipped = 0;
    let mut sum_sq = 0.0;
    let mut max_abs = 0.0;
    let mut t_at_max = f64::NAN;
    for (t, expected) in reference.times.iter().zip(&ref_vm) {
        match interpolate(sim_t, sim_vm, *t) {
            Some(v) => {
                let err = (v - expected).abs();
                sum_sq += err * err;
                if err > max_abs || compared == 0 {
                    max_abs = err;
                    t_at_max = *t;
                }
                compared += 1;
            }
            None => skipped += 1,
        }
    }

    if compared == 0 {
        return Err(ResultsError::Reference {
            what: "reference and simulation do not overlap in time".to_string(),
        });
    }

    Ok(Comparison {
        compared,
        skipped,
        rmse: (sum_sq / compared as f64).sqrt(),
        max_abs,
        t_at_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_and_whitespace_tables() {
        let comma = parse_table("1.0, 2.0\n3.0,4.0\n", "t").unwrap();
        assert_eq!(comma, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);

        let spaces = parse_table("  1.0   2.5e-3\n\n-3 4\n", "t").unwrap();
        assert_eq!(spaces, vec![vec![1.0, 2.5e-3], vec![-3.0, 4.0]]);
    }

    #[test]
    fn bad_number_names_line_and_field() {
        let err = parse_table("1.0,2.0\n3.0,abc\n", "states.csv").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("states.csv"));
        assert!(msg.contains("abc"));
        assert!(msg.contains('2'));
    }

    #[test]
    fn column_major_states_are_transposed() {
        // Two slots, three samples, one sample per column.
        let states = vec![vec![-0.07, -0.06, -0.05], vec![1.0, 2.0, 3.0]];
        let times = vec![vec![0.0, 0.5, 1.0]];
        let r = ReferenceTrace::from_tables(states, times).unwrap();
        assert_eq!(r.len(), 3);
        assert_eq!(r.state_len(), 2);
        assert_eq!(r.component(0).unwrap(), vec![-0.07, -0.06, -0.05]);
        assert_eq!(r.states[2], vec![-0.05, 3.0]);
    }

    #[test]
    fn mismatched_tables_are_rejected() {
        let states = vec![vec![1.0, 2.0]];
        let times = vec![vec![0.0], vec![1.0], vec![2.0]];
        assert!(ReferenceTrace::from_tables(states, times).is_err());
        assert!(ReferenceTrace::from_tables(vec![vec![1.0]], vec![vec![1.0, 0.5]]).is_err());
    }

    #[test]
    fn interpolation_inside_and_outside() {
        let ts = [0.0, 1.0, 3.0];
        let vs = [0.0, 2.0, 6.0];
        assert_eq!(interpolate(&ts, &vs, 0.5), Some(1.0));
        assert_eq!(interpolate(&ts, &vs, 1.0), Some(2.0));
        assert_eq!(interpolate(&ts, &vs, 2.0), Some(4.0));
        assert_eq!(interpolate(&ts, &vs, 0.0), Some(0.0));
        assert_eq!(interpolate(&ts, &vs, 3.5), None);
        assert_eq!(interpolate(&ts, &vs, -0.1), None);
    }

    #[test]
    fn comparison_against_identical_trace_is_zero() {
        let t = vec![0.0, 0.1, 0.2, 0.3];
        let vm = vec![-0.07, -0.05, 0.02, -0.06];
        let reference = ReferenceTrace {
            times: vec![0.0, 0.15, 0.3, 0.4],
            states: vec![vec![-0.07], vec![-0.015], vec![-0.06], vec![-0.06]],
        };
        let c = compare_membrane_potential(&t, &vm, &reference, 0).unwrap();
        assert_eq!(c.compared, 3);
        assert_eq!(c.skipped, 1);
        assert!(c.rmse < 1e-12);
        assert!(c.max_abs < 1e-12);
    }

    #[test]
    fn comparison_reports_largest_deviation() {
        let t = vec![0.0, 1.0];
        let vm = vec![0.0, 0.0];
        let reference = ReferenceTrace {
            times: vec![0.0, 0.5, 1.0],
            states: vec![vec![0.0], vec![0.3], vec![-0.4]],
        };
        let c = compare_membrane_potential(&t, &vm, &reference, 0).unwrap();
        assert_eq!(c.max_abs, 0.4);
        assert_eq!(c.t_at_max, 1.0);
        assert!((c.rmse - (0.25f64 / 3.0).sqrt()).abs() < 1e-12);
    }
}
