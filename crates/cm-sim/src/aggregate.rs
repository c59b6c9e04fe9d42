//! Total membrane current and potential slew rate.

use crate::error::{SimError, SimResult};
use cm_model::DiagnosticSlot;
use std::collections::HashSet;

/// Named subset of diagnostic slots summed into the total current.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentSelection {
    names: Vec<String>,
}

impl Default for CurrentSelection {
    fn default() -> Self {
        Self::physical_currents()
    }
}

impl CurrentSelection {
    /// Every diagnostic slot except the reversal potentials, in slot order.
    pub fn physical_currents() -> Self {
        Self {
            names: DiagnosticSlot::ALL
                .iter()
                .filter(|slot| !slot.is_reversal_potential())
                .map(|slot| slot.name().to_string())
                .collect(),
        }
    }

    /// Explicit selection. Names must be distinct.
    pub fn from_names<I, S>(names: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(SimError::InvalidConfig {
                    what: format!("current {name} selected more than once"),
                });
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Slot indices of the selection within `available`.
    pub fn resolve(&self, available: &[&str]) -> SimResult<Vec<usize>> {
        self.names
            .iter()
            .map(|name| {
                available
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| SimError::Aggregation {
                        what: format!("unknown current {name}"),
                    })
            })
            .collect()
    }
}

/// Per-sample aggregated outputs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AggregatedSeries {
    /// Total membrane current
    pub i_tot: Vec<f64>,
    /// Backward-difference `dVm/dt`, zero at the first sample
    pub dvm_dt: Vec<f64>,
}

/// Pointwise sum of the `selected` diagnostic columns.
///
/// Plain left-to-right addition in selection order for each sample.
pub fn total_current(diagnostics: &[Vec<f64>], selected: &[usize]) -> SimResult<Vec<f64>> {
    let samples = diagnostics.first().map_or(0, Vec::len);
    let mut columns = Vec::with_capacity(selected.len());
    for &index in selected {
        let column = diagnostics.get(index).ok_or_else(|| SimError::Aggregation {
            what: format!("diagnostic slot {index} out of range"),
        })?;
        if column.len() != samples {
            return Err(SimError::Aggregation {
                what: format!(
                    "diagnostic slot {index} has {} samples, expected {samples}",
                    column.len()
                ),
            });
        }
        columns.push(column);
    }

    Ok((0..samples)
        .map(|i| columns.iter().fold(0.0, |acc, column| acc + column[i]))
        .collect())
}

/// `dVm/dt[i] = (Vm[i] - Vm[i-1]) / (t[i] - t[i-1])`, with `dVm/dt[0] = 0`.
pub fn slew_rate(t: &[f64], vm: &[f64]) -> SimResult<Vec<f64>> {
    if t.len() != vm.len() {
        return Err(SimError::Aggregation {
            what: format!("{} times but {} potentials", t.len(), vm.len()),
        });
    }
    let mut out = Vec::with_capacity(t.len());
    if t.is_empty() {
        return Ok(out);
    }
    out.push(0.0);
    for i in 1..t.len() {
        let dt = t[i] - t[i - 1];
        if dt <= 0.0 {
            return Err(SimError::Aggregation {
                what: format!("time not strictly increasing at sample {i}"),
            });
        }
        out.push((vm[i] - vm[i - 1]) / dt);
    }
    Ok(out)
}

/// Total current over `selection` plus the slew rate of `vm`.
pub fn aggregate(
    t: &[f64],
    vm: &[f64],
    diagnostic_names: &[&str],
    diagnostics: &[Vec<f64>],
    selection: &CurrentSelection,
) -> SimResult<AggregatedSeries> {
    let selected = selection.resolve(diagnostic_names)?;
    let i_tot = total_current(diagnostics, &selected)?;
    if !diagnostics.is_empty() && i_tot.len() != t.len() {
        return Err(SimError::Aggregation {
            what: format!("{} current samples for {} times", i_tot.len(), t.len()),
        });
    }
    let dvm_dt = slew_rate(t, vm)?;
    Ok(AggregatedSeries { i_tot, dvm_dt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimStage;
    use cm_model::{DIAGNOSTIC_LEN, DiagnosticSlot};
    use proptest::prelude::*;

    fn columns(samples: usize) -> Vec<Vec<f64>> {
        (0..DIAGNOSTIC_LEN)
            .map(|k| (0..samples).map(|i| (k + 1) as f64 * 0.5 + i as f64).collect())
            .collect()
    }

    #[test]
    fn default_selection_excludes_reversal_potentials() {
        let selection = CurrentSelection::default();
        assert_eq!(selection.len(), 17);
        assert!(!selection.names().iter().any(|n| n == "E_K" || n == "E_Na"));
        assert!(selection.names().iter().any(|n| n == "i_NaL"));
        assert!(selection.names().iter().any(|n| n == "i_stim"));
    }

    #[test]
    fn reversal_potentials_do_not_enter_the_sum() {
        let mut diag = columns(3);
        let names = DiagnosticSlot::NAMES;
        let selection = CurrentSelection::default();
        let idx = selection.resolve(&names).unwrap();
        let before = total_current(&diag, &idx).unwrap();

        diag[DiagnosticSlot::EK.index()] = vec![1e6; 3];
        diag[DiagnosticSlot::ENa.index()] = vec![-1e6; 3];
        let after = total_current(&diag, &idx).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn changing_the_selection_changes_the_sum() {
        let diag = columns(2);
        let names = DiagnosticSlot::NAMES;
        let all = CurrentSelection::default().resolve(&names).unwrap();
        let without_na = CurrentSelection::from_names(
            CurrentSelection::default()
                .names()
                .iter()
                .filter(|n| n.as_str() != "i_Na")
                .cloned(),
        )
        .unwrap()
        .resolve(&names)
        .unwrap();
        let a = total_current(&diag, &all).unwrap();
        let b = total_current(&diag, &without_na).unwrap();
        for i in 0..2 {
            assert_eq!(a[i] - b[i], diag[DiagnosticSlot::INa.index()][i]);
        }
    }

    #[test]
    fn unknown_and_duplicate_names_are_rejected() {
        let err = CurrentSelection::from_names(["i_Na", "i_Foo"])
            .unwrap()
            .resolve(&DiagnosticSlot::NAMES)
            .unwrap_err();
        assert_eq!(err.stage(), SimStage::Aggregation);
        assert!(CurrentSelection::from_names(["i_Na", "i_Na"]).is_err());
    }

    #[test]
    fn slew_rate_backward_difference() {
        let t = [0.0, 0.5, 1.5];
        let vm = [1.0, 2.0, 0.0];
        let s = slew_rate(&t, &vm).unwrap();
        assert_eq!(s, vec![0.0, 2.0, -2.0]);
    }

    #[test]
    fn slew_rate_rejects_non_increasing_time() {
        let err = slew_rate(&[0.0, 0.0], &[1.0, 2.0]).unwrap_err();
        assert_eq!(err.stage(), SimStage::Aggregation);
        assert!(slew_rate(&[0.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn empty_trajectory_gives_empty_series() {
        let diag: Vec<Vec<f64>> = vec![Vec::new(); DIAGNOSTIC_LEN];
        let series = aggregate(
            &[],
            &[],
            &DiagnosticSlot::NAMES,
            &diag,
            &CurrentSelection::default(),
        )
        .unwrap();
        assert!(series.i_tot.is_empty());
        assert!(series.dvm_dt.is_empty());
    }

    proptest! {
        #[test]
        fn total_is_pointwise_sum_of_selected_slots(
            rows in prop::collection::vec(
                prop::collection::vec(-100.0f64..100.0, DIAGNOSTIC_LEN),
                1..20,
            )
        ) {
            let samples = rows.len();
            let diag: Vec<Vec<f64>> = (0..DIAGNOSTIC_LEN)
                .map(|k| rows.iter().map(|r| r[k]).collect())
                .collect();
            let selection = CurrentSelection::default();
            let idx = selection.resolve(&DiagnosticSlot::NAMES).unwrap();
            let total = total_current(&diag, &idx).unwrap();
            prop_assert_eq!(total.len(), samples);
            for (i, row) in rows.iter().enumerate() {
                let mut expected = 0.0;
                for slot in DiagnosticSlot::ALL {
                    if !slot.is_reversal_potential() {
                        expected += row[slot.index()];
                    }
                }
                prop_assert_eq!(total[i], expected);
            }
        }

        #[test]
        fn slew_rate_has_trajectory_length_and_zero_start(
            steps in prop::collection::vec((1e-6f64..1e-2, -0.1f64..0.1), 0..50),
            v0 in -0.09f64..0.04,
        ) {
            let mut t = vec![0.0];
            let mut vm = vec![v0];
            for (dt, dv) in &steps {
                t.push(t[t.len() - 1] + dt);
                vm.push(vm[vm.len() - 1] + dv);
            }
            let s = slew_rate(&t, &vm).unwrap();
            prop_assert_eq!(s.len(), t.len());
            prop_assert_eq!(s[0], 0.0);
        }
    }
}
