//! Compact description of a simulated trace.

use crate::aggregate::AggregatedSeries;

/// Headline numbers of one run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceSummary {
    pub samples: usize,
    pub t_start: f64,
    pub t_end: f64,
    pub vm_min: f64,
    pub vm_max: f64,
    /// Total current with the largest magnitude
    pub peak_i_tot: f64,
    /// Largest positive `dVm/dt` (V/s)
    pub max_upstroke: f64,
}

impl TraceSummary {
    /// Returns `None` for an empty trace.
    pub fn from_series(t: &[f64], vm: &[f64], series: &AggregatedSeries) -> Option<Self> {
        let (&t_start, &t_end) = (t.first()?, t.last()?);
        let vm_min = vm.iter().copied().fold(f64::INFINITY, f64::min);
        let vm_max = vm.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let peak_i_tot = series
            .i_tot
            .iter()
            .copied()
            .fold(0.0, |best: f64, v| if v.abs() > best.abs() { v } else { best });
        let max_upstroke = series.dvm_dt.iter().copied().fold(0.0, f64::max);

        Some(Self {
            samples: t.len(),
            t_start,
            t_end,
            vm_min,
            vm_max,
            peak_i_tot,
            max_upstroke,
        })
    }
}
