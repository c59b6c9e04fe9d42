//! Protocol building blocks: voltage-clamp schedules and explicit stimulus
//! trains, plus the [`CellModel`] wrappers that apply them.
//!
//! The wrappers stay pure. A clamped model holds the membrane potential at
//! whatever value the state carries, so the driver applies each clamp step by
//! writing the command voltage into the state at the step boundary. A
//! train-paced model adds pulses at onsets fixed when the wrapper is built.

use crate::drug::DrugBlock;
use crate::error::{ModelError, ModelResult};
use crate::layout::{DiagnosticSlot, StateSlot};
use crate::traits::{CellModel, Evaluation};

/// One constant-voltage step of a clamp schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoltageClampStep {
    pub duration_s: f64,
    /// Command voltage (V)
    pub voltage_v: f64,
}

/// A clamp schedule: consecutive steps starting at the beginning of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct VoltageClamp {
    steps: Vec<VoltageClampStep>,
    /// Cumulative end of each step, relative to the run start
    ends: Vec<f64>,
}

/// Stretch of a run spent at one command voltage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClampSegment {
    pub t_start: f64,
    pub t_end: f64,
    pub voltage_v: f64,
}

impl VoltageClamp {
    pub fn new(steps: Vec<VoltageClampStep>) -> ModelResult<Self> {
        if steps.is_empty() {
            return Err(ModelError::InvalidProtocol {
                what: "voltage clamp needs at least one step".to_string(),
            });
        }
        let mut ends = Vec::with_capacity(steps.len());
        let mut elapsed = 0.0;
        for (i, step) in steps.iter().enumerate() {
            if !step.duration_s.is_finite() || step.duration_s <= 0.0 {
                return Err(ModelError::InvalidParameter {
                    name: format!("steps[{i}].duration_s"),
                    value: step.duration_s,
                    reason: "must be finite and positive",
                });
            }
            if !step.voltage_v.is_finite() {
                return Err(ModelError::InvalidParameter {
                    name: format!("steps[{i}].voltage_v"),
                    value: step.voltage_v,
                    reason: "must be finite",
                });
            }
            elapsed += step.duration_s;
            ends.push(elapsed);
        }
        Ok(Self { steps, ends })
    }

    pub fn steps(&self) -> &[VoltageClampStep] {
        &self.steps
    }

    /// Total schedule length (s).
    pub fn duration(&self) -> f64 {
        self.ends.last().copied().unwrap_or(0.0)
    }

    /// Command voltage `elapsed` seconds into the run.
    ///
    /// Steps are half-open `[start, end)`; past the end the last step holds.
    pub fn voltage_at(&self, elapsed: f64) -> f64 {
        let i = self.ends.partition_point(|&end| end <= elapsed);
        self.steps[i.min(self.steps.len() - 1)].voltage_v
    }

    /// Split `[t0, t_end]` into per-step segments, the schedule starting at
    /// `t0`. The last step is stretched to reach `t_end`; steps starting at or
    /// after `t_end` are left out.
    pub fn segments(&self, t0: f64, t_end: f64) -> Vec<ClampSegment> {
        let mut segments = Vec::new();
        let mut start = t0;
        for (i, step) in self.steps.iter().enumerate() {
            if start >= t_end {
                break;
            }
            let last = i + 1 == self.steps.len();
            let end = if last {
                t_end
            } else {
                (t0 + self.ends[i]).min(t_end)
            };
            segments.push(ClampSegment {
                t_start: start,
                t_end: end,
                voltage_v: step.voltage_v,
            });
            start = end;
        }
        segments
    }
}

/// Rectangular pulses at explicit onset times.
///
/// A pulse is active on `(onset, onset + duration]`, so adding an onset at or
/// after the current time never changes the current at times already
/// integrated. Overlapping pulses do not add up.
#[derive(Clone, Debug, PartialEq)]
pub struct StimulusTrain {
    /// Pulse amplitude (A/F); depolarizing pulses are positive.
    pub amplitude_a_per_f: f64,
    pub duration_s: f64,
    onsets: Vec<f64>,
}

impl StimulusTrain {
    pub fn new(amplitude_a_per_f: f64, duration_s: f64) -> ModelResult<Self> {
        if !amplitude_a_per_f.is_finite() {
            return Err(ModelError::InvalidParameter {
                name: "amplitude_a_per_f".to_string(),
                value: amplitude_a_per_f,
                reason: "must be finite",
            });
        }
        if !duration_s.is_finite() || duration_s <= 0.0 {
            return Err(ModelError::InvalidParameter {
                name: "duration_s".to_string(),
                value: duration_s,
                reason: "must be finite and positive",
            });
        }
        Ok(Self {
            amplitude_a_per_f,
            duration_s,
            onsets: Vec::new(),
        })
    }

    pub fn onsets(&self) -> &[f64] {
        &self.onsets
    }

    /// Add a pulse, keeping onsets sorted.
    pub fn add_onset(&mut self, onset: f64) -> ModelResult<()> {
        if !onset.is_finite() {
            return Err(ModelError::InvalidParameter {
                name: "onset".to_string(),
                value: onset,
                reason: "must be finite",
            });
        }
        let at = self.onsets.partition_point(|&o| o <= onset);
        self.onsets.insert(at, onset);
        Ok(())
    }

    /// Stimulus current at time `t` (A/F).
    pub fn current_at(&self, t: f64) -> f64 {
        // Latest onset strictly before t.
        let n = self.onsets.partition_point(|&onset| onset < t);
        match n.checked_sub(1).map(|i| self.onsets[i]) {
            Some(onset) if t <= onset + self.duration_s => self.amplitude_a_per_f,
            _ => 0.0,
        }
    }
}

fn vm_index<M: CellModel + ?Sized>(model: &M) -> ModelResult<usize> {
    model
        .state_names()
        .iter()
        .position(|n| *n == StateSlot::Vm.name())
        .ok_or_else(|| ModelError::UnknownSlot {
            name: format!("{} in {}", StateSlot::Vm.name(), model.name()),
        })
}

/// `inner` with the membrane potential held at its state value.
///
/// The derivative of `Vm` is zeroed and everything else is evaluated at the
/// held voltage, so the diagnostic currents are the clamp currents.
pub struct VoltageClamped<'a, M: ?Sized> {
    inner: &'a M,
    vm_index: usize,
}

impl<'a, M: CellModel + ?Sized> VoltageClamped<'a, M> {
    pub fn new(inner: &'a M) -> ModelResult<Self> {
        Ok(Self {
            inner,
            vm_index: vm_index(inner)?,
        })
    }

    pub fn vm_index(&self) -> usize {
        self.vm_index
    }
}

impl<M: CellModel + ?Sized> CellModel for VoltageClamped<'_, M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn state_len(&self) -> usize {
        self.inner.state_len()
    }

    fn diagnostic_len(&self) -> usize {
        self.inner.diagnostic_len()
    }

    fn state_names(&self) -> &[&'static str] {
        self.inner.state_names()
    }

    fn diagnostic_names(&self) -> &[&'static str] {
        self.inner.diagnostic_names()
    }

    fn evaluate(&self, t: f64, y: &[f64], block: &DrugBlock) -> ModelResult<Evaluation> {
        let mut evaluation = self.inner.evaluate(t, y, block)?;
        if let Some(dvm) = evaluation.dydt.get_mut(self.vm_index) {
            *dvm = 0.0;
        }
        Ok(evaluation)
    }
}

/// `inner` with a [`StimulusTrain`] added to the membrane equation and to the
/// stimulus diagnostic slot, when the model has one.
pub struct TrainPaced<'a, M: ?Sized> {
    inner: &'a M,
    train: StimulusTrain,
    vm_index: usize,
    stim_index: Option<usize>,
}

impl<'a, M: CellModel + ?Sized> TrainPaced<'a, M> {
    pub fn new(inner: &'a M, train: StimulusTrain) -> ModelResult<Self> {
        let stim_index = inner
            .diagnostic_names()
            .iter()
            .position(|n| *n == DiagnosticSlot::Istim.name());
        Ok(Self {
            inner,
            train,
            vm_index: vm_index(inner)?,
            stim_index,
        })
    }

    pub fn train(&self) -> &StimulusTrain {
        &self.train
    }
}

impl<M: CellModel + ?Sized> CellModel for TrainPaced<'_, M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn state_len(&self) -> usize {
        self.inner.state_len()
    }

    fn diagnostic_len(&self) -> usize {
        self.inner.diagnostic_len()
    }

    fn state_names(&self) -> &[&'static str] {
        self.inner.state_names()
    }

    fn diagnostic_names(&self) -> &[&'static str] {
        self.inner.diagnostic_names()
    }

    fn evaluate(&self, t: f64, y: &[f64], block: &DrugBlock) -> ModelResult<Evaluation> {
        let mut evaluation = self.inner.evaluate(t, y, block)?;
        let i_stim = self.train.current_at(t);
        if i_stim != 0.0 {
            if let Some(dvm) = evaluation.dydt.get_mut(self.vm_index) {
                *dvm += i_stim;
            }
            if let Some(slot) = self.stim_index.and_then(|k| evaluation.diagnostics.get_mut(k)) {
                *slot += i_stim;
            }
        }
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paci2018::{Paci2018, StatePreset};

    fn schedule() -> VoltageClamp {
        VoltageClamp::new(vec![
            VoltageClampStep {
                duration_s: 0.1,
                voltage_v: -0.08,
            },
            VoltageClampStep {
                duration_s: 0.1,
                voltage_v: -0.12,
            },
            VoltageClampStep {
                duration_s: 0.5,
                voltage_v: -0.06,
            },
        ])
        .unwrap()
    }

    #[test]
    fn clamp_voltage_follows_the_steps() {
        let clamp = schedule();
        assert!((clamp.duration() - 0.7).abs() < 1e-12);
        assert_eq!(clamp.voltage_at(0.0), -0.08);
        assert_eq!(clamp.voltage_at(0.05), -0.08);
        assert_eq!(clamp.voltage_at(0.15), -0.12);
        assert_eq!(clamp.voltage_at(0.69), -0.06);
        assert_eq!(clamp.voltage_at(5.0), -0.06);
    }

    #[test]
    fn segments_cover_the_interval() {
        let clamp = schedule();
        let segments = clamp.segments(1.0, 1.15);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].t_start, 1.0);
        assert!((segments[0].t_end - 1.1).abs() < 1e-12);
        assert_eq!(segments[1].t_end, 1.15);
        assert_eq!(segments[1].voltage_v, -0.12);

        let stretched = clamp.segments(0.0, 2.0);
        assert_eq!(stretched.len(), 3);
        assert_eq!(stretched[2].t_end, 2.0);
        for w in stretched.windows(2) {
            assert_eq!(w[0].t_end, w[1].t_start);
        }
    }

    #[test]
    fn rejects_bad_schedules() {
        assert!(VoltageClamp::new(vec![]).is_err());
        let bad = VoltageClampStep {
            duration_s: 0.0,
            voltage_v: -0.08,
        };
        assert!(matches!(
            VoltageClamp::new(vec![bad]),
            Err(ModelError::InvalidParameter { name, .. }) if name == "steps[0].duration_s"
        ));
    }

    #[test]
    fn train_pulses_open_after_onset() {
        let mut train = StimulusTrain::new(5.5, 0.005).unwrap();
        train.add_onset(0.6).unwrap();
        train.add_onset(0.2).unwrap();
        assert_eq!(train.onsets(), &[0.2, 0.6]);
        assert_eq!(train.current_at(0.2), 0.0);
        assert_eq!(train.current_at(0.203), 5.5);
        assert_eq!(train.current_at(0.205), 5.5);
        assert_eq!(train.current_at(0.21), 0.0);
        assert_eq!(train.current_at(0.601), 5.5);
        assert!(train.add_onset(f64::NAN).is_err());
    }

    #[test]
    fn clamped_paci_holds_vm_and_reports_currents() {
        let model = Paci2018::default();
        let clamped = VoltageClamped::new(&model).unwrap();
        let mut y = StatePreset::Paci2018.values();
        y[StateSlot::Vm.index()] = 0.02;
        let free = model.evaluate(0.0, &y, &DrugBlock::none()).unwrap();
        let held = clamped.evaluate(0.0, &y, &DrugBlock::none()).unwrap();
        assert_eq!(held.dydt[StateSlot::Vm.index()], 0.0);
        assert_eq!(held.diagnostics, free.diagnostics);
        assert_eq!(held.dydt[1..], free.dydt[1..]);
    }

    #[test]
    fn train_paced_paci_adds_stimulus() {
        let model = Paci2018::default();
        let mut train = StimulusTrain::new(5.0, 0.005).unwrap();
        train.add_onset(0.0).unwrap();
        let paced = TrainPaced::new(&model, train).unwrap();
        let y = StatePreset::Paci2018.values();
        let free = model.evaluate(0.001, &y, &DrugBlock::none()).unwrap();
        let stim = paced.evaluate(0.001, &y, &DrugBlock::none()).unwrap();
        let vm = StateSlot::Vm.index();
        assert!((stim.dydt[vm] - free.dydt[vm] - 5.0).abs() < 1e-12);
        assert_eq!(stim.diagnostics[DiagnosticSlot::Istim.index()], 5.0);
        let later = paced.evaluate(0.01, &y, &DrugBlock::none()).unwrap();
        assert_eq!(later, model.evaluate(0.01, &y, &DrugBlock::none()).unwrap());
    }
}
