//! Run protocols: free running, voltage clamp and irregular pacing.
//!
//! Periodic pacing is a property of the model itself. The protocols here need
//! the driver: a clamp restarts the solver at every command step, and
//! irregular pacing schedules each stimulus from the action potential the
//! accepted samples have just shown, restarting once the onset is known.

use crate::error::{SimError, SimResult};
use crate::integrate::integrate_with_observer;
use cm_model::{
    CellModel, DrugBlock, StateSlot, StimulusTrain, TrainPaced, VoltageClamp, VoltageClamped,
};
use cm_solver::{BdfOptions, SolverError, StepControl, StepObserver, StepProgress, Trajectory};
use nalgebra::DVector;
use tracing::debug;

/// How a run drives the membrane.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Protocol {
    /// Free running; a periodic stimulus, if any, belongs to the model.
    #[default]
    Spontaneous,
    /// Membrane potential held on a step schedule starting at `t0`.
    VoltageClamp(VoltageClamp),
    /// Stimuli scheduled from detected action potentials.
    IrregularPacing(IrregularPacing),
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Spontaneous => "spontaneous",
            Protocol::VoltageClamp(_) => "voltage_clamp",
            Protocol::IrregularPacing(_) => "irregular_pacing",
        }
    }
}

/// Irregular pacing: after each detected APD90, the next offset is taken and
/// a stimulus pulse is scheduled that long after the APD90 time. Once the
/// offsets run out the cell runs free.
#[derive(Clone, Debug, PartialEq)]
pub struct IrregularPacing {
    /// Delay from each APD90 to the next stimulus onset (s), used in order
    pub offsets_s: Vec<f64>,
    /// Pulse amplitude (A/F)
    pub amplitude_a_per_f: f64,
    pub duration_s: f64,
    /// Typical diastolic voltage an action potential starts from (V)
    pub ap_start_voltage_v: f64,
    /// Local maxima of Vm above this count as action-potential peaks (V)
    pub peak_threshold_v: f64,
}

impl Default for IrregularPacing {
    fn default() -> Self {
        Self {
            offsets_s: Vec::new(),
            amplitude_a_per_f: 5.5,
            duration_s: 0.005,
            ap_start_voltage_v: -0.075,
            peak_threshold_v: 0.0,
        }
    }
}

impl IrregularPacing {
    pub fn validate(&self) -> SimResult<()> {
        if let Some(bad) = self.offsets_s.iter().find(|o| !o.is_finite() || **o < 0.0) {
            return Err(SimError::InvalidConfig {
                what: format!("stimulation offset {bad} must be finite and non-negative"),
            });
        }
        for (name, value) in [
            ("ap_start_voltage_v", self.ap_start_voltage_v),
            ("peak_threshold_v", self.peak_threshold_v),
        ] {
            if !value.is_finite() {
                return Err(SimError::InvalidConfig {
                    what: format!("{name} = {value} must be finite"),
                });
            }
        }
        StimulusTrain::new(self.amplitude_a_per_f, self.duration_s)?;
        Ok(())
    }
}

/// Action-potential landmarks of an irregularly paced run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PacingRecord {
    /// Times of detected peaks
    pub peaks: Vec<f64>,
    /// Times at which Vm fell back through the APD90 level
    pub apd90_ends: Vec<f64>,
    /// Scheduled stimulus onsets
    pub stimulations: Vec<f64>,
}

/// Peak and APD90 detection over accepted samples, fed in time order.
#[derive(Clone, Debug)]
pub struct ApDetector {
    ap_start_voltage: f64,
    peak_threshold: f64,
    prev: Option<(f64, f64)>,
    rising: bool,
    apd90_voltage: Option<f64>,
    record: PacingRecord,
}

impl ApDetector {
    pub fn new(pacing: &IrregularPacing) -> Self {
        Self {
            ap_start_voltage: pacing.ap_start_voltage_v,
            peak_threshold: pacing.peak_threshold_v,
            prev: None,
            rising: false,
            apd90_voltage: None,
            record: PacingRecord::default(),
        }
    }

    /// Feed the next accepted sample. Returns `t` when this sample completes
    /// the repolarization to 90% of the last peak's amplitude.
    pub fn observe(&mut self, t: f64, vm: f64) -> Option<f64> {
        if let Some((t_prev, vm_prev)) = self.prev {
            let rising = vm > vm_prev;
            if self.rising && !rising && vm_prev > self.peak_threshold {
                self.record.peaks.push(t_prev);
                let amplitude = (self.ap_start_voltage - vm_prev).abs();
                self.apd90_voltage = Some(vm_prev - 0.9 * amplitude);
            }
            self.rising = rising;
        }
        self.prev = Some((t, vm));

        let threshold = self.apd90_voltage?;
        if vm > threshold {
            return None;
        }
        self.apd90_voltage = None;
        self.record.apd90_ends.push(t);
        Some(t)
    }

    pub fn record(&self) -> &PacingRecord {
        &self.record
    }

    pub fn into_record(self) -> PacingRecord {
        self.record
    }
}

/// Joins segment trajectories, keeping step counters, progress and the step
/// budget continuous across solver restarts.
struct Stitcher {
    trajectory: Trajectory,
    t_end: f64,
    max_steps: usize,
}

impl Stitcher {
    fn new(t_end: f64, solver: &BdfOptions) -> Self {
        Self {
            trajectory: Trajectory::default(),
            t_end,
            max_steps: solver.max_steps,
        }
    }

    /// Solver settings for the next segment, starting at `t`.
    fn budget(&self, solver: &BdfOptions, t: f64) -> SimResult<BdfOptions> {
        let left = self.max_steps.saturating_sub(self.trajectory.stats.steps);
        if left == 0 {
            return Err(SimError::Integration {
                t_reached: t,
                source: SolverError::MaxStepsExceeded {
                    t,
                    max_steps: self.max_steps,
                },
            });
        }
        Ok(BdfOptions {
            max_steps: left,
            ..solver.clone()
        })
    }

    fn shift(&self, p: &StepProgress) -> StepProgress {
        StepProgress {
            t_end: self.t_end,
            step: p.step + self.trajectory.stats.steps,
            rejected_steps: p.rejected_steps + self.trajectory.stats.rejected_steps,
            ..*p
        }
    }

    fn push(&mut self, segment: Trajectory) {
        self.trajectory.extend_from(segment);
    }
}

fn last_state(trajectory: &Trajectory, fallback: &[f64]) -> Vec<f64> {
    trajectory
        .y
        .last()
        .map(|y| y.as_slice().to_vec())
        .unwrap_or_else(|| fallback.to_vec())
}

/// Integrate `model` under a clamp schedule.
///
/// Each command step is its own solver run on the clamped model, started from
/// the previous end state with `Vm` set to the command voltage. The sample at
/// a step boundary reports the outgoing step.
#[allow(clippy::too_many_arguments)]
pub fn integrate_voltage_clamp<M: CellModel + ?Sized>(
    model: &M,
    clamp: &VoltageClamp,
    y0: &[f64],
    t0: f64,
    t_end: f64,
    block: &DrugBlock,
    solver: &BdfOptions,
    mut progress: Option<&mut dyn FnMut(StepProgress)>,
) -> SimResult<Trajectory> {
    let clamped = VoltageClamped::new(model)?;
    let vm = clamped.vm_index();
    let mut stitched = Stitcher::new(t_end, solver);
    let mut state = y0.to_vec();

    for segment in clamp.segments(t0, t_end) {
        if let Some(v) = state.get_mut(vm) {
            *v = segment.voltage_v;
        }
        debug!(
            t_start = segment.t_start,
            t_end = segment.t_end,
            voltage = segment.voltage_v,
            "clamp step"
        );
        let budget = stitched.budget(solver, segment.t_start)?;
        let mut trajectory = {
            let mut forward = |p: &StepProgress, _y: &DVector<f64>| {
                if let Some(cb) = progress.as_deref_mut() {
                    cb(stitched.shift(p));
                }
                StepControl::Continue
            };
            let observer: StepObserver<'_> = &mut forward;
            integrate_with_observer(
                &clamped,
                &state,
                segment.t_start,
                segment.t_end,
                block,
                &budget,
                Some(observer),
            )?
        };
        // Vm has a zero derivative; pin it against round-off in the corrector.
        for y in trajectory.y.iter_mut() {
            y[vm] = segment.voltage_v;
        }
        state = last_state(&trajectory, &state);
        stitched.push(trajectory);
    }
    Ok(stitched.trajectory)
}

/// Result of an irregularly paced integration.
pub struct PacedRun {
    pub trajectory: Trajectory,
    /// Every pulse delivered, for replaying the run
    pub train: StimulusTrain,
    pub record: PacingRecord,
}

/// Integrate `model` under irregular pacing.
///
/// The solver runs until an accepted sample completes an APD90; the next
/// pulse is then added to the train and integration restarts from that
/// sample. Pulses only open after their onset, so samples already accepted
/// stay consistent with the final train.
#[allow(clippy::too_many_arguments)]
pub fn integrate_irregular_pacing<M: CellModel + ?Sized>(
    model: &M,
    pacing: &IrregularPacing,
    y0: &[f64],
    t0: f64,
    t_end: f64,
    block: &DrugBlock,
    solver: &BdfOptions,
    mut progress: Option<&mut dyn FnMut(StepProgress)>,
) -> SimResult<PacedRun> {
    pacing.validate()?;
    let vm = model
        .state_names()
        .iter()
        .position(|n| *n == StateSlot::Vm.name())
        .ok_or_else(|| SimError::InvalidConfig {
            what: format!("{} has no {} state slot", model.name(), StateSlot::Vm.name()),
        })?;
    let vm0 = y0.get(vm).copied().ok_or_else(|| SimError::InitialState {
        what: format!("{} expects a {} value", model.name(), StateSlot::Vm.name()),
    })?;

    let mut train = StimulusTrain::new(pacing.amplitude_a_per_f, pacing.duration_s)?;
    let mut detector = ApDetector::new(pacing);
    detector.observe(t0, vm0);
    let mut offsets = pacing.offsets_s.iter().copied();
    let mut pending = offsets.next();
    let mut stitched = Stitcher::new(t_end, solver);
    let mut t = t0;
    let mut state = y0.to_vec();

    while t < t_end {
        let paced = TrainPaced::new(model, train.clone())?;
        let budget = stitched.budget(solver, t)?;
        let mut apd90 = None;
        let trajectory = {
            let mut watch = |p: &StepProgress, y: &DVector<f64>| {
                if let Some(cb) = progress.as_deref_mut() {
                    cb(stitched.shift(p));
                }
                match detector.observe(p.t, y[vm]) {
                    Some(t_apd) if pending.is_some() => {
                        apd90 = Some(t_apd);
                        StepControl::Stop
                    }
                    _ => StepControl::Continue,
                }
            };
            let observer: StepObserver<'_> = &mut watch;
            integrate_with_observer(&paced, &state, t, t_end, block, &budget, Some(observer))?
        };
        t = trajectory.t_last().unwrap_or(t_end);
        state = last_state(&trajectory, &state);
        stitched.push(trajectory);

        if let (Some(t_apd), Some(offset)) = (apd90, pending) {
            let onset = t_apd + offset;
            debug!(t_apd, onset, "stimulus scheduled");
            train.add_onset(onset)?;
            detector.record.stimulations.push(onset);
            pending = offsets.next();
        }
    }

    Ok(PacedRun {
        trajectory: stitched.trajectory,
        train,
        record: detector.into_record(),
    })
}
