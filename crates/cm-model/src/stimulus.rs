//! Periodic current-pulse stimulus.

use crate::error::{ModelError, ModelResult};

/// Rectangular current pulses repeated every `period_s` from `start_s`.
///
/// Like drug block, the pulse train is a pure function of `t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stimulus {
    /// Pulse amplitude (A/F); depolarizing pulses are positive.
    pub amplitude_a_per_f: f64,
    pub start_s: f64,
    pub period_s: f64,
    pub duration_s: f64,
}

impl Stimulus {
    pub fn new(
        amplitude_a_per_f: f64,
        start_s: f64,
        period_s: f64,
        duration_s: f64,
    ) -> ModelResult<Self> {
        let check = |name: &str, value: f64, ok: bool, reason: &'static str| {
            if ok {
                Ok(())
            } else {
                Err(ModelError::InvalidParameter {
                    name: name.to_string(),
                    value,
                    reason,
                })
            }
        };
        check(
            "amplitude_a_per_f",
            amplitude_a_per_f,
            amplitude_a_per_f.is_finite(),
            "must be finite",
        )?;
        check("start_s", start_s, start_s.is_finite(), "must be finite")?;
        check(
            "period_s",
            period_s,
            period_s.is_finite() && period_s > 0.0,
            "must be positive",
        )?;
        check(
            "duration_s",
            duration_s,
            duration_s.is_finite() && duration_s > 0.0 && duration_s < period_s,
            "must be positive and shorter than the period",
        )?;
        Ok(Self {
            amplitude_a_per_f,
            start_s,
            period_s,
            duration_s,
        })
    }

    /// Stimulus current at time `t` (A/F).
    pub fn current_at(&self, t: f64) -> f64 {
        if t < self.start_s {
            return 0.0;
        }
        let phase = (t - self.start_s) % self.period_s;
        if phase < self.duration_s {
            self.amplitude_a_per_f
        } else {
            0.0
        }
    }
}
