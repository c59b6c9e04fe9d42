//! Pharmacological block of ionic conductances.
//!
//! The block is gated purely by the time argument: every evaluation decides
//! afresh whether `t` has reached the application time. Nothing is latched, so
//! the same `t` always yields the same regime no matter the call order.

use crate::error::{ModelError, ModelResult};

/// Per-current conductance multipliers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockScales {
    pub i_na: f64,
    pub i_ca_l: f64,
    pub i_kr: f64,
    pub i_ks: f64,
}

impl BlockScales {
    /// Full conductance on every current.
    pub const NONE: BlockScales = BlockScales {
        i_na: 1.0,
        i_ca_l: 1.0,
        i_kr: 1.0,
        i_ks: 1.0,
    };
}

impl Default for BlockScales {
    fn default() -> Self {
        Self::NONE
    }
}

/// Drug-block configuration: scaling factors plus the time they take effect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrugBlock {
    /// Time (s) from which `scales` apply.
    pub application_time: f64,
    pub scales: BlockScales,
}

impl Default for DrugBlock {
    fn default() -> Self {
        Self {
            application_time: 10_000.0,
            scales: BlockScales::NONE,
        }
    }
}

impl DrugBlock {
    /// No block at any time.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(application_time: f64, scales: BlockScales) -> ModelResult<Self> {
        if !application_time.is_finite() {
            return Err(ModelError::InvalidParameter {
                name: "application_time".to_string(),
                value: application_time,
                reason: "must be finite",
            });
        }
        for (name, value) in [
            ("i_na", scales.i_na),
            ("i_ca_l", scales.i_ca_l),
            ("i_kr", scales.i_kr),
            ("i_ks", scales.i_ks),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ModelError::InvalidParameter {
                    name: name.to_string(),
                    value,
                    reason: "block factor must be finite and non-negative",
                });
            }
        }
        Ok(Self {
            application_time,
            scales,
        })
    }

    /// Whether the block is in effect at time `t`.
    #[inline]
    pub fn is_active(&self, t: f64) -> bool {
        t >= self.application_time
    }

    /// Scaling factors that apply at time `t`.
    #[inline]
    pub fn effective_scales(&self, t: f64) -> BlockScales {
        if self.is_active(t) {
            self.scales
        } else {
            BlockScales::NONE
        }
    }
}
