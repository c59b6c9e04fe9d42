//! Cell-model evaluators for the cardiomyocyte simulator.
//!
//! Provides:
//! - the [`CellModel`] capability consumed by the simulation driver
//! - fixed state and diagnostic slot layouts
//! - stateless drug-block gating and pacing stimulus
//! - voltage-clamp and stimulus-train protocol wrappers
//! - the Paci2018 hiPSC-CM model

pub mod drug;
pub mod error;
pub mod layout;
pub mod paci2018;
pub mod protocol;
pub mod stimulus;
pub mod traits;

pub use drug::{BlockScales, DrugBlock};
pub use error::{ModelError, ModelResult};
pub use layout::{DIAGNOSTIC_LEN, DiagnosticSlot, STATE_LEN, StateSlot};
pub use paci2018::{Conductances, Paci2018, StatePreset};
pub use protocol::{
    ClampSegment, StimulusTrain, TrainPaced, VoltageClamp, VoltageClampStep, VoltageClamped,
};
pub use stimulus::Stimulus;
pub use traits::{CellModel, Evaluation};
