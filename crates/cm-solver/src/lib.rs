//! Stiff ODE integration for cell models.
//!
//! This crate drives diffsol's variable-order (1-5), variable-step BDF
//! solver over a fallible right-hand side. The Jacobian comes from
//! finite-difference Jacobian-vector products, every accepted step is
//! recorded together with the derivative the corrector enforced there, and
//! an optional observer sees each step and may end the run early.

pub mod bdf;
pub mod error;
pub mod jacobian;
pub mod trajectory;

pub use bdf::{
    BdfOptions, StepControl, StepObserver, StepProgress, integrate, integrate_with_observer,
};
pub use error::{SolverError, SolverResult};
pub use trajectory::{SolverStats, Trajectory};
