//! cm-core: stable foundation for the cardiomyocyte simulator.
//!
//! Contains:
//! - numeric (Real, tolerances, finiteness checks, weighted RMS norm)
//! - error (shared error types)

pub mod error;
pub mod numeric;

// Re-exports: nice ergonomics for downstream crates
pub use error::{CoreError, CoreResult};
pub use numeric::*;
