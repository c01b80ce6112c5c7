//! Instrument-specific configuration.
//!
//! - `profile`: closed lookup tables (extinction, gain/readout noise, plate scale)
//! - `header`: exposure parameters read from image metadata

pub mod header;
pub mod profile;

pub use header::*;
pub use profile::*;
