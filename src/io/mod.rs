//! Input/output helpers.
//!
//! - FITS image read/write (`fits`)
//! - standard-star catalog ingest (`catalog`)
//! - append-only result log (`results_log`)
//! - SNR curve JSON export (`curve`)

pub mod catalog;
pub mod curve;
pub mod fits;
pub mod results_log;

pub use catalog::{Catalog, load_catalog};
pub use curve::{curve_file, write_curve_json};
pub use results_log::append_result;
