//! Terminal reports.

pub mod format;

pub use format::{format_curve_table, format_curves, format_measurement, format_profiles, format_result};
