//! `starcal` library crate.
//!
//! Single-star photometric calibration: estimate the sky, refine the star's
//! centroid, build SNR curves of growth, locate the peak, match the star in a
//! standard catalog and derive the photometric zero point.
//!
//! The binary (`starcal`) is a thin wrapper around this library so every
//! stage is testable without spawning processes.

pub mod app;
pub mod catalog;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod image;
pub mod instrument;
pub mod io;
pub mod logging;
pub mod math;
pub mod photometry;
pub mod report;
