//! Synthetic data for demos and tests.

pub mod synth;

pub use synth::{SyntheticFrame, render_gaussian};
