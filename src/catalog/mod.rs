//! Standard-star cross-matching.

pub mod matcher;

pub use matcher::*;
