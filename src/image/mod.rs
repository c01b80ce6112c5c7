//! Image model: pixel frame, world coordinates, and segmentation helpers.

pub mod frame;
pub mod segment;
pub mod wcs;

pub use frame::*;
pub use wcs::TanWcs;
