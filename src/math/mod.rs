//! Mathematical utilities: robust statistics, aperture overlap geometry,
//! image moments, and spherical geometry.

pub mod moments;
pub mod overlap;
pub mod sphere;
pub mod stats;

pub use moments::*;
pub use overlap::*;
pub use sphere::*;
pub use stats::*;
