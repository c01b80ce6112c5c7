//! Measurement stages, in pipeline order:
//!
//! - `background`: masked, sigma-clipped sky statistics
//! - `centroid`: flux-weighted position and moment FWHM
//! - `aperture`: exact-overlap circular aperture sums
//! - `snr`: SNR curve of growth over 0.5–4.0 × FWHM
//! - `peak`: point-source detection nearest the centroid
//! - `calibrate`: instrumental magnitude and zero point

pub mod aperture;
pub mod background;
pub mod calibrate;
pub mod centroid;
pub mod peak;
pub mod snr;

pub use aperture::aperture_flux;
pub use background::{BackgroundEstimate, estimate_background};
pub use calibrate::{Calibration, calibrate, instrumental_magnitude, zero_point};
pub use centroid::refine_centroid;
pub use peak::locate_peak;
pub use snr::{APERTURE_MULTIPLIERS, snr_curve};
