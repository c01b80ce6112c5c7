//! Instrumental magnitude and photometric zero point.

use crate::domain::{Band, CatalogEntry};
use crate::error::AppError;

/// Instrumental magnitude and the zero point derived from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub instrumental_mag: f64,
    pub zero_point: f64,
}

/// `-2.5 log10(flux / exposure_time)`.
pub fn instrumental_magnitude(flux: f64, exposure_time: f64) -> Result<f64, AppError> {
    if !(flux > 0.0) {
        return Err(AppError::domain(format!(
            "Cannot take the magnitude of a non-positive flux ({flux} ADU)."
        )));
    }
    if !(exposure_time > 0.0) {
        return Err(AppError::domain(format!("Exposure time must be > 0 (got {exposure_time} s).")));
    }
    Ok(-2.5 * (flux / exposure_time).log10())
}

/// `catalog - instrumental + extinction · air_mass`.
pub fn zero_point(catalog_mag: f64, instrumental_mag: f64, extinction: f64, air_mass: f64) -> f64 {
    catalog_mag - instrumental_mag + extinction * air_mass
}

/// Calibrate one flux against the matched catalog star in `band`.
pub fn calibrate(
    flux: f64,
    exposure_time: f64,
    entry: &CatalogEntry,
    band: Band,
    extinction: f64,
    air_mass: f64,
) -> Result<Calibration, AppError> {
    let catalog_mag = entry.magnitude(band).ok_or_else(|| {
        AppError::config(format!("Catalog star '{}' has no {band} magnitude.", entry.name))
    })?;
    let instrumental_mag = instrumental_magnitude(flux, exposure_time)?;
    let zero_point = zero_point(catalog_mag.value, instrumental_mag, extinction, air_mass);
    log::debug!(
        "Calibration: {band}={:.3} inst={instrumental_mag:.3} k={extinction} X={air_mass:.3} -> ZP={zero_point:.3}",
        catalog_mag.value
    );
    Ok(Calibration {
        instrumental_mag,
        zero_point,
    })
}
