//! Nearest-neighbor cross-match of the target against the standard-star catalog.

use crate::domain::{Centroid, CatalogEntry, CatalogMatch};
use crate::error::AppError;
use crate::image::wcs::TanWcs;
use crate::math::sphere::{angular_separation, chord_distance};

/// Sky position of the refined centroid plus its nearest catalog entry.
#[derive(Debug, Clone)]
pub struct SkyMatch {
    pub ra: f64,
    pub dec: f64,
    pub matched: CatalogMatch,
}

/// Nearest entry to `(ra, dec)` by great-circle distance.
///
/// No distance cut is applied. Only an empty catalog yields `None`.
pub fn nearest_entry(entries: &[CatalogEntry], ra: f64, dec: f64) -> Option<CatalogMatch> {
    entries
        .iter()
        .map(|entry| (entry, angular_separation(ra, dec, entry.ra, entry.dec)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(entry, separation_deg)| CatalogMatch {
            entry: entry.clone(),
            separation_arcsec: separation_deg * 3600.0,
            separation_3d: chord_distance(ra, dec, entry.ra, entry.dec),
        })
}

/// Project the centroid to the sky and match it.
///
/// Separations above `max_separation_arcsec` are logged as suspicious; the
/// match is returned regardless.
pub fn match_centroid(
    centroid: &Centroid,
    wcs: &TanWcs,
    entries: &[CatalogEntry],
    max_separation_arcsec: f64,
) -> Result<SkyMatch, AppError> {
    let (ra, dec) = wcs.pixel_to_sky(centroid.x, centroid.y);
    let matched = nearest_entry(entries, ra, dec)
        .ok_or_else(|| AppError::config("Cannot cross-match against an empty catalog."))?;

    log::info!(
        "Catalog: ({ra:.6}, {dec:+.6}) -> '{}' at {:.2}\"",
        matched.entry.name,
        matched.separation_arcsec
    );
    if matched.separation_arcsec > max_separation_arcsec {
        log::warn!(
            "Nearest catalog star '{}' is {:.1}\" away (limit {max_separation_arcsec}\"); the calibration may use the wrong star",
            matched.entry.name,
            matched.separation_arcsec
        );
    }
    Ok(SkyMatch { ra, dec, matched })
}
