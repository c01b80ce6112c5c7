//! SNR curve JSON export.
//!
//! The schema is `domain::CurveFile`: one entry per measurement path with the
//! seed FWHM, all curve points, and the optimal (max-SNR) point.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{Band, CurveExport, CurveFile, PathKind, SnrCurve};
use crate::error::AppError;

/// Assemble the export document for a set of curves.
pub fn curve_file(image: &Path, band: Band, sky_median: f64, curves: &[(PathKind, SnrCurve)]) -> CurveFile {
    CurveFile {
        tool: format!("starcal {}", env!("CARGO_PKG_VERSION")),
        created: Utc::now(),
        image: image.display().to_string(),
        band,
        sky_median,
        curves: curves
            .iter()
            .map(|(path, curve)| CurveExport {
                path: *path,
                seed_fwhm: curve.seed_fwhm,
                optimal: curve.optimal(),
                points: curve.points.clone(),
            })
            .collect(),
    }
}

/// Write a curve JSON file (pretty-printed).
pub fn write_curve_json(path: &Path, curve: &CurveFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create curve JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, curve)
        .map_err(|e| AppError::io(format!("Failed to write curve JSON: {e}")))?;
    log::debug!("Wrote SNR curves to {}", path.display());
    Ok(())
}

#[cfg(test)]
pub(crate) fn read_curve_json(path: &Path) -> Result<CurveFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open curve JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::config(format!("Invalid curve JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SnrPoint;

    #[test]
    fn curve_file_survives_a_write_and_read() {
        let point = |m: f64, snr: f64| SnrPoint { multiplier: m, radius: 4.0 * m, flux: 1000.0 * m, snr };
        let curves = vec![
            (PathKind::Fitted, SnrCurve { seed_fwhm: 4.0, points: vec![point(0.5, 3.0), point(1.0, 5.0)] }),
            (PathKind::User, SnrCurve { seed_fwhm: 5.0, points: vec![point(0.5, 6.0), point(1.0, 2.0)] }),
        ];
        let doc = curve_file(Path::new("star.fits"), Band::B, 101.5, &curves);
        assert_eq!(doc.curves[0].optimal.unwrap().multiplier, 1.0);
        assert_eq!(doc.curves[1].optimal.unwrap().multiplier, 0.5);

        let path = std::env::temp_dir().join(format!("starcal_curve_{}.json", std::process::id()));
        write_curve_json(&path, &doc).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let back = read_curve_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert!(text.contains("\"fitted\""), "{text}");
        assert_eq!(back, doc);
    }
}
