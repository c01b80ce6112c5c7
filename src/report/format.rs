//! Formatted terminal output.
//!
//! Formatting lives in one place so the photometry code stays free of
//! presentation details and output changes stay localized.

use crate::app::pipeline::{CurveRun, MeasurementRun};
use crate::domain::{MeasurementResult, PathKind, PathMeasurement, SnrCurve};
use crate::instrument::InstrumentProfile;

/// Full report for a `measure` run.
pub fn format_measurement(run: &MeasurementRun) -> String {
    let mut out = format_result(&run.result);
    out.push_str(&format!("\nSky-subtracted frame: {}\n", run.curves.bkg_path.display()));
    if !run.catalog.row_errors.is_empty() {
        out.push_str(&format!(
            "Catalog: {} of {} row(s) skipped (see log)\n",
            run.catalog.row_errors.len(),
            run.catalog.rows_read
        ));
    }
    out
}

/// Stage-by-stage summary of one measurement.
pub fn format_result(result: &MeasurementResult) -> String {
    let mut out = String::new();
    let exp = &result.exposure;

    out.push_str("=== starcal - single-star zero point ===\n");
    out.push_str(&format!("Image: {}\n", result.image));
    out.push_str(&format!(
        "Instrument: {} | band {} | exptime {} s | airmass {:.3} | mode {} (gain {} e-/ADU, ron {} e-)\n",
        result.instrument, exp.band, exp.exposure_time, exp.air_mass, exp.detector_mode, result.gain, result.readout_noise
    ));
    out.push_str(&format!(
        "Sky: median {:.3} | mean {:.3} | std {:.3} ADU\n",
        result.sky.median, result.sky.mean, result.sky.std
    ));
    out.push_str(&format!(
        "Centroid: ({:.2}, {:.2}) -> ({:.3}, {:.3}) | FWHM {:.3} px = {:.3}\"\n",
        result.initial_x,
        result.initial_y,
        result.centroid.x,
        result.centroid.y,
        result.centroid.fwhm_px,
        result.centroid.fwhm_arcsec
    ));
    out.push_str(&format!("Sky position: RA {:.7} Dec {:+.7}\n", result.ra, result.dec));

    let m = &result.matched;
    let cat = m
        .entry
        .magnitude(exp.band)
        .map(|mag| match mag.error {
            Some(err) => format!("{:.3} ± {err:.3}", mag.value),
            None => format!("{:.3}", mag.value),
        })
        .unwrap_or_else(|| "-".to_string());
    out.push_str(&format!(
        "Catalog: {} | {} = {cat} | separation {:.2}\" (3D {:.3e})\n",
        m.entry.name, exp.band, m.separation_arcsec, m.separation_3d
    ));

    for path in result.paths() {
        out.push('\n');
        out.push_str(&format_path(path));
    }
    out
}

fn format_path(path: &PathMeasurement) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Path: {} (seed {:.3} px = {:.3}\")\n",
        path.kind.display_name(),
        path.seed_fwhm_px,
        path.seed_fwhm_arcsec
    ));
    out.push_str(&format_curve_table(&path.curve));
    out.push_str(&format!(
        "Optimal: r={:.2} px ({}×FWHM) SNR={:.2} flux={} ADU | first SNR {:.2}\n",
        path.optimal.radius, path.optimal.multiplier, path.optimal.snr, path.flux, path.snr_first
    ));
    match path.peak {
        Some(p) => out.push_str(&format!(
            "Peak: ({:.2}, {:.2}) {:.1} ADU, mag {:.3}, {:.2} px from centroid\n",
            p.x, p.y, p.peak, p.mag, p.distance
        )),
        None => out.push_str("Peak: not found\n"),
    }
    out.push_str(&format!(
        "Instrumental mag {:.4} | zero point {:.4}\n",
        path.instrumental_mag, path.zero_point
    ));
    out
}

/// Report for a `curve` run: context plus both curve tables.
pub fn format_curves(run: &CurveRun) -> String {
    let mut out = String::new();
    let exp = &run.inspection.exposure;
    out.push_str(&format!(
        "=== starcal - SNR curves ({} | band {} | mode {}) ===\n",
        run.inspection.profile.name, exp.band, exp.detector_mode
    ));
    out.push_str(&format!("Sky median: {:.3} ADU\n", run.background.stats.median));
    if let Some(c) = run.source.centroid {
        out.push_str(&format!("Centroid: ({:.3}, {:.3}) FWHM {:.3} px\n", c.x, c.y, c.fwhm_px));
    }
    for (kind, curve) in run.curves() {
        out.push('\n');
        out.push_str(&format!("{} (seed {:.3} px):\n", kind_label(*kind), curve.seed_fwhm));
        out.push_str(&format_curve_table(curve));
    }
    out
}

fn kind_label(kind: PathKind) -> &'static str {
    match kind {
        PathKind::Fitted => "Fitted FWHM",
        PathKind::User => "User FWHM",
    }
}

/// One row per curve point; the optimal point is starred.
pub fn format_curve_table(curve: &SnrCurve) -> String {
    let best = curve.optimal().map(|p| p.multiplier);
    let mut out = String::new();
    out.push_str(format!("  {:>6} {:>9} {:>14} {:>10}", "×FWHM", "r (px)", "flux (ADU)", "SNR").trim_end());
    out.push('\n');
    out.push_str(format!("  {:-<6} {:-<9} {:-<14} {:-<10}", "", "", "", "").trim_end());
    out.push('\n');
    for p in &curve.points {
        let mark = if Some(p.multiplier) == best { "*" } else { " " };
        out.push_str(
            format!(
                "{mark} {:>6.1} {:>9.2} {:>14} {:>10.2}",
                p.multiplier, p.radius, p.flux, p.snr
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Table of instrument profiles.
pub fn format_profiles(profiles: &[InstrumentProfile]) -> String {
    let mut out = String::new();
    for profile in profiles {
        out.push_str(&format!(
            "{} ({:.3}\"/px) aliases: {}\n",
            profile.name,
            profile.plate_scale,
            profile.aliases.join(", ")
        ));
        let keys = &profile.keys;
        out.push_str(&format!(
            "  keys: exptime={} airmass={} filter={} mode={}\n",
            keys.exposure_time, keys.air_mass, keys.filter, keys.detector_mode
        ));
        let ext: Vec<String> = profile.extinction.iter().map(|(b, k)| format!("{b}={k:.2}")).collect();
        out.push_str(&format!("  extinction: {}\n", ext.join(" ")));
        for (mode, noise) in &profile.detector_modes {
            out.push_str(&format!(
                "  mode {:<6} gain {:>5.2} e-/ADU  ron {:>5.2} e-\n",
                truncate(mode, 6),
                noise.gain,
                noise.readout_noise
            ));
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SnrPoint;
    use crate::io::results_log::tests::sample_result;

    #[test]
    fn curve_table_marks_the_optimal_point() {
        let point = |m: f64, snr: f64| SnrPoint { multiplier: m, radius: 4.0 * m, flux: 100.0, snr };
        let curve = SnrCurve {
            seed_fwhm: 4.0,
            points: vec![point(0.5, 3.0), point(1.0, 9.0), point(1.5, 7.0)],
        };
        let table = format_curve_table(&curve);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[3].starts_with("*"), "{table}");
        assert!(!lines[2].starts_with("*"));
    }

    #[test]
    fn result_report_names_both_paths() {
        let text = format_result(&sample_result());
        assert!(text.contains("SA 92 250"));
        assert!(text.contains("Path: fitted FWHM"));
        assert!(text.contains("Path: user FWHM"));
        assert!(text.contains("Peak: not found"));
        assert!(text.contains("zero point 20.1000"));
    }

    #[test]
    fn profiles_list_every_mode() {
        let text = format_profiles(&InstrumentProfile::builtin());
        assert!(text.contains("iac80"));
        assert!(text.contains("mode SLOW"));
        assert_eq!(text.matches("  mode ").count(), 5);
    }

    #[test]
    fn long_names_are_shortened() {
        assert_eq!(truncate("ABCDEFGH", 6), "ABCDE.");
        assert_eq!(truncate("AB", 6), "AB");
    }
}
