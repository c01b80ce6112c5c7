//! Standard-star catalog ingest.
//!
//! Expected columns (case-insensitive, any order): `name`, `ra`, `dec` (degrees)
//! and the magnitude/error pairs `U, eU, B, eB, V, eV, R, eR, I, eI`. Blank
//! magnitude cells mean "not measured in this band". Rows with an unusable name
//! or position are skipped and reported; they never abort the load.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{Band, CatalogEntry, Magnitude};
use crate::error::AppError;

/// A row-level problem encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load a catalog CSV. An empty result is a configuration error.
pub fn load_catalog(path: &Path) -> Result<Catalog, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open catalog '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::config(format!("Failed to read catalog headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    for column in ["name", "ra", "dec"] {
        if !header_map.contains_key(column) {
            return Err(AppError::config(format!(
                "Catalog '{}' is missing required column `{column}`.",
                path.display()
            )));
        }
    }

    let mut entries = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        rows_read += 1;
        let parsed = result
            .map_err(|e| format!("CSV parse error: {e}"))
            .and_then(|record| parse_row(&record, &header_map));
        match parsed {
            Ok(entry) => entries.push(entry),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    for err in &row_errors {
        log::warn!("Catalog line {}: {}", err.line, err.message);
    }
    if entries.is_empty() {
        return Err(AppError::config(format!(
            "Catalog '{}' has no usable rows ({rows_read} read).",
            path.display()
        )));
    }
    log::debug!("Catalog: {} entries from {}", entries.len(), path.display());

    Ok(Catalog {
        entries,
        row_errors,
        rows_read,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<CatalogEntry, String> {
    let name = get_required(record, header_map, "name")?.to_string();
    let ra = get_required(record, header_map, "ra")?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("{name}: invalid `ra`"))?;
    let dec = get_required(record, header_map, "dec")?
        .parse::<f64>()
        .ok()
        .filter(|v| (-90.0..=90.0).contains(v))
        .ok_or_else(|| format!("{name}: invalid `dec` (must be within ±90°)"))?;

    let mut magnitudes = BTreeMap::new();
    for band in Band::ALL {
        let mag_col = band.as_str().to_ascii_lowercase();
        let Some(raw) = get_optional(record, header_map, &mag_col) else {
            continue;
        };
        let value = parse_f64(raw).ok_or_else(|| format!("{name}: invalid {band} magnitude '{raw}'"))?;
        let error = get_optional(record, header_map, &format!("e{mag_col}")).and_then(parse_f64);
        magnitudes.insert(band, Magnitude { value, error });
    }

    Ok(CatalogEntry {
        name,
        ra: ra.rem_euclid(360.0),
        dec,
        magnitudes,
    })
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    get_optional(record, header_map, name).ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_f64(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("starcal_{name}_{}.csv", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_entries_with_optional_bands() {
        let path = write_temp(
            "catalog_ok",
            "\u{feff}Name,RA,Dec,U,eU,B,eB,V,eV,R,eR,I,eI\n\
             SA92-245,13.3358,0.6733,,,14.21,0.01,13.82,0.004,13.58,,13.34,0.006\n\
             SA92-250,13.3583,0.6881,14.8,0.02,14.3,0.01,13.18,0.003,12.6,0.002,12.1,0.004\n",
        );
        let catalog = load_catalog(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(catalog.entries.len(), 2);
        assert!(catalog.row_errors.is_empty());
        let first = &catalog.entries[0];
        assert_eq!(first.name, "SA92-245");
        assert!(first.magnitude(Band::U).is_none());
        assert_eq!(first.magnitude(Band::V), Some(Magnitude { value: 13.82, error: Some(0.004) }));
        assert_eq!(first.magnitude(Band::R).unwrap().error, None);
    }

    #[test]
    fn bad_rows_are_reported_not_fatal() {
        let path = write_temp(
            "catalog_rows",
            "name,ra,dec,V,eV\nA,10.0,95.0,12.0,0.1\nB,abc,1.0,12.0,0.1\nC,370.0,-5.0,11.0,\n",
        );
        let catalog = load_catalog(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(catalog.rows_read, 3);
        assert_eq!(catalog.entries.len(), 1);
        assert_eq!(catalog.row_errors.len(), 2);
        assert_eq!(catalog.row_errors[0].line, 2);
        assert!((catalog.entries[0].ra - 10.0).abs() < 1e-12);
    }

    #[test]
    fn empty_or_malformed_catalog_is_a_configuration_error() {
        let path = write_temp("catalog_empty", "name,ra,dec,V,eV\n");
        assert_eq!(load_catalog(&path).unwrap_err().exit_code(), 2);
        let _ = std::fs::remove_file(&path);

        let path = write_temp("catalog_nodec", "name,ra,V\nA,1.0,12.0\n");
        assert_eq!(load_catalog(&path).unwrap_err().exit_code(), 2);
        let _ = std::fs::remove_file(&path);

        let missing = std::env::temp_dir().join("starcal_no_such_catalog.csv");
        assert_eq!(load_catalog(&missing).unwrap_err().exit_code(), 4);
    }
}
