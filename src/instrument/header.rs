//! Header inspection: instrument identity and exposure parameters.
//!
//! Runs first in the pipeline and fails fast: every later stage can assume a
//! valid band, a positive exposure time and air mass, and a detector mode that
//! exists in the profile's gain table.

use std::path::Path;

use crate::domain::{Band, ExposureContext};
use crate::error::AppError;
use crate::instrument::profile::{DetectorNoise, InstrumentProfile, normalize_mode};
use crate::io::fits::FitsHeader;

/// Header keys consulted (in order) to identify the instrument.
const IDENTITY_KEYS: [&str; 3] = ["INSTRUME", "TELESCOP", "DETECTOR"];

/// Result of inspecting an image header.
#[derive(Debug, Clone)]
pub struct HeaderInspection {
    pub profile: InstrumentProfile,
    pub exposure: ExposureContext,
    pub detector: DetectorNoise,
}

/// Inspect `header`, resolving the profile and exposure context.
pub fn inspect(
    header: &FitsHeader,
    instrument: Option<&str>,
    profile_file: Option<&Path>,
) -> Result<HeaderInspection, AppError> {
    let profile = resolve_profile(header, instrument, profile_file)?;
    let exposure = exposure_context(header, &profile)?;
    let detector = profile.detector(&exposure.detector_mode)?;
    log::info!(
        "Header: instrument={} band={} exptime={}s airmass={:.3} mode={} (gain={} e-/ADU, ron={} e-)",
        profile.name,
        exposure.band,
        exposure.exposure_time,
        exposure.air_mass,
        exposure.detector_mode,
        detector.gain,
        detector.readout_noise
    );
    Ok(HeaderInspection {
        profile,
        exposure,
        detector,
    })
}

/// Pick the instrument profile: profile file > explicit name > header identity.
pub fn resolve_profile(
    header: &FitsHeader,
    instrument: Option<&str>,
    profile_file: Option<&Path>,
) -> Result<InstrumentProfile, AppError> {
    if let Some(path) = profile_file {
        return InstrumentProfile::from_json_file(path);
    }
    if let Some(name) = instrument {
        return InstrumentProfile::by_name(name);
    }

    let identities: Vec<String> = IDENTITY_KEYS
        .iter()
        .filter_map(|key| header.get_text(key))
        .collect();
    InstrumentProfile::builtin()
        .into_iter()
        .find(|profile| identities.iter().any(|id| profile.matches(id)))
        .ok_or_else(|| {
            AppError::config(format!(
                "Could not identify the instrument from the header (INSTRUME/TELESCOP/DETECTOR = {:?}); pass --instrument or --profile-file.",
                identities
            ))
        })
}

/// Read exposure time, air mass, filter and detector mode using the profile's key names.
pub fn exposure_context(header: &FitsHeader, profile: &InstrumentProfile) -> Result<ExposureContext, AppError> {
    let keys = &profile.keys;

    let exposure_time = positive_number(header, &keys.exposure_time)?;
    let air_mass = positive_number(header, &keys.air_mass)?;

    let filter = header
        .get_text(&keys.filter)
        .ok_or_else(|| missing_key(&keys.filter))?;
    let band = Band::from_filter_name(&filter).ok_or_else(|| {
        AppError::config(format!(
            "Unrecognized filter '{filter}' in `{}` (expected U, B, V, R or I).",
            keys.filter
        ))
    })?;

    let mode = header
        .get_text(&keys.detector_mode)
        .ok_or_else(|| missing_key(&keys.detector_mode))?;
    let detector_mode = normalize_mode(&mode);

    Ok(ExposureContext {
        exposure_time,
        air_mass,
        band,
        detector_mode,
    })
}

fn positive_number(header: &FitsHeader, key: &str) -> Result<f64, AppError> {
    let value = header.get(key).ok_or_else(|| missing_key(key))?;
    match value.as_f64() {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(AppError::config(format!(
            "Header key `{key}` must be a positive number (got {value:?})."
        ))),
    }
}

fn missing_key(key: &str) -> AppError {
    AppError::config(format!("Missing required header key `{key}`."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::fits::HeaderValue;

    fn iac80_header() -> FitsHeader {
        let mut header = FitsHeader::new();
        header.set("INSTRUME", HeaderValue::Str("CAMELOT".into()), None);
        header.set("EXPTIME", HeaderValue::Float(30.0), None);
        header.set("AIRMASS", HeaderValue::Str("1.25".into()), None);
        header.set("FILTER", HeaderValue::Str("v".into()), None);
        header.set("GAINMODE", HeaderValue::Int(2), None);
        header
    }

    #[test]
    fn inspects_a_complete_header() {
        let inspection = inspect(&iac80_header(), None, None).unwrap();
        assert_eq!(inspection.profile.name, "iac80");
        assert_eq!(inspection.exposure.band, Band::V);
        assert_eq!(inspection.exposure.exposure_time, 30.0);
        assert_eq!(inspection.exposure.air_mass, 1.25);
        assert_eq!(inspection.exposure.detector_mode, "2");
        assert_eq!(inspection.detector.gain, 1.63);
    }

    #[test]
    fn explicit_instrument_overrides_header() {
        let mut header = iac80_header();
        header.set("EXPOSURE", HeaderValue::Float(12.0), None);
        header.set("INSFILTE", HeaderValue::Str("Johnson R".into()), None);
        header.set("READMODE", HeaderValue::Str("fast".into()), None);
        let inspection = inspect(&header, Some("tcs"), None).unwrap();
        assert_eq!(inspection.profile.name, "tcs");
        assert_eq!(inspection.exposure.band, Band::R);
        assert_eq!(inspection.exposure.exposure_time, 12.0);
        assert_eq!(inspection.detector.readout_noise, 9.5);
    }

    #[test]
    fn missing_or_invalid_values_are_configuration_errors() {
        for key in ["EXPTIME", "AIRMASS", "FILTER", "GAINMODE"] {
            let mut header = FitsHeader::new();
            for card in iac80_header().cards() {
                if card.key != key {
                    header.set(&card.key, card.value.clone(), None);
                }
            }
            let err = inspect(&header, None, None).unwrap_err();
            assert_eq!(err.exit_code(), 2, "missing {key}");
        }

        let mut header = iac80_header();
        header.set("FILTER", HeaderValue::Str("Halpha".into()), None);
        assert_eq!(inspect(&header, None, None).unwrap_err().exit_code(), 2);

        let mut header = iac80_header();
        header.set("EXPTIME", HeaderValue::Float(0.0), None);
        assert_eq!(inspect(&header, None, None).unwrap_err().exit_code(), 2);

        let mut header = iac80_header();
        header.set("GAINMODE", HeaderValue::Int(9), None);
        assert_eq!(inspect(&header, None, None).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn unknown_instrument_is_a_configuration_error() {
        let mut header = iac80_header();
        header.set("INSTRUME", HeaderValue::Str("WFC3".into()), None);
        assert_eq!(inspect(&header, None, None).unwrap_err().exit_code(), 2);
    }
}
