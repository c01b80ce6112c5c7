//! Instrument profiles: every instrument-specific constant in one record.
//!
//! A profile holds the extinction table (per band), the detector gain and
//! readout-noise table (per detector mode), the plate scale, and the header
//! keyword names used to read exposure parameters. Two profiles are built in;
//! others can be loaded from JSON with the same schema.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::Band;
use crate::error::AppError;

/// Gain (e⁻/ADU) and readout noise (e⁻) of one detector mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorNoise {
    pub gain: f64,
    pub readout_noise: f64,
}

/// Header keyword names for the exposure parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderKeys {
    pub exposure_time: String,
    pub air_mass: String,
    pub filter: String,
    pub detector_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentProfile {
    pub name: String,
    /// `INSTRUME`/`TELESCOP` values that identify this instrument.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Plate scale (arcsec / pixel).
    pub plate_scale: f64,
    /// Extinction coefficient (mag / air mass) per band.
    pub extinction: BTreeMap<Band, f64>,
    /// Detector-mode identifier → gain/readout noise.
    pub detector_modes: BTreeMap<String, DetectorNoise>,
    pub keys: HeaderKeys,
}

impl InstrumentProfile {
    /// IAC80 telescope with the CAMELOT camera.
    pub fn iac80() -> Self {
        InstrumentProfile {
            name: "iac80".to_string(),
            aliases: vec!["IAC80".into(), "IAC-80".into(), "CAMELOT".into(), "CAMELOT2".into()],
            plate_scale: 0.304,
            extinction: BTreeMap::from([
                (Band::U, 0.46),
                (Band::B, 0.22),
                (Band::V, 0.13),
                (Band::R, 0.09),
                (Band::I, 0.05),
            ]),
            detector_modes: BTreeMap::from([
                ("1".to_string(), DetectorNoise { gain: 0.78, readout_noise: 4.9 }),
                ("2".to_string(), DetectorNoise { gain: 1.63, readout_noise: 5.6 }),
                ("3".to_string(), DetectorNoise { gain: 3.20, readout_noise: 8.4 }),
            ]),
            keys: HeaderKeys {
                exposure_time: "EXPTIME".into(),
                air_mass: "AIRMASS".into(),
                filter: "FILTER".into(),
                detector_mode: "GAINMODE".into(),
            },
        }
    }

    /// Carlos Sánchez Telescope imaging camera.
    pub fn tcs() -> Self {
        InstrumentProfile {
            name: "tcs".to_string(),
            aliases: vec!["TCS".into(), "CAIN".into(), "CAIN-3".into()],
            plate_scale: 0.40,
            extinction: BTreeMap::from([
                (Band::U, 0.48),
                (Band::B, 0.24),
                (Band::V, 0.14),
                (Band::R, 0.10),
                (Band::I, 0.06),
            ]),
            detector_modes: BTreeMap::from([
                ("SLOW".to_string(), DetectorNoise { gain: 1.20, readout_noise: 4.0 }),
                ("FAST".to_string(), DetectorNoise { gain: 2.10, readout_noise: 9.5 }),
            ]),
            keys: HeaderKeys {
                exposure_time: "EXPOSURE".into(),
                air_mass: "AIRMASS".into(),
                filter: "INSFILTE".into(),
                detector_mode: "READMODE".into(),
            },
        }
    }

    pub fn builtin() -> Vec<InstrumentProfile> {
        vec![Self::iac80(), Self::tcs()]
    }

    /// Look up a built-in profile by name or alias (case-insensitive).
    pub fn by_name(name: &str) -> Result<InstrumentProfile, AppError> {
        Self::builtin()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name.trim()) || p.matches(name))
            .ok_or_else(|| {
                let known: Vec<String> = Self::builtin().into_iter().map(|p| p.name).collect();
                AppError::config(format!(
                    "Unknown instrument '{name}'. Built-in profiles: {}.",
                    known.join(", ")
                ))
            })
    }

    /// Load and validate a JSON profile.
    pub fn from_json_file(path: &Path) -> Result<InstrumentProfile, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::io(format!("Failed to open profile '{}': {e}", path.display())))?;
        let mut profile: InstrumentProfile = serde_json::from_reader(file)
            .map_err(|e| AppError::config(format!("Invalid profile JSON '{}': {e}", path.display())))?;
        profile.detector_modes = profile
            .detector_modes
            .into_iter()
            .map(|(mode, noise)| (normalize_mode(&mode), noise))
            .collect();
        profile.validate()?;
        Ok(profile)
    }

    /// Every table entry must be a finite positive number.
    pub fn validate(&self) -> Result<(), AppError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.plate_scale) {
            return Err(AppError::config(format!(
                "Profile '{}': plate scale must be > 0 (got {}).",
                self.name, self.plate_scale
            )));
        }
        if self.extinction.is_empty() || self.detector_modes.is_empty() {
            return Err(AppError::config(format!(
                "Profile '{}': extinction and detector-mode tables must not be empty.",
                self.name
            )));
        }
        if let Some((band, k)) = self.extinction.iter().find(|(_, k)| !positive(**k)) {
            return Err(AppError::config(format!(
                "Profile '{}': extinction for {band} must be > 0 (got {k}).",
                self.name
            )));
        }
        if let Some((mode, _)) = self
            .detector_modes
            .iter()
            .find(|(_, n)| !positive(n.gain) || !positive(n.readout_noise))
        {
            return Err(AppError::config(format!(
                "Profile '{}': detector mode '{mode}' needs positive gain and readout noise.",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether a header identity value names this instrument.
    pub fn matches(&self, identity: &str) -> bool {
        let identity = identity.trim();
        !identity.is_empty()
            && (self.name.eq_ignore_ascii_case(identity)
                || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(identity)))
    }

    pub fn extinction(&self, band: Band) -> Result<f64, AppError> {
        self.extinction.get(&band).copied().ok_or_else(|| {
            AppError::config(format!("Profile '{}' has no extinction coefficient for band {band}.", self.name))
        })
    }

    /// Extinction for a raw filter code (`"v"`, `"R"`, ...).
    pub fn extinction_for_code(&self, code: &str) -> Result<f64, AppError> {
        let band = Band::from_code(code)
            .ok_or_else(|| AppError::config(format!("Unrecognized filter code '{code}' (expected U, B, V, R or I).")))?;
        self.extinction(band)
    }

    pub fn detector(&self, mode: &str) -> Result<DetectorNoise, AppError> {
        let key = normalize_mode(mode);
        self.detector_modes.get(&key).copied().ok_or_else(|| {
            let known: Vec<&str> = self.detector_modes.keys().map(String::as_str).collect();
            AppError::config(format!(
                "Unrecognized detector mode '{mode}' for '{}' (known: {}).",
                self.name,
                known.join(", ")
            ))
        })
    }
}

/// Canonical form of a detector-mode identifier: trimmed, upper-case, and
/// integral numbers without a fractional part (`"2.0"` → `"2"`).
pub fn normalize_mode(mode: &str) -> String {
    let mode = mode.trim();
    match mode.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => format!("{}", v as i64),
        _ => mode.to_ascii_uppercase(),
    }
}
