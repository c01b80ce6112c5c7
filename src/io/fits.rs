//! FITS image I/O on top of cfitsio (`fitsio`).
//!
//! Only the primary HDU is used. Pixel data is exposed as `Array2<f64>`
//! indexed `[[row, col]]`, where row 0 is the first row stored in the file
//! (FITS `y = 1`). cfitsio applies `BSCALE`/`BZERO` on read.
//!
//! Header cards are enumerated through `fitsio::sys` because the safe API only
//! reads keys by name; `FitsHeader` keeps them in file order so they can be
//! copied to derived images.

use std::ffi::{CStr, CString, c_char, c_int};
use std::path::Path;

use fitsio::FitsFile;
use fitsio::errors::check_status;
use fitsio::hdu::HduInfo;
use fitsio::images::{ImageDescription, ImageType};
use ndarray::Array2;

use crate::error::AppError;

/// Keywords that describe the data layout; never copied from one file to another.
const STRUCTURAL_KEYS: [&str; 11] = [
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "EXTEND", "BZERO", "BSCALE", "PCOUNT", "GCOUNT", "XTENSION",
];

/// cfitsio writes these two COMMENT lines into every new primary header.
const BOILERPLATE: [&str; 2] = ["FITS (Flexible Image Transport System) format", "and Astrophysics', volume"];

/// Room for one 80-character card plus the terminator.
const FLEN_CARD: usize = 81;

/// Typed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// `COMMENT`/`HISTORY` text (no value indicator).
    Commentary(String),
}

impl HeaderValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Int(v) => Some(*v as f64),
            HeaderValue::Str(s) => parse_number(s.trim()),
            _ => None,
        }
    }

    /// Render scalar values as a trimmed string (numbers without quotes).
    pub fn as_text(&self) -> Option<String> {
        match self {
            HeaderValue::Str(s) => Some(s.trim().to_string()),
            HeaderValue::Int(v) => Some(v.to_string()),
            HeaderValue::Float(v) => Some(v.to_string()),
            HeaderValue::Bool(b) => Some(if *b { "T" } else { "F" }.to_string()),
            HeaderValue::Commentary(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeaderCard {
    pub key: String,
    pub value: HeaderValue,
    pub comment: Option<String>,
}

/// Ordered FITS header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<HeaderCard>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[HeaderCard] {
        &self.cards
    }

    /// Value of the first card named `key` (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.key.eq_ignore_ascii_case(key) && !matches!(c.value, HeaderValue::Commentary(_)))
            .map(|c| &c.value)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HeaderValue::as_f64)
    }

    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(HeaderValue::as_text)
    }

    /// Insert or replace a keyword, keeping its position if it already exists.
    pub fn set(&mut self, key: &str, value: HeaderValue, comment: Option<&str>) {
        let key = key.trim().to_ascii_uppercase();
        let card = HeaderCard {
            key: key.clone(),
            value,
            comment: comment.map(str::to_string),
        };
        match self.cards.iter_mut().find(|c| c.key == key) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
    }

    pub fn push_commentary(&mut self, key: &str, text: &str) {
        self.cards.push(HeaderCard {
            key: key.trim().to_ascii_uppercase(),
            value: HeaderValue::Commentary(text.to_string()),
            comment: None,
        });
    }
}

/// Read the primary HDU image of a FITS file.
pub fn read_fits(path: &Path) -> Result<(Array2<f64>, FitsHeader), AppError> {
    let invalid = |e: fitsio::errors::Error| AppError::io(format!("Invalid FITS '{}': {e}", path.display()));

    let mut fptr = FitsFile::open(path)
        .map_err(|e| AppError::io(format!("Failed to open FITS '{}': {e}", path.display())))?;
    let hdu = fptr.primary_hdu().map_err(invalid)?;

    let (height, width, pixel_bytes) = match &hdu.info {
        HduInfo::ImageInfo { shape, image_type } if shape.len() == 2 => {
            (shape[0], shape[1], bytes_per_pixel(image_type))
        }
        HduInfo::ImageInfo { shape, .. } => {
            return Err(AppError::io(format!(
                "Invalid FITS '{}': expected a 2D image, got {} axes.",
                path.display(),
                shape.len()
            )));
        }
        _ => {
            return Err(AppError::io(format!(
                "Invalid FITS '{}': the primary HDU is not an image.",
                path.display()
            )));
        }
    };
    check_data_unit(path, width, height, pixel_bytes)?;

    let pixels: Vec<f64> = hdu.read_image(&mut fptr).map_err(invalid)?;
    let data = Array2::from_shape_vec((height, width), pixels)
        .map_err(|e| AppError::io(format!("Invalid FITS '{}': {e}", path.display())))?;
    let header = read_header(&mut fptr, path)?;
    Ok((data, header))
}

fn bytes_per_pixel(image_type: &ImageType) -> u64 {
    match image_type {
        ImageType::UnsignedByte | ImageType::Byte => 1,
        ImageType::Short | ImageType::UnsignedShort => 2,
        ImageType::Long | ImageType::UnsignedLong | ImageType::Float => 4,
        ImageType::LongLong | ImageType::Double => 8,
    }
}

/// Reject axes the file cannot actually hold before cfitsio allocates for them.
fn check_data_unit(path: &Path, width: usize, height: usize, pixel_bytes: u64) -> Result<(), AppError> {
    let declared = (width as u64)
        .checked_mul(height as u64)
        .and_then(|n| n.checked_mul(pixel_bytes))
        .filter(|&n| n > 0);
    let compressed = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e, "gz" | "Z" | "bz2" | "fz"));
    let available = std::fs::metadata(path)
        .map_err(|e| AppError::io(format!("Failed to stat FITS '{}': {e}", path.display())))?
        .len();

    match declared {
        Some(bytes) if compressed || bytes <= available => Ok(()),
        _ => Err(AppError::io(format!(
            "Invalid FITS '{}': NAXIS1={width} NAXIS2={height} does not fit in a {available}-byte file.",
            path.display()
        ))),
    }
}

/// Every card of the current HDU, in file order.
fn read_header(fptr: &mut FitsFile, path: &Path) -> Result<FitsHeader, AppError> {
    let failed = |e: fitsio::errors::Error| AppError::io(format!("Failed to read header of '{}': {e}", path.display()));

    let mut status: c_int = 0;
    let mut count: c_int = 0;
    let mut more: c_int = 0;
    // SAFETY: `fptr` stays borrowed for the whole function, so the raw handle
    // is live; cfitsio only writes the three out-parameters.
    let raw = unsafe { fptr.as_raw() };
    unsafe { fitsio::sys::ffghsp(raw, &mut count, &mut more, &mut status) };
    check_status(status).map_err(failed)?;

    let mut header = FitsHeader::new();
    for n in 1..=count {
        let mut key = [0 as c_char; FLEN_CARD];
        let mut value = [0 as c_char; FLEN_CARD];
        let mut comment = [0 as c_char; FLEN_CARD];
        // SAFETY: each buffer is larger than the longest field cfitsio writes.
        unsafe {
            fitsio::sys::ffgkyn(
                raw,
                n,
                key.as_mut_ptr(),
                value.as_mut_ptr(),
                comment.as_mut_ptr(),
                &mut status,
            )
        };
        check_status(status).map_err(failed)?;

        let key = c_text(&key).trim().to_ascii_uppercase();
        let value = c_text(&value);
        let comment = c_text(&comment);
        let value = value.trim();

        if value.is_empty() {
            // Commentary cards carry their text in the comment field; other
            // keys with an undefined value are dropped.
            if matches!(key.as_str(), "COMMENT" | "HISTORY" | "") && !comment.trim().is_empty() {
                header.push_commentary(if key.is_empty() { "COMMENT" } else { &key }, comment.trim_end());
            }
            continue;
        }
        let comment = comment.trim();
        header.cards.push(HeaderCard {
            key,
            value: parse_value(value),
            comment: (!comment.is_empty()).then(|| comment.to_string()),
        });
    }
    Ok(header)
}

fn c_text(buf: &[c_char; FLEN_CARD]) -> String {
    // SAFETY: the buffer starts zeroed and cfitsio never fills its last byte.
    unsafe { CStr::from_ptr(buf.as_ptr()) }.to_string_lossy().into_owned()
}

/// Type a value field as cfitsio returns it (comment already split off).
fn parse_value(raw: &str) -> HeaderValue {
    if let Some(inner) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return HeaderValue::Str(inner.replace("''", "'").trim_end().to_string());
    }
    match raw {
        "T" => HeaderValue::Bool(true),
        "F" => HeaderValue::Bool(false),
        _ => {
            if let Ok(v) = raw.parse::<i64>() {
                HeaderValue::Int(v)
            } else if let Some(v) = parse_number(raw) {
                HeaderValue::Float(v)
            } else {
                HeaderValue::Str(raw.to_string())
            }
        }
    }
}

/// Parse a FITS number (accepts Fortran `D` exponents).
fn parse_number(token: &str) -> Option<f64> {
    token
        .replace(['D', 'd'], "E")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Write a 2D image as BITPIX -64, copying every non-structural card of `header`.
pub fn write_fits(path: &Path, data: &Array2<f64>, header: &FitsHeader) -> Result<(), AppError> {
    let failed = |e: fitsio::errors::Error| AppError::io(format!("Failed to write FITS '{}': {e}", path.display()));

    let (height, width) = data.dim();
    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions: &[height, width],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()
        .map_err(|e| AppError::io(format!("Failed to create FITS '{}': {e}", path.display())))?;
    let hdu = fptr.primary_hdu().map_err(failed)?;

    let pixels: Vec<f64> = data.iter().copied().collect();
    hdu.write_image(&mut fptr, &pixels).map_err(failed)?;

    for card in header.cards() {
        if STRUCTURAL_KEYS.contains(&card.key.as_str()) {
            continue;
        }
        if let HeaderValue::Commentary(text) = &card.value
            && BOILERPLATE.iter().any(|b| text.trim_start().starts_with(b))
        {
            continue;
        }
        write_card(&mut fptr, card).map_err(failed)?;
    }
    Ok(())
}

fn write_card(fptr: &mut FitsFile, card: &HeaderCard) -> Result<(), fitsio::errors::Error> {
    let key = c_string(&card.key);
    let comment = c_string(card.comment.as_deref().unwrap_or(""));
    let mut status: c_int = 0;

    // SAFETY: every pointer is a live `CString` for the duration of the call.
    unsafe {
        let raw = fptr.as_raw();
        match &card.value {
            HeaderValue::Str(s) => {
                let value = c_string(s);
                fitsio::sys::ffpkys(raw, key.as_ptr(), value.as_ptr(), comment.as_ptr(), &mut status)
            }
            HeaderValue::Int(v) => fitsio::sys::ffpkyj(raw, key.as_ptr(), *v, comment.as_ptr(), &mut status),
            // Negative decimals select G format with that many significant digits.
            HeaderValue::Float(v) => fitsio::sys::ffpkyd(raw, key.as_ptr(), *v, -15, comment.as_ptr(), &mut status),
            HeaderValue::Bool(b) => {
                fitsio::sys::ffpkyl(raw, key.as_ptr(), c_int::from(*b), comment.as_ptr(), &mut status)
            }
            HeaderValue::Commentary(text) => {
                let text = c_string(text);
                if card.key == "HISTORY" {
                    fitsio::sys::ffphis(raw, text.as_ptr(), &mut status)
                } else {
                    fitsio::sys::ffpcom(raw, text.as_ptr(), &mut status)
                }
            }
        }
    };
    check_status(status)
}

/// Header text never legitimately contains NUL; drop any that sneak in.
fn c_string(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("starcal_fits_{}_{name}", std::process::id()))
    }

    fn raw_card(key: &str, value: &str) -> String {
        format!("{:<80}", format!("{key:<8}= {value:>20}"))
    }

    /// A primary HDU built byte by byte, for headers no writer would produce.
    fn write_raw_fits(path: &Path, cards: &[String], data: &[u8]) {
        let mut bytes = cards.concat().into_bytes();
        bytes.extend(format!("{:<80}", "END").into_bytes());
        bytes.resize(bytes.len().div_ceil(2880) * 2880, b' ');
        let mut data = data.to_vec();
        data.resize(data.len().div_ceil(2880).max(1) * 2880, 0);
        bytes.extend(data);
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn header_values_are_typed() {
        assert_eq!(parse_value("120.5"), HeaderValue::Float(120.5));
        assert_eq!(parse_value("'Johnson V'"), HeaderValue::Str("Johnson V".to_string()));
        assert_eq!(parse_value("'O''Brien '"), HeaderValue::Str("O'Brien".to_string()));
        assert_eq!(parse_value("T"), HeaderValue::Bool(true));
        assert_eq!(parse_value("2"), HeaderValue::Int(2));
        assert_eq!(parse_value("1.5D-3"), HeaderValue::Float(1.5e-3));

        assert_eq!(HeaderValue::Str(" 1.23 ".into()).as_f64(), Some(1.23));
        assert_eq!(HeaderValue::Int(2).as_text().as_deref(), Some("2"));
    }

    #[test]
    fn write_then_read_preserves_pixels_and_cards() {
        let data = Array2::from_shape_fn((7, 5), |(r, c)| r as f64 * 10.0 + c as f64 + 0.25);
        let mut header = FitsHeader::new();
        header.set("EXPTIME", HeaderValue::Float(30.0), Some("s"));
        header.set("FILTER", HeaderValue::Str("V".into()), None);
        header.set("GAINMODE", HeaderValue::Int(2), None);
        header.set("BITPIX", HeaderValue::Int(16), None);
        header.push_commentary("HISTORY", "synthetic");

        let path = temp_path("roundtrip.fits");
        write_fits(&path, &data, &header).unwrap();
        let (back, back_header) = read_fits(&path).unwrap();

        // A second generation must not pile up cfitsio's own comments.
        let again = temp_path("roundtrip2.fits");
        write_fits(&again, &back, &back_header).unwrap();
        let (_, third) = read_fits(&again).unwrap();
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&again);

        assert_eq!(back.dim(), (7, 5));
        assert_eq!(back[[3, 2]], 32.25);
        assert_eq!(back_header.get_f64("EXPTIME"), Some(30.0));
        assert_eq!(back_header.get_text("filter").as_deref(), Some("V"));
        assert_eq!(back_header.get("GAINMODE"), Some(&HeaderValue::Int(2)));
        assert_eq!(back_header.get_f64("BITPIX"), Some(-64.0));
        assert!(back_header.cards().iter().any(|c| c.key == "HISTORY"));
        assert_eq!(
            third.cards().iter().filter(|c| c.key == "COMMENT").count(),
            back_header.cards().iter().filter(|c| c.key == "COMMENT").count()
        );
    }

    #[test]
    fn integer_data_is_scaled() {
        let path = temp_path("scaled.fits");
        let cards = [
            raw_card("SIMPLE", "T"),
            raw_card("BITPIX", "16"),
            raw_card("NAXIS", "2"),
            raw_card("NAXIS1", "2"),
            raw_card("NAXIS2", "1"),
            raw_card("BZERO", "32768.0"),
        ];
        let mut data = Vec::new();
        data.extend_from_slice(&(-32768i16).to_be_bytes());
        data.extend_from_slice(&100i16.to_be_bytes());
        write_raw_fits(&path, &cards, &data);

        let (image, _) = read_fits(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(image[[0, 0]], 0.0);
        assert_eq!(image[[0, 1]], 32868.0);
    }

    #[test]
    fn axes_larger_than_the_file_are_rejected() {
        let path = temp_path("huge.fits");
        let cards = [
            raw_card("SIMPLE", "T"),
            raw_card("BITPIX", "-64"),
            raw_card("NAXIS", "2"),
            raw_card("NAXIS1", "100000"),
            raw_card("NAXIS2", "100000"),
        ];
        write_raw_fits(&path, &cards, &[]);
        let err = read_fits(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn negative_axes_are_rejected() {
        let path = temp_path("negative.fits");
        let cards = [
            raw_card("SIMPLE", "T"),
            raw_card("BITPIX", "16"),
            raw_card("NAXIS", "2"),
            raw_card("NAXIS1", "-4"),
            raw_card("NAXIS2", "4"),
        ];
        write_raw_fits(&path, &cards, &[0; 32]);
        let err = read_fits(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_fits(&temp_path("absent.fits")).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
