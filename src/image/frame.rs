//! Calibrated image: pixels + header + world-coordinate transform.

use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::AppError;
use crate::image::wcs::TanWcs;
use crate::io::fits::{FitsHeader, HeaderValue, read_fits, write_fits};

/// An immutable image. Derived images (e.g. sky-subtracted) are new values.
#[derive(Debug, Clone)]
pub struct Image {
    pub data: Array2<f64>,
    pub header: FitsHeader,
    /// `None` when the header carries no usable TAN WCS.
    pub wcs: Option<TanWcs>,
}

impl Image {
    pub fn new(data: Array2<f64>, header: FitsHeader) -> Self {
        let wcs = match TanWcs::from_header(&header) {
            Ok(wcs) => Some(wcs),
            Err(err) => {
                log::debug!("No WCS on image: {err}");
                None
            }
        };
        Self { data, header, wcs }
    }

    /// Load the primary HDU of a FITS file.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let (data, header) = read_fits(path)?;
        log::debug!("Loaded {} ({}x{})", path.display(), data.ncols(), data.nrows());
        Ok(Self::new(data, header))
    }

    /// The WCS, or a configuration error naming what is missing.
    pub fn require_wcs(&self) -> Result<&TanWcs, AppError> {
        match &self.wcs {
            Some(wcs) => Ok(wcs),
            None => Err(TanWcs::from_header(&self.header)
                .err()
                .unwrap_or_else(|| AppError::config("Image header has no usable WCS."))),
        }
    }

    /// A copy with `level` subtracted from every pixel; the header gains `SKYSUB`.
    pub fn subtract_sky(&self, level: f64) -> Image {
        let mut header = self.header.clone();
        header.set("SKYSUB", HeaderValue::Float(level), Some("sky median subtracted [ADU]"));
        Image {
            data: self.data.mapv(|v| v - level),
            header,
            wcs: self.wcs.clone(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        write_fits(path, &self.data, &self.header)
    }
}

/// Default location of the sky-subtracted artifact: `<stem>_bkg.fits` beside the input.
pub fn default_bkg_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    image_path.with_file_name(format!("{stem}_bkg.fits"))
}
