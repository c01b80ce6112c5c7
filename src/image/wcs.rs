//! Gnomonic (TAN) world-coordinate transform.
//!
//! Pixel coordinates are 0-based `(x = column, y = row)`; FITS reference pixels
//! are 1-based, so `p_fits = p + 1`. The linear part maps pixel offsets to
//! intermediate world coordinates (degrees) through the CD matrix, which is
//! read either directly (`CDi_j`) or built from `CDELTi` with `PCi_j` or
//! `CROTA2`.

use nalgebra::{Matrix2, Vector2};

use crate::error::AppError;
use crate::io::fits::{FitsHeader, HeaderValue};

#[derive(Debug, Clone, PartialEq)]
pub struct TanWcs {
    /// Reference pixel (1-based FITS convention).
    pub crpix: [f64; 2],
    /// Sky coordinates of the reference pixel (degrees).
    pub crval: [f64; 2],
    /// Pixel → intermediate world coordinates (degrees per pixel).
    pub cd: Matrix2<f64>,
    cd_inv: Matrix2<f64>,
}

impl TanWcs {
    pub fn new(crpix: [f64; 2], crval: [f64; 2], cd: Matrix2<f64>) -> Result<Self, AppError> {
        let cd_inv = cd
            .try_inverse()
            .ok_or_else(|| AppError::config("WCS CD matrix is singular."))?;
        Ok(Self { crpix, crval, cd, cd_inv })
    }

    /// North-up, east-left WCS with `(ra, dec)` at 0-based pixel `(x, y)`.
    pub fn north_up(x: f64, y: f64, ra: f64, dec: f64, plate_scale_arcsec: f64) -> Result<Self, AppError> {
        let scale = plate_scale_arcsec / 3600.0;
        Self::new([x + 1.0, y + 1.0], [ra, dec], Matrix2::new(-scale, 0.0, 0.0, scale))
    }

    /// Build the transform from header keywords.
    pub fn from_header(header: &FitsHeader) -> Result<Self, AppError> {
        for key in ["CTYPE1", "CTYPE2"] {
            if let Some(ctype) = header.get_text(key) {
                if !ctype.to_ascii_uppercase().ends_with("-TAN") {
                    return Err(AppError::config(format!(
                        "Unsupported projection {key} = '{ctype}' (only TAN is supported)."
                    )));
                }
            }
        }

        let required = |key: &str| {
            header
                .get_f64(key)
                .ok_or_else(|| AppError::config(format!("Image header has no usable WCS: missing `{key}`.")))
        };
        let crpix = [required("CRPIX1")?, required("CRPIX2")?];
        let crval = [required("CRVAL1")?, required("CRVAL2")?];

        let cd_keys = ["CD1_1", "CD1_2", "CD2_1", "CD2_2"];
        let cd = if cd_keys.iter().any(|k| header.get(k).is_some()) {
            let v = |k: &str| header.get_f64(k).unwrap_or(0.0);
            Matrix2::new(v("CD1_1"), v("CD1_2"), v("CD2_1"), v("CD2_2"))
        } else {
            let cdelt1 = required("CDELT1")?;
            let cdelt2 = required("CDELT2")?;
            let pc_keys = ["PC1_1", "PC1_2", "PC2_1", "PC2_2"];
            let pc = if pc_keys.iter().any(|k| header.get(k).is_some()) {
                let v = |k: &str, d: f64| header.get_f64(k).unwrap_or(d);
                Matrix2::new(v("PC1_1", 1.0), v("PC1_2", 0.0), v("PC2_1", 0.0), v("PC2_2", 1.0))
            } else {
                let rho = header.get_f64("CROTA2").unwrap_or(0.0).to_radians();
                let (s, c) = rho.sin_cos();
                Matrix2::new(c, -s * cdelt2 / cdelt1, s * cdelt1 / cdelt2, c)
            };
            Matrix2::from_diagonal(&Vector2::new(cdelt1, cdelt2)) * pc
        };

        Self::new(crpix, crval, cd)
    }

    /// Write the transform as `CTYPE`/`CRPIX`/`CRVAL`/`CD` cards.
    pub fn write_header(&self, header: &mut FitsHeader) {
        header.set("CTYPE1", HeaderValue::Str("RA---TAN".into()), None);
        header.set("CTYPE2", HeaderValue::Str("DEC--TAN".into()), None);
        header.set("CRPIX1", HeaderValue::Float(self.crpix[0]), None);
        header.set("CRPIX2", HeaderValue::Float(self.crpix[1]), None);
        header.set("CRVAL1", HeaderValue::Float(self.crval[0]), None);
        header.set("CRVAL2", HeaderValue::Float(self.crval[1]), None);
        header.set("CD1_1", HeaderValue::Float(self.cd[(0, 0)]), None);
        header.set("CD1_2", HeaderValue::Float(self.cd[(0, 1)]), None);
        header.set("CD2_1", HeaderValue::Float(self.cd[(1, 0)]), None);
        header.set("CD2_2", HeaderValue::Float(self.cd[(1, 1)]), None);
    }

    /// 0-based pixel → (ra, dec) in degrees.
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> (f64, f64) {
        let offset = Vector2::new(x + 1.0 - self.crpix[0], y + 1.0 - self.crpix[1]);
        let world = self.cd * offset;
        let xi = world.x.to_radians();
        let eta = world.y.to_radians();

        let ra0 = self.crval[0].to_radians();
        let (sd0, cd0) = self.crval[1].to_radians().sin_cos();

        let denom = cd0 - eta * sd0;
        let ra = ra0 + xi.atan2(denom);
        let dec = (sd0 + eta * cd0).atan2(xi.hypot(denom));

        (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }

    /// (ra, dec) in degrees → 0-based pixel; `None` on the far hemisphere.
    pub fn sky_to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let (sd, cd) = dec.to_radians().sin_cos();
        let (sd0, cd0) = self.crval[1].to_radians().sin_cos();
        let (sdra, cdra) = (ra - self.crval[0]).to_radians().sin_cos();

        let denom = sd * sd0 + cd * cd0 * cdra;
        if denom <= 0.0 {
            return None;
        }
        let xi = (cd * sdra / denom).to_degrees();
        let eta = ((sd * cd0 - cd * sd0 * cdra) / denom).to_degrees();

        let pixel = self.cd_inv * Vector2::new(xi, eta);
        Some((pixel.x + self.crpix[0] - 1.0, pixel.y + self.crpix[1] - 1.0))
    }
}
