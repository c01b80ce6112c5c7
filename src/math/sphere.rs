//! Great-circle geometry on the celestial sphere (angles in degrees).

use nalgebra::Vector3;

/// Unit vector for a (ra, dec) direction.
pub fn unit_vector(ra_deg: f64, dec_deg: f64) -> Vector3<f64> {
    let ra = ra_deg.to_radians();
    let dec = dec_deg.to_radians();
    Vector3::new(dec.cos() * ra.cos(), dec.cos() * ra.sin(), dec.sin())
}

/// Angular separation (degrees), Vincenty form: stable at all separations.
pub fn angular_separation(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (sd1, cd1) = dec1.to_radians().sin_cos();
    let (sd2, cd2) = dec2.to_radians().sin_cos();
    let (sdra, cdra) = (ra2 - ra1).to_radians().sin_cos();

    let num1 = cd2 * sdra;
    let num2 = cd1 * sd2 - sd1 * cd2 * cdra;
    let denom = sd1 * sd2 + cd1 * cd2 * cdra;
    num1.hypot(num2).atan2(denom).to_degrees()
}

/// Straight-line distance between the two unit vectors.
pub fn chord_distance(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    (unit_vector(ra1, dec1) - unit_vector(ra2, dec2)).norm()
}
