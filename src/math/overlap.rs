//! Exact area of overlap between a circle and an axis-aligned rectangle.
//!
//! Used for fractional pixel weights in aperture photometry. Coordinates are
//! relative to the circle center. The area above a horizontal line `y = h`
//! (`h >= 0`) is integrated analytically:
//!
//! ```text
//! ∫ (sqrt(r² - x²) - h) dx = ½ (x·sqrt(r² - x²) + r²·asin(x/r)) - h·x
//! ```
//!
//! and rectangles straddling the x-axis are split into mirrored halves.

/// Half-width of the circle's chord at height `h`.
fn chord_half_width(h: f64, r: f64) -> f64 {
    if h < r { (r * r - h * h).sqrt() } else { 0.0 }
}

/// Antiderivative of `sqrt(r² - x²) - h`.
fn segment_integral(x: f64, h: f64, r: f64) -> f64 {
    let ratio = (x / r).clamp(-1.0, 1.0);
    0.5 * (x * (r * r - x * x).max(0.0).sqrt() + r * r * ratio.asin()) - h * x
}

/// Area of the circle above `y = h` between `x0 < x1`, for `h >= 0`.
fn area_above(x0: f64, x1: f64, h: f64, r: f64) -> f64 {
    let s = chord_half_width(h, r);
    let a = x0.clamp(-s, s);
    let b = x1.clamp(-s, s);
    segment_integral(b, h, r) - segment_integral(a, h, r)
}

/// Area of the circle inside `[x0, x1] × [y0, y1]` with `0 <= y0 <= y1`.
fn area_upper(x0: f64, x1: f64, y0: f64, y1: f64, r: f64) -> f64 {
    area_above(x0, x1, y0, r) - area_above(x0, x1, y1, r)
}

/// Area of intersection between the circle of radius `r` centered at the
/// origin and the rectangle `[x0, x1] × [y0, y1]`.
pub fn circle_rect_overlap(x0: f64, x1: f64, y0: f64, y1: f64, r: f64) -> f64 {
    if r <= 0.0 || x1 <= x0 || y1 <= y0 {
        return 0.0;
    }
    let area = if y0 >= 0.0 {
        area_upper(x0, x1, y0, y1, r)
    } else if y1 <= 0.0 {
        area_upper(x0, x1, -y1, -y0, r)
    } else {
        area_upper(x0, x1, 0.0, -y0, r) + area_upper(x0, x1, 0.0, y1, r)
    };
    area.max(0.0)
}

/// Fraction of the unit pixel centered at `(px, py)` covered by the circle of
/// radius `r` centered at `(cx, cy)`.
pub fn pixel_coverage(px: f64, py: f64, cx: f64, cy: f64, r: f64) -> f64 {
    let dx = px - cx;
    let dy = py - cy;
    let reach = r + std::f64::consts::FRAC_1_SQRT_2;
    if dx * dx + dy * dy > reach * reach {
        return 0.0;
    }
    circle_rect_overlap(dx - 0.5, dx + 0.5, dy - 0.5, dy + 0.5, r).min(1.0)
}
