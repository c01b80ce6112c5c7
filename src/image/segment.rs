//! Binary segmentation helpers: connected-component labeling and dilation.

use ndarray::Array2;

/// 8-connected neighbor offsets `(dy, dx)`.
const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Label 8-connected regions of `true` pixels.
///
/// Returns the label image (0 = background, labels start at 1) and the pixel
/// count of each label (`sizes[label - 1]`).
pub fn label_components(mask: &Array2<bool>) -> (Array2<usize>, Vec<usize>) {
    let (height, width) = mask.dim();
    let mut labels = Array2::<usize>::zeros((height, width));
    let mut sizes = Vec::new();
    let mut stack = Vec::new();

    for row in 0..height {
        for col in 0..width {
            if !mask[[row, col]] || labels[[row, col]] != 0 {
                continue;
            }
            let label = sizes.len() + 1;
            let mut count = 0usize;
            labels[[row, col]] = label;
            stack.push((row, col));

            while let Some((r, c)) = stack.pop() {
                count += 1;
                for (dy, dx) in NEIGHBORS {
                    let nr = r as isize + dy;
                    let nc = c as isize + dx;
                    if nr < 0 || nc < 0 || nr >= height as isize || nc >= width as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if mask[[nr, nc]] && labels[[nr, nc]] == 0 {
                        labels[[nr, nc]] = label;
                        stack.push((nr, nc));
                    }
                }
            }
            sizes.push(count);
        }
    }

    (labels, sizes)
}

/// Keep only regions with at least `min_pixels` pixels.
pub fn filter_small_regions(mask: &Array2<bool>, min_pixels: usize) -> Array2<bool> {
    let (labels, sizes) = label_components(mask);
    labels.mapv(|label| label != 0 && sizes[label - 1] >= min_pixels)
}

/// Dilate `mask` with a circular footprint of the given radius (pixels).
pub fn dilate_circular(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    let (height, width) = mask.dim();
    let r = radius as isize;
    let footprint: Vec<(isize, isize)> = (-r..=r)
        .flat_map(|dy| (-r..=r).map(move |dx| (dy, dx)))
        .filter(|&(dy, dx)| dy * dy + dx * dx <= r * r)
        .collect();

    let mut out = Array2::from_elem((height, width), false);
    for ((row, col), &set) in mask.indexed_iter() {
        if !set || !is_boundary(mask, row, col) {
            continue;
        }
        for &(dy, dx) in &footprint {
            let nr = row as isize + dy;
            let nc = col as isize + dx;
            if nr >= 0 && nc >= 0 && nr < height as isize && nc < width as isize {
                out[[nr as usize, nc as usize]] = true;
            }
        }
    }
    // Interior pixels are covered by their own membership.
    out.zip_mut_with(mask, |o, &m| *o |= m);
    out
}

/// A set pixel with at least one unset (or off-frame) 8-neighbor.
fn is_boundary(mask: &Array2<bool>, row: usize, col: usize) -> bool {
    let (height, width) = mask.dim();
    NEIGHBORS.iter().any(|&(dy, dx)| {
        let nr = row as isize + dy;
        let nc = col as isize + dx;
        nr < 0 || nc < 0 || nr >= height as isize || nc >= width as isize || !mask[[nr as usize, nc as usize]]
    })
}
