//! Small image kernels shared by the frame validator and the
//! hotspot detector.
//!
//! Everything here works on `(row, col)` indexed `ndarray`s.
//! Borders are handled by clamping (replicating the edge
//! sample) for convolutions, and by ignoring out-of-image
//! neighbours for morphology.

use itertools::iproduct;
use ndarray::{Array1, Array2, Zip};

/// Normalized 1-D Gaussian kernel of `2 * radius + 1` taps.
pub fn gaussian_kernel(sigma: f64, radius: usize) -> Array1<f64> {
    let r = radius as isize;
    let raw = Array1::from_iter((-r..=r).map(|x| {
        let x = x as f64;
        (-(x * x) / (2. * sigma * sigma)).exp()
    }));
    let sum = raw.sum();
    raw / sum
}

/// Separable Gaussian smoothing. A non-positive `sigma` or a
/// zero `radius` returns the input unchanged.
pub fn gaussian_blur(image: &Array2<f64>, sigma: f64, radius: usize) -> Array2<f64> {
    if sigma <= 0. || radius == 0 || image.is_empty() {
        return image.clone();
    }
    let kernel = gaussian_kernel(sigma, radius);
    let (ht, wid) = image.dim();
    let r = radius as isize;

    let clamp = |v: isize, len: usize| v.max(0).min(len as isize - 1) as usize;

    let horizontal: Array2<f64> = Array2::from_shape_fn((ht, wid), |(row, col)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * image[(row, clamp(col as isize + k as isize - r, wid))])
            .sum::<f64>()
    });
    Array2::from_shape_fn((ht, wid), |(row, col)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * horizontal[(clamp(row as isize + k as isize - r, ht), col)])
            .sum::<f64>()
    })
}

/// `q`-th percentile (`0..=100`) of the samples with linear
/// interpolation between the closest ranks. Returns `None`
/// for an empty image.
pub fn percentile(image: &Array2<f64>, q: f64) -> Option<f64> {
    if image.is_empty() {
        return None;
    }
    let mut values: Vec<f64> = image.iter().copied().collect();
    values.sort_by(|a, b| a.total_cmp(b));

    let q = q.max(0.).min(100.);
    let rank = q / 100. * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

/// Mask of samples strictly above `threshold`.
pub fn threshold(image: &Array2<f64>, threshold: f64) -> Array2<bool> {
    image.mapv(|v| v > threshold)
}

fn morph(mask: &Array2<bool>, size: usize, keep_if_all: bool) -> Array2<bool> {
    let (ht, wid) = mask.dim();
    let before = (size as isize - 1) / 2;
    let after = size as isize - 1 - before;
    Array2::from_shape_fn((ht, wid), |(row, col)| {
        let mut window = iproduct!(-before..=after, -before..=after).filter_map(|(dr, dc)| {
            let r = row as isize + dr;
            let c = col as isize + dc;
            if r < 0 || c < 0 || r >= ht as isize || c >= wid as isize {
                None
            } else {
                Some(mask[(r as usize, c as usize)])
            }
        });
        if keep_if_all {
            window.all(|v| v)
        } else {
            window.any(|v| v)
        }
    })
}

/// Erosion with a `size x size` square structuring element.
pub fn erode(mask: &Array2<bool>, size: usize) -> Array2<bool> {
    if size <= 1 {
        return mask.clone();
    }
    morph(mask, size, true)
}

/// Dilation with a `size x size` square structuring element.
pub fn dilate(mask: &Array2<bool>, size: usize) -> Array2<bool> {
    if size <= 1 {
        return mask.clone();
    }
    morph(mask, size, false)
}

/// Morphological opening (erosion followed by dilation).
/// Removes specks smaller than the structuring element while
/// leaving compact blobs in place.
pub fn open(mask: &Array2<bool>, size: usize) -> Array2<bool> {
    dilate(&erode(mask, size), size)
}

/// Response of the 4-neighbour Laplacian kernel
/// `[0 1 0; 1 -4 1; 0 1 0]`, clamped at the borders.
pub fn laplacian(image: &Array2<f64>) -> Array2<f64> {
    let (ht, wid) = image.dim();
    let at = |r: isize, c: isize| {
        let r = r.max(0).min(ht as isize - 1) as usize;
        let c = c.max(0).min(wid as isize - 1) as usize;
        image[(r, c)]
    };
    Array2::from_shape_fn((ht, wid), |(row, col)| {
        let (r, c) = (row as isize, col as isize);
        at(r - 1, c) + at(r + 1, c) + at(r, c - 1) + at(r, c + 1) - 4. * at(r, c)
    })
}

/// Population variance of all samples; `0` if empty.
pub fn variance(image: &Array2<f64>) -> f64 {
    if image.is_empty() {
        return 0.;
    }
    let n = image.len() as f64;
    let mean = image.sum() / n;
    image.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

/// Share of samples falling in the fullest of `bins` equal
/// buckets spanning the image's own `[min, max]` range. A
/// constant image has a ratio of `1`.
pub fn histogram_peak_ratio(image: &Array2<f64>, bins: usize) -> f64 {
    if image.is_empty() || bins == 0 {
        return 0.;
    }
    let (min, max) = image
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = max - min;
    if span <= 0. {
        return 1.;
    }
    let mut counts = vec![0usize; bins];
    for v in image.iter() {
        let bin = (((v - min) / span) * bins as f64) as usize;
        counts[bin.min(bins - 1)] += 1;
    }
    let peak = counts.into_iter().max().unwrap_or(0);
    peak as f64 / image.len() as f64
}

/// Mean of `image` over the `true` samples of `mask`.
pub fn masked_mean(image: &Array2<f64>, mask: &Array2<bool>) -> Option<f64> {
    let mut sum = 0.;
    let mut count = 0usize;
    Zip::from(image).and(mask).for_each(|&v, &m| {
        if m {
            sum += v;
            count += 1;
        }
    });
    (count > 0).then(|| sum / count as f64)
}

/// Bilinear sample at fractional `(x, y) = (col, row)`.
/// `None` outside the image.
pub fn bilinear(image: &Array2<f64>, x: f64, y: f64) -> Option<f64> {
    let (ht, wid) = image.dim();
    if ht == 0 || wid == 0 {
        return None;
    }
    if x < 0. || y < 0. || x > (wid - 1) as f64 || y > (ht - 1) as f64 {
        return None;
    }
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(wid - 1);
    let y1 = (y0 + 1).min(ht - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;
    let top = image[(y0, x0)] * (1. - fx) + image[(y0, x1)] * fx;
    let bottom = image[(y1, x0)] * (1. - fx) + image[(y1, x1)] * fx;
    Some(top * (1. - fy) + bottom * fy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(1.0, 2);
        assert_eq!(k.len(), 5);
        assert_abs_diff_eq!(k.sum(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(k[0], k[4]);
        assert!(k[2] > k[1]);
    }

    #[test]
    fn blur_preserves_constant_images() {
        let img = Array2::from_elem((7, 9), 42.);
        let out = gaussian_blur(&img, 1.0, 2);
        for v in out.iter() {
            assert_abs_diff_eq!(*v, 42., epsilon = 1e-9);
        }
    }

    #[test]
    fn blur_of_impulse_is_kernel_product() {
        let mut img = Array2::zeros((9, 9));
        img[(4, 4)] = 1.;
        let out = gaussian_blur(&img, 1.0, 2);
        let k = gaussian_kernel(1.0, 2);
        for (r, c) in iproduct!(0..5, 0..5) {
            assert_abs_diff_eq!(out[(r + 2, c + 2)], k[r] * k[c], epsilon = 1e-12);
        }
        assert_abs_diff_eq!(out[(0, 0)], 0.);
        assert_abs_diff_eq!(out.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn percentile_interpolates() {
        let img = array![[1., 2.], [3., 4.]];
        assert_abs_diff_eq!(percentile(&img, 0.).unwrap(), 1.);
        assert_abs_diff_eq!(percentile(&img, 100.).unwrap(), 4.);
        assert_abs_diff_eq!(percentile(&img, 50.).unwrap(), 2.5);
        assert!(percentile(&Array2::zeros((0, 3)), 50.).is_none());
    }

    #[test]
    fn opening_removes_specks_keeps_blobs() {
        let mut mask = Array2::from_elem((12, 12), false);
        mask[(1, 1)] = true;
        for (r, c) in iproduct!(5..9, 5..9) {
            mask[(r, c)] = true;
        }
        let opened = open(&mask, 3);
        assert!(!opened[(1, 1)]);
        assert_eq!(opened.iter().filter(|v| **v).count(), 16);
        assert!(opened[(5, 5)] && opened[(8, 8)]);
    }

    #[test]
    fn laplacian_of_flat_is_zero() {
        let lap = laplacian(&Array2::from_elem((5, 5), 3.));
        assert!(lap.iter().all(|v| *v == 0.));
        assert_abs_diff_eq!(variance(&lap), 0.);
    }

    #[test]
    fn peak_ratio() {
        assert_abs_diff_eq!(histogram_peak_ratio(&Array2::from_elem((3, 3), 5.), 16), 1.);
        let img = array![[0., 1.], [2., 3.]];
        assert_abs_diff_eq!(histogram_peak_ratio(&img, 4), 0.25);
    }

    #[test]
    fn bilinear_midpoint() {
        let img = array![[0., 10.], [20., 30.]];
        assert_abs_diff_eq!(bilinear(&img, 0.5, 0.5).unwrap(), 15.);
        assert!(bilinear(&img, 1.5, 0.).is_none());
    }
}
