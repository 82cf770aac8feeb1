//! Radial intensity decay around a candidate centroid.
//!
//! A compact heat source falls off quickly in every
//! direction, while a bright patch that is part of a larger
//! warm region stays flat along at least some rays.

use ndarray::Array2;
use serde_derive::*;

use crate::filters::bilinear;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RadialDecayParams {
    /// Number of rays, evenly spread over the full circle.
    pub rays: usize,
    /// Ray length in pixels.
    pub radius: f64,
    /// Minimum fitted decay rate (per pixel) for a ray to
    /// count as decaying.
    pub min_decay_rate: f64,
}

impl Default for RadialDecayParams {
    fn default() -> Self {
        RadialDecayParams {
            rays: 8,
            radius: 8.,
            min_decay_rate: 0.05,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RadialDecay {
    /// Fitted rate per ray; `0` where the fit failed.
    pub rates: Vec<f64>,
    pub passed: bool,
}

impl RadialDecay {
    pub fn mean_rate(&self) -> f64 {
        if self.rates.is_empty() {
            return 0.;
        }
        self.rates.iter().sum::<f64>() / self.rates.len() as f64
    }
}

/// Sample rays from `center = (x, y)`, normalize each by its
/// own peak and fit `y = A·exp(-k·r)`. Passes if a strict
/// majority of rays has `k >= min_decay_rate`.
pub fn radial_decay(image: &Array2<f64>, center: (f64, f64), params: &RadialDecayParams) -> RadialDecay {
    let rates: Vec<f64> = (0..params.rays)
        .map(|i| {
            let theta = 2. * std::f64::consts::PI * i as f64 / params.rays as f64;
            let profile = sample_ray(image, center, theta, params.radius);
            fit_decay_rate(&profile).unwrap_or(0.)
        })
        .collect();
    let decaying = rates.iter().filter(|k| **k >= params.min_decay_rate).count();
    RadialDecay {
        passed: decaying * 2 > params.rays,
        rates,
    }
}

/// `(r, intensity)` samples at unit steps along a ray,
/// stopping at the image border.
fn sample_ray(image: &Array2<f64>, (cx, cy): (f64, f64), theta: f64, radius: f64) -> Vec<(f64, f64)> {
    let (dx, dy) = (theta.cos(), theta.sin());
    let steps = radius.max(0.).floor() as usize;
    (0..=steps)
        .map_while(|s| {
            let r = s as f64;
            bilinear(image, cx + r * dx, cy + r * dy).map(|v| (r, v))
        })
        .collect()
}

/// Log-linear least-squares fit of an exponential decay to a
/// profile normalized by its peak. `None` when the profile is
/// too short, the peak is not positive, or any sample is not
/// positive.
fn fit_decay_rate(profile: &[(f64, f64)]) -> Option<f64> {
    if profile.len() < 3 {
        return None;
    }
    let peak = profile.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);
    if !(peak > 0.) {
        return None;
    }
    let points: Vec<(f64, f64)> = profile
        .iter()
        .map(|&(r, v)| {
            let norm = v / peak;
            (norm > 0.).then(|| (r, norm.ln()))
        })
        .collect::<Option<_>>()?;

    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0., 0.), |(sx, sy), (x, y)| (sx + x, sy + y));
    let (mx, my) = (sx / n, sy / n);
    let (sxy, sxx) = points.iter().fold((0., 0.), |(sxy, sxx), (x, y)| {
        (sxy + (x - mx) * (y - my), sxx + (x - mx) * (x - mx))
    });
    if sxx <= 0. {
        return None;
    }
    let rate = -sxy / sxx;
    rate.is_finite().then(|| rate)
}
