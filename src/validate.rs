//! Screening of unusable frames.
//!
//! A camera that has lost its signal typically produces one
//! of two things: a solid "no signal" screen (blue or black),
//! or analogue snow. Both are caught here before detection
//! runs on them.

use serde_derive::*;

use crate::filters::{histogram_peak_ratio, laplacian, variance};
use crate::frame::Frame;

/// Thresholds of the validity checks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ValidatorParams {
    /// Solid colours a dead feed shows, as `[r, g, b]`.
    pub blank_colors: Vec<[f64; 3]>,
    /// Largest per-channel difference still counted as a
    /// blank colour.
    pub color_tolerance: f64,
    /// Frames with at least this share of blank pixels are
    /// rejected.
    pub max_blank_fraction: f64,
    pub histogram_bins: usize,
    pub max_laplacian_variance: f64,
    pub min_peak_ratio: f64,
}

impl Default for ValidatorParams {
    fn default() -> Self {
        ValidatorParams {
            blank_colors: vec![[0., 0., 255.], [0., 0., 0.]],
            color_tolerance: 30.,
            max_blank_fraction: 0.98,
            histogram_bins: 32,
            max_laplacian_variance: 1000.,
            min_peak_ratio: 0.1,
        }
    }
}

/// Outcome of screening a frame.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FrameVerdict {
    Valid,
    /// Zero width or height.
    Empty,
    /// Dominated by a blank colour.
    Blank { fraction: f64 },
    /// High-frequency noise with a flat histogram.
    Static {
        laplacian_variance: f64,
        peak_ratio: f64,
    },
}

impl FrameVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, FrameVerdict::Valid)
    }
}

/// Run all checks, reporting the first that fails.
pub fn classify(frame: &Frame, params: &ValidatorParams) -> FrameVerdict {
    if frame.is_empty() {
        return FrameVerdict::Empty;
    }

    let fraction = blank_fraction(frame, params);
    if fraction >= params.max_blank_fraction {
        return FrameVerdict::Blank { fraction };
    }

    let intensity = frame.intensity();
    let laplacian_variance = variance(&laplacian(&intensity));
    let peak_ratio = histogram_peak_ratio(&intensity, params.histogram_bins);
    if laplacian_variance > params.max_laplacian_variance && peak_ratio < params.min_peak_ratio {
        return FrameVerdict::Static {
            laplacian_variance,
            peak_ratio,
        };
    }

    FrameVerdict::Valid
}

/// Whether `frame` is usable for detection. Empty frames are
/// never valid.
pub fn validate(frame: &Frame, params: &ValidatorParams) -> bool {
    classify(frame, params).is_valid()
}

fn blank_fraction(frame: &Frame, params: &ValidatorParams) -> f64 {
    if params.blank_colors.is_empty() {
        return 0.;
    }
    let (ht, wid) = (frame.height(), frame.width());
    let near = |px: &[f64; 3], color: &[f64; 3]| {
        px.iter()
            .zip(color.iter())
            .all(|(a, b)| (a - b).abs() <= params.color_tolerance)
    };
    let blank = itertools::iproduct!(0..ht, 0..wid)
        .filter(|&(row, col)| {
            let px = frame.rgb_at(row, col);
            params.blank_colors.iter().any(|c| near(&px, c))
        })
        .count();
    blank as f64 / (ht * wid) as f64
}
