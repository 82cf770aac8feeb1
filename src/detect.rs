//! Hotspot detection on a single thermal frame.
//!
//! The detector is a pure function of the frame and a
//! [`DetectorParams`]:
//!
//! 1. collapse to intensity and apply a light Gaussian blur
//!    (hotspots are only a few pixels wide, so the kernel is
//!    kept small);
//! 2. pick a threshold, by default a high percentile of the
//!    frame's own distribution so it adapts to the ambient
//!    range;
//! 3. threshold and open the mask to drop single-pixel noise;
//! 4. trace the external contour of every blob;
//! 5. keep blobs passing the area, circularity, local contrast
//!    and (optionally) radial decay checks, in that order.

use anyhow::{ensure, Result};
use log::{debug, trace};
use ndarray::{s, Array2};
use serde_derive::*;

use crate::{
    contour::{find_blobs, Blob, Point, Shape},
    filters::{dilate, gaussian_blur, masked_mean, open, percentile, threshold},
    frame::Frame,
    radial::{radial_decay, RadialDecayParams},
};

/// How the binarization threshold is chosen.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Threshold at [`DetectorParams::intensity_percentile`].
    Percentile,
    /// Fixed intensity threshold.
    Fixed { value: f64 },
    /// Raise the percentile from
    /// [`DetectorParams::intensity_percentile`] up to
    /// `max_percentile` by `step`, and keep the highest level
    /// that still yields a candidate. Trades recall for
    /// stability when the ambient temperature drifts.
    Sweep { max_percentile: f64, step: f64 },
}

impl Default for ThresholdMode {
    fn default() -> Self {
        ThresholdMode::Percentile
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorParams {
    pub mode: ThresholdMode,
    /// Percentile (`0..=100`) of the blurred frame used as the
    /// threshold.
    pub intensity_percentile: f64,
    /// Gaussian sigma in pixels; `0` disables smoothing.
    pub blur_sigma: f64,
    pub blur_radius: usize,
    /// Side of the square opening element; `<= 1` disables.
    pub open_size: usize,
    pub min_area: f64,
    pub max_area: f64,
    pub circularity_threshold: f64,
    /// Required margin of the mean intensity inside a blob
    /// over the ring surrounding it.
    pub contrast_threshold: f64,
    /// Width in pixels of the surrounding ring.
    pub ring_width: usize,
    pub radial_decay: Option<RadialDecayParams>,
}

impl Default for DetectorParams {
    fn default() -> Self {
        DetectorParams {
            mode: ThresholdMode::Percentile,
            intensity_percentile: 99.,
            blur_sigma: 1.,
            blur_radius: 2,
            open_size: 3,
            min_area: 10.,
            max_area: 400.,
            circularity_threshold: 0.6,
            contrast_threshold: 20.,
            ring_width: 3,
            radial_decay: None,
        }
    }
}

/// Smallest percentile increment a sweep may use.
pub const MIN_SWEEP_STEP: f64 = 0.01;

impl DetectorParams {
    /// Reject settings that cannot describe a detector.
    pub fn check(&self) -> Result<()> {
        ensure!(
            (0. ..=100.).contains(&self.intensity_percentile),
            "intensity percentile {} outside [0, 100]",
            self.intensity_percentile
        );
        ensure!(
            self.min_area <= self.max_area,
            "min_area {} exceeds max_area {}",
            self.min_area,
            self.max_area
        );
        if let ThresholdMode::Sweep { max_percentile, step } = self.mode {
            ensure!(
                step >= MIN_SWEEP_STEP,
                "sweep step {} below {}",
                step,
                MIN_SWEEP_STEP
            );
            ensure!(
                (0. ..=100.).contains(&max_percentile),
                "sweep max percentile {} outside [0, 100]",
                max_percentile
            );
        }
        Ok(())
    }
}

/// A blob that passed every enabled check.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HotspotCandidate {
    pub contour: Vec<Point>,
    /// Area enclosed by the contour, in square pixels.
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
    /// `(x, y)` in pixels.
    pub centroid: (f64, f64),
    pub contrast: f64,
    pub pixel_count: usize,
    /// Mean radial decay rate, when that check ran.
    pub decay_rate: Option<f64>,
}

/// Detect hotspot candidates in `frame`. Candidate order
/// follows contour discovery and carries no meaning.
pub fn detect(frame: &Frame, params: &DetectorParams) -> Vec<HotspotCandidate> {
    if frame.is_empty() {
        return vec![];
    }
    let smoothed = gaussian_blur(&frame.intensity(), params.blur_sigma, params.blur_radius);

    match params.mode {
        ThresholdMode::Percentile => percentile(&smoothed, params.intensity_percentile)
            .map(|t| candidates_at(&smoothed, t, params))
            .unwrap_or_default(),
        ThresholdMode::Fixed { value } => candidates_at(&smoothed, value, params),
        ThresholdMode::Sweep {
            max_percentile,
            step,
        } => sweep(&smoothed, params, max_percentile, step),
    }
}

fn sweep(smoothed: &Array2<f64>, params: &DetectorParams, max_percentile: f64, step: f64) -> Vec<HotspotCandidate> {
    let start = params.intensity_percentile;
    let step = step.max(MIN_SWEEP_STEP);
    let levels = if max_percentile > start {
        ((max_percentile - start) / step + 1e-9).floor() as usize
    } else {
        0
    };

    // highest level first: the first hit is the answer
    for i in (0..=levels).rev() {
        let q = (start + i as f64 * step).min(max_percentile.max(start));
        let t = match percentile(smoothed, q) {
            Some(t) => t,
            None => return vec![],
        };
        let found = candidates_at(smoothed, t, params);
        if !found.is_empty() {
            debug!("sweep settled at percentile {:.2} (threshold {:.2})", q, t);
            return found;
        }
    }
    vec![]
}

fn candidates_at(smoothed: &Array2<f64>, level: f64, params: &DetectorParams) -> Vec<HotspotCandidate> {
    let peak = smoothed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(peak > level) {
        // flat frame, or nothing above the threshold
        return vec![];
    }
    let mask = open(&threshold(smoothed, level), params.open_size);
    let blobs = find_blobs(&mask);
    trace!("threshold {:.2}: {} blobs", level, blobs.len());

    blobs
        .into_iter()
        .filter_map(|blob| evaluate(smoothed, blob, params))
        .collect()
}

fn evaluate(smoothed: &Array2<f64>, blob: Blob, params: &DetectorParams) -> Option<HotspotCandidate> {
    let shape = Shape::of(&blob.contour);

    if shape.area < params.min_area || shape.area > params.max_area {
        trace!("blob at {:?}: area {:.1} out of bounds", blob.bbox, shape.area);
        return None;
    }
    if shape.perimeter <= 0.
        || shape.circularity <= 0.
        || shape.circularity < params.circularity_threshold
    {
        trace!("blob at {:?}: circularity {:.3}", blob.bbox, shape.circularity);
        return None;
    }

    let contrast = local_contrast(smoothed, &blob, params.ring_width)?;
    if !(contrast > params.contrast_threshold) {
        trace!("blob at {:?}: contrast {:.1}", blob.bbox, contrast);
        return None;
    }

    let decay_rate = match &params.radial_decay {
        Some(radial) => {
            let decay = radial_decay(smoothed, shape.centroid, radial);
            if !decay.passed {
                trace!("blob at {:?}: no radial decay {:?}", blob.bbox, decay.rates);
                return None;
            }
            Some(decay.mean_rate())
        }
        None => None,
    };

    Some(HotspotCandidate {
        pixel_count: blob.pixels.len(),
        contour: blob.contour,
        area: shape.area,
        perimeter: shape.perimeter,
        circularity: shape.circularity,
        centroid: shape.centroid,
        contrast,
        decay_rate,
    })
}

/// Mean intensity inside the blob minus the mean over the
/// ring obtained by dilating it `ring_width` pixels. `None`
/// if the ring is empty (the blob covers its whole window).
fn local_contrast(smoothed: &Array2<f64>, blob: &Blob, ring_width: usize) -> Option<f64> {
    let (ht, wid) = smoothed.dim();
    let (x0, y0, x1, y1) = blob.bbox;
    let x0 = x0.saturating_sub(ring_width);
    let y0 = y0.saturating_sub(ring_width);
    let x1 = (x1 + ring_width).min(wid - 1);
    let y1 = (y1 + ring_width).min(ht - 1);

    let window = smoothed.slice(s![y0..=y1, x0..=x1]).to_owned();
    let mut inside = Array2::from_elem(window.dim(), false);
    for &(x, y) in blob.pixels.iter() {
        inside[(y - y0, x - x0)] = true;
    }
    let mut ring = dilate(&inside, 2 * ring_width + 1);
    ring.zip_mut_with(&inside, |r, i| *r = *r && !*i);

    let inner = masked_mean(&window, &inside)?;
    let outer = masked_mean(&window, &ring)?;
    Some(inner - outer)
}
