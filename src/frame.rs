use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use image::DynamicImage;
use ndarray::{s, Array2, Array3, Axis};

/// Luma weights applied to `[r, g, b]` when collapsing a
/// colour frame to intensity.
pub const LUMA_WEIGHTS: [f64; 3] = [0.299, 0.587, 0.114];

/// A single captured frame.
///
/// Samples are stored as `(row, col, channel)` with either
/// one (gray / radiometric) or three (`rgb`) channels. Values
/// are kept as `f64` in the sensor's native scale; 8-bit
/// sources land in `0..=255`.
#[derive(Debug, Clone)]
pub struct Frame {
    samples: Array3<f64>,
}

impl Frame {
    pub fn from_gray(gray: Array2<f64>) -> Self {
        Frame {
            samples: gray.insert_axis(Axis(2)),
        }
    }

    pub fn from_rgb(rgb: Array3<f64>) -> Result<Self> {
        let (_, _, channels) = rgb.dim();
        ensure!(
            channels == 3,
            "expected 3 colour channels, found {}",
            channels
        );
        Ok(Frame { samples: rgb })
    }

    /// Frame of `width x height` with every sample at `value`.
    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self::from_gray(Array2::from_elem((height, width), value))
    }

    pub fn from_dynamic(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let samples = Array3::from_shape_fn(
            (height as usize, width as usize, 3),
            |(row, col, ch)| rgb.get_pixel(col as u32, row as u32)[ch] as f64,
        );
        Frame { samples }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("could not decode frame {}", path.display()))?;
        Ok(Self::from_dynamic(&image))
    }

    pub fn width(&self) -> usize {
        self.samples.dim().1
    }

    pub fn height(&self) -> usize {
        self.samples.dim().0
    }

    pub fn channels(&self) -> usize {
        self.samples.dim().2
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Sample at `(row, col)` as an `[r, g, b]` triple. Gray
    /// frames replicate the single channel.
    pub fn rgb_at(&self, row: usize, col: usize) -> [f64; 3] {
        if self.channels() == 1 {
            let v = self.samples[(row, col, 0)];
            [v, v, v]
        } else {
            [
                self.samples[(row, col, 0)],
                self.samples[(row, col, 1)],
                self.samples[(row, col, 2)],
            ]
        }
    }

    /// Single-channel intensity image, `(row, col)` indexed.
    pub fn intensity(&self) -> Array2<f64> {
        if self.channels() == 1 {
            return self.samples.slice(s![.., .., 0]).to_owned();
        }
        let mut out = Array2::zeros((self.height(), self.width()));
        for (ch, weight) in LUMA_WEIGHTS.iter().enumerate() {
            out.scaled_add(*weight, &self.samples.slice(s![.., .., ch]));
        }
        out
    }
}

/// Source of camera frames, typically a video capture device.
///
/// The device lifecycle lives outside the pipeline; the loop
/// only pulls frames and asks the source to close on
/// shutdown.
pub trait FrameSource {
    /// Next available frame, or `None` if the device has
    /// nothing to offer right now.
    fn try_get_frame(&mut self) -> Option<Frame>;

    fn close(&mut self) {}
}

/// Replays image files from disk in order. Unreadable files
/// are logged and skipped.
pub struct ImageFiles {
    paths: std::vec::IntoIter<PathBuf>,
}

impl ImageFiles {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        ImageFiles {
            paths: paths.into_iter(),
        }
    }
}

impl FrameSource for ImageFiles {
    fn try_get_frame(&mut self) -> Option<Frame> {
        for path in &mut self.paths {
            match Frame::open(&path) {
                Ok(frame) => return Some(frame),
                Err(e) => log::warn!("skipping frame: {:#}", e),
            }
        }
        None
    }
}

impl FrameSource for VecDeque<Frame> {
    fn try_get_frame(&mut self) -> Option<Frame> {
        self.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn gray_intensity_is_identity() {
        let gray = Array2::from_shape_fn((4, 6), |(r, c)| (r * 6 + c) as f64);
        let frame = Frame::from_gray(gray.clone());
        assert_eq!((frame.width(), frame.height(), frame.channels()), (6, 4, 1));
        assert_eq!(frame.intensity(), gray);
        assert_eq!(frame.rgb_at(1, 2), [8., 8., 8.]);
    }

    #[test]
    fn rgb_collapses_with_luma_weights() {
        let mut rgb = Array3::zeros((2, 2, 3));
        rgb[(0, 1, 0)] = 100.;
        rgb[(0, 1, 2)] = 200.;
        let frame = Frame::from_rgb(rgb).unwrap();
        let luma = frame.intensity();
        assert_abs_diff_eq!(luma[(0, 1)], 0.299 * 100. + 0.114 * 200., epsilon = 1e-9);
        assert_abs_diff_eq!(luma[(1, 1)], 0.);
    }

    #[test]
    fn rejects_two_channel_frames() {
        assert!(Frame::from_rgb(Array3::zeros((2, 2, 2))).is_err());
    }

    #[test]
    fn empty_frame() {
        assert!(Frame::filled(0, 10, 1.).is_empty());
        assert!(!Frame::filled(1, 1, 1.).is_empty());
    }
}
