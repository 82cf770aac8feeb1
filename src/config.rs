//! Mission configuration.
//!
//! Every field has a default, so a config file only needs to
//! name what it changes:
//!
//! ```json
//! { "camera": { "fov_deg": 45 }, "detector": { "min_area": 20 } }
//! ```

use std::{fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::{ensure, Context, Result};
use serde_derive::*;

use crate::detect::DetectorParams;
use crate::path::SweepParams;
use crate::validate::ValidatorParams;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CameraParams {
    /// Full angular field of view, degrees.
    pub fov_deg: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        CameraParams { fov_deg: 60. }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MissionConfig {
    pub camera: CameraParams,
    pub detector: DetectorParams,
    pub validator: ValidatorParams,
    /// Hotspots closer than this many meters are one.
    pub dedup_tolerance_m: f64,
    /// Budget for obtaining a valid frame in one capture
    /// cycle.
    pub frame_timeout_ms: u64,
    /// Pause between frame pulls within a cycle.
    pub retry_interval_ms: u64,
    /// Pause after polling a link with nothing new.
    pub poll_interval_ms: u64,
    /// Half-side of the square searched around the target,
    /// meters.
    pub search_radius: f64,
    pub sweep: SweepParams,
}

impl Default for MissionConfig {
    fn default() -> Self {
        MissionConfig {
            camera: Default::default(),
            detector: Default::default(),
            validator: Default::default(),
            dedup_tolerance_m: 10.,
            frame_timeout_ms: 2000,
            retry_interval_ms: 50,
            poll_interval_ms: 100,
            search_radius: 100.,
            sweep: Default::default(),
        }
    }
}

impl MissionConfig {
    pub fn from_json_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("could not open config {}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("could not parse config {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    /// Reject values no mission can run with.
    pub fn check(&self) -> Result<()> {
        ensure!(
            self.camera.fov_deg > 0. && self.camera.fov_deg < 180.,
            "field of view must lie in (0, 180), got {}",
            self.camera.fov_deg
        );
        ensure!(
            self.dedup_tolerance_m >= 0.,
            "negative dedup tolerance {}",
            self.dedup_tolerance_m
        );
        self.detector.check().context("invalid detector settings")?;
        self.sweep
            .check(self.search_radius)
            .context("invalid sweep settings")?;
        Ok(())
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
