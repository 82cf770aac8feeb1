//! Offline geolocation of recorded captures.
//!
//! Detection runs on all captures in parallel; hotspots are
//! then deduplicated in capture order, so the result is the
//! one [`PerceptionLoop`](crate::mission::PerceptionLoop)
//! would have produced live.

use anyhow::{Context, Result};
use log::debug;
use rayon::prelude::*;

use crate::{
    config::MissionConfig,
    detect::detect,
    frame::Frame,
    geo::{GeodeticProjector, Pose},
    hotspot::{GeolocatedHotspot, HotspotSet},
    validate::classify,
};

/// A frame together with the pose it was taken from.
#[derive(Debug, Clone)]
pub struct Capture {
    pub frame: Frame,
    pub pose: Pose,
}

/// Geolocated hotspots of one capture, before deduplication.
/// Invalid frames yield none.
pub fn locate_capture(capture: &Capture, config: &MissionConfig) -> Result<Vec<GeolocatedHotspot>> {
    let verdict = classify(&capture.frame, &config.validator);
    if !verdict.is_valid() {
        debug!("skipping capture at {:?}: {:?}", capture.pose, verdict);
        return Ok(vec![]);
    }

    let frame = &capture.frame;
    let mut projector = GeodeticProjector::new();
    detect(frame, &config.detector)
        .iter()
        .map(|c| {
            projector
                .locate(
                    &capture.pose,
                    c.centroid,
                    frame.width(),
                    frame.height(),
                    config.camera.fov_deg,
                )
                .with_context(|| format!("could not geolocate candidate from {:?}", capture.pose))
        })
        .collect()
}

/// Deduplicated hotspots over all `captures`, in capture order.
pub fn locate_captures(captures: &[Capture], config: &MissionConfig) -> Result<Vec<GeolocatedHotspot>> {
    let per_capture = captures
        .par_iter()
        .map(|c| locate_capture(c, config))
        .collect::<Result<Vec<_>>>()?;

    let mut hotspots = HotspotSet::new(config.dedup_tolerance_m);
    for hotspot in per_capture.into_iter().flatten() {
        hotspots.insert(hotspot);
    }
    Ok(hotspots.as_slice().to_vec())
}
