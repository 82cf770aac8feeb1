//! The perception loop.
//!
//! [`PerceptionLoop`] is driven one telemetry tick at a time.
//! The status code of each record selects the state:
//!
//! | status | state                |
//! |--------|----------------------|
//! | `0`    | `EN_ROUTE`           |
//! | `1`    | `ON_TARGET_CAPTURE`  |
//! | `-1`   | `RETURNING`, `DONE`  |
//!
//! While on target, every tick with a usable pose runs at
//! most one capture cycle: pull a valid frame, detect,
//! geolocate each candidate from the pose at capture, and
//! keep the ones not already known. Returning closes the
//! frame source and hands the accumulated hotspots to the
//! sink.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Instant,
};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_derive::*;

use crate::{
    config::MissionConfig,
    detect::detect,
    frame::{Frame, FrameSource},
    geo::{GeodeticProjector, LatLon, Pose},
    hotspot::{hotspot_label, GeolocatedHotspot, HotspotSet, HotspotSink},
    telemetry::{MissionStatus, Telemetry, TelemetryLink},
    validate::classify,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionState {
    AwaitingTelemetry,
    EnRoute,
    OnTargetCapture,
    Returning,
    Done,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct MissionStats {
    pub ticks: usize,
    /// On-target ticks skipped for want of a usable pose.
    pub skipped_ticks: usize,
    pub frames_pulled: usize,
    pub frames_rejected: usize,
    /// Capture cycles that found no valid frame in time.
    pub soft_misses: usize,
    pub detection_cycles: usize,
    pub candidates: usize,
    pub hotspots_accepted: usize,
    pub duplicates: usize,
}

/// Shared flag to stop [`PerceptionLoop::run`] from another
/// thread. The loop checks it between ticks.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct PerceptionLoop<F, S> {
    config: MissionConfig,
    frames: F,
    sink: S,
    projector: GeodeticProjector,
    hotspots: HotspotSet,
    state: MissionState,
    history: Vec<MissionState>,
    stats: MissionStats,
    stop: StopHandle,
}

impl<F: FrameSource, S: HotspotSink> PerceptionLoop<F, S> {
    pub fn new(config: MissionConfig, frames: F, sink: S) -> Self {
        let hotspots = HotspotSet::new(config.dedup_tolerance_m);
        PerceptionLoop {
            config,
            frames,
            sink,
            projector: GeodeticProjector::new(),
            hotspots,
            state: MissionState::AwaitingTelemetry,
            history: vec![MissionState::AwaitingTelemetry],
            stats: Default::default(),
            stop: Default::default(),
        }
    }

    pub fn state(&self) -> MissionState {
        self.state
    }

    /// States visited so far, in order. Consecutive ticks in
    /// the same state are recorded once.
    pub fn history(&self) -> &[MissionState] {
        &self.history
    }

    pub fn stats(&self) -> &MissionStats {
        &self.stats
    }

    pub fn hotspots(&self) -> &[GeolocatedHotspot] {
        self.hotspots.as_slice()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Advance by one telemetry tick. `None` (no new record)
    /// keeps the current state. Ticks after `DONE` are ignored.
    ///
    /// Errors are configuration errors (an unusable field of
    /// view, a failing sink) and should halt the mission. A
    /// reported position that cannot be projected skips the
    /// tick like a missing one.
    pub fn step(&mut self, telemetry: Option<Telemetry>) -> Result<MissionState> {
        if self.state == MissionState::Done {
            return Ok(self.state);
        }
        self.stats.ticks += 1;

        let telemetry = match telemetry {
            Some(t) => t,
            None => return Ok(self.state),
        };
        match telemetry.status {
            MissionStatus::EnRoute => self.enter(MissionState::EnRoute),
            MissionStatus::OnTarget => {
                self.enter(MissionState::OnTargetCapture);
                self.capture(&telemetry)?;
            }
            MissionStatus::ReturningToBase => {
                self.enter(MissionState::Returning);
                self.finish()?;
            }
        }
        Ok(self.state)
    }

    /// Poll `link` until the mission is done, the link closes,
    /// or a stop is requested. The last two also clean up, so
    /// the loop always ends in `DONE` with results flushed. An
    /// error from a tick is returned after the same cleanup.
    pub fn run<L: TelemetryLink>(&mut self, link: &mut L) -> Result<MissionStats> {
        while self.state != MissionState::Done {
            if self.stop.is_stopped() {
                info!("stop requested in state {:?}", self.state);
                self.finish()?;
                break;
            }
            let ticked = match link.poll() {
                Some(t) => self.step(Some(t)),
                None if link.is_closed() => {
                    info!("telemetry link closed in state {:?}", self.state);
                    self.finish()?;
                    break;
                }
                None => {
                    let state = self.step(None);
                    thread::sleep(self.config.poll_interval());
                    state
                }
            };
            if let Err(e) = ticked {
                warn!("mission halted in state {:?}: {:#}", self.state, e);
                // a failed cleanup is not retried
                if self.state != MissionState::Returning {
                    if let Err(flush) = self.finish() {
                        warn!("cleanup after halt failed: {:#}", flush);
                    }
                }
                return Err(e);
            }
        }
        Ok(self.stats.clone())
    }

    /// Close the frame source, report every accepted hotspot to
    /// the sink, and enter `DONE`. No-op once done.
    pub fn finish(&mut self) -> Result<()> {
        if self.state == MissionState::Done {
            return Ok(());
        }
        self.frames.close();
        for (i, hotspot) in self.hotspots.iter().enumerate() {
            self.sink
                .accept(*hotspot, Some(&hotspot_label(i)))
                .with_context(|| format!("could not report {}", hotspot_label(i)))?;
        }
        self.sink.flush().context("could not flush hotspots")?;
        info!(
            "mission done: {} hotspots, {} detection cycles",
            self.hotspots.len(),
            self.stats.detection_cycles
        );
        self.enter(MissionState::Done);
        Ok(())
    }

    fn enter(&mut self, state: MissionState) {
        if self.state != state {
            debug!("{:?} -> {:?}", self.state, state);
            self.state = state;
            self.history.push(state);
        }
    }

    fn capture(&mut self, telemetry: &Telemetry) -> Result<()> {
        let pose = match (telemetry.altitude, telemetry.position) {
            (Some(alt), Some((lat, lon))) if alt > 0. && LatLon::new(lat, lon).is_projectable() => {
                Pose { lat, lon, alt }
            }
            _ => {
                debug!("on target without a usable pose, skipping tick: {:?}", telemetry);
                self.stats.skipped_ticks += 1;
                return Ok(());
            }
        };

        let frame = match self.pull_valid_frame() {
            Some(frame) => frame,
            None => {
                warn!(
                    "no valid frame within {:?}, skipping cycle",
                    self.config.frame_timeout()
                );
                self.stats.soft_misses += 1;
                return Ok(());
            }
        };

        self.stats.detection_cycles += 1;
        let candidates = detect(&frame, &self.config.detector);
        self.stats.candidates += candidates.len();
        debug!("{} candidates at {:?}", candidates.len(), pose);

        for candidate in candidates {
            let hotspot = self
                .projector
                .locate(
                    &pose,
                    candidate.centroid,
                    frame.width(),
                    frame.height(),
                    self.config.camera.fov_deg,
                )
                .with_context(|| format!("could not geolocate candidate from {:?}", pose))?;
            if self.hotspots.insert(hotspot) {
                self.stats.hotspots_accepted += 1;
                info!(
                    "hotspot #{} at ({:.6}, {:.6})",
                    self.hotspots.len(),
                    hotspot.lat,
                    hotspot.lon
                );
            } else {
                self.stats.duplicates += 1;
            }
        }
        Ok(())
    }

    /// Pull frames until one passes validation or the frame
    /// timeout runs out. At least one pull is attempted.
    fn pull_valid_frame(&mut self) -> Option<Frame> {
        let deadline = Instant::now() + self.config.frame_timeout();
        loop {
            if let Some(frame) = self.frames.try_get_frame() {
                self.stats.frames_pulled += 1;
                let verdict = classify(&frame, &self.config.validator);
                if verdict.is_valid() {
                    return Some(frame);
                }
                self.stats.frames_rejected += 1;
                debug!("frame rejected: {:?}", verdict);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            thread::sleep(self.config.retry_interval().min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotspot::LabeledHotspot;
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::MissionState::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn hot_frame() -> Frame {
        let mut frame = ndarray::Array2::from_elem((100, 100), 50.);
        frame.slice_mut(ndarray::s![47..53, 47..53]).fill(255.);
        Frame::from_gray(frame)
    }

    fn config() -> MissionConfig {
        MissionConfig {
            frame_timeout_ms: 20,
            retry_interval_ms: 2,
            poll_interval_ms: 1,
            ..Default::default()
        }
    }

    type Loop = PerceptionLoop<VecDeque<Frame>, Vec<LabeledHotspot>>;

    fn perception(frames: Vec<Frame>) -> Loop {
        PerceptionLoop::new(config(), frames.into_iter().collect(), vec![])
    }

    fn on_target() -> Telemetry {
        Telemetry::with_fix(MissionStatus::OnTarget, 50., 34., -118.)
    }

    #[test]
    fn full_mission_runs_one_cycle() {
        init();
        let mut mission = perception(vec![hot_frame()]);
        assert_eq!(mission.state(), AwaitingTelemetry);

        mission.step(Some(Telemetry::new(MissionStatus::EnRoute))).unwrap();
        mission.step(Some(on_target())).unwrap();
        mission
            .step(Some(Telemetry::new(MissionStatus::ReturningToBase)))
            .unwrap();

        assert_eq!(
            mission.history(),
            &[AwaitingTelemetry, EnRoute, OnTargetCapture, Returning, Done]
        );
        assert_eq!(mission.stats().detection_cycles, 1);
        assert_eq!(mission.stats().hotspots_accepted, 1);

        // the square sits half a pixel north-west of the frame
        // center
        let reported = mission.sink();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].label.as_deref(), Some("Hotspot 1"));
        assert!(reported[0].lat > 34. && reported[0].lon < -118.);
        let here = crate::geo::LatLon::new(reported[0].lat, reported[0].lon);
        let offset = crate::geo::distance_m(crate::geo::LatLon::new(34., -118.), here).unwrap();
        assert!(offset < 1., "{} m off", offset);
    }

    #[test]
    fn missing_altitude_skips_tick() {
        let mut mission = perception(vec![hot_frame()]);
        let mut t = on_target();
        t.altitude = None;
        assert_eq!(mission.step(Some(t)).unwrap(), OnTargetCapture);
        assert_eq!(mission.stats().frames_pulled, 0);
        assert_eq!(mission.stats().skipped_ticks, 1);
        assert!(mission.hotspots().is_empty());

        t.altitude = Some(0.);
        mission.step(Some(t)).unwrap();
        assert_eq!(mission.stats().frames_pulled, 0);
        assert_eq!(mission.history(), &[AwaitingTelemetry, OnTargetCapture]);
    }

    #[test]
    fn no_telemetry_keeps_state() {
        let mut mission = perception(vec![]);
        assert_eq!(mission.step(None).unwrap(), AwaitingTelemetry);
        mission.step(Some(Telemetry::new(MissionStatus::EnRoute))).unwrap();
        assert_eq!(mission.step(None).unwrap(), EnRoute);
        assert_eq!(mission.stats().ticks, 3);
    }

    #[test]
    fn repeated_sightings_are_deduplicated() {
        let mut mission = perception(vec![hot_frame(), hot_frame()]);
        mission.step(Some(on_target())).unwrap();
        mission.step(Some(on_target())).unwrap();
        assert_eq!(mission.stats().detection_cycles, 2);
        assert_eq!(mission.stats().hotspots_accepted, 1);
        assert_eq!(mission.stats().duplicates, 1);
        assert_eq!(mission.hotspots().len(), 1);
    }

    #[test]
    fn invalid_frames_time_out_as_soft_miss() {
        init();
        let blank = Frame::filled(64, 64, 0.);
        let mut mission = perception(vec![blank.clone(), blank]);

        let start = Instant::now();
        mission.step(Some(on_target())).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));

        let stats = mission.stats();
        assert_eq!(stats.frames_pulled, 2);
        assert_eq!(stats.frames_rejected, 2);
        assert_eq!(stats.soft_misses, 1);
        assert_eq!(stats.detection_cycles, 0);
        assert_eq!(mission.state(), OnTargetCapture);
    }

    #[test]
    fn rejected_frame_is_retried() {
        let mut mission = perception(vec![Frame::filled(64, 64, 0.), hot_frame()]);
        mission.step(Some(on_target())).unwrap();
        assert_eq!(mission.stats().frames_rejected, 1);
        assert_eq!(mission.stats().detection_cycles, 1);
        assert_eq!(mission.stats().soft_misses, 0);
    }

    #[test]
    fn ticks_after_done_are_ignored() {
        let mut mission = perception(vec![hot_frame()]);
        mission
            .step(Some(Telemetry::new(MissionStatus::ReturningToBase)))
            .unwrap();
        assert_eq!(mission.step(Some(on_target())).unwrap(), Done);
        assert_eq!(mission.stats().ticks, 1);
        assert_eq!(mission.stats().frames_pulled, 0);
    }

    #[test]
    fn unprojectable_position_skips_tick() {
        let mut mission = perception(vec![hot_frame(), hot_frame()]);
        let mut link: VecDeque<Telemetry> = vec![
            on_target(),
            Telemetry::with_fix(MissionStatus::OnTarget, 50., 95., -118.),
            Telemetry::with_fix(MissionStatus::OnTarget, 50., f64::NAN, -118.),
            Telemetry::new(MissionStatus::ReturningToBase),
        ]
        .into_iter()
        .collect();

        let stats = mission.run(&mut link).unwrap();
        assert_eq!(stats.skipped_ticks, 2);
        assert_eq!(stats.frames_pulled, 1);
        assert_eq!(mission.state(), Done);
        assert_eq!(mission.sink().len(), 1);
        assert_eq!(mission.sink()[0].label.as_deref(), Some("Hotspot 1"));
    }

    #[test]
    fn failed_tick_still_flushes_results() {
        let mut mission = perception(vec![hot_frame(), hot_frame()]);
        mission.step(Some(on_target())).unwrap();

        // an unusable field of view fails geolocation mid-mission
        mission.config.camera.fov_deg = 0.;
        let far = Telemetry::with_fix(MissionStatus::OnTarget, 50., 34.01, -118.);
        let mut link: VecDeque<Telemetry> =
            vec![far, Telemetry::new(MissionStatus::ReturningToBase)].into_iter().collect();

        assert!(mission.run(&mut link).is_err());
        assert_eq!(mission.state(), Done);
        assert_eq!(mission.sink().len(), 1);
        assert_eq!(link.len(), 1);
    }

    #[test]
    fn run_replays_link_to_done() {
        let mut mission = perception(vec![hot_frame()]);
        let mut link: VecDeque<Telemetry> = vec![
            Telemetry::new(MissionStatus::EnRoute),
            on_target(),
            Telemetry::new(MissionStatus::ReturningToBase),
        ]
        .into_iter()
        .collect();

        let stats = mission.run(&mut link).unwrap();
        assert_eq!(stats.ticks, 3);
        assert_eq!(mission.state(), Done);
        assert_eq!(mission.into_sink().len(), 1);
    }

    #[test]
    fn closed_link_finishes_mission() {
        let mut mission = perception(vec![hot_frame()]);
        let mut link: VecDeque<Telemetry> = vec![on_target()].into_iter().collect();
        mission.run(&mut link).unwrap();
        assert_eq!(mission.history(), &[AwaitingTelemetry, OnTargetCapture, Done]);
        assert_eq!(mission.sink().len(), 1);
    }

    #[test]
    fn stop_handle_ends_run() {
        let mut mission = perception(vec![hot_frame()]);
        mission.step(Some(on_target())).unwrap();

        let stop = mission.stop_handle();
        stop.stop();
        let mut link: VecDeque<Telemetry> = vec![on_target(); 5].into_iter().collect();
        mission.run(&mut link).unwrap();

        assert!(stop.is_stopped());
        assert_eq!(link.len(), 5);
        assert_eq!(mission.state(), Done);
        assert_eq!(mission.sink()[0].label.as_deref(), Some("Hotspot 1"));
    }
}
