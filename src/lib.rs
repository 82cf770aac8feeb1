//! Locate ground heat sources from an aerial thermal camera.
//!
//! The crate turns frames taken at a known pose into
//! geodetic coordinates of candidate fire hotspots, and plans
//! the search pattern flown to find them.
//!
//! # Pipeline
//!
//! 1. [Screen](validate) frames from a dead or noisy feed.
//! 2. [Detect](detect::detect) compact regions that stand out
//!    from their surroundings.
//! 3. [Project](geo::GeodeticProjector) each candidate's pixel
//!    position to the ground, using the altitude and field of
//!    view at capture.
//! 4. [Deduplicate](hotspot::HotspotSet) against the hotspots
//!    found so far.
//!
//! [`PerceptionLoop`] runs these steps against a stream of
//! flight-controller telemetry. Recorded flights can be
//! processed offline with [`batch::locate_captures`].
//!
//! ```rust
//! # fn test_compile() -> anyhow::Result<()> {
//! use hotspot::{detect::detect, geo::{GeodeticProjector, Pose}, Frame};
//!
//! let frame = Frame::open("frame.png".as_ref())?;
//! let pose = Pose { lat: 34., lon: -118., alt: 50. };
//! let mut projector = GeodeticProjector::new();
//! for candidate in detect(&frame, &Default::default()) {
//!     let at = projector.locate(&pose, candidate.centroid, frame.width(), frame.height(), 60.)?;
//!     println!("{:?}", at);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The search path is independent of detection:
//!
//! ```rust
//! use hotspot::{geo::LatLon, path::{PathPlanner, SweepParams}};
//!
//! let planner = PathPlanner::new(SweepParams::from_camera(50., 60., 0.2));
//! let path = planner.generate_scan_path(LatLon::new(34., -118.), 100.).unwrap();
//! assert_eq!(path.local.len(), path.geodetic.len());
//! ```

pub mod filters;
pub mod frame;
pub mod validate;

pub mod contour;
pub mod radial;
pub mod detect;

pub mod geo;
pub mod path;
pub mod hotspot;

pub mod telemetry;
pub mod config;
pub mod mission;
pub mod batch;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::config::MissionConfig;
pub use crate::detect::{DetectorParams, HotspotCandidate};
pub use crate::frame::{Frame, FrameSource};
pub use crate::mission::{MissionState, PerceptionLoop};
