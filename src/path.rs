//! Search pattern generation.
//!
//! The search area is the square of half-side `search_radius`
//! around the target. It is swept boustrophedon style: strips
//! run east-west, starting at the south-west corner, and the
//! direction alternates from one strip to the next.

use serde_derive::*;

use crate::geo::{GeoError, LatLon, LocalOffset, TransverseMercator};

/// Upper bound on the strips of a single sweep.
pub const MAX_STRIPS: usize = 10_000;

/// Geometry of the sweep.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SweepParams {
    /// Ground width imaged by one strip, meters.
    pub strip_width: f64,
    /// Fraction of `strip_width` shared by adjacent strips,
    /// in `[0, 1)`.
    pub overlap: f64,
    /// Upper bound on the number of strips.
    pub max_strips: Option<usize>,
}

impl Default for SweepParams {
    fn default() -> Self {
        SweepParams {
            strip_width: 10.,
            overlap: 0.2,
            max_strips: None,
        }
    }
}

impl SweepParams {
    /// Strip width from the camera footprint at `altitude`:
    /// the full swath `2 · altitude · tan(fov / 2)`.
    pub fn from_camera(altitude: f64, fov_deg: f64, overlap: f64) -> Self {
        SweepParams {
            strip_width: 2. * altitude * (fov_deg.to_radians() / 2.).tan(),
            overlap,
            max_strips: None,
        }
    }

    /// Distance between adjacent strip center lines.
    pub fn spacing(&self) -> f64 {
        self.strip_width * (1. - self.overlap)
    }

    /// Reject parameters that cannot describe a sweep of
    /// `search_radius`, or would need more than
    /// [`MAX_STRIPS`] strips to cover it.
    pub fn check(&self, search_radius: f64) -> Result<(), GeoError> {
        let bad = |msg: String| Err(GeoError::InvalidPath(msg));
        if !(search_radius > 0.) || !search_radius.is_finite() {
            return bad(format!("search radius {}", search_radius));
        }
        if !(self.strip_width > 0.) || !self.strip_width.is_finite() {
            return bad(format!("strip width {}", self.strip_width));
        }
        if !(0. ..1.).contains(&self.overlap) {
            return bad(format!("overlap {}", self.overlap));
        }
        if self.max_strips == Some(0) {
            return bad("zero strips".into());
        }
        if 2. * search_radius / self.spacing() > MAX_STRIPS as f64 {
            return bad(format!(
                "strip spacing {} too fine for radius {}",
                self.spacing(),
                search_radius
            ));
        }
        Ok(())
    }
}

/// A planned path, in local meters around the target and as
/// geodetic waypoints.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScanPath {
    pub origin: LatLon,
    pub local: Vec<LocalOffset>,
    pub geodetic: Vec<LatLon>,
}

pub struct PathPlanner {
    pub params: SweepParams,
}

impl PathPlanner {
    pub fn new(params: SweepParams) -> Self {
        PathPlanner { params }
    }

    /// Local waypoints of the sweep: two per strip, the first
    /// at `(-r, -r)`.
    pub fn local_waypoints(&self, search_radius: f64) -> Result<Vec<LocalOffset>, GeoError> {
        self.params.check(search_radius)?;
        let r = search_radius;
        let spacing = self.params.spacing();

        let mut strips = ((2. * r) / spacing - 1e-9).ceil().max(0.) as usize + 1;
        if let Some(max) = self.params.max_strips {
            strips = strips.min(max);
        }

        let waypoints = (0..strips)
            .flat_map(|i| {
                let north = (-r + i as f64 * spacing).min(r);
                let (from, to) = if i % 2 == 0 { (-r, r) } else { (r, -r) };
                vec![LocalOffset::new(from, north), LocalOffset::new(to, north)]
            })
            .collect();
        Ok(waypoints)
    }

    /// Sweep around `origin`, projected to geodetic waypoints.
    pub fn generate_scan_path(&self, origin: LatLon, search_radius: f64) -> Result<ScanPath, GeoError> {
        let local = self.local_waypoints(search_radius)?;
        let tm = TransverseMercator::new(origin)?;
        let geodetic = local.iter().map(|o| tm.to_geo(*o)).collect();
        Ok(ScanPath {
            origin,
            local,
            geodetic,
        })
    }
}
