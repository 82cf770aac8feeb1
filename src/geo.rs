//! Local tangent-plane geodesy.
//!
//! Offsets on the ground are handled in a transverse Mercator
//! projection (WGS84, unit scale) whose central meridian and
//! latitude of origin sit at a chosen origin, so `(0, 0)`
//! meters maps back to the origin itself. The forward and
//! inverse maps use Krüger's series to sixth order in the
//! third flattening, following Karney, *Transverse Mercator
//! with an accuracy of a few nanometers* (2011). Within a few
//! kilometers of the origin the round trip is exact to far
//! below a millimeter.

use serde_derive::*;
use thiserror::Error;

/// WGS84 semi-major axis in meters.
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1. / 298.257_223_563;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("projector used before an origin was configured")]
    Unconfigured,
    #[error("invalid origin ({lat}, {lon})")]
    InvalidOrigin { lat: f64, lon: f64 },
    #[error("altitude must be positive, got {0}")]
    NonPositiveAltitude(f64),
    #[error("field of view must lie in (0, 180) degrees, got {0}")]
    InvalidFieldOfView(f64),
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    EmptyFrame { width: usize, height: usize },
    #[error("invalid scan parameters: {0}")]
    InvalidPath(String),
}

/// A geodetic position in degrees.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        LatLon { lat, lon }
    }

    /// Whether a projection can be anchored here: finite,
    /// off the poles and within ±180° longitude.
    pub fn is_projectable(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite() && self.lat.abs() < 90. && self.lon.abs() <= 180.
    }
}

/// Platform pose at capture time. Altitude is above ground,
/// in meters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl Pose {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// East/north offset in meters from a projection origin.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LocalOffset {
    pub east: f64,
    pub north: f64,
}

impl LocalOffset {
    pub fn new(east: f64, north: f64) -> Self {
        LocalOffset { east, north }
    }

    pub fn norm(&self) -> f64 {
        self.east.hypot(self.north)
    }
}

/// Transverse Mercator centered on a fixed origin.
#[derive(Debug, Clone, PartialEq)]
pub struct TransverseMercator {
    origin: LatLon,
    e: f64,
    e2: f64,
    /// Rectifying radius.
    big_a: f64,
    alpha: [f64; 6],
    beta: [f64; 6],
    /// Northing of the origin latitude on the central meridian.
    y0: f64,
}

impl TransverseMercator {
    pub fn new(origin: LatLon) -> Result<Self, GeoError> {
        if !origin.is_projectable() {
            return Err(GeoError::InvalidOrigin {
                lat: origin.lat,
                lon: origin.lon,
            });
        }

        let f = WGS84_F;
        let e2 = f * (2. - f);
        let n = f / (2. - f);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let big_a = WGS84_A / (1. + n) * (1. + n2 / 4. + n4 / 64. + n6 / 256.);

        let alpha = [
            n / 2. - 2. * n2 / 3. + 5. * n3 / 16. + 41. * n4 / 180. - 127. * n5 / 288.
                + 7891. * n6 / 37800.,
            13. * n2 / 48. - 3. * n3 / 5. + 557. * n4 / 1440. + 281. * n5 / 630.
                - 1983433. * n6 / 1935360.,
            61. * n3 / 240. - 103. * n4 / 140. + 15061. * n5 / 26880. + 167603. * n6 / 181440.,
            49561. * n4 / 161280. - 179. * n5 / 168. + 6601661. * n6 / 7257600.,
            34729. * n5 / 80640. - 3418889. * n6 / 1995840.,
            212378941. * n6 / 319334400.,
        ];
        let beta = [
            n / 2. - 2. * n2 / 3. + 37. * n3 / 96. - n4 / 360. - 81. * n5 / 512.
                + 96199. * n6 / 604800.,
            n2 / 48. + n3 / 15. - 437. * n4 / 1440. + 46. * n5 / 105. - 1118711. * n6 / 3870720.,
            17. * n3 / 480. - 37. * n4 / 840. - 209. * n5 / 4480. + 5569. * n6 / 90720.,
            4397. * n4 / 161280. - 11. * n5 / 504. - 830251. * n6 / 7257600.,
            4583. * n5 / 161280. - 108847. * n6 / 3991680.,
            20648693. * n6 / 638668800.,
        ];

        let mut tm = TransverseMercator {
            origin,
            e: e2.sqrt(),
            e2,
            big_a,
            alpha,
            beta,
            y0: 0.,
        };
        tm.y0 = tm.project(origin.lat, 0.).1;
        Ok(tm)
    }

    pub fn origin(&self) -> LatLon {
        self.origin
    }

    /// `tan(conformal latitude)` from `tan(latitude)`.
    fn taupf(&self, tau: f64) -> f64 {
        let tau1 = tau.hypot(1.);
        let sig = (self.e * (self.e * tau / tau1).atanh()).sinh();
        tau * sig.hypot(1.) - sig * tau1
    }

    /// Inverse of [`Self::taupf`] by Newton iteration.
    fn tauf(&self, taup: f64) -> f64 {
        let e2m = 1. - self.e2;
        let mut tau = taup / e2m;
        for _ in 0..8 {
            let taupa = self.taupf(tau);
            let dtau = (taup - taupa) * (1. + e2m * tau * tau)
                / (e2m * tau.hypot(1.) * taupa.hypot(1.));
            tau += dtau;
            if dtau.abs() <= 1e-14 * tau.abs().max(1.) {
                break;
            }
        }
        tau
    }

    /// `(x, y)` on the projection plane for latitude `lat_deg`
    /// and longitude offset `dlon_deg` from the central
    /// meridian, before removing the origin northing.
    fn project(&self, lat_deg: f64, dlon_deg: f64) -> (f64, f64) {
        let phi = lat_deg.to_radians();
        let lam = dlon_deg.to_radians();

        let taup = self.taupf(phi.tan());
        let xip = taup.atan2(lam.cos());
        let etap = (lam.sin() / taup.hypot(lam.cos())).asinh();

        let (mut xi, mut eta) = (xip, etap);
        for (j, a) in self.alpha.iter().enumerate() {
            let k = 2. * (j + 1) as f64;
            xi += a * (k * xip).sin() * (k * etap).cosh();
            eta += a * (k * xip).cos() * (k * etap).sinh();
        }
        (self.big_a * eta, self.big_a * xi)
    }

    /// Geodetic position of an east/north offset from the
    /// origin.
    pub fn to_geo(&self, offset: LocalOffset) -> LatLon {
        let xi = (offset.north + self.y0) / self.big_a;
        let eta = offset.east / self.big_a;

        let (mut xip, mut etap) = (xi, eta);
        for (j, b) in self.beta.iter().enumerate() {
            let k = 2. * (j + 1) as f64;
            xip -= b * (k * xi).sin() * (k * eta).cosh();
            etap -= b * (k * xi).cos() * (k * eta).sinh();
        }

        let taup = xip.sin() / etap.sinh().hypot(xip.cos());
        let lam = etap.sinh().atan2(xip.cos());
        let phi = self.tauf(taup).atan();

        LatLon::new(phi.to_degrees(), self.origin.lon + lam.to_degrees())
    }

    /// East/north offset of a geodetic position from the
    /// origin.
    pub fn to_local(&self, pos: LatLon) -> LocalOffset {
        let mut dlon = pos.lon - self.origin.lon;
        if dlon > 180. {
            dlon -= 360.;
        } else if dlon < -180. {
            dlon += 360.;
        }
        let (x, y) = self.project(pos.lat, dlon);
        LocalOffset::new(x, y - self.y0)
    }
}

/// Ground offset covered by a pixel of a nadir-pointing,
/// undistorted camera.
///
/// The frame spans a half swath of `altitude · tan(fov / 2)`
/// meters on each side of its center along both axes, so a
/// pixel's offset from `(width / 2, height / 2)` is scaled by
/// `half_swath / (dimension / 2)`. Rows grow southwards.
/// Lens distortion and gimbal tilt are not corrected.
pub fn pixel_offset_to_local(
    pixel: (f64, f64),
    width: usize,
    height: usize,
    altitude: f64,
    fov_deg: f64,
) -> Result<LocalOffset, GeoError> {
    if !(altitude > 0.) || !altitude.is_finite() {
        return Err(GeoError::NonPositiveAltitude(altitude));
    }
    if !(fov_deg > 0. && fov_deg < 180.) {
        return Err(GeoError::InvalidFieldOfView(fov_deg));
    }
    if width == 0 || height == 0 {
        return Err(GeoError::EmptyFrame { width, height });
    }

    let half_swath = altitude * (fov_deg.to_radians() / 2.).tan();
    let (half_w, half_h) = (width as f64 / 2., height as f64 / 2.);
    let east = (pixel.0 - half_w) * half_swath / half_w;
    let north = -(pixel.1 - half_h) * half_swath / half_h;
    Ok(LocalOffset::new(east, north))
}

/// Converts between local ground offsets and geodetic
/// coordinates around a configurable origin.
///
/// The projector must be [`configure`d](Self::configure)
/// before use, and reconfigured whenever offsets are relative
/// to a different platform position.
#[derive(Debug, Clone, Default)]
pub struct GeodeticProjector {
    tm: Option<TransverseMercator>,
}

impl GeodeticProjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configured(origin: LatLon) -> Result<Self, GeoError> {
        let mut projector = Self::new();
        projector.configure(origin.lat, origin.lon)?;
        Ok(projector)
    }

    /// Anchor the projection at `(origin_lat, origin_lon)`,
    /// replacing any previous origin.
    pub fn configure(&mut self, origin_lat: f64, origin_lon: f64) -> Result<(), GeoError> {
        self.tm = Some(TransverseMercator::new(LatLon::new(origin_lat, origin_lon))?);
        Ok(())
    }

    pub fn origin(&self) -> Option<LatLon> {
        self.tm.as_ref().map(|tm| tm.origin())
    }

    fn projection(&self) -> Result<&TransverseMercator, GeoError> {
        self.tm.as_ref().ok_or(GeoError::Unconfigured)
    }

    pub fn local_to_geo(&self, east: f64, north: f64) -> Result<LatLon, GeoError> {
        Ok(self.projection()?.to_geo(LocalOffset::new(east, north)))
    }

    pub fn geo_to_local(&self, lat: f64, lon: f64) -> Result<LocalOffset, GeoError> {
        Ok(self.projection()?.to_local(LatLon::new(lat, lon)))
    }

    pub fn pixel_offset_to_local(
        &self,
        pixel: (f64, f64),
        width: usize,
        height: usize,
        altitude: f64,
        fov_deg: f64,
    ) -> Result<LocalOffset, GeoError> {
        self.projection()?;
        pixel_offset_to_local(pixel, width, height, altitude, fov_deg)
    }

    /// Reconfigure at `pose` and return the ground position
    /// seen at `pixel`.
    pub fn locate(
        &mut self,
        pose: &Pose,
        pixel: (f64, f64),
        width: usize,
        height: usize,
        fov_deg: f64,
    ) -> Result<LatLon, GeoError> {
        let offset = pixel_offset_to_local(pixel, width, height, pose.alt, fov_deg)?;
        self.configure(pose.lat, pose.lon)?;
        self.local_to_geo(offset.east, offset.north)
    }
}

/// Ground distance in meters between two nearby positions,
/// measured in the projection anchored at `a`.
pub fn distance_m(a: LatLon, b: LatLon) -> Result<f64, GeoError> {
    Ok(TransverseMercator::new(a)?.to_local(b).norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn origin_maps_to_zero() {
        let p = GeodeticProjector::configured(LatLon::new(34., -118.)).unwrap();
        let local = p.geo_to_local(34., -118.).unwrap();
        assert_abs_diff_eq!(local.east, 0., epsilon = 1e-9);
        assert_abs_diff_eq!(local.north, 0., epsilon = 1e-9);
        let geo = p.local_to_geo(0., 0.).unwrap();
        assert_abs_diff_eq!(geo.lat, 34., epsilon = 1e-12);
        assert_abs_diff_eq!(geo.lon, -118., epsilon = 1e-12);
    }

    #[test]
    fn center_pixel_projects_to_origin() {
        let mut p = GeodeticProjector::new();
        p.configure(34., -118.).unwrap();
        let offset = p.pixel_offset_to_local((320., 240.), 640, 480, 50., 60.).unwrap();
        assert_eq!(offset, LocalOffset::new(0., 0.));
        let geo = p.local_to_geo(offset.east, offset.north).unwrap();
        assert_abs_diff_eq!(geo.lat, 34., epsilon = 1e-12);
        assert_abs_diff_eq!(geo.lon, -118., epsilon = 1e-12);
    }

    #[test]
    fn round_trip_within_search_radius() {
        let p = GeodeticProjector::configured(LatLon::new(-33.86, 151.21)).unwrap();
        for &(de, dn) in &[(0.3, -0.2), (250., 125.), (-1200., 800.), (4000., -3500.)] {
            let geo = p.local_to_geo(de, dn).unwrap();
            let back = p.geo_to_local(geo.lat, geo.lon).unwrap();
            assert_abs_diff_eq!(back.east, de, epsilon = 1e-6);
            assert_abs_diff_eq!(back.north, dn, epsilon = 1e-6);
        }
        for &(lat, lon) in &[(-33.87, 151.2), (-33.8, 151.25), (-33.9, 151.15)] {
            let local = p.geo_to_local(lat, lon).unwrap();
            let geo = p.local_to_geo(local.east, local.north).unwrap();
            assert_abs_diff_eq!(geo.lat, lat, epsilon = 1e-9);
            assert_abs_diff_eq!(geo.lon, lon, epsilon = 1e-9);
        }
    }

    #[test]
    fn meter_scale_is_right() {
        // one arc-minute of latitude is close to a nautical mile
        let p = GeodeticProjector::configured(LatLon::new(45., 7.)).unwrap();
        let north = p.geo_to_local(45. + 1. / 60., 7.).unwrap();
        assert_abs_diff_eq!(north.east, 0., epsilon = 1e-9);
        assert_abs_diff_eq!(north.north, 1852.2, epsilon = 1.);
        let east = p.geo_to_local(45., 7.001).unwrap();
        // 0.001° of longitude at 45° on WGS84
        assert_abs_diff_eq!(east.east, 78.847, epsilon = 0.01);
    }

    #[test]
    fn configure_is_idempotent() {
        let mut p = GeodeticProjector::new();
        p.configure(10., 20.).unwrap();
        let first = p.local_to_geo(35., -12.).unwrap();
        p.configure(10., 20.).unwrap();
        assert_eq!(p.local_to_geo(35., -12.).unwrap(), first);
    }

    #[test]
    fn reconfigure_replaces_origin() {
        let mut p = GeodeticProjector::configured(LatLon::new(10., 20.)).unwrap();
        p.configure(11., 21.).unwrap();
        assert_eq!(p.origin(), Some(LatLon::new(11., 21.)));
        let geo = p.local_to_geo(0., 0.).unwrap();
        assert_abs_diff_eq!(geo.lat, 11., epsilon = 1e-12);
    }

    #[test]
    fn configuration_errors() {
        let p = GeodeticProjector::new();
        assert_eq!(p.local_to_geo(1., 1.), Err(GeoError::Unconfigured));
        assert_eq!(p.geo_to_local(1., 1.), Err(GeoError::Unconfigured));

        let p = GeodeticProjector::configured(LatLon::new(34., -118.)).unwrap();
        assert_eq!(
            p.pixel_offset_to_local((1., 1.), 100, 100, 0., 60.),
            Err(GeoError::NonPositiveAltitude(0.))
        );
        assert!(p.pixel_offset_to_local((1., 1.), 100, 100, -5., 60.).is_err());
        assert!(p.pixel_offset_to_local((1., 1.), 100, 100, 50., 0.).is_err());
        assert!(p.pixel_offset_to_local((1., 1.), 0, 100, 50., 60.).is_err());
        assert!(GeodeticProjector::new().configure(95., 0.).is_err());
    }

    #[test]
    fn pixel_scaling() {
        // 90° fov at 10 m covers ±10 m
        let o = pixel_offset_to_local((100., 0.), 100, 100, 10., 90.).unwrap();
        assert_abs_diff_eq!(o.east, 10., epsilon = 1e-9);
        assert_abs_diff_eq!(o.north, 10., epsilon = 1e-9);
        let o = pixel_offset_to_local((25., 75.), 100, 100, 10., 90.).unwrap();
        assert_abs_diff_eq!(o.east, -5., epsilon = 1e-9);
        assert_abs_diff_eq!(o.north, -5., epsilon = 1e-9);
    }

    #[test]
    fn locate_uses_pose() {
        let mut p = GeodeticProjector::new();
        let pose = Pose {
            lat: 34.,
            lon: -118.,
            alt: 50.,
        };
        let geo = p.locate(&pose, (80., 20.), 100, 100, 60.).unwrap();
        let local = p.geo_to_local(geo.lat, geo.lon).unwrap();
        let half = 50. * (30f64).to_radians().tan();
        assert_abs_diff_eq!(local.east, 0.6 * half, epsilon = 1e-6);
        assert_abs_diff_eq!(local.north, 0.6 * half, epsilon = 1e-6);
        assert!(distance_m(pose.position(), geo).unwrap() > 0.);
    }
}
