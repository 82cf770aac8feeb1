use anyhow::Result;
use log::debug;
use serde_derive::*;

use crate::geo::{distance_m, LatLon};

/// A hotspot on the ground.
pub type GeolocatedHotspot = LatLon;

/// Hotspot with the label it was reported under.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LabeledHotspot {
    pub lat: f64,
    pub lon: f64,
    pub label: Option<String>,
}

/// Consumer of accepted hotspots, e.g. a map exporter or an
/// operator console.
pub trait HotspotSink {
    fn accept(&mut self, hotspot: GeolocatedHotspot, label: Option<&str>) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl HotspotSink for Vec<LabeledHotspot> {
    fn accept(&mut self, hotspot: GeolocatedHotspot, label: Option<&str>) -> Result<()> {
        self.push(LabeledHotspot {
            lat: hotspot.lat,
            lon: hotspot.lon,
            label: label.map(String::from),
        });
        Ok(())
    }
}

/// Accumulated hotspots, kept in insertion order, with no two
/// closer than `tolerance_m` meters.
#[derive(Debug, Clone)]
pub struct HotspotSet {
    tolerance_m: f64,
    hotspots: Vec<GeolocatedHotspot>,
}

impl HotspotSet {
    pub fn new(tolerance_m: f64) -> Self {
        HotspotSet {
            tolerance_m,
            hotspots: vec![],
        }
    }

    pub fn tolerance_m(&self) -> f64 {
        self.tolerance_m
    }

    /// Index of an accepted hotspot within tolerance of
    /// `hotspot`, if any.
    pub fn find_near(&self, hotspot: GeolocatedHotspot) -> Option<usize> {
        self.hotspots.iter().position(|h| {
            // an unprojectable pair cannot be a duplicate
            distance_m(hotspot, *h)
                .map(|d| d <= self.tolerance_m)
                .unwrap_or(false)
        })
    }

    /// Add `hotspot` unless it duplicates an accepted one.
    /// Returns whether it was added.
    pub fn insert(&mut self, hotspot: GeolocatedHotspot) -> bool {
        if let Some(i) = self.find_near(hotspot) {
            debug!(
                "({:.6}, {:.6}) duplicates hotspot #{} ({:.6}, {:.6})",
                hotspot.lat, hotspot.lon, i + 1, self.hotspots[i].lat, self.hotspots[i].lon
            );
            return false;
        }
        self.hotspots.push(hotspot);
        true
    }

    pub fn len(&self) -> usize {
        self.hotspots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotspots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeolocatedHotspot> {
        self.hotspots.iter()
    }

    pub fn as_slice(&self) -> &[GeolocatedHotspot] {
        &self.hotspots
    }
}

/// Label a hotspot is reported under: `Hotspot N`, counting
/// from one.
pub fn hotspot_label(index: usize) -> String {
    format!("Hotspot {}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_within_tolerance_are_dropped() {
        let mut set = HotspotSet::new(5.);
        assert!(set.insert(LatLon::new(34., -118.)));
        // ~1.1 m north
        assert!(!set.insert(LatLon::new(34.00001, -118.)));
        assert_eq!(set.len(), 1);
        // ~111 m north
        assert!(set.insert(LatLon::new(34.001, -118.)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.find_near(LatLon::new(34.001, -118.00001)), Some(1));
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut set = HotspotSet::new(1.);
        let points = [(1., 1.), (1.1, 1.), (1.2, 1.)];
        for &(lat, lon) in points.iter() {
            set.insert(LatLon::new(lat, lon));
        }
        let lats: Vec<f64> = set.iter().map(|h| h.lat).collect();
        assert_eq!(lats, vec![1., 1.1, 1.2]);
    }

    #[test]
    fn vec_sink_keeps_labels() {
        let mut sink: Vec<LabeledHotspot> = vec![];
        sink.accept(LatLon::new(1., 2.), Some(&hotspot_label(0))).unwrap();
        sink.accept(LatLon::new(3., 4.), None).unwrap();
        assert_eq!(sink[0].label.as_deref(), Some("Hotspot 1"));
        assert_eq!(sink[1].label, None);
    }
}
