use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bounds::Bounds;

/// A single located point (first/last point of a track).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        GeoPoint {
            lat,
            lon,
            elevation: None,
            time: None,
        }
    }

    pub fn has_finite_position(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }
}

/// Statistics computed from a track file.
///
/// Distances are meters, durations milliseconds, speeds meters per second,
/// elevations meters. Every field defaults to zero or empty so a record that
/// was never analyzed still serializes and compares cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackAnalysis {
    pub total_distance: f64,
    pub total_distance_moving: f64,
    pub total_tracks: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub time_span: i64,
    pub time_moving: i64,
    pub diff_elevation_up: f64,
    pub diff_elevation_down: f64,
    pub avg_elevation: f64,
    pub min_elevation: f64,
    pub max_elevation: f64,
    pub max_speed: f64,
    pub avg_speed: f64,
    pub points: u32,
    pub wpt_points: u32,
    pub metric_end: f64,
    pub location_start: Option<GeoPoint>,
    pub location_end: Option<GeoPoint>,
    /// Geometry seen while analyzing; `None` when the provider does not report it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

impl TrackAnalysis {
    /// True when no statistics have been filled in yet.
    pub fn is_empty(&self) -> bool {
        self.points == 0 && self.wpt_points == 0 && self.total_tracks == 0
    }

    pub fn has_elevation_data(&self) -> bool {
        self.min_elevation != 0.0 || self.max_elevation != 0.0
    }

    /// Zero out NaN and infinite numbers and drop points or bounds that
    /// carry them. JSON has no representation for them, so a stored
    /// non-finite value would make the whole catalog unreadable. Returns
    /// true when anything was replaced.
    pub fn clear_non_finite(&mut self) -> bool {
        let mut changed = false;
        for v in [
            &mut self.total_distance,
            &mut self.total_distance_moving,
            &mut self.diff_elevation_up,
            &mut self.diff_elevation_down,
            &mut self.avg_elevation,
            &mut self.min_elevation,
            &mut self.max_elevation,
            &mut self.max_speed,
            &mut self.avg_speed,
            &mut self.metric_end,
        ] {
            if !v.is_finite() {
                *v = 0.0;
                changed = true;
            }
        }
        for slot in [&mut self.location_start, &mut self.location_end] {
            if slot.as_ref().is_some_and(|p| !p.has_finite_position()) {
                *slot = None;
                changed = true;
            }
            if let Some(p) = slot.as_mut()
                && p.elevation.is_some_and(|e| !e.is_finite())
            {
                p.elevation = None;
                changed = true;
            }
        }
        if self.bounds.is_some_and(|b| !b.is_finite()) {
            self.bounds = None;
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_values_are_cleared() {
        let mut start = GeoPoint::new(52.0, 13.0);
        start.elevation = Some(f64::NAN);
        let mut a = TrackAnalysis {
            total_distance: 1200.0,
            avg_elevation: f64::NAN,
            max_speed: f64::INFINITY,
            location_start: Some(start),
            location_end: Some(GeoPoint::new(f64::NAN, 13.0)),
            bounds: Some(Bounds::new(52.0, 13.0, f64::NAN, 13.1)),
            ..TrackAnalysis::default()
        };

        assert!(a.clear_non_finite());
        assert_eq!(a.total_distance, 1200.0);
        assert_eq!(a.avg_elevation, 0.0);
        assert_eq!(a.max_speed, 0.0);
        assert_eq!(a.location_start, Some(GeoPoint::new(52.0, 13.0)));
        assert!(a.location_end.is_none());
        assert!(a.bounds.is_none());

        assert!(!a.clear_non_finite());
    }
}
