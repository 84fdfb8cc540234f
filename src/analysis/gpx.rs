use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, Utc};

use super::{AnalysisError, AnalysisProvider};
use crate::model::analysis::{GeoPoint, TrackAnalysis};
use crate::model::bounds::Bounds;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two coordinates.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Built-in provider: reads GPX tracks, routes and waypoints with the
/// `gpx` crate and summarizes them.
#[derive(Debug, Clone)]
pub struct GpxAnalyzer {
    /// Segments slower than this (m/s) count as stopped
    pub moving_speed_threshold: f64,
}

impl Default for GpxAnalyzer {
    fn default() -> Self {
        GpxAnalyzer {
            moving_speed_threshold: 0.5,
        }
    }
}

impl GpxAnalyzer {
    pub fn new(moving_speed_threshold: f64) -> Self {
        GpxAnalyzer {
            moving_speed_threshold,
        }
    }

    /// Analyze GPX text. `path` is only used in error messages.
    pub fn analyze_str(&self, path: &Path, content: &str) -> Result<TrackAnalysis, AnalysisError> {
        self.analyze_reader(path, content.as_bytes())
    }

    fn analyze_reader<R: Read>(&self, path: &Path, reader: R) -> Result<TrackAnalysis, AnalysisError> {
        let doc = gpx::read(reader).map_err(|e| AnalysisError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(self.summarize(&Scanned::from_gpx(doc)))
    }

    fn summarize(&self, scanned: &Scanned) -> TrackAnalysis {
        let mut out = TrackAnalysis::default();
        let mut bounds = Bounds::empty();
        let mut ele_sum = 0.0;
        let mut ele_count = 0u32;
        let mut min_ele = f64::MAX;
        let mut max_ele = f64::MIN;

        out.wpt_points = scanned.waypoints.len() as u32;
        for wpt in &scanned.waypoints {
            bounds.extend(wpt.lat, wpt.lon);
        }

        for segment in scanned.segments.iter().filter(|s| !s.is_empty()) {
            out.total_tracks += 1;
            for (i, pt) in segment.iter().enumerate() {
                out.points += 1;
                bounds.extend(pt.lat, pt.lon);
                if let Some(ele) = pt.elevation {
                    ele_sum += ele;
                    ele_count += 1;
                    min_ele = min_ele.min(ele);
                    max_ele = max_ele.max(ele);
                }
                if let Some(t) = pt.time {
                    out.start_time = Some(out.start_time.map_or(t, |s| s.min(t)));
                    out.end_time = Some(out.end_time.map_or(t, |e| e.max(t)));
                }
                if out.location_start.is_none() {
                    out.location_start = Some(pt.clone());
                }
                out.location_end = Some(pt.clone());

                let Some(prev) = i.checked_sub(1).map(|j| &segment[j]) else {
                    continue;
                };
                let dist = haversine_distance(prev.lat, prev.lon, pt.lat, pt.lon);
                out.total_distance += dist;

                if let (Some(a), Some(b)) = (prev.elevation, pt.elevation) {
                    let diff = b - a;
                    if diff > 0.0 {
                        out.diff_elevation_up += diff;
                    } else {
                        out.diff_elevation_down -= diff;
                    }
                }

                if let (Some(t0), Some(t1)) = (prev.time, pt.time) {
                    let dt_ms = (t1 - t0).num_milliseconds();
                    if dt_ms > 0 {
                        let speed = dist / (dt_ms as f64 / 1000.0);
                        if speed > self.moving_speed_threshold {
                            out.time_moving += dt_ms;
                            out.total_distance_moving += dist;
                            out.max_speed = out.max_speed.max(speed);
                        }
                    }
                }
            }
        }

        if ele_count > 0 {
            out.avg_elevation = ele_sum / ele_count as f64;
            out.min_elevation = min_ele;
            out.max_elevation = max_ele;
        }
        if let (Some(start), Some(end)) = (out.start_time, out.end_time) {
            out.time_span = (end - start).num_milliseconds();
        }
        if out.time_moving > 0 {
            out.avg_speed = out.total_distance_moving / (out.time_moving as f64 / 1000.0);
        }
        out.metric_end = out.total_distance;
        if !bounds.is_empty() {
            out.bounds = Some(bounds);
        }
        out
    }
}

impl AnalysisProvider for GpxAnalyzer {
    fn compute(&self, path: &Path) -> Result<TrackAnalysis, AnalysisError> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AnalysisError::NotFound(path.to_path_buf())
            } else {
                AnalysisError::Io {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        self.analyze_reader(path, BufReader::new(file))
    }
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

/// Track segments and routes as point lists, plus loose waypoints.
#[derive(Default)]
struct Scanned {
    segments: Vec<Vec<GeoPoint>>,
    waypoints: Vec<GeoPoint>,
}

impl Scanned {
    fn from_gpx(doc: gpx::Gpx) -> Self {
        let points = |wpts: Vec<gpx::Waypoint>| -> Vec<GeoPoint> {
            wpts.iter().filter_map(to_geo_point).collect()
        };
        let mut segments: Vec<Vec<GeoPoint>> = doc
            .tracks
            .into_iter()
            .flat_map(|track| track.segments)
            .map(|segment| points(segment.points))
            .collect();
        segments.extend(doc.routes.into_iter().map(|route| points(route.points)));
        Scanned {
            segments,
            waypoints: points(doc.waypoints),
        }
    }
}

/// Points without a usable position are skipped; NaN or infinite
/// elevations are treated as missing.
fn to_geo_point(wpt: &gpx::Waypoint) -> Option<GeoPoint> {
    let geo = wpt.point();
    let mut pt = GeoPoint::new(geo.y(), geo.x());
    if !pt.has_finite_position() {
        return None;
    }
    pt.elevation = wpt.elevation.filter(|e| e.is_finite());
    pt.time = wpt
        .time
        .as_ref()
        .and_then(|t| t.format().ok())
        .and_then(|iso| DateTime::parse_from_rfc3339(&iso).ok())
        .map(|t| t.with_timezone(&Utc));
    Some(pt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <wpt lat="52.0005" lon="13.0005"><name>Cafe</name></wpt>
  <trk>
    <name>Morning Ride</name>
    <trkseg>
      <trkpt lat="52.0" lon="13.0"><ele>100</ele><time>2024-05-01T08:00:00Z</time></trkpt>
      <trkpt lat="52.001" lon="13.0"><ele>110</ele><time>2024-05-01T08:00:20Z</time></trkpt>
      <trkpt lat="52.002" lon="13.0"><ele>105</ele><time>2024-05-01T08:00:40Z</time></trkpt>
      <trkpt lat="52.002" lon="13.0"><ele>105</ele><time>2024-05-01T08:01:40Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="52.01" lon="13.01"/>
    </trkseg>
  </trk>
</gpx>
"#;

    #[test]
    fn haversine_one_degree_of_longitude_at_equator() {
        let dist = haversine_distance(0.0, 0.0, 0.0, 1.0);
        assert!((dist - 111_195.0).abs() < 200.0);
    }

    #[test]
    fn sample_statistics() {
        let a = GpxAnalyzer::default()
            .analyze_str(Path::new("sample.gpx"), SAMPLE)
            .unwrap();

        assert_eq!(a.points, 5);
        assert_eq!(a.wpt_points, 1);
        assert_eq!(a.total_tracks, 2);

        // two ~111 m steps, the stationary minute adds nothing
        assert!((a.total_distance - 222.4).abs() < 1.0, "{}", a.total_distance);
        assert!((a.total_distance_moving - a.total_distance).abs() < 1e-9);
        assert_eq!(a.time_span, 100_000);
        assert_eq!(a.time_moving, 40_000);
        assert!((a.max_speed - 5.56).abs() < 0.05, "{}", a.max_speed);
        assert!((a.avg_speed - 5.56).abs() < 0.05, "{}", a.avg_speed);

        assert_eq!(a.min_elevation, 100.0);
        assert_eq!(a.max_elevation, 110.0);
        assert_eq!(a.diff_elevation_up, 10.0);
        assert_eq!(a.diff_elevation_down, 5.0);
        assert_eq!(a.avg_elevation, 105.0);

        let start = a.location_start.as_ref().unwrap();
        assert_eq!((start.lat, start.lon), (52.0, 13.0));
        let end = a.location_end.as_ref().unwrap();
        assert_eq!((end.lat, end.lon), (52.01, 13.01));

        let bounds = a.bounds.unwrap();
        assert_eq!(bounds, Bounds::new(52.0, 13.0, 52.01, 13.01));
    }

    #[test]
    fn routes_count_as_segments() {
        let gpx = r#"<gpx version="1.1" creator="test"><rte><rtept lat="1" lon="1"/><rtept lat="1" lon="2"/></rte></gpx>"#;
        let a = GpxAnalyzer::default()
            .analyze_str(Path::new("r.gpx"), gpx)
            .unwrap();
        assert_eq!(a.points, 2);
        assert_eq!(a.total_tracks, 1);
        assert!(a.total_distance > 100_000.0);
        assert!(a.start_time.is_none());
        assert_eq!(a.time_moving, 0);
    }

    #[test]
    fn nan_elevation_is_treated_as_missing() {
        let gpx = r#"<gpx version="1.1" creator="test"><trk><trkseg>
            <trkpt lat="1" lon="1"><ele>NaN</ele></trkpt>
            <trkpt lat="1" lon="1.001"><ele>12</ele></trkpt>
        </trkseg></trk></gpx>"#;
        let a = GpxAnalyzer::default()
            .analyze_str(Path::new("n.gpx"), gpx)
            .unwrap();
        assert_eq!(a.points, 2);
        assert_eq!(a.avg_elevation, 12.0);
        assert_eq!(a.diff_elevation_up, 0.0);
        assert!(a.location_start.unwrap().elevation.is_none());
    }

    #[test]
    fn not_gpx_is_parse_error() {
        let err = GpxAnalyzer::default()
            .analyze_str(Path::new("x.gpx"), "<kml></kml>")
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { .. }));
    }

    #[test]
    fn bad_coordinate_is_parse_error() {
        let gpx = r#"<gpx version="1.1" creator="test"><trk><trkseg><trkpt lat="north" lon="1"/></trkseg></trk></gpx>"#;
        let err = GpxAnalyzer::default()
            .analyze_str(Path::new("x.gpx"), gpx)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { .. }));
    }

    #[test]
    fn reads_from_disk() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("ride.gpx");
        std::fs::write(&file, SAMPLE).unwrap();
        let a = GpxAnalyzer::default().compute(&file).unwrap();
        assert_eq!(a.points, 5);
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = GpxAnalyzer::default()
            .compute(&tmp.path().join("gone.gpx"))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound(_)));
    }
}
