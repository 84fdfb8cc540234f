use serde::Serialize;

use crate::model::config::format_color;
use crate::model::track::TrackRecord;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TrackSummaryJson {
    pub path: String,
    pub file_name: String,
    pub title: String,
    pub color: String,
    pub distance_m: f64,
    pub points: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub new: bool,
}

#[derive(Serialize)]
pub struct MoveResultJson {
    pub old: String,
    pub new: String,
    pub moved: bool,
}

pub fn track_to_summary(record: &TrackRecord) -> TrackSummaryJson {
    TrackSummaryJson {
        path: record.file_path.clone(),
        file_name: record.file_name.clone(),
        title: record.nice_title(),
        color: format_color(record.style.color),
        distance_m: record.analysis.total_distance,
        points: record.analysis.points,
        new: record.is_new,
    }
}

// ---------------------------------------------------------------------------
// Human-readable formatting
// ---------------------------------------------------------------------------

/// Meters as `850 m` or `12.35 km`.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.2} km", meters / 1000.0)
    }
}

/// Milliseconds as `h:mm:ss`.
pub fn format_duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// One-line summary for `list`
pub fn format_track_line(record: &TrackRecord) -> String {
    let marker = if record.is_new { "*" } else { " " };
    format!(
        "{} {}  {}  {}  {} pts",
        marker,
        record.file_path,
        record.nice_title(),
        format_distance(record.analysis.total_distance),
        record.analysis.points
    )
}

/// Detailed view for `show`
pub fn format_track_detail(record: &TrackRecord) -> Vec<String> {
    let a = &record.analysis;
    let mut lines = vec![
        record.nice_title(),
        format!("path: {}", record.file_path),
        format!(
            "imported: {}",
            record.import_date.format("%Y-%m-%d %H:%M")
        ),
    ];
    if !record.description.is_empty() {
        lines.push(format!("description: {}", record.description));
    }
    if let Some((lat, lon)) = record.bounds.center() {
        lines.push(format!("center: {:.5}, {:.5}", lat, lon));
    }

    lines.push(format!(
        "style: {} width {} coloring {}",
        format_color(record.style.color),
        record.style.width,
        record.style.coloring_type
    ));
    if !record.hidden_groups.is_empty() {
        let groups: Vec<&str> = record.hidden_groups.iter().map(String::as_str).collect();
        lines.push(format!("hidden groups: {}", groups.join(", ")));
    }

    if a.is_empty() {
        lines.push("statistics: not analyzed".to_string());
        return lines;
    }
    lines.push(format!(
        "distance: {} ({} moving)",
        format_distance(a.total_distance),
        format_distance(a.total_distance_moving)
    ));
    lines.push(format!(
        "time: {} ({} moving)",
        format_duration(a.time_span),
        format_duration(a.time_moving)
    ));
    if a.has_elevation_data() {
        lines.push(format!(
            "elevation: {:.0}..{:.0} m, +{:.0} / -{:.0} m",
            a.min_elevation, a.max_elevation, a.diff_elevation_up, a.diff_elevation_down
        ));
    }
    lines.push(format!(
        "speed: avg {:.1} km/h, max {:.1} km/h",
        a.avg_speed * 3.6,
        a.max_speed * 3.6
    ));
    lines.push(format!(
        "points: {} in {} segments, {} waypoints",
        a.points, a.total_tracks, a.wpt_points
    ));
    lines
}
