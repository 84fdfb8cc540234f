use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::analysis::TrackAnalysis;
use super::bounds::Bounds;

/// Default track color: opaque red, ARGB.
pub const DEFAULT_TRACK_COLOR: u32 = 0xFFFF_0000;

/// Default line width multiplier when no preset is chosen.
pub const DEFAULT_WIDTH_MULTIPLIER: u32 = 7;

/// Named line width presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidthPreset {
    Thin,
    Medium,
    Bold,
}

/// A parsed `width` value: either a named preset or a custom pixel width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackWidth {
    Preset(WidthPreset),
    Custom(u32),
}

impl TrackWidth {
    /// Parse a width string. Unknown non-numeric values yield `None`.
    pub fn parse(s: &str) -> Option<TrackWidth> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thin" => Some(TrackWidth::Preset(WidthPreset::Thin)),
            "medium" => Some(TrackWidth::Preset(WidthPreset::Medium)),
            "bold" => Some(TrackWidth::Preset(WidthPreset::Bold)),
            other => other.parse::<u32>().ok().map(TrackWidth::Custom),
        }
    }
}

impl std::fmt::Display for TrackWidth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackWidth::Preset(WidthPreset::Thin) => write!(f, "thin"),
            TrackWidth::Preset(WidthPreset::Medium) => write!(f, "medium"),
            TrackWidth::Preset(WidthPreset::Bold) => write!(f, "bold"),
            TrackWidth::Custom(px) => write!(f, "{}", px),
        }
    }
}

/// How a track line is colored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColoringType {
    Solid,
    Speed,
    Altitude,
    Slope,
}

impl ColoringType {
    pub fn as_str(self) -> &'static str {
        match self {
            ColoringType::Solid => "solid",
            ColoringType::Speed => "speed",
            ColoringType::Altitude => "altitude",
            ColoringType::Slope => "slope",
        }
    }

    pub fn parse(s: &str) -> Option<ColoringType> {
        match s {
            "" | "solid" => Some(ColoringType::Solid),
            "speed" => Some(ColoringType::Speed),
            "altitude" => Some(ColoringType::Altitude),
            "slope" => Some(ColoringType::Slope),
            _ => None,
        }
    }
}

/// Visual styling of a track on the map.
///
/// `width` and `coloring_type` are kept as strings so values written by a
/// newer version survive a round trip through an older one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackStyle {
    pub color: u32,
    pub width: String,
    pub coloring_type: String,
    pub show_start_finish: bool,
    pub join_segments: bool,
    pub show_arrows: bool,
}

impl Default for TrackStyle {
    fn default() -> Self {
        TrackStyle {
            color: DEFAULT_TRACK_COLOR,
            width: DEFAULT_WIDTH_MULTIPLIER.to_string(),
            coloring_type: ColoringType::Solid.as_str().to_string(),
            show_start_finish: true,
            join_segments: false,
            show_arrows: false,
        }
    }
}

impl TrackStyle {
    pub fn parsed_width(&self) -> Option<TrackWidth> {
        TrackWidth::parse(&self.width)
    }

    pub fn parsed_coloring(&self) -> Option<ColoringType> {
        ColoringType::parse(&self.coloring_type)
    }
}

/// One catalog entry describing an imported track file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Absolute path to the track file (primary key)
    pub file_path: String,
    /// Last path component; shared names across folders are allowed
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Records stored without a date load as the Unix epoch
    #[serde(default = "unknown_import_date")]
    pub import_date: DateTime<Utc>,
    #[serde(default)]
    pub bounds: Bounds,
    /// Set on import, cleared once the user has looked at the track
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub style: TrackStyle,
    #[serde(default)]
    pub analysis: TrackAnalysis,
    #[serde(default)]
    pub hidden_groups: IndexSet<String>,
}

impl TrackRecord {
    /// A fresh record for `file_path` with default style and empty statistics.
    pub fn new(file_path: &str) -> Self {
        TrackRecord {
            file_path: file_path.to_string(),
            file_name: file_name_of(file_path),
            title: String::new(),
            description: String::new(),
            import_date: Utc::now(),
            bounds: Bounds::empty(),
            is_new: true,
            style: TrackStyle::default(),
            analysis: TrackAnalysis::default(),
            hidden_groups: IndexSet::new(),
        }
    }

    /// Title for display: the explicit title, or the file stem with
    /// underscores turned into spaces.
    pub fn nice_title(&self) -> String {
        if !self.title.trim().is_empty() {
            return self.title.clone();
        }
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
            .replace('_', " ")
    }

    /// Replace the statistics with a fresh analysis. Bounds reported by the
    /// analysis replace the stored bounds. NaN and infinite values are
    /// cleared first.
    pub fn apply_analysis(&mut self, mut analysis: TrackAnalysis) {
        if analysis.clear_non_finite() {
            log::warn!("{}: analysis had non-finite values, cleared them", self.file_path);
        }
        if let Some(bounds) = analysis.bounds.take() {
            self.bounds = bounds;
        }
        self.analysis = analysis;
    }

    /// Returns true if the group was newly hidden.
    pub fn add_hidden_group(&mut self, name: &str) -> bool {
        self.hidden_groups.insert(name.to_string())
    }

    /// Returns true if the group was hidden before.
    pub fn remove_hidden_group(&mut self, name: &str) -> bool {
        self.hidden_groups.shift_remove(name)
    }

    /// Move the record to a new path, keeping everything else.
    pub(crate) fn set_file_path(&mut self, file_path: String) {
        self.file_name = file_name_of(&file_path);
        self.file_path = file_path;
    }
}

fn unknown_import_date() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Lexically clean a path so one file has one key: repeated separators,
/// `.` components and trailing separators are dropped. `..` is kept, and
/// symlinks are not resolved.
pub fn normalize_path(file_path: &str) -> String {
    let cleaned: PathBuf = Path::new(file_path)
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if cleaned.as_os_str().is_empty() {
        return file_path.to_string();
    }
    cleaned.to_string_lossy().into_owned()
}

/// Last component of a path, or the whole string when there is none.
pub fn file_name_of(file_path: &str) -> String {
    Path::new(file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_defaults() {
        let rec = TrackRecord::new("/trk/a.gpx");
        assert_eq!(rec.file_name, "a.gpx");
        assert_eq!(rec.style.color, DEFAULT_TRACK_COLOR);
        assert_eq!(rec.style.width, "7");
        assert_eq!(rec.style.parsed_coloring(), Some(ColoringType::Solid));
        assert!(rec.analysis.is_empty());
        assert!(rec.is_new);
    }

    #[test]
    fn nice_title_falls_back_to_file_stem() {
        let mut rec = TrackRecord::new("/trk/morning_ride_2024.gpx");
        assert_eq!(rec.nice_title(), "morning ride 2024");
        rec.title = "Morning Ride".into();
        assert_eq!(rec.nice_title(), "Morning Ride");
        rec.title = "   ".into();
        assert_eq!(rec.nice_title(), "morning ride 2024");
    }

    #[test]
    fn paths_normalize_lexically() {
        assert_eq!(normalize_path("/a//x.gpx"), "/a/x.gpx");
        assert_eq!(normalize_path("/a/./b/"), "/a/b");
        assert_eq!(normalize_path("/a/../x.gpx"), "/a/../x.gpx");
        assert_eq!(normalize_path("x.gpx"), "x.gpx");
    }

    #[test]
    fn missing_import_date_loads_the_same_every_time() {
        let json = r#"{"file_path": "/trk/a.gpx"}"#;
        let first: TrackRecord = serde_json::from_str(json).unwrap();
        let second: TrackRecord = serde_json::from_str(json).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.import_date, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn apply_analysis_clears_nan() {
        let mut rec = TrackRecord::new("/trk/a.gpx");
        rec.apply_analysis(TrackAnalysis {
            points: 3,
            avg_elevation: f64::NAN,
            ..TrackAnalysis::default()
        });
        assert_eq!(rec.analysis.points, 3);
        assert_eq!(rec.analysis.avg_elevation, 0.0);
        assert!(serde_json::to_string(&rec).unwrap().contains("\"avg_elevation\":0.0"));
    }

    #[test]
    fn hidden_groups_are_idempotent() {
        let mut rec = TrackRecord::new("/trk/a.gpx");
        assert!(rec.add_hidden_group("cafes"));
        assert!(!rec.add_hidden_group("cafes"));
        assert_eq!(rec.hidden_groups.len(), 1);
        assert!(!rec.remove_hidden_group("parking"));
        assert_eq!(rec.hidden_groups.len(), 1);
        assert!(rec.remove_hidden_group("cafes"));
        assert!(rec.hidden_groups.is_empty());
    }

    #[test]
    fn width_parses_presets_and_pixels() {
        assert_eq!(
            TrackWidth::parse("Bold"),
            Some(TrackWidth::Preset(WidthPreset::Bold))
        );
        assert_eq!(TrackWidth::parse("12"), Some(TrackWidth::Custom(12)));
        assert_eq!(TrackWidth::parse("wide"), None);
        assert_eq!(TrackWidth::Custom(12).to_string(), "12");
    }

    #[test]
    fn unknown_coloring_is_preserved_as_string() {
        let mut style = TrackStyle::default();
        style.coloring_type = "gradient_v2".into();
        assert_eq!(style.parsed_coloring(), None);
        let json = serde_json::to_string(&style).unwrap();
        let back: TrackStyle = serde_json::from_str(&json).unwrap();
        assert_eq!(back.coloring_type, "gradient_v2");
    }

    #[test]
    fn apply_analysis_takes_reported_bounds() {
        let mut rec = TrackRecord::new("/trk/a.gpx");
        let analysis = TrackAnalysis {
            points: 10,
            bounds: Some(Bounds::new(1.0, 2.0, 3.0, 4.0)),
            ..Default::default()
        };
        rec.apply_analysis(analysis);
        assert_eq!(rec.bounds, Bounds::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(rec.analysis.points, 10);
        assert!(rec.analysis.bounds.is_none());
    }

    #[test]
    fn set_file_path_updates_file_name() {
        let mut rec = TrackRecord::new("/trk/old/a.gpx");
        rec.set_file_path("/trk/new/b.gpx".into());
        assert_eq!(rec.file_path, "/trk/new/b.gpx");
        assert_eq!(rec.file_name, "b.gpx");
    }
}
