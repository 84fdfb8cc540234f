use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::track::{DEFAULT_TRACK_COLOR, DEFAULT_WIDTH_MULTIPLIER, TrackStyle};

/// Configuration from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub style: StyleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSection {
    /// Where the catalog file lives. `None` means the default data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Folder imported tracks are kept under; used for relative directories.
    #[serde(default)]
    pub tracks_root: Option<PathBuf>,
    /// Write the catalog after every mutation
    #[serde(default = "default_true")]
    pub autosave: bool,
}

impl Default for CatalogSection {
    fn default() -> Self {
        CatalogSection {
            path: None,
            tracks_root: None,
            autosave: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Segments slower than this (m/s) count as stopped time
    #[serde(default = "default_moving_speed")]
    pub moving_speed_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            moving_speed_threshold: default_moving_speed(),
        }
    }
}

/// Style given to newly added tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    /// `#AARRGGBB` or `#RRGGBB`
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_width")]
    pub width: String,
    #[serde(default = "default_coloring")]
    pub coloring_type: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        StyleConfig {
            color: default_color(),
            width: default_width(),
            coloring_type: default_coloring(),
        }
    }
}

impl StyleConfig {
    /// The configured style, falling back to the built-in color when the
    /// configured one does not parse.
    pub fn to_style(&self) -> TrackStyle {
        TrackStyle {
            color: parse_color(&self.color).unwrap_or(DEFAULT_TRACK_COLOR),
            width: self.width.clone(),
            coloring_type: self.coloring_type.clone(),
            ..TrackStyle::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_moving_speed() -> f64 {
    0.5
}

fn default_color() -> String {
    format_color(DEFAULT_TRACK_COLOR)
}

fn default_width() -> String {
    DEFAULT_WIDTH_MULTIPLIER.to_string()
}

fn default_coloring() -> String {
    "solid".to_string()
}

/// Parse `#AARRGGBB` or `#RRGGBB` (leading `#` optional). Six-digit colors
/// are made opaque.
pub fn parse_color(s: &str) -> Option<u32> {
    let hex = s.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        8 => u32::from_str_radix(hex, 16).ok(),
        6 => u32::from_str_radix(hex, 16).ok().map(|rgb| 0xFF00_0000 | rgb),
        _ => None,
    }
}

pub fn format_color(argb: u32) -> String {
    format!("#{:08X}", argb)
}
