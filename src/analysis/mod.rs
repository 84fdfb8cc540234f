//! Trail statistics for track files.
//!
//! The catalog asks an [`AnalysisProvider`] for fresh statistics and never
//! reads track files itself. [`GpxAnalyzer`] is the built-in provider.

mod gpx;

use std::path::{Path, PathBuf};

pub use self::gpx::{GpxAnalyzer, haversine_distance};

use crate::model::analysis::TrackAnalysis;

/// Why a track file could not be analyzed
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("track file not found: {0}")]
    NotFound(PathBuf),
    #[error("could not parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Computes statistics for a track file on disk.
///
/// Implementations may block on file I/O; the catalog only calls them
/// outside its lock.
pub trait AnalysisProvider: Send + Sync {
    fn compute(&self, path: &Path) -> Result<TrackAnalysis, AnalysisError>;
}

impl<F> AnalysisProvider for F
where
    F: Fn(&Path) -> Result<TrackAnalysis, AnalysisError> + Send + Sync,
{
    fn compute(&self, path: &Path) -> Result<TrackAnalysis, AnalysisError> {
        self(path)
    }
}
