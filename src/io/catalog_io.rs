use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::io::recovery::atomic_write;
use crate::model::track::TrackRecord;

/// Current on-disk format version
pub const CATALOG_VERSION: u32 = 1;

/// Error type for catalog file I/O
#[derive(Debug, thiserror::Error)]
pub enum CatalogIoError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("could not serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The catalog file as written to disk
#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    tracks: Vec<TrackRecord>,
}

/// Older catalogs stored a bare list of records.
#[derive(Deserialize)]
#[serde(untagged)]
enum AnyCatalogFile {
    Versioned(CatalogFile),
    Bare(Vec<TrackRecord>),
}

/// Default catalog location, respecting XDG_DATA_HOME
pub fn default_catalog_path() -> PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local").join("share"));
    data_dir.join("gpxdb").join("catalog.json")
}

pub(crate) fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
}

/// Serialize records in order. Shared by `write_catalog` and the recovery
/// log, which keeps the payload of a failed write.
pub fn serialize_catalog<'a>(
    records: impl IntoIterator<Item = &'a TrackRecord>,
) -> Result<String, CatalogIoError> {
    #[derive(Serialize)]
    struct CatalogFileRef<'r> {
        version: u32,
        tracks: Vec<&'r TrackRecord>,
    }
    let out = serde_json::to_string_pretty(&CatalogFileRef {
        version: CATALOG_VERSION,
        tracks: records.into_iter().collect(),
    })?;
    Ok(out)
}

/// Write the catalog, replacing the previous file atomically.
pub fn write_catalog(path: &Path, records: &[TrackRecord]) -> Result<(), CatalogIoError> {
    let content = serialize_catalog(records)?;
    write_catalog_content(path, &content)
}

pub(crate) fn write_catalog_content(path: &Path, content: &str) -> Result<(), CatalogIoError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| CatalogIoError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    atomic_write(path, content.as_bytes()).map_err(|e| CatalogIoError::Write {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read the catalog in stored order.
///
/// Unknown fields are ignored and missing ones take their defaults, so files
/// written by newer or older versions still load.
pub fn read_catalog(path: &Path) -> Result<Vec<TrackRecord>, CatalogIoError> {
    let content = fs::read_to_string(path).map_err(|e| CatalogIoError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let parsed: AnyCatalogFile =
        serde_json::from_str(&content).map_err(|e| CatalogIoError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
    let records = match parsed {
        AnyCatalogFile::Versioned(file) => {
            if file.version > CATALOG_VERSION {
                log::info!(
                    "{} was written by a newer version (format {}), unknown fields are ignored",
                    path.display(),
                    file.version
                );
            }
            file.tracks
        }
        AnyCatalogFile::Bare(tracks) => tracks,
    };
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bounds::Bounds;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_records() -> Vec<TrackRecord> {
        let mut a = TrackRecord::new("/trk/a.gpx");
        a.title = "Morning Ride".into();
        a.bounds = Bounds::new(52.0, 13.0, 52.5, 13.5);
        a.analysis.total_distance = 12_345.5;
        a.analysis.points = 812;
        a.add_hidden_group("cafes");
        let b = TrackRecord::new("/trk/b.gpx");
        vec![a, b]
    }

    #[test]
    fn write_then_read_preserves_order_and_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("catalog.json");
        let records = sample_records();

        write_catalog(&path, &records).unwrap();
        let loaded = read_catalog(&path).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn missing_file_is_read_error() {
        let tmp = TempDir::new().unwrap();
        let err = read_catalog(&tmp.path().join("catalog.json")).unwrap_err();
        assert!(matches!(err, CatalogIoError::Read { .. }));
    }

    #[test]
    fn garbage_is_parse_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            read_catalog(&path).unwrap_err(),
            CatalogIoError::Parse { .. }
        ));
    }

    #[test]
    fn unknown_fields_ignored_and_missing_fields_defaulted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        fs::write(
            &path,
            r#"{
  "version": 7,
  "future_setting": true,
  "tracks": [
    { "file_path": "/trk/a.gpx", "sparkle": 3, "style": { "color": 4278255360, "glow": true } }
  ]
}"#,
        )
        .unwrap();

        let loaded = read_catalog(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        let rec = &loaded[0];
        assert_eq!(rec.file_path, "/trk/a.gpx");
        assert_eq!(rec.style.color, 0xFF00FF00);
        assert_eq!(rec.style.width, "7");
        assert!(rec.analysis.is_empty());
        assert!(rec.hidden_groups.is_empty());
    }

    #[test]
    fn bare_list_is_accepted() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        fs::write(&path, r#"[{ "file_path": "/x/1.gpx" }, { "file_path": "/x/2.gpx" }]"#).unwrap();
        let loaded = read_catalog(&path).unwrap();
        let paths: Vec<&str> = loaded.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(paths, vec!["/x/1.gpx", "/x/2.gpx"]);
    }
}
