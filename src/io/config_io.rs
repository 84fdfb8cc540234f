use std::fs;
use std::path::{Path, PathBuf};

use crate::io::catalog_io::{default_catalog_path, home_dir};
use crate::model::config::CatalogConfig;

/// Error type for reading config.toml
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Get the config file path, respecting XDG_CONFIG_HOME
pub fn config_path() -> PathBuf {
    let config_dir = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"));
    config_dir.join("gpxdb").join("config.toml")
}

/// Read the config from a specific path. A missing file yields defaults;
/// an unreadable or malformed one is an error.
pub fn read_config_from(path: &Path) -> Result<CatalogConfig, ConfigError> {
    if !path.exists() {
        return Ok(CatalogConfig::default());
    }
    let text = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read the config from the default location.
pub fn read_config() -> Result<CatalogConfig, ConfigError> {
    read_config_from(&config_path())
}

/// The catalog file a config points at.
pub fn resolve_catalog_path(config: &CatalogConfig) -> PathBuf {
    config
        .catalog
        .path
        .clone()
        .unwrap_or_else(default_catalog_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = read_config_from(&tmp.path().join("config.toml")).unwrap();
        assert!(config.catalog.autosave);
        assert!(config.catalog.path.is_none());
    }

    #[test]
    fn config_overrides_catalog_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[catalog]
path = "/srv/tracks/catalog.json"
tracks_root = "/srv/tracks"
"#,
        )
        .unwrap();
        let config = read_config_from(&path).unwrap();
        assert_eq!(
            resolve_catalog_path(&config),
            PathBuf::from("/srv/tracks/catalog.json")
        );
        assert_eq!(config.catalog.tracks_root, Some(PathBuf::from("/srv/tracks")));
    }

    #[test]
    fn malformed_config_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[catalog\nautosave = ").unwrap();
        assert!(matches!(
            read_config_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
