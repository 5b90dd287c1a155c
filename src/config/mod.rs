//! TOML settings for timeline production.

mod errors;
mod settings;

use std::path::Path;

use serde::de::Error as SerdeDeError;

pub use errors::ConfigError;
pub use settings::TimelineSettings;

/// Conventional settings filename.
pub const SETTINGS_FILE_NAME: &str = "timeline.toml";

/// Load settings from `path`, returning defaults if it does not exist.
pub fn load_from(path: &Path) -> Result<TimelineSettings, ConfigError> {
    if !path.exists() {
        return Ok(TimelineSettings::default());
    }
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source: SerdeDeError::custom(source),
    })?;
    toml::from_str(&text)
        .map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })
        .map(TimelineSettings::normalized)
}

/// Save settings to a specific path, creating parent directories as needed.
pub fn save_to_path(settings: &TimelineSettings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(settings).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::TimelineKind;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_from(&dir.path().join(SETTINGS_FILE_NAME)).unwrap();
        assert_eq!(settings, TimelineSettings::default());
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE_NAME);
        let mut settings = TimelineSettings {
            kind: TimelineKind::Mcep,
            frame_skip_seconds: 0.01,
            frame_samples: 160,
            ..TimelineSettings::default()
        };
        settings
            .processing
            .insert("mcep.order".to_string(), "24".to_string());
        save_to_path(&settings, &path).unwrap();
        assert_eq!(load_from(&path).unwrap(), settings);
    }

    #[test]
    fn partial_file_fills_defaults_and_normalizes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "kind = \"hnm\"\nframe_samples = 0\n").unwrap();
        let settings = load_from(&path).unwrap();
        assert_eq!(settings.kind, TimelineKind::Hnm);
        assert_eq!(settings.frame_samples, settings::DEFAULT_FRAME_SAMPLES);
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "kind = [").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn processing_header_records_framing() {
        let header = TimelineSettings::default().processing_header();
        assert_eq!(header.get("frame_samples"), Some("80"));
        assert_eq!(header.get("frame_skip_seconds"), Some("0.005"));
    }
}
