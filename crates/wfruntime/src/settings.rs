use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wfcore::value::to_text;
use wfcore::Value;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Settings file {0} must contain a JSON object")]
    NotAnObject(PathBuf),
}

/// Source of persisted string settings, consulted once per compilation
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> Result<HashMap<String, String>, SettingsError>;
}

/// No persisted settings at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSettings;

impl SettingsSource for NoSettings {
    fn load(&self) -> Result<HashMap<String, String>, SettingsError> {
        Ok(HashMap::new())
    }
}

/// Settings held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub HashMap<String, String>);

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl SettingsSource for StaticSettings {
    fn load(&self) -> Result<HashMap<String, String>, SettingsError> {
        Ok(self.0.clone())
    }
}

/// Settings persisted as a JSON object on disk.
///
/// Either a flat object or an object whose `env` member is the flat object.
/// Non-string values are stored as their JSON text.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for JsonFileSettings {
    fn load(&self) -> Result<HashMap<String, String>, SettingsError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;
        let parsed: Value = serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let object = match parsed {
            Value::Object(mut map) => match map.remove("env") {
                Some(Value::Object(env)) => env,
                Some(other) => {
                    map.insert("env".to_string(), other);
                    map
                }
                None => map,
            },
            _ => return Err(SettingsError::NotAnObject(self.path.clone())),
        };

        Ok(object
            .into_iter()
            .map(|(key, value)| (key, to_text(&value)))
            .collect())
    }
}

/// Load settings, treating any failure as an empty map.
pub fn load_or_empty(source: &dyn SettingsSource) -> HashMap<String, String> {
    match source.load() {
        Ok(settings) => {
            tracing::debug!("Loaded {} setting(s)", settings.len());
            settings
        }
        Err(e) => {
            tracing::warn!("Ignoring persisted settings: {}", e);
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_file_reads_env_section_and_stringifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"env": {"token": "y", "limit": 5, "debug": true}}"#).unwrap();

        let settings = JsonFileSettings::new(&path).load().unwrap();
        assert_eq!(settings["token"], "y");
        assert_eq!(settings["limit"], "5");
        assert_eq!(settings["debug"], "true");
    }

    #[test]
    fn corrupt_file_falls_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        let source = JsonFileSettings::new(&path);
        assert!(matches!(source.load(), Err(SettingsError::Parse { .. })));
        assert!(load_or_empty(&source).is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_empty() {
        let source = JsonFileSettings::new("/definitely/not/here/settings.json");
        assert!(matches!(source.load(), Err(SettingsError::Io { .. })));
        assert!(load_or_empty(&source).is_empty());
    }
}
