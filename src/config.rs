use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::geo::GeoConfig;
use crate::core::metadata::{DEFAULT_LIST_KEYS, MetadataNormalizer};
use crate::core::weights::{
    DEFAULT_IMPORTANT_KEYS, DEFAULT_RARE_KEYS, KeySet, KeySets, WeightingSystem,
};

const CONFIG_DIR_NAME: &str = "fimint";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration file {path} is not valid TOML: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("configuration could not be serialized: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub important_keys: Vec<String>,
    pub rare_keys: Vec<String>,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            important_keys: DEFAULT_IMPORTANT_KEYS.iter().map(|s| s.to_string()).collect(),
            rare_keys: DEFAULT_RARE_KEYS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl WeightConfig {
    pub fn key_sets(&self) -> KeySets {
        KeySets {
            important: KeySet::new(self.important_keys.iter().cloned()),
            rare: KeySet::new(self.rare_keys.iter().cloned()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub list_keys: Vec<String>,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            list_keys: DEFAULT_LIST_KEYS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl NormalizationConfig {
    pub fn normalizer(&self) -> MetadataNormalizer {
        MetadataNormalizer::new(self.list_keys.iter().cloned())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// exiftool when it is installed, the built-in EXIF reader otherwise
    #[default]
    Auto,
    /// Always run the external exiftool program
    Exiftool,
    /// Built-in EXIF reader (no external program)
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub kind: ExtractorKind,
    pub exiftool_path: PathBuf,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            kind: ExtractorKind::Auto,
            exiftool_path: PathBuf::from("exiftool"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    pub systems: Vec<WeightingSystem>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            systems: vec![
                WeightingSystem::Equal,
                WeightingSystem::ImportantKeys,
                WeightingSystem::RareKeys,
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub weights: WeightConfig,
    pub normalization: NormalizationConfig,
    pub geo: GeoConfig,
    pub extractor: ExtractorConfig,
    pub comparison: ComparisonConfig,
}

impl AppConfig {
    /// Load from an explicit path (which must exist), else from the user
    /// config directory when present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => {
                log::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.weights.important_keys, ["Author", "Creator", "Producer"]);
        assert_eq!(config.extractor.kind, ExtractorKind::Auto);
        assert_eq!(config.comparison.systems.len(), 3);
        assert_eq!(config.geo.latitude_key, "EXIF:GPSLatitude");
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [weights]
            rare_keys = ["XMP:Rating"]

            [extractor]
            kind = "builtin"

            [comparison]
            systems = ["equal", "custom"]
            "#,
        )
        .unwrap();

        assert_eq!(config.weights.rare_keys, ["XMP:Rating"]);
        assert_eq!(config.weights.important_keys, ["Author", "Creator", "Producer"]);
        assert_eq!(config.extractor.kind, ExtractorKind::Builtin);
        assert_eq!(config.extractor.exiftool_path, PathBuf::from("exiftool"));
        assert_eq!(
            config.comparison.systems,
            [WeightingSystem::Equal, WeightingSystem::Custom]
        );
        assert!(config.weights.key_sets().rare.contains("XMP:Rating"));
    }

    #[test]
    fn test_round_trip_through_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let config = AppConfig::default();
        fs::write(&path, config.to_toml().unwrap()).unwrap();

        assert_eq!(AppConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = AppConfig::load(Some(Path::new("/non/existent/config.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "weights = 3").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
