use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// Type names the editor uses to tell text blocks and spans apart from objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// `_type` of text blocks
    pub block_type: String,
    /// `_type` of text spans inside text blocks
    pub span_type: String,
    /// Style given to placeholder blocks
    pub default_style: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            block_type: "block".to_string(),
            span_type: "span".to_string(),
            default_style: "normal".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Block count at which block inserts and splits are refused
    pub max_blocks: Option<usize>,
    /// Refuse local edits (selection changes still go through)
    pub read_only: bool,
    /// Number of undo steps kept
    pub history_limit: usize,
    /// Number of change events kept for late subscribers
    pub replay_capacity: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_blocks: None,
            read_only: false,
            history_limit: 100,
            replay_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema: SchemaConfig,
    pub editor: EditorConfig,
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load the user's config, falling back to defaults when there is none
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Ok(Self::load()?.unwrap_or_default())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = Self::expand_path(Path::new("$PORTABLE_TEXT_CONFIG_DIR"))
            .unwrap_or_else(|| {
                PathBuf::from(shellexpand::tilde("~/.config/portable-text").as_ref())
            });
        config_dir.join("config.toml")
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_defaults_to_home() {
        unsafe {
            env::remove_var("PORTABLE_TEXT_CONFIG_DIR");
        }
        let config_path = Config::config_path();
        let path_str = config_path.to_string_lossy();

        assert!(!path_str.starts_with('~'));
        assert!(path_str.ends_with(".config/portable-text/config.toml"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.schema.block_type, "block");
        assert_eq!(config.schema.span_type, "span");
        assert_eq!(config.schema.default_style, "normal");
        assert_eq!(config.editor.max_blocks, None);
        assert!(!config.editor.read_only);
        assert_eq!(config.editor.history_limit, 100);
        assert_eq!(config.editor.replay_capacity, 256);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let original = Config {
            schema: SchemaConfig {
                block_type: "textBlock".to_string(),
                ..SchemaConfig::default()
            },
            editor: EditorConfig {
                max_blocks: Some(3),
                ..EditorConfig::default()
            },
        };

        let toml_str = toml::to_string(&original).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config_content = r#"
[editor]
read_only = true
"#;

        let config: Config = toml::from_str(config_content).unwrap();

        assert!(config.editor.read_only);
        assert_eq!(config.editor.history_limit, 100);
        assert_eq!(config.schema, SchemaConfig::default());
    }

    #[test]
    fn test_expand_path_with_env_var() {
        unsafe {
            env::set_var("PT_TEST_VAR", "/test/env/path");
        }

        let path = PathBuf::from("$PT_TEST_VAR/subdir");
        let expanded = Config::expand_path(&path);

        assert_eq!(expanded, Some(PathBuf::from("/test/env/path/subdir")));

        unsafe {
            env::remove_var("PT_TEST_VAR");
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let non_existent_config = temp_dir.path().join("nonexistent.toml");

        let result = Config::load_from_path(&non_existent_config).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_load_config_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("config.toml");
        std::fs::write(&config_file, "[editor\nread_only = ").unwrap();

        let result = Config::load_from_path(&config_file);

        assert!(matches!(result, Err(ConfigError::ConfigParseError { .. })));
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("nested").join("config.toml");
        let test_config = Config {
            editor: EditorConfig {
                max_blocks: Some(10),
                read_only: true,
                ..EditorConfig::default()
            },
            ..Config::default()
        };

        test_config.save_to_path(&config_file).unwrap();
        let loaded_config = Config::load_from_path(&config_file).unwrap().unwrap();

        assert_eq!(loaded_config, test_config);
    }
}
