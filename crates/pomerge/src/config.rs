//! Process configuration.
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! file (or no file at all) yields a working configuration. The ledger path
//! can be overridden with the `POMERGE_DB` environment variable, and the
//! cloud recognizer credential is read from the environment at client
//! construction time — its absence disables that one capability only.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable overriding the ledger database path.
pub const DB_PATH_ENV: &str = "POMERGE_DB";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root directory scanned for input documents. Expected to contain
    /// `po/`, `do/` and `si/` subdirectories.
    pub input_directory: PathBuf,
    /// Directory where merged bundle PDFs are written.
    pub output_directory: PathBuf,
    /// Ledger database path. `None` resolves to the platform default.
    pub database_path: Option<PathBuf>,
    pub ocr: OcrConfig,
    pub recognizer: RecognizerConfig,
    /// Sleep between passes in loop mode, seconds.
    pub loop_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_directory: PathBuf::from("input"),
            output_directory: PathBuf::from("merged"),
            database_path: None,
            ocr: OcrConfig::default(),
            recognizer: RecognizerConfig::default(),
            loop_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OcrConfig {
    /// Tesseract language codes, joined with `+`.
    pub languages: Vec<String>,
    /// Rasterization resolution for OCR.
    pub dpi: u32,
    /// Upper bound on pages rasterized per document. Vendor documents put
    /// the identifying header on the first page; scanning everything is
    /// wasted work on large attachments.
    pub max_pages: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: vec!["eng".to_string()],
            dpi: 300,
            max_pages: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecognizerConfig {
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Candidate models, tried in order.
    pub models: Vec<String>,
    /// Maximum retries after a rate-limited response.
    pub max_retries: u32,
    /// Per-request timeout, seconds.
    pub timeout_secs: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GEMINI_API_KEY".to_string(),
            models: vec![
                "gemini-2.5-flash".to_string(),
                "gemini-2.0-flash".to_string(),
                "gemini-flash-latest".to_string(),
                "gemini-1.5-flash-latest".to_string(),
            ],
            max_retries: 3,
            timeout_secs: 120,
        }
    }
}

impl Config {
    /// Resolves the effective ledger path: env override, then config value,
    /// then `~/.pomerge/data/pomerge.db`.
    pub fn resolved_database_path(&self) -> PathBuf {
        if let Ok(env_path) = std::env::var(DB_PATH_ENV) {
            if !env_path.is_empty() {
                return PathBuf::from(env_path);
            }
        }
        if let Some(ref path) = self.database_path {
            return path.clone();
        }
        dirs::home_dir()
            .map(|h| h.join(".pomerge").join("data").join("pomerge.db"))
            .unwrap_or_else(|| PathBuf::from("pomerge.db"))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ocr.dpi == 0 {
            return Err(ConfigError::Validation {
                message: "ocr.dpi must be greater than zero".to_string(),
            });
        }
        if self.ocr.max_pages == 0 {
            return Err(ConfigError::Validation {
                message: "ocr.max_pages must be greater than zero".to_string(),
            });
        }
        if self.recognizer.models.is_empty() {
            return Err(ConfigError::Validation {
                message: "recognizer.models must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads configuration from the given JSON file, or defaults when `None`.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            serde_json::from_str(&raw)?
        }
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = load_config(None).unwrap();
        assert_eq!(config.loop_interval_secs, 60);
        assert_eq!(config.ocr.dpi, 300);
        assert_eq!(config.recognizer.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    fn test_load_partial_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"input_directory": "/data/inbox", "loop_interval_secs": 5}}"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.input_directory, PathBuf::from("/data/inbox"));
        assert_eq!(config.loop_interval_secs, 5);
        // Untouched sections keep defaults.
        assert_eq!(config.ocr.max_pages, 5);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"input_dir": "/data/inbox"}}"#).unwrap();

        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_zero_dpi_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"ocr": {{"dpi": 0}}}}"#).unwrap();

        match load_config(Some(file.path())) {
            Err(ConfigError::Validation { message }) => assert!(message.contains("dpi")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_errors() {
        let result = load_config(Some(Path::new("/nonexistent/pomerge.json")));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_database_path_from_config() {
        let config = Config {
            database_path: Some(PathBuf::from("/var/lib/pomerge/state.db")),
            ..Default::default()
        };
        // Only meaningful when the env override is unset; the test
        // environment does not set POMERGE_DB.
        if std::env::var(DB_PATH_ENV).is_err() {
            assert_eq!(
                config.resolved_database_path(),
                PathBuf::from("/var/lib/pomerge/state.db")
            );
        }
    }
}
