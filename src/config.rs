//! Runtime settings read from `meeting-grid.toml`.
use crate::error::MeetingGridError;
use crate::error::ResultMessage;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

/// File looked up in the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "meeting-grid.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory of memoized text service answers
    pub cache_dir: PathBuf,
    pub model: String,
    pub api_base: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub max_attempts: u32,
    /// Backoff before retry `n` is `n * backoff_seconds`
    pub backoff_seconds: u64,
    pub min_call_interval_ms: u64,
    /// Schedule tables read from the primary document
    pub max_primary_tables: usize,
    /// Per-channel distance under which two fill colors are the same room
    pub color_tolerance: u8,
    /// Names that head a chair's group of sessions
    pub chairs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache"),
            model: "gemini-2.5-flash".to_owned(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            api_key_env: "GEMINI_API_KEY".to_owned(),
            max_attempts: 3,
            backoff_seconds: 5,
            min_call_interval_ms: 1000,
            max_primary_tables: 2,
            color_tolerance: 8,
            chairs: vec!["Xiaodong".to_owned(), "Sorour".to_owned(), "Hiroki".to_owned()],
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Config, MeetingGridError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, MeetingGridError> {
        let path = path.as_ref();
        fs::read_to_string(path)
            .map_err(MeetingGridError::from)
            .and_then(|content| Config::from_toml(&content))
            .with_prefix(&path.display().to_string())
    }

    /// Explicit file, else `meeting-grid.toml` when present, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Config, MeetingGridError> {
        match explicit {
            Some(path) => Config::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Config::load(DEFAULT_CONFIG_FILE),
            None => Ok(Config::default()),
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_seconds.saturating_mul(u64::from(attempt)))
    }

    pub fn min_call_interval(&self) -> Duration {
        Duration::from_millis(self.min_call_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = Config::from_toml("model = \"gemini-2.0-flash\"\nchairs = [\"Ana\"]\n").unwrap();
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.chairs, vec!["Ana"]);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.max_primary_tables, 2);
        assert_eq!(config.cache_dir, PathBuf::from(".cache"));
    }

    #[test]
    fn backoff_is_linear() {
        let config = Config::default();
        assert_eq!(config.backoff(1), Duration::from_secs(5));
        assert_eq!(config.backoff(2), Duration::from_secs(10));
        assert_eq!(config.min_call_interval(), Duration::from_secs(1));
    }

    #[test]
    fn invalid_files_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meeting-grid.toml");
        fs::write(&path, "max_attempts = \"three\"").unwrap();
        let error = Config::load(&path).unwrap_err().to_string();
        assert!(error.starts_with(&path.display().to_string()));
    }
}
